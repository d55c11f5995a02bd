//! Trace lists shared by command traces, execution traces and variable traces.
//!
//! A [`TraceList`] keeps callbacks in registration order. Delivery works on a
//! snapshot of the entries: every entry is held through its own [`Rc`] while
//! its callback runs, so a callback may unregister itself or any other trace
//! without invalidating the entry being executed. Removed entries are flagged
//! and skipped by snapshots that were taken before the removal.
//!
//! The list also carries the reentrancy guard: the set of operations whose
//! traces are currently being delivered. Owners consult it to decide whether a
//! nested event should be suppressed.

use crate::error::{CmdResult, Exception};
use crate::interp::Interp;
use crate::value::Value;
use std::cell::Cell;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::rc::Rc;

/// Set of trace operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceOps(u32);

impl TraceOps {
    pub const NONE: TraceOps = TraceOps(0);
    pub const RENAME: TraceOps = TraceOps(1);
    pub const DELETE: TraceOps = TraceOps(2);
    pub const ENTER: TraceOps = TraceOps(4);
    pub const LEAVE: TraceOps = TraceOps(8);
    pub const READ: TraceOps = TraceOps(16);
    pub const WRITE: TraceOps = TraceOps(32);
    pub const UNSET: TraceOps = TraceOps(64);

    const NAMES: [(TraceOps, &'static str); 7] = [
        (TraceOps::RENAME, "rename"),
        (TraceOps::DELETE, "delete"),
        (TraceOps::ENTER, "enter"),
        (TraceOps::LEAVE, "leave"),
        (TraceOps::READ, "read"),
        (TraceOps::WRITE, "write"),
        (TraceOps::UNSET, "unset"),
    ];

    pub fn contains(self, other: TraceOps) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: TraceOps) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parse a single operation name such as `rename` or `enter`.
    pub fn from_name(name: &str) -> Option<TraceOps> {
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(ops, _)| *ops)
    }

    /// Names of the operations in the set, in canonical order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(ops, _)| self.contains(*ops))
            .map(|(_, n)| *n)
            .collect()
    }
}

impl BitOr for TraceOps {
    type Output = TraceOps;
    fn bitor(self, rhs: TraceOps) -> TraceOps {
        TraceOps(self.0 | rhs.0)
    }
}

impl BitOrAssign for TraceOps {
    fn bitor_assign(&mut self, rhs: TraceOps) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TraceOps {
    type Output = TraceOps;
    fn bitand(self, rhs: TraceOps) -> TraceOps {
        TraceOps(self.0 & rhs.0)
    }
}

impl fmt::Debug for TraceOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceOps({})", self.names().join("|"))
    }
}

/// Handle of a registered trace, unique within its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u64);

/// A structural or execution event delivered to a command trace.
#[derive(Debug)]
pub enum TraceEvent<'a> {
    /// The command was renamed. Both names are fully qualified.
    Rename { old: &'a str, new: &'a str },
    /// The command is being deleted.
    Delete { name: &'a str },
    /// The command is about to be dispatched with `words`.
    Enter { command: &'a str, words: &'a [Value] },
    /// The command has returned `outcome`.
    Leave {
        command: &'a str,
        words: &'a [Value],
        outcome: &'a CmdResult,
    },
}

impl TraceEvent<'_> {
    pub fn ops(&self) -> TraceOps {
        match self {
            TraceEvent::Rename { .. } => TraceOps::RENAME,
            TraceEvent::Delete { .. } => TraceOps::DELETE,
            TraceEvent::Enter { .. } => TraceOps::ENTER,
            TraceEvent::Leave { .. } => TraceOps::LEAVE,
        }
    }
}

/// Callback of a command or interpreter trace.
///
/// The returned error is honored for execution events only; errors from
/// rename and delete traces are ignored.
pub type CommandTraceFn = dyn Fn(&mut Interp, &TraceEvent<'_>) -> Result<(), Exception>;

/// An interpreter-wide execution trace.
pub struct InterpTrace {
    /// Deepest nesting level the trace fires at; 0 means every level.
    pub level: usize,
    pub callback: Box<CommandTraceFn>,
}

/// A registered trace. Held through an [`Rc`] during delivery.
pub struct TraceEntry<F: ?Sized> {
    id: TraceId,
    ops: TraceOps,
    tag: Option<String>,
    removed: Cell<bool>,
    callback: Box<F>,
}

impl<F: ?Sized> TraceEntry<F> {
    pub fn id(&self) -> TraceId {
        self.id
    }

    pub fn ops(&self) -> TraceOps {
        self.ops
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn callback(&self) -> &F {
        &self.callback
    }

    /// True once the entry has been unregistered.
    pub fn is_removed(&self) -> bool {
        self.removed.get()
    }
}

/// Ordered trace list with a reentrancy guard.
pub struct TraceList<F: ?Sized> {
    entries: Vec<Rc<TraceEntry<F>>>,
    next_id: u64,
    active: TraceOps,
}

impl<F: ?Sized> Default for TraceList<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            active: TraceOps::NONE,
        }
    }
}

impl<F: ?Sized> TraceList<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `ops`.
    pub fn add(&mut self, ops: TraceOps, callback: Box<F>) -> TraceId {
        self.add_tagged(ops, None, callback)
    }

    /// Register a callback carrying a tag that can later identify it, such as
    /// the script a scripted trace runs.
    pub fn add_tagged(&mut self, ops: TraceOps, tag: Option<String>, callback: Box<F>) -> TraceId {
        let id = TraceId(self.next_id);
        self.next_id += 1;
        self.entries.push(Rc::new(TraceEntry {
            id,
            ops,
            tag,
            removed: Cell::new(false),
            callback,
        }));
        id
    }

    /// Unregister a trace. Returns false when no such trace is registered.
    pub fn remove(&mut self, id: TraceId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                let entry = self.entries.remove(index);
                entry.removed.set(true);
                true
            }
            None => false,
        }
    }

    /// Find the first trace registered with exactly `ops` and `tag`.
    pub fn find_tagged(&self, ops: TraceOps, tag: &str) -> Option<TraceId> {
        self.entries
            .iter()
            .find(|e| e.ops == ops && e.tag.as_deref() == Some(tag))
            .map(|e| e.id)
    }

    /// Unregister every trace.
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            entry.removed.set(true);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when some trace listens for any operation in `ops`.
    pub fn has(&self, ops: TraceOps) -> bool {
        self.entries.iter().any(|e| e.ops.intersects(ops))
    }

    /// Registered traces, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry<F>> {
        self.entries.iter().map(|e| e.as_ref())
    }

    /// True while traces for any operation in `ops` are being delivered.
    pub fn is_active(&self, ops: TraceOps) -> bool {
        self.active.intersects(ops)
    }

    /// Start delivering `ops`: marks them active and returns the previous
    /// guard state together with a snapshot of the matching entries. Returns
    /// `None` when nothing listens for `ops`.
    pub fn begin(&mut self, ops: TraceOps) -> Option<(TraceOps, Vec<Rc<TraceEntry<F>>>)> {
        let snapshot: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.ops.intersects(ops))
            .cloned()
            .collect();
        if snapshot.is_empty() {
            return None;
        }
        let saved = self.active;
        self.active |= ops;
        Some((saved, snapshot))
    }

    /// Restore the guard state returned by [`TraceList::begin`].
    pub fn finish(&mut self, saved: TraceOps) {
        self.active = saved;
    }
}

/// Run each live entry of a snapshot, stopping at the first error.
pub fn deliver<F: ?Sized>(
    snapshot: &[Rc<TraceEntry<F>>],
    mut call: impl FnMut(&TraceEntry<F>) -> Result<(), Exception>,
) -> Result<(), Exception> {
    for entry in snapshot {
        if entry.is_removed() {
            continue;
        }
        call(entry)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    type Note = dyn Fn(&RefCell<Vec<u64>>);

    fn noting(n: u64) -> Box<Note> {
        Box::new(move |log: &RefCell<Vec<u64>>| log.borrow_mut().push(n))
    }

    #[test]
    fn test_ops_names_roundtrip() {
        let ops = TraceOps::RENAME | TraceOps::DELETE;
        assert_eq!(ops.names(), vec!["rename", "delete"]);
        assert_eq!(TraceOps::from_name("leave"), Some(TraceOps::LEAVE));
        assert_eq!(TraceOps::from_name("sideways"), None);
        assert!(ops.contains(TraceOps::DELETE));
        assert!(!ops.intersects(TraceOps::ENTER));
    }

    #[test]
    fn test_snapshot_keeps_registration_order_and_filters_ops() {
        let mut list: TraceList<Note> = TraceList::new();
        list.add(TraceOps::DELETE, noting(1));
        list.add(TraceOps::RENAME, noting(2));
        list.add(TraceOps::DELETE | TraceOps::RENAME, noting(3));

        let log = RefCell::new(Vec::new());
        let (saved, snapshot) = list.begin(TraceOps::DELETE).unwrap();
        assert!(list.is_active(TraceOps::DELETE));
        deliver(&snapshot, |e| {
            (e.callback())(&log);
            Ok(())
        })
        .unwrap();
        list.finish(saved);

        assert_eq!(*log.borrow(), vec![1, 3]);
        assert!(!list.is_active(TraceOps::DELETE));
    }

    #[test]
    fn test_removed_entries_are_skipped_by_older_snapshots() {
        let mut list: TraceList<Note> = TraceList::new();
        let first = list.add(TraceOps::DELETE, noting(1));
        list.add(TraceOps::DELETE, noting(2));

        let (_, snapshot) = list.begin(TraceOps::DELETE).unwrap();
        assert!(list.remove(first));
        assert!(!list.remove(first));

        let log = RefCell::new(Vec::new());
        deliver(&snapshot, |e| {
            (e.callback())(&log);
            Ok(())
        })
        .unwrap();
        assert_eq!(*log.borrow(), vec![2]);
        assert!(snapshot[0].is_removed());
    }

    #[test]
    fn test_begin_without_listeners_leaves_guard_alone() {
        let mut list: TraceList<Note> = TraceList::new();
        list.add(TraceOps::RENAME, noting(1));
        assert!(list.begin(TraceOps::DELETE).is_none());
        assert!(!list.is_active(TraceOps::DELETE));
    }

    #[test]
    fn test_tagged_lookup_and_clear() {
        let mut list: TraceList<Note> = TraceList::new();
        let id = list.add_tagged(TraceOps::ENTER, Some("log".into()), noting(1));
        assert_eq!(list.find_tagged(TraceOps::ENTER, "log"), Some(id));
        assert_eq!(list.find_tagged(TraceOps::LEAVE, "log"), None);
        list.clear();
        assert!(list.is_empty());
    }
}
