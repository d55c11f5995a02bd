//! The namespace tree.
//!
//! Namespaces live in an arena owned by the interpreter and are addressed by
//! [`NsId`]. Slot 0 is always the global namespace. Slots are never reused, so
//! a stale id of a deleted namespace simply fails to resolve.

use crate::command::CommandId;
use crate::frame::VarTable;
use std::collections::BTreeMap;

/// Handle of a namespace in the interpreter's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NsId(pub(crate) usize);

/// A hierarchical naming scope owning a command table and a variable table.
pub struct Namespace {
    pub(crate) name: String,
    pub(crate) parent: Option<NsId>,
    pub(crate) children: BTreeMap<String, NsId>,
    pub(crate) commands: BTreeMap<String, CommandId>,
    pub(crate) vars: VarTable,
    /// Bumped whenever lookups through this namespace may resolve differently.
    pub(crate) lookup_epoch: u64,
}

impl Namespace {
    fn new(name: &str, parent: Option<NsId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: BTreeMap::new(),
            commands: BTreeMap::new(),
            vars: VarTable::default(),
            lookup_epoch: 0,
        }
    }

    /// Simple (unqualified) name; empty for the global namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NsId> {
        self.parent
    }

    pub fn lookup_epoch(&self) -> u64 {
        self.lookup_epoch
    }
}

pub(crate) struct Namespaces {
    slots: Vec<Option<Namespace>>,
}

impl Namespaces {
    pub(crate) const GLOBAL: NsId = NsId(0);

    pub(crate) fn new() -> Self {
        Self {
            slots: vec![Some(Namespace::new("", None))],
        }
    }

    pub(crate) fn get(&self, id: NsId) -> Option<&Namespace> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NsId) -> Option<&mut Namespace> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    pub(crate) fn exists(&self, id: NsId) -> bool {
        self.get(id).is_some()
    }

    /// Fully qualified name: `::` for the global namespace, `::a::b` otherwise.
    pub(crate) fn full_name(&self, id: NsId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(ns) = self.get(current) else { break };
            if ns.parent.is_some() {
                parts.push(ns.name.as_str());
            }
            cursor = ns.parent;
        }
        if parts.is_empty() {
            return "::".to_string();
        }
        parts.reverse();
        format!("::{}", parts.join("::"))
    }

    /// Fully qualified name of `tail` inside namespace `id`.
    pub(crate) fn qualify(&self, id: NsId, tail: &str) -> String {
        let ns = self.full_name(id);
        if ns == "::" {
            format!("::{}", tail)
        } else {
            format!("{}::{}", ns, tail)
        }
    }

    fn create_child(&mut self, parent: NsId, name: &str) -> NsId {
        let id = NsId(self.slots.len());
        self.slots.push(Some(Namespace::new(name, Some(parent))));
        if let Some(ns) = self.get_mut(parent) {
            ns.children.insert(name.to_string(), id);
        }
        id
    }

    fn walk(&mut self, start: NsId, path: &str, create: bool) -> Option<NsId> {
        let mut current = start;
        for part in path_components(path) {
            let existing = self.get(current)?.children.get(part).copied();
            current = match existing {
                Some(child) => child,
                None if create => self.create_child(current, part),
                None => return None,
            };
        }
        Some(current)
    }

    /// Resolve a namespace path. Absolute paths start at the global namespace;
    /// relative paths are tried under `from`, then under the global namespace.
    pub(crate) fn find(&self, from: NsId, path: &str) -> Option<NsId> {
        let walk = |start: NsId| -> Option<NsId> {
            let mut current = start;
            for part in path_components(path) {
                current = *self.get(current)?.children.get(part)?;
            }
            Some(current)
        };
        if is_absolute(path) {
            return walk(Self::GLOBAL);
        }
        walk(from).or_else(|| walk(Self::GLOBAL))
    }

    /// Resolve a namespace path, creating missing namespaces. Relative paths
    /// are created under `from`.
    pub(crate) fn find_or_create(&mut self, from: NsId, path: &str) -> Option<NsId> {
        let start = if is_absolute(path) { Self::GLOBAL } else { from };
        self.walk(start, path, true)
    }

    /// Detach a namespace from its parent and free its slot. The namespace
    /// must already be empty.
    pub(crate) fn remove(&mut self, id: NsId) -> Option<Namespace> {
        if id == Self::GLOBAL {
            return None;
        }
        let ns = self.slots.get_mut(id.0)?.take()?;
        if let Some(parent) = ns.parent.and_then(|p| self.get_mut(p)) {
            parent.children.remove(&ns.name);
        }
        Some(ns)
    }

    /// Bump the lookup epoch of `id` and every ancestor.
    pub(crate) fn invalidate_lookups(&mut self, id: NsId) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(ns) = self.get_mut(current) else { break };
            ns.lookup_epoch += 1;
            cursor = ns.parent;
        }
    }

    /// Ids of `id` and all its descendants, children before parents.
    pub(crate) fn descendants_postorder(&self, id: NsId) -> Vec<NsId> {
        let mut out = Vec::new();
        self.collect_postorder(id, &mut out);
        out
    }

    fn collect_postorder(&self, id: NsId, out: &mut Vec<NsId>) {
        if let Some(ns) = self.get(id) {
            for child in ns.children.values() {
                self.collect_postorder(*child, out);
            }
            out.push(id);
        }
    }
}

pub(crate) fn is_absolute(name: &str) -> bool {
    name.starts_with("::")
}

pub(crate) fn is_qualified(name: &str) -> bool {
    name.contains("::")
}

fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split("::").map(|s| s.trim_matches(':')).filter(|s| !s.is_empty())
}

/// Split a possibly qualified name into its namespace path and tail.
///
/// `"a::b::cmd"` gives `(Some("a::b"), "cmd")`, `"::cmd"` gives
/// `(Some("::"), "cmd")` and `"cmd"` gives `(None, "cmd")`.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rfind("::") {
        Some(pos) => {
            let tail = &name[pos + 2..];
            let head = name[..pos].trim_end_matches(':');
            if head.is_empty() {
                (Some("::"), tail)
            } else {
                (Some(head), tail)
            }
        }
        None => (None, name),
    }
}
