//! Command implementations and command records.
//!
//! A command record binds a name in one table (a namespace's command table or
//! the interpreter's hidden table) to an implementation plus its lifecycle
//! metadata. Records live in an arena and are addressed by generation-checked
//! [`CommandId`] handles: when a record is reclaimed its slot generation is
//! bumped, so every handle still pointing at the slot becomes detectably
//! stale.

use crate::error::{CmdResult, EvalError};
use crate::interp::Interp;
use crate::namespace::NsId;
use crate::trace::{CommandTraceFn, TraceList};
use crate::value::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Stable handle of a command record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId {
    index: u32,
    generation: u32,
}

/// Object-safe trait for any native command implementation.
///
/// `args[0]` is the command name as it was invoked. An implementation must not
/// assume the record it was reached through is still valid after it returns
/// if it renamed or deleted itself.
pub trait CommandProc {
    fn invoke(&self, interp: &mut Interp, args: &[Value]) -> CmdResult;
}

impl<F> CommandProc for F
where
    F: Fn(&mut Interp, &[Value]) -> CmdResult,
{
    fn invoke(&self, interp: &mut Interp, args: &[Value]) -> CmdResult {
        self(interp, args)
    }
}

/// Callback run once when a command is deleted.
pub type DeleteProc = Box<dyn FnOnce(&mut Interp)>;

/// The polymorphic part of a command record.
#[derive(Clone)]
pub enum CommandImpl {
    /// A native procedure.
    Proc(Rc<dyn CommandProc>),
    /// Forwarder created by importing `real` into another namespace.
    Import { real: CommandId },
    /// Re-dispatches to `target` by name, with `prefix` words inserted before
    /// the caller's arguments.
    Alias { target: Value, prefix: Vec<Value> },
    /// Maps its first argument onto a subcommand.
    Ensemble(Rc<Ensemble>),
}

impl CommandImpl {
    /// Wrap a closure or any other [`CommandProc`].
    pub fn native(proc: impl CommandProc + 'static) -> Self {
        CommandImpl::Proc(Rc::new(proc))
    }

    /// Wrap a closure, letting the compiler infer its argument types.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut Interp, &[Value]) -> CmdResult + 'static,
    {
        CommandImpl::Proc(Rc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CommandImpl::Proc(_) => "native",
            CommandImpl::Import { .. } => "import",
            CommandImpl::Alias { .. } => "alias",
            CommandImpl::Ensemble(_) => "ensemble",
        }
    }
}

/// Subcommand map of an ensemble command.
///
/// Each subcommand name maps to the fully qualified name of the command that
/// implements it. A unique prefix of a subcommand name selects it.
pub struct Ensemble {
    subcommands: BTreeMap<String, String>,
}

impl Ensemble {
    pub fn new<I, A, B>(subcommands: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            subcommands: subcommands
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        }
    }

    pub fn subcommands(&self) -> impl Iterator<Item = &str> {
        self.subcommands.keys().map(|s| s.as_str())
    }

    /// Full name of the command implementing `sub`.
    pub fn resolve(&self, sub: &str) -> Result<&str, EvalError> {
        if let Some(target) = self.subcommands.get(sub) {
            return Ok(target.as_str());
        }
        let mut matches = self
            .subcommands
            .iter()
            .filter(|(name, _)| name.starts_with(sub));
        match (matches.next(), matches.next()) {
            (Some((_, target)), None) if !sub.is_empty() => Ok(target.as_str()),
            _ => {
                let names: Vec<&str> = self.subcommands().collect();
                let choices = match names.split_last() {
                    Some((last, rest)) if !rest.is_empty() => {
                        format!("{}, or {}", rest.join(", "), last)
                    }
                    Some((last, _)) => last.to_string(),
                    None => String::new(),
                };
                Err(EvalError::Command {
                    message: format!(
                        "unknown or ambiguous subcommand \"{}\": must be {}",
                        sub, choices
                    ),
                    code: vec!["TCL".into(), "LOOKUP".into(), "SUBCOMMAND".into(), sub.into()],
                })
            }
        }
    }
}

/// The table a record currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    Namespace(NsId),
    Hidden,
    /// Logically deleted: no table refers to the record any more.
    Detached,
}

pub(crate) struct CommandRecord {
    /// Key of the record in its current table (a hidden token when hidden).
    pub(crate) name: String,
    pub(crate) location: Location,
    /// Owning namespace; kept while the command is hidden.
    pub(crate) ns: NsId,
    pub(crate) imp: CommandImpl,
    pub(crate) deleter: Option<DeleteProc>,
    pub(crate) epoch: u64,
    /// One reference for the table entry plus one per external holder.
    pub(crate) ref_count: usize,
    pub(crate) deleting: bool,
    pub(crate) traces: TraceList<CommandTraceFn>,
    /// Imports of this command living in other namespaces.
    pub(crate) imports: Vec<CommandId>,
}

impl CommandRecord {
    pub(crate) fn new(name: &str, ns: NsId, imp: CommandImpl, deleter: Option<DeleteProc>) -> Self {
        Self {
            name: name.to_string(),
            location: Location::Namespace(ns),
            ns,
            imp,
            deleter,
            epoch: 0,
            ref_count: 1,
            deleting: false,
            traces: TraceList::new(),
            imports: Vec::new(),
        }
    }
}

struct Slot {
    generation: u32,
    record: Option<CommandRecord>,
}

/// Arena of command records with free-slot reuse.
#[derive(Default)]
pub(crate) struct CommandArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl CommandArena {
    pub(crate) fn insert(&mut self, record: CommandRecord) -> CommandId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.record = Some(record);
                CommandId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                CommandId { index, generation: 0 }
            }
        }
    }

    pub(crate) fn get(&self, id: CommandId) -> Option<&CommandRecord> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: CommandId) -> Option<&mut CommandRecord> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_mut())
    }

    /// Free a record's slot; every handle to it becomes stale.
    pub(crate) fn reclaim(&mut self, id: CommandId) -> Option<CommandRecord> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(record)
    }

    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.record.is_some()).count()
    }
}
