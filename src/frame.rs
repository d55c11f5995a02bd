//! Call frames and variables.
//!
//! The interpreter keeps a stack of [`CallFrame`]s. Frame 0 is the global
//! frame. A procedure call pushes a frame that owns its local variables;
//! `namespace eval` pushes a frame whose variables are those of the
//! namespace. The *active* variable frame is usually the top of the stack but
//! `uplevel` and the `global` evaluation flag temporarily select another one.
//!
//! Variables carry a [`TraceList`] of read, write and unset traces, delivered
//! with the same discipline as command traces.

use crate::error::{EvalError, Exception};
use crate::interp::Interp;
use crate::namespace::{self, Namespaces, NsId};
use crate::trace::{self, TraceId, TraceList, TraceOps};
use crate::value::Value;
use std::collections::BTreeMap;

/// A variable trace event.
#[derive(Debug)]
pub struct VarEvent<'a> {
    /// The variable name as it was referenced.
    pub name: &'a str,
    pub op: TraceOps,
}

/// Callback of a variable trace. An error from a read or write trace fails
/// the access; errors from unset traces are ignored.
pub type VarTraceFn = dyn Fn(&mut Interp, &VarEvent<'_>) -> Result<(), Exception>;

/// A variable slot. A slot may exist without a value when only traces or a
/// link were registered for it.
#[derive(Default)]
pub struct Var {
    pub(crate) value: Option<Value>,
    pub(crate) link: Option<VarRef>,
    pub(crate) traces: TraceList<VarTraceFn>,
}

/// Name → variable store of one scope.
#[derive(Default)]
pub struct VarTable {
    vars: BTreeMap<String, Var>,
}

impl VarTable {
    /// Get the value of a variable in this table (links are not followed).
    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.vars.get(name).and_then(|v| v.value.clone())
    }

    /// Set or override a variable in this table.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.entry(name.into()).or_default().value = Some(value.into());
    }

    /// Names of the variables that currently hold a value.
    pub fn names(&self) -> Vec<String> {
        self.vars
            .iter()
            .filter(|(_, v)| v.value.is_some() || v.link.is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub(crate) fn slot(&self, name: &str) -> Option<&Var> {
        self.vars.get(name)
    }

    pub(crate) fn slot_mut(&mut self, name: &str) -> Option<&mut Var> {
        self.vars.get_mut(name)
    }

    pub(crate) fn entry(&mut self, name: &str) -> &mut Var {
        self.vars.entry(name.to_string()).or_default()
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Var> {
        self.vars.remove(name)
    }

    pub(crate) fn clear(&mut self) {
        self.vars.clear();
    }
}

/// Where a variable table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scope {
    Frame(usize),
    Namespace(NsId),
}

/// Address of a variable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VarRef {
    pub(crate) scope: Scope,
    pub(crate) name: String,
}

/// One frame of the call stack.
pub struct CallFrame {
    pub(crate) ns: NsId,
    /// Local variables of a procedure frame; `None` for namespace frames.
    pub(crate) locals: Option<VarTable>,
    pub(crate) level: usize,
    /// The invocation words of a procedure frame.
    pub(crate) words: Vec<Value>,
    /// Index of the frame that was active when this one was pushed.
    pub(crate) caller: usize,
}

impl CallFrame {
    pub(crate) fn global() -> Self {
        Self {
            ns: Namespaces::GLOBAL,
            locals: None,
            level: 0,
            words: Vec::new(),
            caller: 0,
        }
    }

    pub fn namespace(&self) -> NsId {
        self.ns
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_proc(&self) -> bool {
        self.locals.is_some()
    }
}

const MAX_LINK_DEPTH: usize = 64;

impl Interp {
    /// Push a frame and make it the active variable frame. Returns the
    /// previously active frame, to be handed back to [`Interp::pop_frame`].
    pub(crate) fn push_frame(&mut self, ns: NsId, proc_words: Option<Vec<Value>>) -> usize {
        let saved = self.var_frame;
        let level = self.frames[saved].level + 1;
        let (locals, words) = match proc_words {
            Some(words) => (Some(VarTable::default()), words),
            None => (None, Vec::new()),
        };
        self.frames.push(CallFrame {
            ns,
            locals,
            level,
            words,
            caller: saved,
        });
        self.var_frame = self.frames.len() - 1;
        saved
    }

    pub(crate) fn pop_frame(&mut self, saved: usize) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
        self.var_frame = saved.min(self.frames.len() - 1);
    }

    /// Namespace of the active variable frame.
    pub fn current_namespace(&self) -> NsId {
        self.frames[self.var_frame].ns
    }

    /// Level of the active variable frame; 0 at global level.
    pub fn level(&self) -> usize {
        self.frames[self.var_frame].level
    }

    /// The active variable frame.
    pub fn frame(&self) -> &CallFrame {
        &self.frames[self.var_frame]
    }

    /// Invocation words of the procedure frame at `level`.
    pub(crate) fn frame_words(&self, level: usize) -> Option<&[Value]> {
        let mut index = self.var_frame;
        loop {
            let frame = &self.frames[index];
            if frame.level == level {
                return Some(&frame.words);
            }
            if index == 0 {
                return None;
            }
            index = frame.caller;
        }
    }

    /// Resolve a level specifier (`N` relative, `#N` absolute) to a frame
    /// index on the caller chain of the active frame.
    pub(crate) fn frame_for_level(&self, spec: &str) -> Result<usize, EvalError> {
        let current = self.level();
        let bad = || EvalError::msg(format!("bad level \"{}\"", spec));
        let target = match spec.strip_prefix('#') {
            Some(abs) => abs.parse::<usize>().map_err(|_| bad())?,
            None => {
                let up = spec.parse::<usize>().map_err(|_| bad())?;
                current.checked_sub(up).ok_or_else(bad)?
            }
        };
        if target > current {
            return Err(bad());
        }
        let mut index = self.var_frame;
        loop {
            let frame = &self.frames[index];
            if frame.level <= target {
                return Ok(index);
            }
            index = frame.caller;
        }
    }

    /// Run `f` with `index` as the active variable frame.
    pub(crate) fn with_var_frame<T>(&mut self, index: usize, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.var_frame, index);
        let result = f(self);
        self.var_frame = saved.min(self.frames.len() - 1);
        result
    }

    fn table(&self, scope: &Scope) -> Option<&VarTable> {
        match scope {
            Scope::Frame(index) => self.frames.get(*index)?.locals.as_ref(),
            Scope::Namespace(ns) => Some(&self.namespaces.get(*ns)?.vars),
        }
    }

    fn table_mut(&mut self, scope: &Scope) -> Option<&mut VarTable> {
        match scope {
            Scope::Frame(index) => self.frames.get_mut(*index)?.locals.as_mut(),
            Scope::Namespace(ns) => Some(&mut self.namespaces.get_mut(*ns)?.vars),
        }
    }

    fn slot(&self, var: &VarRef) -> Option<&Var> {
        self.table(&var.scope)?.slot(&var.name)
    }

    fn slot_mut(&mut self, var: &VarRef) -> Option<&mut Var> {
        self.table_mut(&var.scope)?.slot_mut(&var.name)
    }

    /// Resolve a variable name from the active frame, following links.
    /// Returns `None` when a namespace qualifier does not resolve.
    fn locate_var(&self, name: &str) -> Option<VarRef> {
        let frame_index = self.var_frame;
        let frame = &self.frames[frame_index];
        let mut var = if namespace::is_qualified(name) {
            let (ns_path, tail) = namespace::split_qualified(name);
            let ns = self.namespaces.find(frame.ns, ns_path.unwrap_or("::"))?;
            VarRef {
                scope: Scope::Namespace(ns),
                name: tail.to_string(),
            }
        } else if frame.locals.is_some() {
            VarRef {
                scope: Scope::Frame(frame_index),
                name: name.to_string(),
            }
        } else {
            VarRef {
                scope: Scope::Namespace(frame.ns),
                name: name.to_string(),
            }
        };
        for _ in 0..MAX_LINK_DEPTH {
            match self.slot(&var).and_then(|slot| slot.link.clone()) {
                Some(target) => var = target,
                None => break,
            }
        }
        Some(var)
    }

    fn fire_var_traces(&mut self, var: &VarRef, name: &str, op: TraceOps, verb: &str) -> Result<(), Exception> {
        let Some(slot) = self.slot_mut(var) else {
            return Ok(());
        };
        if slot
            .traces
            .is_active(TraceOps::READ | TraceOps::WRITE | TraceOps::UNSET)
        {
            return Ok(());
        }
        let Some((saved, snapshot)) = slot.traces.begin(op) else {
            return Ok(());
        };
        let event = VarEvent { name, op };
        let result = trace::deliver(&snapshot, |entry| (entry.callback())(self, &event));
        if let Some(slot) = self.slot_mut(var) {
            slot.traces.finish(saved);
        }
        result.map_err(|e| match e {
            Exception::Error(err) => Exception::msg(format!("can't {} \"{}\": {}", verb, name, err)),
            other => other,
        })
    }

    /// Read a variable from the active frame.
    pub fn get_var(&mut self, name: &str) -> Result<Value, Exception> {
        let missing = || Exception::msg(format!("can't read \"{}\": no such variable", name));
        let var = self.locate_var(name).ok_or_else(missing)?;
        self.fire_var_traces(&var, name, TraceOps::READ, "read")?;
        self.slot(&var)
            .and_then(|slot| slot.value.clone())
            .ok_or_else(missing)
    }

    /// Write a variable in the active frame, creating it if needed. Returns
    /// the variable's value after write traces ran.
    pub fn set_var(&mut self, name: &str, value: impl Into<Value>) -> Result<Value, Exception> {
        let value = value.into();
        let var = self.locate_var(name).ok_or_else(|| {
            Exception::msg(format!("can't set \"{}\": parent namespace doesn't exist", name))
        })?;
        let Some(table) = self.table_mut(&var.scope) else {
            return Err(Exception::msg(format!("can't set \"{}\": no such frame", name)));
        };
        table.entry(&var.name).value = Some(value.clone());
        self.fire_var_traces(&var, name, TraceOps::WRITE, "set")?;
        Ok(self
            .slot(&var)
            .and_then(|slot| slot.value.clone())
            .unwrap_or(value))
    }

    /// Remove a variable, firing its unset traces.
    pub fn unset_var(&mut self, name: &str) -> Result<(), Exception> {
        let missing = || Exception::msg(format!("can't unset \"{}\": no such variable", name));
        let var = self.locate_var(name).ok_or_else(missing)?;
        if self.slot(&var).and_then(|slot| slot.value.as_ref()).is_none() {
            return Err(missing());
        }
        let Some(mut removed) = self.table_mut(&var.scope).and_then(|t| t.remove(&var.name)) else {
            return Err(missing());
        };
        if let Some((_, snapshot)) = removed.traces.begin(TraceOps::UNSET) {
            let event = VarEvent {
                name,
                op: TraceOps::UNSET,
            };
            for entry in snapshot.iter().filter(|entry| !entry.is_removed()) {
                if let Err(e) = (entry.callback())(self, &event) {
                    tracing::debug!(variable = name, error = %e, "ignoring error from unset trace");
                }
            }
        }
        removed.traces.clear();
        Ok(())
    }

    /// True when the variable exists and holds a value.
    pub fn var_exists(&self, name: &str) -> bool {
        self.locate_var(name)
            .and_then(|var| self.slot(&var).map(|slot| slot.value.is_some()))
            .unwrap_or(false)
    }

    /// Link a local variable of the active procedure frame to the global
    /// (or namespace) variable `name`. A no-op outside procedures.
    pub fn link_global(&mut self, name: &str) -> Result<(), EvalError> {
        let frame_index = self.var_frame;
        if self.frames[frame_index].locals.is_none() {
            return Ok(());
        }
        let (ns_path, tail) = namespace::split_qualified(name);
        let ns = match ns_path {
            Some(path) => self
                .namespaces
                .find(Namespaces::GLOBAL, path)
                .ok_or_else(|| EvalError::UnknownNamespace(path.to_string()))?,
            None => Namespaces::GLOBAL,
        };
        let target = VarRef {
            scope: Scope::Namespace(ns),
            name: tail.to_string(),
        };
        if let Some(locals) = self.frames[frame_index].locals.as_mut() {
            if locals.slot(tail).is_some_and(|slot| slot.value.is_some()) {
                return Err(EvalError::msg(format!("variable \"{}\" already exists", tail)));
            }
            locals.entry(tail).link = Some(target);
        }
        Ok(())
    }

    /// Register a trace on a variable of the active frame. The variable slot
    /// is created if it does not exist yet.
    pub fn trace_var(&mut self, name: &str, ops: TraceOps, callback: Box<VarTraceFn>) -> Result<TraceId, EvalError> {
        let var = self
            .locate_var(name)
            .ok_or_else(|| EvalError::msg(format!("can't trace \"{}\": parent namespace doesn't exist", name)))?;
        let table = self
            .table_mut(&var.scope)
            .ok_or_else(|| EvalError::msg(format!("can't trace \"{}\": no such frame", name)))?;
        Ok(table.entry(&var.name).traces.add(ops, callback))
    }

    /// Remove a variable trace. Returns false when it was not registered.
    pub fn untrace_var(&mut self, name: &str, id: TraceId) -> bool {
        match self.locate_var(name) {
            Some(var) => self
                .slot_mut(&var)
                .map(|slot| slot.traces.remove(id))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Names of the variables visible in the active frame.
    pub fn var_names(&self) -> Vec<String> {
        let frame = &self.frames[self.var_frame];
        match &frame.locals {
            Some(locals) => locals.names(),
            None => self
                .namespaces
                .get(frame.ns)
                .map(|ns| ns.vars.names())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpConfig;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_var_table_set_and_get() {
        let mut table = VarTable::default();
        assert_eq!(table.get_var("KEY"), None);
        table.set_var("KEY", "VALUE");
        assert_eq!(table.get_var("KEY"), Some(Value::from("VALUE")));
        assert_eq!(table.names(), vec!["KEY".to_string()]);
    }

    #[test]
    fn test_global_and_local_scopes() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.set_var("x", "global").unwrap();

        let saved = interp.push_frame(Namespaces::GLOBAL, Some(vec![Value::from("p")]));
        assert!(!interp.var_exists("x"));
        interp.set_var("x", "local").unwrap();
        assert_eq!(interp.get_var("::x").unwrap().as_str(), "global");
        assert_eq!(interp.level(), 1);
        interp.pop_frame(saved);

        assert_eq!(interp.get_var("x").unwrap().as_str(), "global");
        assert_eq!(interp.level(), 0);
    }

    #[test]
    fn test_link_global() {
        let mut interp = Interp::new(InterpConfig::bare());
        let saved = interp.push_frame(Namespaces::GLOBAL, Some(Vec::new()));
        interp.link_global("counter").unwrap();
        interp.set_var("counter", "5").unwrap();
        interp.pop_frame(saved);
        assert_eq!(interp.get_var("counter").unwrap().as_str(), "5");
    }

    #[test]
    fn test_missing_variable_messages() {
        let mut interp = Interp::new(InterpConfig::bare());
        let err = interp.get_var("nope").unwrap_err();
        assert_eq!(err.to_string(), "can't read \"nope\": no such variable");
        let err = interp.unset_var("nope").unwrap_err();
        assert_eq!(err.to_string(), "can't unset \"nope\": no such variable");
    }

    #[test]
    fn test_var_traces_fire_once_per_access() {
        let mut interp = Interp::new(InterpConfig::bare());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        interp
            .trace_var(
                "v",
                TraceOps::READ | TraceOps::WRITE | TraceOps::UNSET,
                Box::new(move |interp, event| {
                    log.borrow_mut().push(event.op.names().join(""));
                    // Accesses from inside the trace do not re-fire it.
                    if event.op == TraceOps::WRITE {
                        let current = interp.get_var(event.name)?;
                        interp.set_var(event.name, format!("{}!", current))?;
                    }
                    Ok(())
                }),
            )
            .unwrap();

        assert_eq!(interp.set_var("v", "a").unwrap().as_str(), "a!");
        assert_eq!(interp.get_var("v").unwrap().as_str(), "a!");
        interp.unset_var("v").unwrap();
        assert_eq!(*seen.borrow(), vec!["write", "read", "unset"]);
        assert!(!interp.var_exists("v"));
    }

    #[test]
    fn test_read_trace_error_fails_the_read() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.set_var("v", "1").unwrap();
        interp
            .trace_var("v", TraceOps::READ, Box::new(|_, _| Err(Exception::msg("locked"))))
            .unwrap();
        let err = interp.get_var("v").unwrap_err();
        assert_eq!(err.to_string(), "can't read \"v\": locked");
    }

    #[test]
    fn test_unset_trace_errors_are_ignored() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.set_var("v", "1").unwrap();
        let runs = Rc::new(RefCell::new(0));
        interp
            .trace_var("v", TraceOps::UNSET, Box::new(|_, _| Err(Exception::msg("locked"))))
            .unwrap();
        let count = runs.clone();
        interp
            .trace_var(
                "v",
                TraceOps::UNSET,
                Box::new(move |_, _| {
                    *count.borrow_mut() += 1;
                    Ok(())
                }),
            )
            .unwrap();
        interp.unset_var("v").unwrap();
        assert_eq!(*runs.borrow(), 1);
        assert!(!interp.var_exists("v"));
    }

    #[test]
    fn test_level_specs() {
        let mut interp = Interp::new(InterpConfig::bare());
        let first = interp.push_frame(Namespaces::GLOBAL, Some(Vec::new()));
        let second = interp.push_frame(Namespaces::GLOBAL, Some(Vec::new()));
        assert_eq!(interp.frame_for_level("1").unwrap(), 1);
        assert_eq!(interp.frame_for_level("#0").unwrap(), 0);
        assert_eq!(interp.frame_for_level("2").unwrap(), 0);
        assert!(interp.frame_for_level("3").is_err());
        assert!(interp.frame_for_level("x").is_err());
        interp.pop_frame(second);
        interp.pop_frame(first);
    }
}
