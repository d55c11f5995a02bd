//! Interpreter state and lifecycle.
//!
//! An [`Interp`] owns the namespace tree, the hidden table, the command arena,
//! the call-frame stack and the diagnostics surface. It is the context object
//! threaded through every operation: command implementations and trace
//! callbacks receive it as `&mut Interp`.
//!
//! Deletion is deferred. [`Interp::delete`] marks the interpreter deleted,
//! after which no command or namespace can be created; the physical teardown
//! runs once no evaluation holds the interpreter any more (see
//! [`Interp::preserve`]), or when the value is dropped.

use crate::builtin;
use crate::command::{CommandArena, CommandId};
use crate::config::InterpConfig;
use crate::frame::CallFrame;
use crate::namespace::Namespaces;
use crate::trace::{CommandTraceFn, InterpTrace, TraceId, TraceList, TraceOps};
use crate::value::Value;
use std::any::Any;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::io::Write;
use std::rc::Rc;

/// Callback run when associated data is deleted, receiving the data back.
pub type AssocDeleteProc = Box<dyn FnOnce(&mut Interp, Box<dyn Any>)>;

struct AssocEntry {
    data: Box<dyn Any>,
    deleter: Option<AssocDeleteProc>,
}

/// Shared flag requesting cancellation of the running evaluation.
///
/// Clones share the flag, so a handle can be given to a command or another
/// owner and set from there. The engine polls the flag after each dispatched
/// command and clears it when a new top-level evaluation starts.
#[derive(Clone, Default)]
pub struct CancelHandle(Rc<Cell<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.get()
    }

    pub fn reset(&self) {
        self.0.set(false);
    }
}

/// The interpreter.
pub struct Interp {
    pub(crate) config: InterpConfig,
    pub(crate) namespaces: Namespaces,
    pub(crate) commands: CommandArena,
    pub(crate) hidden: BTreeMap<String, CommandId>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) var_frame: usize,
    pub(crate) num_levels: usize,
    pub(crate) compile_epoch: u64,
    pub(crate) cmd_count: u64,
    deleted: bool,
    torn_down: bool,
    preserve_count: usize,
    pub(crate) err_already_logged: bool,
    /// The error info belongs to an error that was already handled.
    pub(crate) error_info_stale: bool,
    allow_exceptions_once: bool,
    pub(crate) exceptions_allowed: bool,
    pub(crate) result: Value,
    pub(crate) error_info: Option<String>,
    pub(crate) error_code: Vec<String>,
    pub(crate) error_line: usize,
    pub(crate) interp_traces: TraceList<InterpTrace>,
    assoc: BTreeMap<String, AssocEntry>,
    next_assoc_key: u64,
    pub(crate) cancel: CancelHandle,
    pub(crate) stack_base: usize,
    out: Box<dyn Write>,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new(InterpConfig::default())
    }
}

impl Interp {
    /// Create an interpreter. Built-in commands are registered unless the
    /// config disables them.
    pub fn new(config: InterpConfig) -> Self {
        let builtins = config.builtins;
        let mut interp = Self {
            config,
            namespaces: Namespaces::new(),
            commands: CommandArena::default(),
            hidden: BTreeMap::new(),
            frames: vec![CallFrame::global()],
            var_frame: 0,
            num_levels: 0,
            compile_epoch: 0,
            cmd_count: 0,
            deleted: false,
            torn_down: false,
            preserve_count: 0,
            err_already_logged: false,
            error_info_stale: false,
            allow_exceptions_once: false,
            exceptions_allowed: false,
            result: Value::empty(),
            error_info: None,
            error_code: Vec::new(),
            error_line: 0,
            interp_traces: TraceList::new(),
            assoc: BTreeMap::new(),
            next_assoc_key: 0,
            cancel: CancelHandle::default(),
            stack_base: 0,
            out: Box::new(std::io::stdout()),
        };
        if builtins {
            builtin::register_all(&mut interp);
        }
        tracing::debug!(
            max_nesting_depth = interp.config.max_nesting_depth,
            builtins,
            "interpreter created"
        );
        interp
    }

    pub fn config(&self) -> &InterpConfig {
        &self.config
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Mark the interpreter deleted. Idempotent.
    ///
    /// Bumps the compile epoch so every compiled script is invalidated. The
    /// teardown runs immediately when nothing holds the interpreter, and
    /// otherwise when the last hold is released.
    pub fn delete(&mut self) {
        if self.deleted {
            return;
        }
        self.deleted = true;
        self.compile_epoch += 1;
        tracing::debug!(
            holds = self.preserve_count,
            levels = self.num_levels,
            "interpreter marked deleted"
        );
        if self.preserve_count == 0 && self.num_levels == 0 {
            self.teardown();
        }
    }

    /// True once the interpreter has been physically torn down.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Hold the interpreter alive across an evaluation.
    pub fn preserve(&mut self) {
        self.preserve_count += 1;
    }

    /// Drop a hold taken with [`Interp::preserve`]; runs a deferred teardown
    /// when the interpreter is deleted and this was the last hold.
    pub fn release(&mut self) {
        self.preserve_count = self.preserve_count.saturating_sub(1);
        if self.preserve_count == 0 && self.deleted && self.num_levels == 0 {
            self.teardown();
        }
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        if self.num_levels > 0 {
            panic!(
                "interpreter teardown with {} evaluations still active",
                self.num_levels
            );
        }
        self.torn_down = true;
        tracing::debug!("tearing down interpreter");

        let hidden: Vec<CommandId> = self.hidden.values().copied().collect();
        for id in hidden {
            self.delete_command_by_id(id);
        }
        self.hidden.clear();

        // A deleter may register new data; keep going until none is left.
        while let Some((name, entry)) = self.assoc.pop_first() {
            tracing::trace!(key = %name, "deleting assoc data");
            if let Some(deleter) = entry.deleter {
                deleter(self, entry.data);
            }
        }

        self.teardown_namespaces();

        self.interp_traces.clear();
        self.frames.truncate(1);
        self.var_frame = 0;
        self.result = Value::empty();
        self.error_info = None;
        self.error_code.clear();
        self.error_line = 0;
    }

    /// Attach named data to the interpreter, replacing (and deleting) any
    /// previous data under the same name.
    pub fn set_assoc_data(&mut self, name: &str, data: Box<dyn Any>, deleter: Option<AssocDeleteProc>) {
        self.delete_assoc_data(name);
        self.assoc
            .insert(name.to_string(), AssocEntry { data, deleter });
    }

    pub fn assoc_data(&self, name: &str) -> Option<&dyn Any> {
        self.assoc.get(name).map(|e| e.data.as_ref())
    }

    pub fn assoc_data_mut(&mut self, name: &str) -> Option<&mut dyn Any> {
        self.assoc.get_mut(name).map(|e| e.data.as_mut())
    }

    /// Remove named data, running its deleter. Returns false when absent.
    pub fn delete_assoc_data(&mut self, name: &str) -> bool {
        match self.assoc.remove(name) {
            Some(entry) => {
                if let Some(deleter) = entry.deleter {
                    deleter(self, entry.data);
                }
                true
            }
            None => false,
        }
    }

    /// Run `callback` when the interpreter is torn down.
    pub fn call_when_deleted(&mut self, callback: impl FnOnce(&mut Interp) + 'static) {
        let key = format!("::when-deleted::{}", self.next_assoc_key);
        self.next_assoc_key += 1;
        self.set_assoc_data(
            &key,
            Box::new(()),
            Some(Box::new(move |interp, _| callback(interp))),
        );
    }

    /// Result of the last dispatched command or evaluation.
    pub fn result(&self) -> &Value {
        &self.result
    }

    /// Traceback accumulated for the last error, if any.
    pub fn error_info(&self) -> Option<&str> {
        self.error_info.as_deref()
    }

    /// Structured error code of the last error.
    pub fn error_code(&self) -> &[String] {
        &self.error_code
    }

    /// 1-based line of the command that raised the last error.
    pub fn error_line(&self) -> usize {
        self.error_line
    }

    /// Number of commands dispatched so far.
    pub fn command_count(&self) -> u64 {
        self.cmd_count
    }

    pub fn compile_epoch(&self) -> u64 {
        self.compile_epoch
    }

    /// Current evaluation nesting depth.
    pub fn nesting_depth(&self) -> usize {
        self.num_levels
    }

    /// Set the maximum nesting depth and return the previous one. A zero
    /// depth is ignored and only queries the current limit.
    pub fn set_recursion_limit(&mut self, depth: usize) -> usize {
        let old = self.config.max_nesting_depth;
        if depth > 0 {
            self.config.max_nesting_depth = depth;
        }
        old
    }

    /// Change the cap on dispatched commands.
    pub fn set_command_limit(&mut self, limit: Option<u64>) {
        self.config.command_limit = limit;
    }

    /// Let control-flow codes escape the next top-level evaluation.
    pub fn allow_exceptions(&mut self) {
        self.allow_exceptions_once = true;
    }

    pub(crate) fn take_allow_exceptions(&mut self) -> bool {
        std::mem::take(&mut self.allow_exceptions_once) || self.config.allow_exceptions
    }

    /// Handle that cancels the running evaluation when set.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Channel `puts` writes to.
    pub fn output(&mut self) -> &mut dyn Write {
        self.out.as_mut()
    }

    pub fn set_output(&mut self, out: impl Write + 'static) {
        self.out = Box::new(out);
    }

    /// Register an interpreter-wide execution trace seeing every dispatch at
    /// nesting depth `level` or shallower (0 means all depths).
    pub fn create_trace(&mut self, level: usize, ops: TraceOps, callback: Box<CommandTraceFn>) -> TraceId {
        self.interp_traces
            .add(ops, Box::new(InterpTrace { level, callback }))
    }

    pub fn delete_trace(&mut self, id: TraceId) -> bool {
        self.interp_traces.remove(id)
    }
}

impl Drop for Interp {
    fn drop(&mut self) {
        if !self.torn_down {
            self.deleted = true;
            self.num_levels = 0;
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandImpl;
    use crate::trace::TraceEvent;
    use std::cell::RefCell;

    fn noop() -> CommandImpl {
        CommandImpl::from_fn(|_, _| Ok(Value::empty()))
    }

    #[test]
    fn test_delete_is_idempotent_and_blocks_creation() {
        let mut interp = Interp::new(InterpConfig::bare());
        let epoch = interp.compile_epoch();
        interp.delete();
        interp.delete();
        assert!(interp.is_deleted());
        assert!(interp.is_torn_down());
        assert_eq!(interp.compile_epoch(), epoch + 1);
        assert!(interp.create_command("late", noop()).is_none());
    }

    #[test]
    fn test_teardown_waits_for_last_hold() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.preserve();
        interp.delete();
        assert!(!interp.is_torn_down());
        interp.release();
        assert!(interp.is_torn_down());
    }

    #[test]
    fn test_teardown_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut interp = Interp::new(InterpConfig::bare());

        interp.create_command("visible", noop()).unwrap();
        interp.create_command("secret", noop()).unwrap();
        interp.hide_command("secret", "secret").unwrap();
        for name in ["visible", "secret"] {
            let log = log.clone();
            let id = if name == "secret" {
                interp.hidden["secret"]
            } else {
                interp.find_command(name).unwrap()
            };
            interp
                .trace_command_id(
                    id,
                    TraceOps::DELETE,
                    Box::new(move |_, event| {
                        if let TraceEvent::Delete { name } = event {
                            log.borrow_mut().push(format!("delete {}", name));
                        }
                        Ok(())
                    }),
                )
                .unwrap();
        }

        let outer = log.clone();
        interp.set_assoc_data(
            "first",
            Box::new(1u32),
            Some(Box::new(move |interp, _| {
                outer.borrow_mut().push("assoc first".to_string());
                // Registered during teardown: still deleted before the namespaces go.
                let inner = outer.clone();
                interp.set_assoc_data(
                    "late",
                    Box::new(2u32),
                    Some(Box::new(move |_, _| inner.borrow_mut().push("assoc late".to_string()))),
                );
            })),
        );

        drop(interp);
        assert_eq!(
            *log.borrow(),
            vec!["delete secret", "assoc first", "assoc late", "delete ::visible"]
        );
    }

    #[test]
    fn test_assoc_data_roundtrip() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.set_assoc_data("counter", Box::new(41u32), None);
        if let Some(n) = interp
            .assoc_data_mut("counter")
            .and_then(|d| d.downcast_mut::<u32>())
        {
            *n += 1;
        }
        let value = interp
            .assoc_data("counter")
            .and_then(|d| d.downcast_ref::<u32>())
            .copied();
        assert_eq!(value, Some(42));
        assert!(interp.delete_assoc_data("counter"));
        assert!(!interp.delete_assoc_data("counter"));
    }

    #[test]
    fn test_call_when_deleted_runs_once() {
        let hits = Rc::new(Cell::new(0));
        let mut interp = Interp::new(InterpConfig::bare());
        let counter = hits.clone();
        interp.call_when_deleted(move |_| counter.set(counter.get() + 1));
        interp.delete();
        drop(interp);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_set_recursion_limit_ignores_zero() {
        let mut interp = Interp::new(InterpConfig::bare());
        assert_eq!(interp.set_recursion_limit(50), 1000);
        assert_eq!(interp.set_recursion_limit(0), 50);
        assert_eq!(interp.config().max_nesting_depth, 50);
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let interp = Interp::new(InterpConfig::bare());
        let handle = interp.cancel_handle();
        handle.cancel();
        assert!(interp.cancel_handle().is_canceled());
        handle.reset();
        assert!(!interp.cancel.is_canceled());
    }
}
