//! The evaluation engine.
//!
//! A script is evaluated command by command: the words of each command are
//! substituted (with `{*}` words spliced in as lists), word 0 is resolved to a
//! command, execution traces run around the dispatch, and the completion is
//! propagated to the caller. Errors accumulate a traceback in the
//! interpreter's error info as they unwind through script levels.
//!
//! Every command dispatch counts as one nesting level. The readiness check at
//! each level enforces the nesting limit and the native-stack budget, so
//! runaway recursion surfaces as [`EvalError::RecursionLimit`].

use crate::command::{CommandId, CommandImpl};
use crate::error::{CmdResult, EscapedFlow, EvalError, Exception};
use crate::interp::Interp;
use crate::namespace::Namespaces;
use crate::parser::{ParsedCommand, Parser, Word, WordPart};
use crate::trace::{self, TraceEvent, TraceOps};
use crate::value::Value;

/// Longest command text quoted in a traceback fragment.
const MAX_LOGGED_COMMAND: usize = 150;

/// Options of an evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalFlags {
    /// Evaluate at global level: variables and command resolution use the
    /// global namespace.
    pub global: bool,
    /// Resolve command names in the global namespace, and do not record the
    /// invoked words in the traceback.
    pub invoke: bool,
    /// Do not add traceback fragments for errors.
    pub no_traceback: bool,
}

impl EvalFlags {
    pub fn global() -> Self {
        Self {
            global: true,
            ..Self::default()
        }
    }

    pub fn invoke() -> Self {
        Self {
            invoke: true,
            ..Self::default()
        }
    }
}

#[inline(never)]
fn stack_address() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

fn truncate_command(text: &str) -> String {
    if text.len() <= MAX_LOGGED_COMMAND {
        return text.to_string();
    }
    let mut end = MAX_LOGGED_COMMAND;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn escaped_to_error(exc: Exception) -> Exception {
    let flow = match exc {
        Exception::Break => EscapedFlow::Break,
        Exception::Continue => EscapedFlow::Continue,
        Exception::Custom { code, .. } => EscapedFlow::Code(code),
        Exception::Return { .. } => EscapedFlow::Code(2),
        error @ Exception::Error(_) => return error,
    };
    Exception::Error(EvalError::EscapedControlFlow(flow))
}

impl Interp {
    /// Evaluate a script at the current level.
    pub fn eval(&mut self, script: &str) -> CmdResult {
        self.eval_with_flags(script, EvalFlags::default())
    }

    pub fn eval_with_flags(&mut self, script: &str, flags: EvalFlags) -> CmdResult {
        self.run_evaluation(flags, |interp, top| interp.eval_script(script, flags, top))
    }

    /// Evaluate a command given as already-substituted words.
    ///
    /// When the command fails, the traceback quotes the words as a list,
    /// unless `flags.invoke` is set.
    pub fn eval_words(&mut self, words: &[Value], flags: EvalFlags) -> CmdResult {
        self.run_evaluation(flags, |interp, top| {
            let result = interp.eval_objv(words, flags, false, None);
            interp.words_finished(words, result, !flags.invoke && !flags.no_traceback, top)
        })
    }

    /// Invoke a hidden command by its token.
    pub fn invoke_hidden(&mut self, words: &[Value], no_traceback: bool) -> CmdResult {
        let flags = EvalFlags {
            global: true,
            invoke: true,
            no_traceback,
        };
        self.run_evaluation(flags, |interp, top| {
            let result = interp.eval_objv(words, flags, true, None);
            interp.words_finished(words, result, !no_traceback, top)
        })
    }

    /// Append a fragment to the error info of a failed evaluation.
    ///
    /// The error info is (re)initialized from `err` first when it is empty
    /// or belongs to an earlier, already handled error.
    pub fn add_error_info(&mut self, err: &Exception, fragment: &str) {
        self.init_error_info(err);
        if let Some(info) = self.error_info.as_mut() {
            info.push_str(fragment);
        }
    }

    /// Replace the error info with `info` and keep the engine from adding a
    /// fragment for the command that is failing now.
    pub fn set_error_info(&mut self, err: &Exception, info: &str) {
        self.init_error_info(err);
        self.error_info = Some(info.to_string());
        if let Some(e) = err.as_error() {
            self.error_code = e.error_code();
        }
        self.err_already_logged = true;
    }

    /// Mark the current error as handled; the next error starts a fresh
    /// traceback.
    pub(crate) fn reset_error_state(&mut self) {
        self.error_info_stale = true;
        self.err_already_logged = false;
    }

    fn init_error_info(&mut self, err: &Exception) -> bool {
        if self.error_info.is_some() && !self.error_info_stale {
            return false;
        }
        self.error_info = Some(err.value().to_string());
        self.error_code = match err.as_error() {
            Some(e) => e.error_code(),
            None => vec!["NONE".to_string()],
        };
        self.error_info_stale = false;
        true
    }

    pub(crate) fn run_evaluation(&mut self, flags: EvalFlags, body: impl FnOnce(&mut Self, bool) -> CmdResult) -> CmdResult {
        let top = self.num_levels == 0;
        if top {
            self.begin_top_level();
        }
        if self.is_deleted() {
            return Err(EvalError::InterpreterDeleted.into());
        }
        self.preserve();
        let saved = flags.global.then(|| std::mem::replace(&mut self.var_frame, 0));
        let result = body(self, top);
        if let Some(saved) = saved {
            self.var_frame = saved.min(self.frames.len() - 1);
        }
        self.result = match &result {
            Ok(value) => value.clone(),
            Err(exc) => exc.value(),
        };
        self.release();
        result
    }

    fn begin_top_level(&mut self) {
        self.result = Value::empty();
        self.error_info = None;
        self.error_code.clear();
        self.error_line = 0;
        self.error_info_stale = false;
        self.err_already_logged = false;
        self.exceptions_allowed = self.take_allow_exceptions();
        self.cancel.reset();
        self.stack_base = stack_address();
    }

    fn eval_script(&mut self, script: &str, flags: EvalFlags, top: bool) -> CmdResult {
        let mut parser = Parser::new(script);
        let mut result = Value::empty();
        loop {
            let parsed = match parser.next_command() {
                Ok(Some(parsed)) => parsed,
                Ok(None) => break,
                Err(e) => {
                    let start = e.command_start;
                    return self.command_failed(script, start, script.len(), e.into(), !flags.no_traceback, top);
                }
            };
            if parsed.words.is_empty() {
                continue;
            }
            match self.eval_command(&parsed.words, flags, None) {
                Ok(value) => result = value,
                Err(exc) => {
                    return self.command_failed(script, parsed.start, parsed.end, exc, !flags.no_traceback, top);
                }
            }
        }
        Ok(result)
    }

    /// Substitute the words of one parsed command and dispatch it.
    pub(crate) fn eval_command(&mut self, words: &[Word], flags: EvalFlags, target: Option<CommandId>) -> CmdResult {
        let values = self.substitute_words(words)?;
        self.eval_objv(&values, flags, false, target)
    }

    fn substitute_words(&mut self, words: &[Word]) -> Result<Vec<Value>, Exception> {
        let mut values = Vec::with_capacity(words.len());
        for (index, word) in words.iter().enumerate() {
            let value = self.substitute_word(word)?;
            if !word.expand {
                values.push(value);
                continue;
            }
            match value.as_list() {
                Ok(items) => values.extend(items),
                Err(e) => {
                    let exc = Exception::Error(e);
                    self.add_error_info(&exc, &format!("\n    (expanding word {})", index));
                    return Err(exc);
                }
            }
        }
        Ok(values)
    }

    fn substitute_word(&mut self, word: &Word) -> CmdResult {
        if let [part] = word.parts.as_slice() {
            return self.substitute_part(part);
        }
        let mut text = String::new();
        for part in &word.parts {
            text.push_str(self.substitute_part(part)?.as_str());
        }
        Ok(Value::from(text))
    }

    fn substitute_part(&mut self, part: &WordPart) -> CmdResult {
        match part {
            WordPart::Literal(text) => Ok(Value::from(text.as_str())),
            WordPart::VarSubst(name) => self.get_var(name),
            WordPart::CmdSubst(script) => {
                self.num_levels += 1;
                let result = match self.ready() {
                    Ok(()) => self.eval_script(script, EvalFlags::default(), false),
                    Err(e) => Err(e.into()),
                };
                self.num_levels -= 1;
                result
            }
        }
    }

    /// Apply top-level conversions and record traceback for a failed command.
    fn command_failed(&mut self, script: &str, start: usize, end: usize, exc: Exception, log: bool, top: bool) -> CmdResult {
        let exc = if top {
            match exc.unwind_return() {
                Ok(value) => return Ok(value),
                Err(exc) if self.exceptions_allowed => exc,
                Err(exc) => escaped_to_error(exc),
            }
        } else {
            exc
        };
        if let Exception::Error(_) = exc {
            if log && !self.err_already_logged {
                let end = end.clamp(start, script.len());
                self.log_command_info(script, start, &script[start..end], &exc);
            }
            self.err_already_logged = false;
        }
        Err(exc)
    }

    pub(crate) fn compiled_command_failed(&mut self, script: &str, parsed: &ParsedCommand, exc: Exception, top: bool) -> CmdResult {
        self.command_failed(script, parsed.start, parsed.end, exc, true, top)
    }

    fn words_finished(&mut self, words: &[Value], result: CmdResult, log: bool, top: bool) -> CmdResult {
        match result {
            Ok(value) => Ok(value),
            Err(exc) => {
                let text = Value::from_list(words.iter());
                let text = text.as_str();
                self.command_failed(text, 0, text.len(), exc, log, top)
            }
        }
    }

    fn log_command_info(&mut self, script: &str, start: usize, command: &str, err: &Exception) {
        let fresh = self.init_error_info(err);
        self.error_line = 1 + script[..start].matches('\n').count();
        let lead = if fresh { "while executing" } else { "invoked from within" };
        let fragment = format!("\n    {}\n\"{}\"", lead, truncate_command(command));
        if let Some(info) = self.error_info.as_mut() {
            info.push_str(&fragment);
        }
    }

    /// Readiness check run at every nesting level.
    pub(crate) fn ready(&self) -> Result<(), EvalError> {
        if self.is_deleted() {
            return Err(EvalError::InterpreterDeleted);
        }
        if self.num_levels > self.config.max_nesting_depth {
            return Err(EvalError::RecursionLimit);
        }
        if self.stack_base != 0 && self.stack_base.abs_diff(stack_address()) > self.config.stack_limit_bytes {
            tracing::debug!(levels = self.num_levels, "native stack budget exhausted");
            return Err(EvalError::RecursionLimit);
        }
        Ok(())
    }

    /// Dispatch one command given as words, at one more nesting level.
    ///
    /// `target` is a command already resolved by the caller; it is used as
    /// long as it is still registered.
    pub(crate) fn eval_objv(&mut self, words: &[Value], flags: EvalFlags, hidden: bool, target: Option<CommandId>) -> CmdResult {
        self.num_levels += 1;
        let result = self.resolve_and_dispatch(words, flags, hidden, target);
        self.num_levels -= 1;
        result
    }

    fn resolve_and_dispatch(&mut self, words: &[Value], flags: EvalFlags, hidden: bool, mut target: Option<CommandId>) -> CmdResult {
        self.ready()?;
        let Some(name) = words.first() else {
            return Ok(Value::empty());
        };
        let mut check_traces = true;
        loop {
            let id = match target.take().filter(|id| self.is_command_live(*id)) {
                Some(id) => id,
                None => match self.resolve_for_dispatch(name.as_str(), flags, hidden) {
                    Some(id) => id,
                    None => return self.invoke_unknown(words, flags, hidden),
                },
            };
            if check_traces && self.has_exec_traces(id) {
                let epoch = self.command_epoch(id);
                self.preserve_command(id);
                let entered = self.fire_exec_traces(id, words, None);
                let changed = self.command_epoch(id) != epoch || !self.is_command_live(id);
                self.release_command(id);
                entered?;
                if changed {
                    tracing::debug!(command = %name, "command changed by enter trace, resolving again");
                    check_traces = false;
                    continue;
                }
                return self.dispatch(id, words, flags, true);
            }
            return self.dispatch(id, words, flags, false);
        }
    }

    fn resolve_for_dispatch(&self, name: &str, flags: EvalFlags, hidden: bool) -> Option<CommandId> {
        if hidden {
            return self.find_hidden(name);
        }
        let context = if flags.global || flags.invoke {
            Namespaces::GLOBAL
        } else {
            self.current_namespace()
        };
        self.resolve_command(name, context)
    }

    fn invoke_unknown(&mut self, words: &[Value], flags: EvalFlags, hidden: bool) -> CmdResult {
        let name = words.first().map(|w| w.to_string()).unwrap_or_default();
        if hidden {
            return Err(EvalError::UnknownHidden(name).into());
        }
        let fallback = self.config.unknown_command.clone();
        let Some(handler) = self.resolve_command(&fallback, Namespaces::GLOBAL) else {
            return Err(EvalError::InvalidCommandName(name).into());
        };
        tracing::debug!(command = %name, fallback = %fallback, "dispatching to unknown-command fallback");
        let mut fallback_words = Vec::with_capacity(words.len() + 1);
        fallback_words.push(Value::from(fallback));
        fallback_words.extend_from_slice(words);
        self.eval_objv(&fallback_words, flags, false, Some(handler))
    }

    fn has_exec_traces(&self, id: CommandId) -> bool {
        let mask = TraceOps::ENTER | TraceOps::LEAVE;
        self.interp_traces.has(mask)
            || self
                .commands
                .get(id)
                .is_some_and(|record| record.traces.has(mask))
    }

    /// Deliver enter traces (`outcome` is `None`) or leave traces.
    ///
    /// Interpreter-wide traces run before command traces on enter and after
    /// them on leave. Neither fires for commands executed by a trace callback.
    fn fire_exec_traces(&mut self, id: CommandId, words: &[Value], outcome: Option<&CmdResult>) -> Result<(), Exception> {
        let command = self.command_full_name(id).unwrap_or_default();
        let event = match outcome {
            None => TraceEvent::Enter {
                command: &command,
                words,
            },
            Some(outcome) => TraceEvent::Leave {
                command: &command,
                words,
                outcome,
            },
        };
        if outcome.is_none() {
            self.fire_interp_traces(&event)?;
            self.fire_command_exec_traces(id, &event)
        } else {
            self.fire_command_exec_traces(id, &event)?;
            self.fire_interp_traces(&event)
        }
    }

    fn fire_interp_traces(&mut self, event: &TraceEvent<'_>) -> Result<(), Exception> {
        let ops = event.ops();
        if self.interp_traces.is_active(TraceOps::ENTER | TraceOps::LEAVE) {
            return Ok(());
        }
        let Some((saved, snapshot)) = self.interp_traces.begin(ops) else {
            return Ok(());
        };
        let depth = self.num_levels;
        let result = trace::deliver(&snapshot, |entry| {
            let trace = entry.callback();
            if trace.level == 0 || depth <= trace.level {
                (trace.callback)(self, event)
            } else {
                Ok(())
            }
        });
        self.interp_traces.finish(saved);
        result
    }

    fn fire_command_exec_traces(&mut self, id: CommandId, event: &TraceEvent<'_>) -> Result<(), Exception> {
        let ops = event.ops();
        let Some(record) = self.commands.get_mut(id) else {
            return Ok(());
        };
        if record.traces.is_active(TraceOps::ENTER | TraceOps::LEAVE) {
            return Ok(());
        }
        let Some((saved, snapshot)) = record.traces.begin(ops) else {
            return Ok(());
        };
        let result = trace::deliver(&snapshot, |entry| (entry.callback())(self, event));
        if let Some(record) = self.commands.get_mut(id) {
            record.traces.finish(saved);
        }
        result
    }

    /// Invoke a resolved command, holding its record across the call.
    fn dispatch(&mut self, id: CommandId, words: &[Value], flags: EvalFlags, traced: bool) -> CmdResult {
        self.preserve_command(id);
        self.cmd_count += 1;
        let saved = flags.global.then(|| std::mem::replace(&mut self.var_frame, 0));
        let mut result = self.invoke_impl(id, words, flags);
        if let Some(saved) = saved {
            self.var_frame = saved.min(self.frames.len() - 1);
        }

        if self.cancel.is_canceled() {
            tracing::debug!(command = %words[0], "evaluation canceled");
            result = Err(EvalError::Canceled.into());
        } else if self.config.command_limit.is_some_and(|limit| self.cmd_count > limit) {
            tracing::debug!(count = self.cmd_count, "command limit exceeded");
            result = Err(EvalError::LimitExceeded.into());
        }

        if traced && !self.is_command_deleting(id) {
            if let Err(e) = self.fire_exec_traces(id, words, Some(&result)) {
                result = Err(e);
            }
        }
        self.release_command(id);
        result
    }

    fn invoke_impl(&mut self, id: CommandId, words: &[Value], flags: EvalFlags) -> CmdResult {
        let invalid = || Exception::from(EvalError::InvalidCommandName(words[0].to_string()));
        let real = self.original_command(id).ok_or_else(invalid)?;
        match self.command_impl(real).ok_or_else(invalid)? {
            CommandImpl::Proc(proc) => proc.invoke(self, words),
            CommandImpl::Import { .. } => Err(invalid()),
            CommandImpl::Alias { target, prefix } => {
                let mut target_words = Vec::with_capacity(prefix.len() + words.len());
                target_words.push(target);
                target_words.extend(prefix);
                target_words.extend_from_slice(&words[1..]);
                let flags = EvalFlags {
                    invoke: true,
                    ..flags
                };
                self.eval_objv(&target_words, flags, false, None)
            }
            CommandImpl::Ensemble(ensemble) => {
                let Some(sub) = words.get(1) else {
                    return Err(EvalError::WrongArgs(format!("{} subcommand ?arg ...?", words[0])).into());
                };
                let target = ensemble.resolve(sub.as_str())?;
                let mut target_words = Vec::with_capacity(words.len() - 1);
                target_words.push(Value::from(target));
                target_words.extend_from_slice(&words[2..]);
                let flags = EvalFlags {
                    invoke: true,
                    ..flags
                };
                self.eval_objv(&target_words, flags, false, None)
            }
        }
    }
}
