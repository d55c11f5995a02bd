//! Built-in commands.
//!
//! Each built-in is a struct built from its argument words by
//! [`BuiltinCommand::from_args`] and then executed against the interpreter.
//! Arity and option errors are reported while building, before the command
//! touches any interpreter state.
//!
//! Commands that group subcommands (`namespace`, `info`, `interp`, `trace`)
//! are ensembles whose subcommands live under `::tcl::<group>::`.

mod control;
mod introspect;
mod io;
mod list;
mod procs;
mod vars;

use crate::command::{CommandImpl, CommandProc, Ensemble};
use crate::error::{CmdResult, EvalError};
use crate::interp::Interp;
use crate::value::Value;
use std::marker::PhantomData;
use std::rc::Rc;

/// A command implemented natively and registered when the interpreter starts.
pub(crate) trait BuiltinCommand: Sized {
    /// Name the command is registered under, e.g. "set" or
    /// "::tcl::info::level".
    fn name() -> &'static str;

    /// Usage line reported in "wrong # args" errors.
    fn usage() -> &'static str;

    /// Build the command from the words following the command name.
    fn from_args(args: &[Value]) -> Result<Self, EvalError>;

    fn execute(self, interp: &mut Interp) -> CmdResult;
}

/// Adapter that turns a [`BuiltinCommand`] type into a command
/// implementation.
pub(crate) struct Factory<T> {
    _phantom: PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> CommandProc for Factory<T> {
    fn invoke(&self, interp: &mut Interp, args: &[Value]) -> CmdResult {
        T::from_args(args.get(1..).unwrap_or_default())?.execute(interp)
    }
}

pub(crate) fn wrong_args<T: BuiltinCommand>() -> EvalError {
    EvalError::WrongArgs(T::usage().to_string())
}

/// Join words the way `concat` does: trimmed and separated by one space,
/// skipping empty ones.
pub(crate) fn concat(words: &[Value]) -> String {
    words
        .iter()
        .map(|w| w.as_str().trim())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn bool_value(b: bool) -> Value {
    Value::from(if b { "1" } else { "0" })
}

fn add_builtin<T: BuiltinCommand + 'static>(interp: &mut Interp) {
    if interp
        .create_command(T::name(), CommandImpl::native(Factory::<T>::default()))
        .is_none()
    {
        tracing::warn!(command = T::name(), "could not register builtin");
    }
}

fn add_ensemble(interp: &mut Interp, name: &str, subcommands: &[&str]) {
    let ensemble = Ensemble::new(
        subcommands
            .iter()
            .map(|sub| (sub.to_string(), format!("::tcl::{}::{}", name, sub))),
    );
    interp.create_command(name, CommandImpl::Ensemble(Rc::new(ensemble)));
}

/// Register the whole built-in command set.
pub(crate) fn register_all(interp: &mut Interp) {
    vars::register(interp);
    io::register(interp);
    list::register(interp);
    control::register(interp);
    procs::register(interp);
    introspect::register(interp);
    tracing::trace!("registered builtin commands");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpConfig;
    use crate::error::Exception;

    #[test]
    fn test_wrong_args_uses_usage() {
        let mut interp = Interp::new(InterpConfig::default());
        let err = interp.eval("set").unwrap_err();
        assert_eq!(
            err,
            Exception::Error(EvalError::WrongArgs("set varName ?newValue?".to_string()))
        );
        assert_eq!(
            err.to_string(),
            "wrong # args: should be \"set varName ?newValue?\""
        );
    }

    #[test]
    fn test_concat_trims_and_skips_empty() {
        let words = [Value::from(" a "), Value::from(""), Value::from("b c ")];
        assert_eq!(concat(&words), "a b c");
    }

    #[test]
    fn test_ensembles_are_registered() {
        let mut interp = Interp::new(InterpConfig::default());
        for name in ["namespace", "info", "interp", "trace"] {
            assert!(interp.command_exists(name), "{} missing", name);
        }
        assert!(interp.command_exists("::tcl::info::commands"));
        assert_eq!(interp.eval("info lev").unwrap().as_str(), "0");
    }
}
