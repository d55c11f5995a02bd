//! Compiled scripts: a parse cache with pre-resolved command targets.
//!
//! A [`CompiledScript`] remembers the interpreter's compile epoch and the
//! epoch of every command it resolved ahead of time. Any structural change to
//! a command bumps both, so [`Interp::eval_compiled`] recompiles a stale
//! script before running it, and re-resolves by name when a target changes
//! while the script is running.

use crate::command::CommandId;
use crate::error::CmdResult;
use crate::eval::EvalFlags;
use crate::interp::Interp;
use crate::namespace::NsId;
use crate::parser::{self, ParseError, ParsedCommand};
use crate::value::Value;

struct CompiledCommand {
    parsed: ParsedCommand,
    /// Pre-resolved command and its epoch at compile time.
    target: Option<(CommandId, u64)>,
}

/// A parsed script bound to the interpreter state it was compiled against.
pub struct CompiledScript {
    source: String,
    commands: Vec<CompiledCommand>,
    compile_epoch: u64,
    ns: NsId,
    compilations: u32,
}

impl CompiledScript {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// How many times the script was compiled, including the first time.
    pub fn compilations(&self) -> u32 {
        self.compilations
    }

    /// True when the script can run without recompiling.
    pub fn is_valid(&self, interp: &Interp) -> bool {
        self.compile_epoch == interp.compile_epoch()
            && self.ns == interp.current_namespace()
            && self
                .commands
                .iter()
                .filter_map(|c| c.target)
                .all(|(id, epoch)| interp.command_epoch(id) == Some(epoch))
    }
}

impl Interp {
    /// Parse a script and resolve the command words that are literal.
    ///
    /// The compiled script does not keep the resolved commands alive; it
    /// detects that one went away through its epoch and the handle itself.
    pub fn compile(&self, script: &str) -> Result<CompiledScript, ParseError> {
        let ns = self.current_namespace();
        let commands = parser::parse_script(script)?
            .into_iter()
            .map(|parsed| {
                let target = parsed
                    .words
                    .first()
                    .filter(|word| !word.expand)
                    .and_then(|word| word.as_literal())
                    .and_then(|name| self.resolve_command(&name, ns))
                    .and_then(|id| Some((id, self.command_epoch(id)?)));
                CompiledCommand { parsed, target }
            })
            .collect();
        Ok(CompiledScript {
            source: script.to_string(),
            commands,
            compile_epoch: self.compile_epoch(),
            ns,
            compilations: 1,
        })
    }

    /// Run a compiled script, recompiling it first when it is stale.
    pub fn eval_compiled(&mut self, compiled: &mut CompiledScript) -> CmdResult {
        if !compiled.is_valid(self) {
            tracing::debug!(
                compiled_epoch = compiled.compile_epoch,
                current_epoch = self.compile_epoch(),
                "recompiling stale script"
            );
            let compilations = compiled.compilations;
            *compiled = self.compile(&compiled.source)?;
            compiled.compilations = compilations + 1;
        }
        let compiled = &*compiled;
        let flags = EvalFlags::default();
        self.run_evaluation(flags, |interp, top| {
            let mut result = Value::empty();
            for command in &compiled.commands {
                let target = command
                    .target
                    .filter(|(id, epoch)| {
                        interp.compile_epoch() == compiled.compile_epoch
                            && interp.command_epoch(*id) == Some(*epoch)
                    })
                    .map(|(id, _)| id);
                match interp.eval_command(&command.parsed.words, flags, target) {
                    Ok(value) => result = value,
                    Err(exc) => {
                        return interp.compiled_command_failed(&compiled.source, &command.parsed, exc, top);
                    }
                }
            }
            Ok(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandImpl;
    use crate::config::InterpConfig;
    use crate::error::{EvalError, Exception};

    fn scaled(factor: i64) -> CommandImpl {
        CommandImpl::from_fn(move |_, args| {
            let n = args[1].as_int()?;
            Ok(Value::from(n * factor))
        })
    }

    #[test]
    fn test_compiled_script_runs_and_stays_valid() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.create_command("double", scaled(2)).unwrap();
        let mut compiled = interp.compile("double 4; double 21").unwrap();
        assert!(compiled.is_valid(&interp));
        assert_eq!(interp.eval_compiled(&mut compiled).unwrap().as_str(), "42");
        assert_eq!(interp.eval_compiled(&mut compiled).unwrap().as_str(), "42");
        assert_eq!(compiled.compilations(), 1);
    }

    #[test]
    fn test_redefinition_invalidates() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.create_command("double", scaled(2)).unwrap();
        let mut compiled = interp.compile("double 21").unwrap();
        interp.create_command("double", scaled(3)).unwrap();
        assert!(!compiled.is_valid(&interp));
        assert_eq!(interp.eval_compiled(&mut compiled).unwrap().as_str(), "63");
        assert_eq!(compiled.compilations(), 2);
    }

    #[test]
    fn test_rename_and_delete_invalidate() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.create_command("double", scaled(2)).unwrap();
        let mut compiled = interp.compile("double 1").unwrap();
        interp.rename_command("double", "twice").unwrap();
        assert!(!compiled.is_valid(&interp));
        assert_eq!(
            interp.eval_compiled(&mut compiled).unwrap_err(),
            Exception::Error(EvalError::InvalidCommandName("double".to_string()))
        );

        let mut compiled = interp.compile("twice 5").unwrap();
        interp.delete_command("twice").unwrap();
        assert!(!compiled.is_valid(&interp));
        assert!(interp.eval_compiled(&mut compiled).is_err());
    }

    #[test]
    fn test_change_while_running_re_resolves() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.create_command("double", scaled(2)).unwrap();
        interp.create_command(
            "redefine",
            CommandImpl::from_fn(|interp, _| {
                interp.create_command("double", scaled(10));
                Ok(Value::empty())
            }),
        );
        let mut compiled = interp.compile("redefine; double 3").unwrap();
        assert_eq!(interp.eval_compiled(&mut compiled).unwrap().as_str(), "30");
    }

    #[test]
    fn test_interpreter_deletion_invalidates() {
        let mut interp = Interp::new(InterpConfig::bare());
        interp.create_command("double", scaled(2)).unwrap();
        let mut compiled = interp.compile("double 1").unwrap();
        interp.delete();
        assert!(!compiled.is_valid(&interp));
        assert_eq!(
            interp.eval_compiled(&mut compiled).unwrap_err(),
            Exception::Error(EvalError::InterpreterDeleted)
        );
    }
}
