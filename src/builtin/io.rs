use super::{BuiltinCommand, add_builtin, wrong_args};
use crate::error::{CmdResult, EvalError};
use crate::interp::Interp;
use crate::value::Value;
use std::io::Write;

/// Write a string to the interpreter's output channel or to stderr.
pub struct Puts {
    newline: bool,
    stderr: bool,
    text: Value,
}

impl BuiltinCommand for Puts {
    fn name() -> &'static str {
        "puts"
    }

    fn usage() -> &'static str {
        "puts ?-nonewline? ?channelId? string"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let (newline, rest) = match args.first() {
            Some(first) if first.as_str() == "-nonewline" && args.len() > 1 => (false, &args[1..]),
            _ => (true, args),
        };
        let (channel, text) = match rest {
            [text] => ("stdout", text),
            [channel, text] => (channel.as_str(), text),
            _ => return Err(wrong_args::<Self>()),
        };
        let stderr = match channel {
            "stdout" => false,
            "stderr" => true,
            other => {
                return Err(EvalError::msg(format!(
                    "can not find channel named \"{}\"",
                    other
                )));
            }
        };
        Ok(Self {
            newline,
            stderr,
            text: text.clone(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let mut stderr = std::io::stderr();
        let out: &mut dyn Write = if self.stderr { &mut stderr } else { interp.output() };
        let written = if self.newline {
            writeln!(out, "{}", self.text)
        } else {
            write!(out, "{}", self.text)
        };
        written
            .and_then(|_| out.flush())
            .map_err(|e| EvalError::msg(format!("error writing \"stdout\": {}", e)))?;
        Ok(Value::empty())
    }
}

pub(super) fn register(interp: &mut Interp) {
    add_builtin::<Puts>(interp);
}
