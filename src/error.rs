//! Errors and control-flow outcomes.
//!
//! A command implementation returns a [`CmdResult`]: either the result value
//! or an [`Exception`]. Exceptions cover every non-normal completion code:
//! errors, `return`, `break`, `continue`, and custom codes. Errors carry an
//! [`EvalError`] describing what went wrong.

use crate::parser::ParseError;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// Outcome of evaluating one command or script.
pub type CmdResult = Result<Value, Exception>;

/// Numeric completion codes as seen by scripts (`return -code`, `catch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Error,
    Return,
    Break,
    Continue,
    /// Application-defined code; always greater than 4.
    Custom(i32),
}

impl Code {
    /// Map an integer completion code onto the enumeration.
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => Code::Ok,
            1 => Code::Error,
            2 => Code::Return,
            3 => Code::Break,
            4 => Code::Continue,
            n => Code::Custom(n),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Code::Ok => 0,
            Code::Error => 1,
            Code::Return => 2,
            Code::Break => 3,
            Code::Continue => 4,
            Code::Custom(n) => n,
        }
    }

    /// Parse the symbolic or numeric form accepted by `return -code`.
    pub fn parse(text: &str) -> Result<Self, EvalError> {
        match text {
            "ok" => Ok(Code::Ok),
            "error" => Ok(Code::Error),
            "return" => Ok(Code::Return),
            "break" => Ok(Code::Break),
            "continue" => Ok(Code::Continue),
            other => other.parse::<i32>().map(Code::from_i32).map_err(|_| {
                EvalError::msg(format!(
                    "bad completion code \"{}\": must be ok, error, return, break, continue, or an integer",
                    other
                ))
            }),
        }
    }
}

/// Which control-flow signal escaped to a context that cannot interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapedFlow {
    Break,
    Continue,
    Code(i32),
}

impl fmt::Display for EscapedFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapedFlow::Break => write!(f, "invoked \"break\" outside of a loop"),
            EscapedFlow::Continue => write!(f, "invoked \"continue\" outside of a loop"),
            EscapedFlow::Code(n) => write!(f, "command returned bad code: {}", n),
        }
    }
}

/// Error taxonomy of the interpreter core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("attempt to call eval in deleted interpreter")]
    InterpreterDeleted,

    #[error("too many nested evaluations (infinite loop?)")]
    RecursionLimit,

    #[error("invalid command name \"{0}\"")]
    InvalidCommandName(String),

    #[error("{0}")]
    EscapedControlFlow(EscapedFlow),

    #[error("cannot define or rename alias \"{0}\": would create a loop")]
    AliasLoop(String),

    #[error("command \"{0}\" already exists")]
    DuplicateName(String),

    #[error("can't {action} \"{name}\": command doesn't exist")]
    UnknownCommand { action: &'static str, name: String },

    #[error("unknown hidden command \"{0}\"")]
    UnknownHidden(String),

    #[error("unknown namespace \"{0}\"")]
    UnknownNamespace(String),

    #[error("{0}")]
    BadName(String),

    #[error("{0}")]
    NotAList(String),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("wrong # args: should be \"{0}\"")]
    WrongArgs(String),

    #[error("eval canceled")]
    Canceled,

    #[error("command count limit exceeded")]
    LimitExceeded,

    /// Error raised by a command implementation.
    #[error("{message}")]
    Command { message: String, code: Vec<String> },
}

impl EvalError {
    /// Command error with the default `NONE` error code.
    pub fn msg(message: impl Into<String>) -> Self {
        EvalError::Command {
            message: message.into(),
            code: vec!["NONE".to_string()],
        }
    }

    /// Structured error code published on the diagnostics surface.
    pub fn error_code(&self) -> Vec<String> {
        let message = self.to_string();
        let parts: &[&str] = match self {
            EvalError::InterpreterDeleted => &["CORE", "IDELETE"],
            EvalError::RecursionLimit => &["TCL", "LIMIT", "STACK"],
            EvalError::InvalidCommandName(name) => {
                return vec!["TCL".into(), "LOOKUP".into(), "COMMAND".into(), name.clone()];
            }
            EvalError::EscapedControlFlow(_) => &["TCL", "RESULT", "UNEXPECTED"],
            EvalError::AliasLoop(_) => &["TCL", "OPERATION", "ALIAS", "LOOP"],
            EvalError::DuplicateName(_) => &["TCL", "OPERATION", "RENAME", "TARGET_EXISTS"],
            EvalError::UnknownCommand { name, .. } => {
                return vec!["TCL".into(), "LOOKUP".into(), "COMMAND".into(), name.clone()];
            }
            EvalError::UnknownHidden(name) => {
                return vec!["TCL".into(), "LOOKUP".into(), "HIDDENTOKEN".into(), name.clone()];
            }
            EvalError::UnknownNamespace(name) => {
                return vec!["TCL".into(), "LOOKUP".into(), "NAMESPACE".into(), name.clone()];
            }
            EvalError::BadName(_) => &["TCL", "VALUE", "COMMAND"],
            EvalError::NotAList(_) => &["TCL", "VALUE", "LIST"],
            EvalError::Parse(_) => &["TCL", "PARSE"],
            EvalError::WrongArgs(_) => &["TCL", "WRONGARGS"],
            EvalError::Canceled => &["TCL", "CANCEL", "IEVAL"],
            EvalError::LimitExceeded => &["TCL", "LIMIT", "COMMANDS"],
            EvalError::Command { code, .. } => return code.clone(),
        };
        let mut code: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        if matches!(self, EvalError::InterpreterDeleted) {
            code.push(message);
        }
        code
    }
}

/// Any completion other than normal.
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    Error(EvalError),
    /// `return`, unwinding to the nearest procedure boundary. `code` is the
    /// completion the procedure call itself will produce.
    Return { code: Code, value: Value },
    Break,
    Continue,
    Custom { code: i32, value: Value },
}

impl Exception {
    /// Error exception with a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Exception::Error(EvalError::msg(message))
    }

    pub fn code(&self) -> Code {
        match self {
            Exception::Error(_) => Code::Error,
            Exception::Return { .. } => Code::Return,
            Exception::Break => Code::Break,
            Exception::Continue => Code::Continue,
            Exception::Custom { code, .. } => Code::Custom(*code),
        }
    }

    pub fn as_error(&self) -> Option<&EvalError> {
        match self {
            Exception::Error(e) => Some(e),
            _ => None,
        }
    }

    /// The value a `catch` would store for this completion.
    pub fn value(&self) -> Value {
        match self {
            Exception::Error(e) => Value::new(e.to_string()),
            Exception::Return { value, .. } | Exception::Custom { value, .. } => value.clone(),
            Exception::Break | Exception::Continue => Value::empty(),
        }
    }

    /// Build the exception that a command completing with `code` produces.
    pub fn from_code(code: Code, value: Value) -> CmdResult {
        match code {
            Code::Ok => Ok(value),
            Code::Error => Err(Exception::Error(EvalError::msg(value.as_str()))),
            Code::Return => Err(Exception::Return {
                code: Code::Ok,
                value,
            }),
            Code::Break => Err(Exception::Break),
            Code::Continue => Err(Exception::Continue),
            Code::Custom(code) => Err(Exception::Custom { code, value }),
        }
    }

    /// Apply a `return` at a procedure boundary (or at top level): the
    /// prepared completion code replaces the `return` itself. Any other
    /// exception passes through unchanged.
    pub fn unwind_return(self) -> CmdResult {
        match self {
            Exception::Return { code, value } => Exception::from_code(code, value),
            other => Err(other),
        }
    }
}

impl From<EvalError> for Exception {
    fn from(e: EvalError) -> Self {
        Exception::Error(e)
    }
}

impl From<ParseError> for Exception {
    fn from(e: ParseError) -> Self {
        Exception::Error(EvalError::Parse(e))
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exception::Error(e) => write!(f, "{}", e),
            Exception::Return { value, .. } => write!(f, "return: {}", value),
            Exception::Break => f.write_str("break"),
            Exception::Continue => f.write_str("continue"),
            Exception::Custom { code, value } => write!(f, "code {}: {}", code, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip_names() {
        assert_eq!(Code::parse("break").unwrap(), Code::Break);
        assert_eq!(Code::parse("7").unwrap(), Code::Custom(7));
        assert_eq!(Code::parse("2").unwrap(), Code::Return);
        assert!(Code::parse("sideways").is_err());
        assert_eq!(Code::Custom(9).as_i32(), 9);
    }

    #[test]
    fn test_escaped_flow_messages() {
        let e = EvalError::EscapedControlFlow(EscapedFlow::Break);
        assert_eq!(e.to_string(), "invoked \"break\" outside of a loop");
        let e = EvalError::EscapedControlFlow(EscapedFlow::Code(42));
        assert_eq!(e.to_string(), "command returned bad code: 42");
    }

    #[test]
    fn test_unwind_return_applies_prepared_code() {
        let ret = Exception::Return {
            code: Code::Ok,
            value: Value::from("x"),
        };
        assert_eq!(ret.unwind_return(), Ok(Value::from("x")));

        let ret = Exception::Return {
            code: Code::Break,
            value: Value::empty(),
        };
        assert_eq!(ret.unwind_return(), Err(Exception::Break));

        let ret = Exception::Return {
            code: Code::Error,
            value: Value::from("boom"),
        };
        let err = ret.unwind_return().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_error_codes() {
        let code = EvalError::InterpreterDeleted.error_code();
        assert_eq!(code[0], "CORE");
        assert_eq!(code[1], "IDELETE");
        let code = EvalError::InvalidCommandName("frob".into()).error_code();
        assert_eq!(code, vec!["TCL", "LOOKUP", "COMMAND", "frob"]);
    }
}
