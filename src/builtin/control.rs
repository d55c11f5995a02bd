use super::{BuiltinCommand, add_builtin, concat, wrong_args};
use crate::error::{CmdResult, Code, EvalError, Exception};
use crate::interp::Interp;
use crate::value::Value;

/// Return from a procedure, optionally with another completion code.
pub struct Return {
    code: Code,
    value: Value,
}

impl BuiltinCommand for Return {
    fn name() -> &'static str {
        "return"
    }

    fn usage() -> &'static str {
        "return ?-code code? ?value?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let mut code = Code::Ok;
        let mut rest = args;
        while let [option, value, tail @ ..] = rest {
            if option.as_str() != "-code" {
                break;
            }
            code = Code::parse(value.as_str())?;
            rest = tail;
        }
        match rest {
            [] => Ok(Self {
                code,
                value: Value::empty(),
            }),
            [value] => Ok(Self {
                code,
                value: value.clone(),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, _interp: &mut Interp) -> CmdResult {
        Err(Exception::Return {
            code: self.code,
            value: self.value,
        })
    }
}

/// Leave the innermost loop.
pub struct Break;

impl BuiltinCommand for Break {
    fn name() -> &'static str {
        "break"
    }

    fn usage() -> &'static str {
        "break"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        if args.is_empty() { Ok(Self) } else { Err(wrong_args::<Self>()) }
    }

    fn execute(self, _interp: &mut Interp) -> CmdResult {
        Err(Exception::Break)
    }
}

/// Skip to the next iteration of the innermost loop.
pub struct Continue;

impl BuiltinCommand for Continue {
    fn name() -> &'static str {
        "continue"
    }

    fn usage() -> &'static str {
        "continue"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        if args.is_empty() { Ok(Self) } else { Err(wrong_args::<Self>()) }
    }

    fn execute(self, _interp: &mut Interp) -> CmdResult {
        Err(Exception::Continue)
    }
}

/// Raise an error, optionally with explicit error info and error code.
pub struct Error {
    message: Value,
    info: Option<Value>,
    code: Option<Value>,
}

impl BuiltinCommand for Error {
    fn name() -> &'static str {
        "error"
    }

    fn usage() -> &'static str {
        "error message ?errorInfo? ?errorCode?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [message, rest @ ..] if rest.len() <= 2 => Ok(Self {
                message: message.clone(),
                info: rest.first().cloned(),
                code: rest.get(1).cloned(),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let code = match &self.code {
            Some(code) => code.as_list()?.iter().map(|c| c.to_string()).collect(),
            None => vec!["NONE".to_string()],
        };
        let err = Exception::Error(EvalError::Command {
            message: self.message.to_string(),
            code,
        });
        if let Some(info) = self.info.filter(|i| !i.is_empty()) {
            interp.set_error_info(&err, info.as_str());
        }
        Err(err)
    }
}

/// Evaluate a script and report its completion code instead of failing.
pub struct Catch {
    script: Value,
    result_var: Option<Value>,
}

impl BuiltinCommand for Catch {
    fn name() -> &'static str {
        "catch"
    }

    fn usage() -> &'static str {
        "catch script ?resultVarName?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [script] => Ok(Self {
                script: script.clone(),
                result_var: None,
            }),
            [script, var] => Ok(Self {
                script: script.clone(),
                result_var: Some(var.clone()),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let (code, value) = match interp.eval(self.script.as_str()) {
            Ok(value) => (Code::Ok, value),
            Err(exc) => {
                if exc.as_error().is_some() {
                    interp.reset_error_state();
                }
                (exc.code(), exc.value())
            }
        };
        if let Some(var) = &self.result_var {
            interp.set_var(var.as_str(), value)?;
        }
        Ok(Value::from(code.as_i32() as i64))
    }
}

/// Iterate over the elements of a list.
pub struct Foreach {
    vars: Vec<Value>,
    list: Value,
    body: Value,
}

impl BuiltinCommand for Foreach {
    fn name() -> &'static str {
        "foreach"
    }

    fn usage() -> &'static str {
        "foreach varList list body"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let [vars, list, body] = args else {
            return Err(wrong_args::<Self>());
        };
        let vars = vars.as_list()?;
        if vars.is_empty() {
            return Err(EvalError::msg("foreach varlist is empty"));
        }
        Ok(Self {
            vars,
            list: list.clone(),
            body: body.clone(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let items = self.list.as_list()?;
        for chunk in items.chunks(self.vars.len()) {
            for (index, var) in self.vars.iter().enumerate() {
                let value = chunk.get(index).cloned().unwrap_or_default();
                interp.set_var(var.as_str(), value)?;
            }
            match interp.eval(self.body.as_str()) {
                Ok(_) | Err(Exception::Continue) => {}
                Err(Exception::Break) => break,
                Err(exc) => {
                    if exc.as_error().is_some() {
                        let line = interp.error_line();
                        interp.add_error_info(&exc, &format!("\n    (\"foreach\" body line {})", line));
                    }
                    return Err(exc);
                }
            }
        }
        Ok(Value::empty())
    }
}

/// Evaluate a script in the variable context of a calling frame.
pub struct Uplevel {
    level: String,
    script: String,
}

impl BuiltinCommand for Uplevel {
    fn name() -> &'static str {
        "uplevel"
    }

    fn usage() -> &'static str {
        "uplevel ?level? command ?arg ...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let is_level = |w: &Value| {
            let s = w.as_str();
            s.starts_with('#') || (!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        };
        let (level, rest) = match args {
            [first, rest @ ..] if !rest.is_empty() && is_level(first) => (first.to_string(), rest),
            _ => ("1".to_string(), args),
        };
        if rest.is_empty() {
            return Err(wrong_args::<Self>());
        }
        Ok(Self {
            level,
            script: if rest.len() == 1 {
                rest[0].to_string()
            } else {
                concat(rest)
            },
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let frame = interp.frame_for_level(&self.level)?;
        let result = interp.with_var_frame(frame, |interp| interp.eval(&self.script));
        if let Err(exc) = &result {
            if exc.as_error().is_some() {
                let line = interp.error_line();
                interp.add_error_info(exc, &format!("\n    (\"uplevel\" body line {})", line));
            }
        }
        result
    }
}

pub(super) fn register(interp: &mut Interp) {
    add_builtin::<Return>(interp);
    add_builtin::<Break>(interp);
    add_builtin::<Continue>(interp);
    add_builtin::<Error>(interp);
    add_builtin::<Catch>(interp);
    add_builtin::<Foreach>(interp);
    add_builtin::<Uplevel>(interp);
}

#[cfg(test)]
mod tests {
    use crate::command::CommandImpl;
    use crate::config::InterpConfig;
    use crate::error::{EscapedFlow, EvalError, Exception};
    use crate::interp::Interp;
    use crate::value::Value;

    fn interp() -> Interp {
        Interp::new(InterpConfig::default())
    }

    #[test]
    fn test_foreach_with_break_and_continue() {
        let mut interp = interp();
        interp.create_command(
            "stop_at",
            CommandImpl::from_fn(|_, args| {
                if args[1] == args[2] { Err(Exception::Break) } else { Ok(Value::empty()) }
            }),
        );
        let script = "
            set out {}
            foreach x {1 2 3 4 5} {
                set out [concat $out $x]
                stop_at $x 3
            }
            set out
        ";
        assert_eq!(interp.eval(script).unwrap().as_str(), "1 2 3");
        assert_eq!(interp.eval("set n 0; foreach x {a b c} { continue; incr n }; set n").unwrap().as_str(), "0");
        assert_eq!(
            interp.eval("set r {}; foreach {a b} {1 2 3} { set r [concat $r $a:$b] }; set r").unwrap().as_str(),
            "1:2 3:"
        );
    }

    #[test]
    fn test_foreach_body_error_names_line() {
        let mut interp = interp();
        interp.eval("foreach x {1} {\n set y 1\n nosuch\n}").unwrap_err();
        assert!(interp.error_info().unwrap().contains("(\"foreach\" body line 3)"));
    }

    #[test]
    fn test_catch_codes() {
        let mut interp = interp();
        assert_eq!(interp.eval("catch {set x 1}").unwrap().as_str(), "0");
        assert_eq!(interp.eval("catch {error boom} msg").unwrap().as_str(), "1");
        assert_eq!(interp.get_var("msg").unwrap().as_str(), "boom");
        assert_eq!(interp.eval("catch {return -code break}").unwrap().as_str(), "2");
        assert_eq!(interp.eval("catch break").unwrap().as_str(), "3");
        assert_eq!(interp.eval("catch continue").unwrap().as_str(), "4");
        assert_eq!(interp.eval("catch {return -code 9 x} v").unwrap().as_str(), "2");
    }

    #[test]
    fn test_error_with_info_and_code() {
        let mut interp = interp();
        let err = interp.eval("error oops {custom trace} {APP FAIL}").unwrap_err();
        assert_eq!(err.to_string(), "oops");
        assert_eq!(interp.error_code(), ["APP", "FAIL"]);
        assert_eq!(
            interp.error_info().unwrap(),
            "custom trace"
        );
    }

    #[test]
    fn test_catch_starts_fresh_traceback() {
        let mut interp = interp();
        let err = interp.eval("catch {error first}; error second").unwrap_err();
        assert_eq!(err.to_string(), "second");
        assert_eq!(
            interp.error_info().unwrap(),
            "second\n    while executing\n\"error second\""
        );
    }

    #[test]
    fn test_top_level_control_flow() {
        let mut interp = interp();
        assert_eq!(
            interp.eval("break").unwrap_err(),
            Exception::Error(EvalError::EscapedControlFlow(EscapedFlow::Break))
        );
        assert_eq!(
            interp.eval("continue").unwrap_err().to_string(),
            "invoked \"continue\" outside of a loop"
        );
        assert_eq!(interp.eval("return -code error bad").unwrap_err().to_string(), "bad");
        assert_eq!(interp.eval("return fine; error unreachable").unwrap().as_str(), "fine");
    }

    #[test]
    fn test_uplevel_reaches_caller_variables() {
        let mut interp = interp();
        interp
            .eval("proc setter {name value} { uplevel 1 [list set $name $value] }")
            .unwrap();
        interp
            .eval("proc outer {} { setter local 7; set local }")
            .unwrap();
        assert_eq!(interp.eval("outer").unwrap().as_str(), "7");
        interp.eval("proc top {} { uplevel #0 {set g 1} }; top").unwrap();
        assert_eq!(interp.get_var("g").unwrap().as_str(), "1");
        assert!(interp.eval("uplevel 5 {set x 1}").is_err());
    }
}
