use super::{BuiltinCommand, add_builtin, wrong_args};
use crate::command::{CommandImpl, CommandProc};
use crate::error::{CmdResult, EscapedFlow, EvalError, Exception};
use crate::interp::Interp;
use crate::namespace::{self, NsId};
use crate::value::Value;

struct Param {
    name: String,
    default: Option<Value>,
}

/// A script-defined procedure. Each call runs the body in a fresh frame
/// whose namespace is the one the procedure was defined in.
struct Procedure {
    ns: NsId,
    params: Vec<Param>,
    variadic: bool,
    body: Value,
}

impl Procedure {
    fn usage(&self, name: &Value) -> EvalError {
        let mut usage = name.to_string();
        for param in &self.params {
            match param.default {
                Some(_) => usage.push_str(&format!(" ?{}?", param.name)),
                None => usage.push_str(&format!(" {}", param.name)),
            }
        }
        if self.variadic {
            usage.push_str(" ?arg ...?");
        }
        EvalError::WrongArgs(usage)
    }

    fn bindings(&self, words: &[Value]) -> Result<Vec<(&str, Value)>, EvalError> {
        let args = &words[1..];
        if !self.variadic && args.len() > self.params.len() {
            return Err(self.usage(&words[0]));
        }
        let mut bound = Vec::with_capacity(self.params.len() + 1);
        for (index, param) in self.params.iter().enumerate() {
            let value = match (args.get(index), &param.default) {
                (Some(arg), _) => arg.clone(),
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(self.usage(&words[0])),
            };
            bound.push((param.name.as_str(), value));
        }
        if self.variadic {
            let rest = args.get(self.params.len()..).unwrap_or_default();
            bound.push(("args", Value::from_list(rest)));
        }
        Ok(bound)
    }
}

impl CommandProc for Procedure {
    fn invoke(&self, interp: &mut Interp, words: &[Value]) -> CmdResult {
        let bound = self.bindings(words)?;
        let saved = interp.push_frame(self.ns, Some(words.to_vec()));
        let mut result = Ok(Value::empty());
        for (name, value) in bound {
            if let Err(e) = interp.set_var(name, value) {
                result = Err(e);
                break;
            }
        }
        if result.is_ok() {
            result = interp.eval(self.body.as_str());
        }
        interp.pop_frame(saved);

        let exc = match result {
            Ok(value) => return Ok(value),
            Err(exc @ Exception::Return { .. }) => return exc.unwind_return(),
            Err(Exception::Break) => Exception::Error(EvalError::EscapedControlFlow(EscapedFlow::Break)),
            Err(Exception::Continue) => {
                Exception::Error(EvalError::EscapedControlFlow(EscapedFlow::Continue))
            }
            Err(exc @ Exception::Error(_)) => exc,
            Err(other) => return Err(other),
        };
        let line = interp.error_line();
        interp.add_error_info(&exc, &format!("\n    (procedure \"{}\" line {})", words[0], line));
        Err(exc)
    }
}

fn parse_params(spec: &Value) -> Result<(Vec<Param>, bool), EvalError> {
    let fields = spec.as_list()?;
    let mut params = Vec::with_capacity(fields.len());
    let mut variadic = false;
    for (index, field) in fields.iter().enumerate() {
        let parts = field.as_list()?;
        let (name, default) = match parts.as_slice() {
            [] => return Err(EvalError::msg("argument with no name")),
            [name] => (name.to_string(), None),
            [name, default] => (name.to_string(), Some(default.clone())),
            _ => {
                return Err(EvalError::msg(format!(
                    "too many fields in argument specifier \"{}\"",
                    field
                )));
            }
        };
        if namespace::is_qualified(&name) {
            return Err(EvalError::msg(format!(
                "formal parameter \"{}\" is not a simple name",
                name
            )));
        }
        if name == "args" && default.is_none() && index + 1 == fields.len() {
            variadic = true;
            continue;
        }
        params.push(Param { name, default });
    }
    Ok((params, variadic))
}

/// Define a procedure.
pub struct Proc {
    name: Value,
    params: Vec<Param>,
    variadic: bool,
    body: Value,
}

impl BuiltinCommand for Proc {
    fn name() -> &'static str {
        "proc"
    }

    fn usage() -> &'static str {
        "proc name args body"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let [name, params, body] = args else {
            return Err(wrong_args::<Self>());
        };
        let (params, variadic) = parse_params(params)?;
        Ok(Self {
            name: name.clone(),
            params,
            variadic,
            body: body.clone(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let bad_name = || EvalError::msg(format!("can't create procedure \"{}\"", self.name));
        let (path, tail) = namespace::split_qualified(self.name.as_str());
        if tail.is_empty() {
            return Err(bad_name().into());
        }
        let ns = match path {
            Some(path) => interp.create_namespace(path)?,
            None => interp.current_namespace(),
        };
        let full = interp.namespaces.qualify(ns, tail);
        let procedure = Procedure {
            ns,
            params: self.params,
            variadic: self.variadic,
            body: self.body,
        };
        interp
            .create_command(&full, CommandImpl::native(procedure))
            .ok_or_else(bad_name)?;
        Ok(Value::empty())
    }
}

/// Rename a command; an empty new name deletes it.
pub struct Rename {
    old: Value,
    new: Value,
}

impl BuiltinCommand for Rename {
    fn name() -> &'static str {
        "rename"
    }

    fn usage() -> &'static str {
        "rename oldName newName"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [old, new] => Ok(Self {
                old: old.clone(),
                new: new.clone(),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        interp.rename_command(self.old.as_str(), self.new.as_str())?;
        Ok(Value::empty())
    }
}

pub(super) fn register(interp: &mut Interp) {
    add_builtin::<Proc>(interp);
    add_builtin::<Rename>(interp);
}
