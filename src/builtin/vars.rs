use super::{BuiltinCommand, add_builtin, wrong_args};
use crate::error::{CmdResult, EvalError};
use crate::interp::Interp;
use crate::value::Value;

/// Read or write a variable.
pub struct Set {
    name: Value,
    value: Option<Value>,
}

impl BuiltinCommand for Set {
    fn name() -> &'static str {
        "set"
    }

    fn usage() -> &'static str {
        "set varName ?newValue?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [name] => Ok(Self {
                name: name.clone(),
                value: None,
            }),
            [name, value] => Ok(Self {
                name: name.clone(),
                value: Some(value.clone()),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        match self.value {
            Some(value) => interp.set_var(self.name.as_str(), value),
            None => interp.get_var(self.name.as_str()),
        }
    }
}

/// Remove variables.
pub struct Unset {
    nocomplain: bool,
    names: Vec<Value>,
}

impl BuiltinCommand for Unset {
    fn name() -> &'static str {
        "unset"
    }

    fn usage() -> &'static str {
        "unset ?-nocomplain? ?--? ?varName ...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let mut rest = args;
        let mut nocomplain = false;
        if let Some(first) = rest.first() {
            if first.as_str() == "-nocomplain" {
                nocomplain = true;
                rest = &rest[1..];
            }
        }
        if rest.first().is_some_and(|w| w.as_str() == "--") {
            rest = &rest[1..];
        }
        Ok(Self {
            nocomplain,
            names: rest.to_vec(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        for name in &self.names {
            match interp.unset_var(name.as_str()) {
                Ok(()) => {}
                Err(_) if self.nocomplain => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Value::empty())
    }
}

/// Add an integer to a variable; a missing variable counts as 0.
pub struct Incr {
    name: Value,
    amount: i64,
}

impl BuiltinCommand for Incr {
    fn name() -> &'static str {
        "incr"
    }

    fn usage() -> &'static str {
        "incr varName ?increment?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [name] => Ok(Self {
                name: name.clone(),
                amount: 1,
            }),
            [name, amount] => Ok(Self {
                name: name.clone(),
                amount: amount.as_int()?,
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let name = self.name.as_str();
        let current = if interp.var_exists(name) {
            interp.get_var(name)?.as_int()?
        } else {
            0
        };
        let next = current
            .checked_add(self.amount)
            .ok_or_else(|| EvalError::msg("integer overflow"))?;
        interp.set_var(name, next)
    }
}

/// Link procedure locals to global variables.
pub struct Global {
    names: Vec<Value>,
}

impl BuiltinCommand for Global {
    fn name() -> &'static str {
        "global"
    }

    fn usage() -> &'static str {
        "global ?varName ...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        Ok(Self {
            names: args.to_vec(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        for name in &self.names {
            interp.link_global(name.as_str())?;
        }
        Ok(Value::empty())
    }
}

pub(super) fn register(interp: &mut Interp) {
    add_builtin::<Set>(interp);
    add_builtin::<Unset>(interp);
    add_builtin::<Incr>(interp);
    add_builtin::<Global>(interp);
}
