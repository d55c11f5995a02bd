use super::{BuiltinCommand, add_builtin, concat, wrong_args};
use crate::error::{CmdResult, EvalError};
use crate::interp::Interp;
use crate::value::Value;

/// Build a list from the arguments.
pub struct List {
    items: Vec<Value>,
}

impl BuiltinCommand for List {
    fn name() -> &'static str {
        "list"
    }

    fn usage() -> &'static str {
        "list ?arg ...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        Ok(Self {
            items: args.to_vec(),
        })
    }

    fn execute(self, _interp: &mut Interp) -> CmdResult {
        Ok(Value::from_list(&self.items))
    }
}

/// Number of elements of a list.
pub struct Llength {
    list: Value,
}

impl BuiltinCommand for Llength {
    fn name() -> &'static str {
        "llength"
    }

    fn usage() -> &'static str {
        "llength list"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [list] => Ok(Self { list: list.clone() }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, _interp: &mut Interp) -> CmdResult {
        Ok(Value::from(self.list.as_list()?.len()))
    }
}

/// Parse an index such as `2`, `end` or `end-1` against a list length.
/// Returns `None` for indices outside the list.
fn resolve_index(index: &str, len: usize) -> Result<Option<usize>, EvalError> {
    let bad = || {
        EvalError::msg(format!(
            "bad index \"{}\": must be integer?[+-]integer? or end?[+-]integer?",
            index
        ))
    };
    let position: i64 = match index.strip_prefix("end") {
        Some("") => len as i64 - 1,
        Some(offset) => {
            let offset: i64 = offset.parse().map_err(|_| bad())?;
            len as i64 - 1 + offset
        }
        None => index.trim().parse().map_err(|_| bad())?,
    };
    Ok(usize::try_from(position).ok().filter(|p| *p < len))
}

/// Element of a list at an index; the list itself without an index.
pub struct Lindex {
    list: Value,
    index: Option<Value>,
}

impl BuiltinCommand for Lindex {
    fn name() -> &'static str {
        "lindex"
    }

    fn usage() -> &'static str {
        "lindex list ?index?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [list] => Ok(Self {
                list: list.clone(),
                index: None,
            }),
            [list, index] => Ok(Self {
                list: list.clone(),
                index: Some(index.clone()),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, _interp: &mut Interp) -> CmdResult {
        let Some(index) = self.index else {
            return Ok(self.list);
        };
        let items = self.list.as_list()?;
        Ok(resolve_index(index.as_str(), items.len())?
            .and_then(|i| items.get(i).cloned())
            .unwrap_or_default())
    }
}

/// Join arguments with single spaces after trimming them.
pub struct Concat {
    words: Vec<Value>,
}

impl BuiltinCommand for Concat {
    fn name() -> &'static str {
        "concat"
    }

    fn usage() -> &'static str {
        "concat ?arg ...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        Ok(Self {
            words: args.to_vec(),
        })
    }

    fn execute(self, _interp: &mut Interp) -> CmdResult {
        Ok(Value::from(concat(&self.words)))
    }
}

pub(super) fn register(interp: &mut Interp) {
    add_builtin::<List>(interp);
    add_builtin::<Llength>(interp);
    add_builtin::<Lindex>(interp);
    add_builtin::<Concat>(interp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpConfig;

    #[test]
    fn test_index_forms() {
        assert_eq!(resolve_index("0", 3).unwrap(), Some(0));
        assert_eq!(resolve_index("end", 3).unwrap(), Some(2));
        assert_eq!(resolve_index("end-2", 3).unwrap(), Some(0));
        assert_eq!(resolve_index("end-3", 3).unwrap(), None);
        assert_eq!(resolve_index("7", 3).unwrap(), None);
        assert!(resolve_index("first", 3).is_err());
    }

    #[test]
    fn test_list_commands() {
        let mut interp = Interp::new(InterpConfig::default());
        assert_eq!(interp.eval("list a {b c} {}").unwrap().as_str(), "a {b c} {}");
        assert_eq!(interp.eval("llength {a {b c} d}").unwrap().as_str(), "3");
        assert_eq!(interp.eval("lindex {a {b c} d} 1").unwrap().as_str(), "b c");
        assert_eq!(interp.eval("lindex {a b} end").unwrap().as_str(), "b");
        assert_eq!(interp.eval("lindex {a b} 5").unwrap().as_str(), "");
        assert_eq!(interp.eval("concat { a } b {} { c d }").unwrap().as_str(), "a b c d");
        assert!(interp.eval("llength {a {b}").is_err());
    }
}
