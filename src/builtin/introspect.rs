//! Subcommands of the `namespace`, `info`, `interp` and `trace` ensembles.

use super::{BuiltinCommand, add_builtin, add_ensemble, bool_value, concat, wrong_args};
use crate::error::{CmdResult, EvalError};
use crate::eval::EvalFlags;
use crate::interp::Interp;
use crate::namespace;
use crate::trace::{TraceEvent, TraceOps};
use crate::value::Value;

fn script_of(words: &[Value]) -> String {
    match words {
        [single] => single.to_string(),
        _ => concat(words),
    }
}

pub struct NamespaceEval {
    name: Value,
    script: String,
}

impl BuiltinCommand for NamespaceEval {
    fn name() -> &'static str {
        "::tcl::namespace::eval"
    }

    fn usage() -> &'static str {
        "namespace eval name arg ?arg...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [name, script @ ..] if !script.is_empty() => Ok(Self {
                name: name.clone(),
                script: script_of(script),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let ns = interp.create_namespace(self.name.as_str())?;
        let saved = interp.push_frame(ns, None);
        let result = interp.eval(&self.script);
        interp.pop_frame(saved);
        if let Err(exc) = &result {
            if exc.as_error().is_some() {
                let full = interp.namespace_full_name(ns).unwrap_or_default();
                let line = interp.error_line();
                interp.add_error_info(
                    exc,
                    &format!("\n    (in namespace eval \"{}\" script line {})", full, line),
                );
            }
        }
        result
    }
}

pub struct NamespaceCurrent;

impl BuiltinCommand for NamespaceCurrent {
    fn name() -> &'static str {
        "::tcl::namespace::current"
    }

    fn usage() -> &'static str {
        "namespace current"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        if args.is_empty() { Ok(Self) } else { Err(wrong_args::<Self>()) }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let current = interp.current_namespace();
        Ok(Value::from(interp.namespace_full_name(current).unwrap_or_default()))
    }
}

pub struct NamespaceDelete {
    names: Vec<Value>,
}

impl BuiltinCommand for NamespaceDelete {
    fn name() -> &'static str {
        "::tcl::namespace::delete"
    }

    fn usage() -> &'static str {
        "namespace delete ?name name ...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        Ok(Self {
            names: args.to_vec(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        for name in &self.names {
            interp.delete_namespace(name.as_str())?;
        }
        Ok(Value::empty())
    }
}

pub struct NamespaceExists {
    name: Value,
}

impl BuiltinCommand for NamespaceExists {
    fn name() -> &'static str {
        "::tcl::namespace::exists"
    }

    fn usage() -> &'static str {
        "namespace exists name"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [name] => Ok(Self { name: name.clone() }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        Ok(bool_value(interp.find_namespace(self.name.as_str()).is_some()))
    }
}

pub struct NamespaceChildren {
    name: Option<Value>,
}

impl BuiltinCommand for NamespaceChildren {
    fn name() -> &'static str {
        "::tcl::namespace::children"
    }

    fn usage() -> &'static str {
        "namespace children ?name?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [] => Ok(Self { name: None }),
            [name] => Ok(Self {
                name: Some(name.clone()),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let ns = match &self.name {
            Some(name) => interp
                .find_namespace(name.as_str())
                .ok_or_else(|| EvalError::UnknownNamespace(name.to_string()))?,
            None => interp.current_namespace(),
        };
        Ok(Value::from_list(interp.namespace_children(ns)))
    }
}

/// Import commands into the current namespace. Patterns must be qualified;
/// glob characters in the last component select several commands.
pub struct NamespaceImport {
    patterns: Vec<Value>,
}

impl BuiltinCommand for NamespaceImport {
    fn name() -> &'static str {
        "::tcl::namespace::import"
    }

    fn usage() -> &'static str {
        "namespace import ?pattern pattern ...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        Ok(Self {
            patterns: args.to_vec(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let current = interp.current_namespace();
        for pattern in &self.patterns {
            let pattern = pattern.as_str();
            if !namespace::is_qualified(pattern) {
                return Err(EvalError::msg(format!(
                    "unknown namespace in import pattern \"{}\"",
                    pattern
                ))
                .into());
            }
            let (_, tail) = namespace::split_qualified(pattern);
            if tail.contains(['*', '?', '[']) {
                for name in interp.list_commands(Some(pattern))? {
                    interp.import_command(current, &name)?;
                }
            } else {
                interp.import_command(current, pattern)?;
            }
        }
        Ok(Value::empty())
    }
}

pub struct InfoCommands {
    pattern: Option<Value>,
}

impl BuiltinCommand for InfoCommands {
    fn name() -> &'static str {
        "::tcl::info::commands"
    }

    fn usage() -> &'static str {
        "info commands ?pattern?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [] => Ok(Self { pattern: None }),
            [pattern] => Ok(Self {
                pattern: Some(pattern.clone()),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let names = interp.list_commands(self.pattern.as_ref().map(Value::as_str))?;
        Ok(Value::from_list(names))
    }
}

pub struct InfoExists {
    name: Value,
}

impl BuiltinCommand for InfoExists {
    fn name() -> &'static str {
        "::tcl::info::exists"
    }

    fn usage() -> &'static str {
        "info exists varName"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [name] => Ok(Self { name: name.clone() }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        Ok(bool_value(interp.var_exists(self.name.as_str())))
    }
}

/// Current procedure level, or the invocation words of a level. Positive
/// numbers are absolute levels, zero and negative ones are relative.
pub struct InfoLevel {
    level: Option<i64>,
}

impl BuiltinCommand for InfoLevel {
    fn name() -> &'static str {
        "::tcl::info::level"
    }

    fn usage() -> &'static str {
        "info level ?number?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [] => Ok(Self { level: None }),
            [level] => Ok(Self {
                level: Some(level.as_int()?),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let current = interp.level();
        let Some(requested) = self.level else {
            return Ok(Value::from(current));
        };
        let absolute = if requested > 0 {
            usize::try_from(requested).ok()
        } else {
            current.checked_sub(requested.unsigned_abs() as usize)
        };
        let bad = || EvalError::msg(format!("bad level \"{}\"", requested));
        let level = absolute.filter(|l| *l > 0 && *l <= current).ok_or_else(bad)?;
        let words = interp.frame_words(level).ok_or_else(bad)?;
        Ok(Value::from_list(words))
    }
}

pub struct InfoCmdCount;

impl BuiltinCommand for InfoCmdCount {
    fn name() -> &'static str {
        "::tcl::info::cmdcount"
    }

    fn usage() -> &'static str {
        "info cmdcount"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        if args.is_empty() { Ok(Self) } else { Err(wrong_args::<Self>()) }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        Ok(Value::from(interp.command_count() as i64))
    }
}

pub struct InfoHidden;

impl BuiltinCommand for InfoHidden {
    fn name() -> &'static str {
        "::tcl::info::hidden"
    }

    fn usage() -> &'static str {
        "info hidden"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        if args.is_empty() { Ok(Self) } else { Err(wrong_args::<Self>()) }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        Ok(Value::from_list(interp.list_hidden()))
    }
}

pub struct InterpHide {
    name: Value,
    token: Value,
}

impl BuiltinCommand for InterpHide {
    fn name() -> &'static str {
        "::tcl::interp::hide"
    }

    fn usage() -> &'static str {
        "interp hide cmdName ?hiddenCmdToken?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [name] => Ok(Self {
                name: name.clone(),
                token: name.clone(),
            }),
            [name, token] => Ok(Self {
                name: name.clone(),
                token: token.clone(),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        interp.hide_command(self.name.as_str(), self.token.as_str())?;
        Ok(self.token)
    }
}

pub struct InterpExpose {
    token: Value,
    name: Value,
}

impl BuiltinCommand for InterpExpose {
    fn name() -> &'static str {
        "::tcl::interp::expose"
    }

    fn usage() -> &'static str {
        "interp expose hiddenCmdName ?cmdName?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [token] => Ok(Self {
                token: token.clone(),
                name: token.clone(),
            }),
            [token, name] => Ok(Self {
                token: token.clone(),
                name: name.clone(),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        interp.expose_command(self.token.as_str(), self.name.as_str())?;
        Ok(self.name)
    }
}

/// Invoke a hidden command. Hidden commands always run at global level, so
/// `-global` is accepted for compatibility only.
pub struct InterpInvokeHidden {
    no_traceback: bool,
    words: Vec<Value>,
}

impl BuiltinCommand for InterpInvokeHidden {
    fn name() -> &'static str {
        "::tcl::interp::invokehidden"
    }

    fn usage() -> &'static str {
        "interp invokehidden ?-global? ?-notraceback? ?--? hiddenCmdToken ?arg ...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let mut no_traceback = false;
        let mut rest = args;
        while let [option, tail @ ..] = rest {
            match option.as_str() {
                "-global" => {}
                "-notraceback" => no_traceback = true,
                "--" => {
                    rest = tail;
                    break;
                }
                _ => break,
            }
            rest = tail;
        }
        if rest.is_empty() {
            return Err(wrong_args::<Self>());
        }
        Ok(Self {
            no_traceback,
            words: rest.to_vec(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        interp.invoke_hidden(&self.words, self.no_traceback)
    }
}

/// Create an alias; an empty target deletes it.
pub struct InterpAlias {
    name: Value,
    target: Value,
    prefix: Vec<Value>,
}

impl BuiltinCommand for InterpAlias {
    fn name() -> &'static str {
        "::tcl::interp::alias"
    }

    fn usage() -> &'static str {
        "interp alias aliasName targetCmd ?arg ...?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [name, target, prefix @ ..] => Ok(Self {
                name: name.clone(),
                target: target.clone(),
                prefix: prefix.to_vec(),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        if self.target.is_empty() && self.prefix.is_empty() {
            interp.delete_command(self.name.as_str())?;
            return Ok(Value::empty());
        }
        interp.create_alias(self.name.as_str(), self.target.as_str(), self.prefix)?;
        Ok(self.name)
    }
}

pub struct InterpRecursionLimit {
    limit: Option<i64>,
}

impl BuiltinCommand for InterpRecursionLimit {
    fn name() -> &'static str {
        "::tcl::interp::recursionlimit"
    }

    fn usage() -> &'static str {
        "interp recursionlimit ?newlimit?"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        match args {
            [] => Ok(Self { limit: None }),
            [limit] => Ok(Self {
                limit: Some(limit.as_int()?),
            }),
            _ => Err(wrong_args::<Self>()),
        }
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let Some(limit) = self.limit else {
            return Ok(Value::from(interp.config().max_nesting_depth));
        };
        let limit = usize::try_from(limit)
            .ok()
            .filter(|l| *l > 0)
            .ok_or_else(|| EvalError::msg("recursion limit must be > 0"))?;
        interp.set_recursion_limit(limit);
        Ok(Value::from(limit))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraceKind {
    Command,
    Execution,
}

impl TraceKind {
    fn parse(kind: &Value) -> Result<Self, EvalError> {
        match kind.as_str() {
            "command" => Ok(TraceKind::Command),
            "execution" => Ok(TraceKind::Execution),
            other => Err(EvalError::msg(format!(
                "bad option \"{}\": must be command or execution",
                other
            ))),
        }
    }

    fn allowed(self) -> TraceOps {
        match self {
            TraceKind::Command => TraceOps::RENAME | TraceOps::DELETE,
            TraceKind::Execution => TraceOps::ENTER | TraceOps::LEAVE,
        }
    }

    fn parse_ops(self, list: &Value) -> Result<TraceOps, EvalError> {
        let names = list.as_list()?;
        if names.is_empty() {
            return Err(EvalError::msg(format!(
                "bad operation list \"\": must be one or more of {}",
                self.allowed().names().join(" or ")
            )));
        }
        let mut ops = TraceOps::NONE;
        for name in &names {
            match TraceOps::from_name(name.as_str()).filter(|op| self.allowed().contains(*op)) {
                Some(op) => ops |= op,
                None => {
                    return Err(EvalError::msg(format!(
                        "bad operation \"{}\": must be {}",
                        name,
                        self.allowed().names().join(" or ")
                    )));
                }
            }
        }
        Ok(ops)
    }
}

/// Build the command a script trace evaluates for `event`.
fn trace_command_line(script: &str, event: &TraceEvent<'_>) -> String {
    let args = match event {
        TraceEvent::Rename { old, new } => Value::from_list([*old, *new, "rename"]),
        TraceEvent::Delete { name } => Value::from_list([*name, "", "delete"]),
        TraceEvent::Enter { words, .. } => {
            Value::from_list([Value::from_list(*words), Value::from("enter")])
        }
        TraceEvent::Leave { words, outcome, .. } => {
            let (code, result) = match outcome {
                Ok(value) => (0, value.clone()),
                Err(exc) => (exc.code().as_i32(), exc.value()),
            };
            Value::from_list([
                Value::from_list(*words),
                Value::from(code as i64),
                result,
                Value::from("leave"),
            ])
        }
    };
    format!("{} {}", script, args)
}

pub struct TraceAdd {
    kind: TraceKind,
    name: Value,
    ops: TraceOps,
    script: Value,
}

impl BuiltinCommand for TraceAdd {
    fn name() -> &'static str {
        "::tcl::trace::add"
    }

    fn usage() -> &'static str {
        "trace add type name opList command"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let [kind, name, ops, script] = args else {
            return Err(wrong_args::<Self>());
        };
        let kind = TraceKind::parse(kind)?;
        Ok(Self {
            kind,
            name: name.clone(),
            ops: kind.parse_ops(ops)?,
            script: script.clone(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        tracing::trace!(kind = ?self.kind, command = %self.name, ops = ?self.ops, "adding script trace");
        let script = self.script.to_string();
        interp.trace_command_tagged(
            self.name.as_str(),
            self.ops,
            self.script.as_str(),
            Box::new(move |interp: &mut Interp, event: &TraceEvent<'_>| {
                let line = trace_command_line(&script, event);
                interp
                    .eval_with_flags(&line, EvalFlags::global())
                    .map(|_| ())
            }),
        )?;
        Ok(Value::empty())
    }
}

pub struct TraceRemove {
    name: Value,
    ops: TraceOps,
    script: Value,
}

impl BuiltinCommand for TraceRemove {
    fn name() -> &'static str {
        "::tcl::trace::remove"
    }

    fn usage() -> &'static str {
        "trace remove type name opList command"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let [kind, name, ops, script] = args else {
            return Err(wrong_args::<Self>());
        };
        let kind = TraceKind::parse(kind)?;
        Ok(Self {
            name: name.clone(),
            ops: kind.parse_ops(ops)?,
            script: script.clone(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        interp.untrace_command_tagged(self.name.as_str(), self.ops, self.script.as_str())?;
        Ok(Value::empty())
    }
}

/// List the script traces of a command as `{opList script}` pairs.
pub struct TraceInfo {
    kind: TraceKind,
    name: Value,
}

impl BuiltinCommand for TraceInfo {
    fn name() -> &'static str {
        "::tcl::trace::info"
    }

    fn usage() -> &'static str {
        "trace info type name"
    }

    fn from_args(args: &[Value]) -> Result<Self, EvalError> {
        let [kind, name] = args else {
            return Err(wrong_args::<Self>());
        };
        Ok(Self {
            kind: TraceKind::parse(kind)?,
            name: name.clone(),
        })
    }

    fn execute(self, interp: &mut Interp) -> CmdResult {
        let allowed = self.kind.allowed();
        let entries: Vec<Value> = interp
            .command_traces(self.name.as_str())?
            .into_iter()
            .filter(|(_, ops, _)| ops.intersects(allowed))
            .filter_map(|(_, ops, tag)| {
                let tag = tag?;
                Some(Value::from_list([
                    Value::from_list(ops.names()),
                    Value::from(tag),
                ]))
            })
            .collect();
        Ok(Value::from_list(entries))
    }
}

pub(super) fn register(interp: &mut Interp) {
    add_builtin::<NamespaceEval>(interp);
    add_builtin::<NamespaceCurrent>(interp);
    add_builtin::<NamespaceDelete>(interp);
    add_builtin::<NamespaceExists>(interp);
    add_builtin::<NamespaceChildren>(interp);
    add_builtin::<NamespaceImport>(interp);
    add_ensemble(
        interp,
        "namespace",
        &["children", "current", "delete", "eval", "exists", "import"],
    );

    add_builtin::<InfoCommands>(interp);
    add_builtin::<InfoExists>(interp);
    add_builtin::<InfoLevel>(interp);
    add_builtin::<InfoCmdCount>(interp);
    add_builtin::<InfoHidden>(interp);
    add_ensemble(interp, "info", &["cmdcount", "commands", "exists", "hidden", "level"]);

    add_builtin::<InterpHide>(interp);
    add_builtin::<InterpExpose>(interp);
    add_builtin::<InterpInvokeHidden>(interp);
    add_builtin::<InterpAlias>(interp);
    add_builtin::<InterpRecursionLimit>(interp);
    add_ensemble(
        interp,
        "interp",
        &["alias", "expose", "hide", "invokehidden", "recursionlimit"],
    );

    add_builtin::<TraceAdd>(interp);
    add_builtin::<TraceRemove>(interp);
    add_builtin::<TraceInfo>(interp);
    add_ensemble(interp, "trace", &["add", "info", "remove"]);
}

#[cfg(test)]
mod tests {
    use crate::config::InterpConfig;
    use crate::error::{EvalError, Exception};
    use crate::interp::Interp;
    use crate::output::MemWriter;

    fn interp() -> Interp {
        Interp::new(InterpConfig::default())
    }

    #[test]
    fn test_namespace_eval_and_current() {
        let mut interp = interp();
        assert_eq!(interp.eval("namespace current").unwrap().as_str(), "::");
        assert_eq!(
            interp.eval("namespace eval a::b { namespace current }").unwrap().as_str(),
            "::a::b"
        );
        interp
            .eval("namespace eval app { proc where {} { namespace current } }")
            .unwrap();
        assert!(interp.command_exists("::app::where"));
        assert_eq!(interp.eval("app::where").unwrap().as_str(), "::app");
        assert_eq!(interp.eval("namespace exists ::a::b").unwrap().as_str(), "1");
        assert_eq!(interp.eval("namespace children ::a").unwrap().as_str(), "::a::b");
    }

    #[test]
    fn test_namespace_variables_are_separate() {
        let mut interp = interp();
        interp.eval("set v global; namespace eval ns { set v inner }").unwrap();
        assert_eq!(interp.get_var("v").unwrap().as_str(), "global");
        assert_eq!(interp.eval("set ::ns::v").unwrap().as_str(), "inner");
    }

    #[test]
    fn test_namespace_eval_error_context() {
        let mut interp = interp();
        interp.eval("namespace eval ns {\n  nosuch\n}").unwrap_err();
        assert!(interp
            .error_info()
            .unwrap()
            .contains("(in namespace eval \"::ns\" script line 2)"));
    }

    #[test]
    fn test_namespace_delete_removes_commands() {
        let mut interp = interp();
        interp.eval("namespace eval gone { proc f {} {} }").unwrap();
        interp.eval("namespace delete gone").unwrap();
        assert!(!interp.command_exists("::gone::f"));
        assert_eq!(interp.eval("namespace exists gone").unwrap().as_str(), "0");
        assert!(interp.eval("namespace delete gone").is_err());
    }

    #[test]
    fn test_namespace_import_follows_redefinition() {
        let mut interp = interp();
        interp
            .eval("namespace eval lib { proc hello {} { return v1 }; proc help {} {} }")
            .unwrap();
        interp.eval("namespace import ::lib::hel*").unwrap();
        assert!(interp.command_exists("::hello"));
        assert!(interp.command_exists("::help"));
        assert_eq!(interp.eval("hello").unwrap().as_str(), "v1");
        interp.eval("proc ::lib::hello {} { return v2 }").unwrap();
        assert_eq!(interp.eval("hello").unwrap().as_str(), "v2");
        assert!(interp.eval("namespace import hello").is_err());
    }

    #[test]
    fn test_info_subcommands() {
        let mut interp = interp();
        interp.eval("proc probe {a b} { info level 0 }").unwrap();
        assert_eq!(interp.eval("probe 1 {2 3}").unwrap().as_str(), "probe 1 {2 3}");
        interp.eval("proc depth {} { info level }").unwrap();
        assert_eq!(interp.eval("depth").unwrap().as_str(), "1");
        assert!(interp.eval("info level 3").is_err());

        interp.eval("set present 1").unwrap();
        assert_eq!(interp.eval("info exists present").unwrap().as_str(), "1");
        assert_eq!(interp.eval("info exists absent").unwrap().as_str(), "0");

        assert_eq!(interp.eval("info commands lle*").unwrap().as_str(), "llength");
        let before: i64 = interp.eval("info cmdcount").unwrap().as_int().unwrap();
        let after: i64 = interp.eval("set x 1; info cmdcount").unwrap().as_int().unwrap();
        assert_eq!(after - before, 3);
    }

    #[test]
    fn test_hide_expose_and_invokehidden() {
        let mut interp = interp();
        let out = MemWriter::new();
        interp.set_output(out.clone());
        interp.eval("interp hide puts secret").unwrap();
        assert!(interp.eval("puts hi").is_err());
        assert_eq!(interp.eval("info hidden").unwrap().as_str(), "secret");
        interp.eval("interp invokehidden secret hi").unwrap();
        assert_eq!(out.contents(), "hi\n");
        assert_eq!(
            interp.eval("interp invokehidden nothing").unwrap_err(),
            Exception::Error(EvalError::UnknownHidden("nothing".to_string()))
        );
        interp.eval("interp expose secret puts").unwrap();
        interp.eval("puts back").unwrap();
        assert_eq!(out.contents(), "hi\nback\n");
        assert!(interp.eval("interp hide puts a::b").is_err());
    }

    #[test]
    fn test_interp_alias() {
        let mut interp = interp();
        interp.eval("interp alias first lindex").unwrap();
        interp.eval("interp alias head first").unwrap();
        assert_eq!(interp.eval("head {a b c} 0").unwrap().as_str(), "a");
        interp.eval("interp alias tag list x").unwrap();
        assert_eq!(interp.eval("tag y").unwrap().as_str(), "x y");
        assert_eq!(
            interp.eval("interp alias first head").unwrap_err().to_string(),
            "cannot define or rename alias \"first\": would create a loop"
        );
        interp.eval("interp alias tag {}").unwrap();
        assert!(!interp.command_exists("tag"));

        assert_eq!(
            interp.eval("interp alias {} t").unwrap_err().to_string(),
            "can't create alias \"\""
        );
        assert!(!interp.is_deleted());
        assert_eq!(interp.eval("list ok").unwrap().as_str(), "ok");
    }

    #[test]
    fn test_interp_recursionlimit() {
        let mut interp = interp();
        assert_eq!(interp.eval("interp recursionlimit 50").unwrap().as_str(), "50");
        assert_eq!(interp.eval("interp recursionlimit").unwrap().as_str(), "50");
        assert!(interp.eval("interp recursionlimit 0").is_err());
    }

    #[test]
    fn test_script_command_traces() {
        let mut interp = interp();
        interp
            .eval("set log {}; proc note {args} { global log; set log [concat $log [list $args]] }")
            .unwrap();
        interp.eval("proc f {} {}").unwrap();
        interp.eval("trace add command f {rename delete} note").unwrap();
        interp.eval("rename f g; rename g {}").unwrap();
        assert_eq!(
            interp.get_var("log").unwrap().as_str(),
            "{::f ::g rename} {::g {} delete}"
        );
    }

    #[test]
    fn test_script_execution_traces() {
        let mut interp = interp();
        interp.eval("set log {}").unwrap();
        interp
            .eval("proc note {args} { global log; set log [concat $log [list $args]] }")
            .unwrap();
        interp.eval("proc f {x} { return r$x }").unwrap();
        interp.eval("trace add execution f {enter leave} note").unwrap();
        interp.eval("f 1").unwrap();
        assert_eq!(
            interp.get_var("log").unwrap().as_str(),
            "{{f 1} enter} {{f 1} 0 r1 leave}"
        );
        assert_eq!(
            interp.eval("trace info execution f").unwrap().as_str(),
            "{{enter leave} note}"
        );
        interp.eval("trace remove execution f {enter leave} note").unwrap();
        interp.eval("set log {}; f 2").unwrap();
        assert_eq!(interp.get_var("log").unwrap().as_str(), "");
        assert!(interp.eval("trace add execution f bogus note").is_err());
        assert!(interp.eval("trace add variable f write note").is_err());
    }
}
