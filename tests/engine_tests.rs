use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wordeval::{
    CommandImpl, EscapedFlow, EvalError, EvalFlags, Exception, Interp, InterpConfig, MemWriter,
    TraceEvent, TraceOps, Value,
};

fn bare() -> Interp {
    Interp::new(InterpConfig::bare())
}

fn constant(text: &'static str) -> CommandImpl {
    CommandImpl::from_fn(move |_, _| Ok(Value::from(text)))
}

#[test]
fn double_scenario() {
    let mut interp = bare();
    interp
        .create_command(
            "double",
            CommandImpl::from_fn(|_, args| {
                let n = args
                    .get(1)
                    .ok_or_else(|| EvalError::WrongArgs("double n".into()))?
                    .as_int()?;
                Ok(Value::from(n * 2))
            }),
        )
        .unwrap();
    assert_eq!(interp.eval("double 21").unwrap().as_str(), "42");
    assert_eq!(interp.result().as_str(), "42");
}

#[test]
fn unresolved_name_without_fallback() {
    let mut interp = bare();
    assert_eq!(
        interp.eval("frobnicate").unwrap_err(),
        Exception::Error(EvalError::InvalidCommandName("frobnicate".into()))
    );
}

#[test]
fn unknown_fallback_receives_words() {
    let mut interp = bare();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    interp.create_command(
        "unknown",
        CommandImpl::from_fn(move |_, args| {
            *log.borrow_mut() = args[1..].to_vec();
            Ok(Value::empty())
        }),
    );
    interp.eval("frobnicate 1 2").unwrap();
    assert_eq!(*seen.borrow(), ["frobnicate", "1", "2"].map(Value::from));
}

#[test]
fn break_at_top_level_is_an_error() {
    let mut interp = Interp::new(InterpConfig::default());
    assert_eq!(
        interp.eval("break").unwrap_err(),
        Exception::Error(EvalError::EscapedControlFlow(EscapedFlow::Break))
    );
    // The interpreter keeps working afterwards.
    assert_eq!(interp.eval("set a 1").unwrap().as_str(), "1");
}

#[test]
fn allowed_exceptions_escape_once() {
    let mut interp = bare();
    interp.create_command("brk", CommandImpl::from_fn(|_, _| Err(Exception::Break)));
    interp.allow_exceptions();
    assert_eq!(interp.eval("brk").unwrap_err(), Exception::Break);
    assert!(matches!(
        interp.eval("brk").unwrap_err(),
        Exception::Error(EvalError::EscapedControlFlow(EscapedFlow::Break))
    ));
}

#[test]
fn create_and_delete_keep_at_most_one_entry() {
    let mut interp = bare();
    let first = interp.create_command("cmd", constant("one")).unwrap();
    let second = interp.create_command("cmd", constant("two")).unwrap();
    assert!(!interp.is_command_live(first));
    assert_eq!(interp.list_commands(Some("cmd")).unwrap(), ["cmd"]);
    assert_eq!(interp.eval("cmd").unwrap().as_str(), "two");

    interp.delete_command("cmd").unwrap();
    assert!(interp.list_commands(Some("cmd")).unwrap().is_empty());
    assert!(matches!(
        interp.delete_command("cmd"),
        Err(EvalError::UnknownCommand { action: "delete", .. })
    ));
    assert!(!interp.delete_command_by_id(second));
}

#[test]
fn rename_round_trip_keeps_imports_and_traces() {
    let mut interp = bare();
    interp.create_namespace("lib").unwrap();
    let id = interp.create_command("::lib::foo", constant("foo")).unwrap();
    let global = interp.current_namespace();
    interp.import_command(global, "::lib::foo").unwrap();

    let renames = Rc::new(RefCell::new(Vec::new()));
    let log = renames.clone();
    interp
        .trace_command(
            "::lib::foo",
            TraceOps::RENAME,
            Box::new(move |_, event| {
                if let TraceEvent::Rename { old, new } = event {
                    log.borrow_mut().push(format!("{} {}", old, new));
                }
                Ok(())
            }),
        )
        .unwrap();

    interp.rename_command("::lib::foo", "::lib::bar").unwrap();
    interp.rename_command("::lib::bar", "::lib::foo").unwrap();

    assert_eq!(interp.command_full_name(id).unwrap(), "::lib::foo");
    assert_eq!(interp.command_imports(id).len(), 1);
    assert_eq!(interp.command_traces("::lib::foo").unwrap().len(), 1);
    assert_eq!(
        *renames.borrow(),
        ["::lib::foo ::lib::bar", "::lib::bar ::lib::foo"]
    );
    assert_eq!(interp.eval("foo").unwrap().as_str(), "foo");
}

#[test]
fn renamed_import_target_keeps_forwarding() {
    let mut interp = bare();
    interp.create_command("::lib::foo", constant("v1")).unwrap();
    let global = interp.current_namespace();
    interp.import_command(global, "::lib::foo").unwrap();

    interp.rename_command("::lib::foo", "::lib::bar").unwrap();
    assert_eq!(interp.eval("foo").unwrap().as_str(), "v1");

    interp.create_command("::lib::bar", constant("v2")).unwrap();
    assert_eq!(interp.eval("foo").unwrap().as_str(), "v2");

    interp.delete_command("::lib::bar").unwrap();
    assert!(!interp.command_exists("foo"));
}

#[test]
fn hide_then_expose_is_transparent() {
    let mut interp = bare();
    let id = interp.create_command("tool", constant("ran")).unwrap();
    interp.create_command("::ns::peer", constant("peer")).unwrap();
    let ns = interp.find_namespace("::ns").unwrap();
    interp.import_command(ns, "::tool").unwrap();

    interp.hide_command("tool", "tok").unwrap();
    assert!(!interp.command_exists("tool"));
    assert_eq!(
        interp.invoke_hidden(&[Value::from("tok")], false).unwrap().as_str(),
        "ran"
    );
    interp.expose_command("tok", "tool").unwrap();

    assert_eq!(interp.eval("tool").unwrap().as_str(), "ran");
    assert_eq!(interp.command_imports(id).len(), 1);
    assert!(matches!(
        interp.hide_command("::ns::peer", "p"),
        Err(EvalError::BadName(_))
    ));
}

#[test]
fn epochs_move_on_structural_changes_only() {
    let mut interp = bare();
    let id = interp.create_command("cmd", constant("x")).unwrap();
    let start = interp.command_epoch(id).unwrap();

    interp.find_command("cmd").unwrap();
    interp.eval("cmd").unwrap();
    assert_eq!(interp.command_epoch(id).unwrap(), start);

    interp.hide_command("cmd", "hidden").unwrap();
    let hidden = interp.command_epoch(id).unwrap();
    assert!(hidden > start);
    interp.expose_command("hidden", "cmd").unwrap();
    let exposed = interp.command_epoch(id).unwrap();
    assert!(exposed > hidden);
    interp.rename_command("cmd", "renamed").unwrap();
    let renamed = interp.command_epoch(id).unwrap();
    assert!(renamed > exposed);

    assert!(interp.preserve_command(id));
    interp.create_command("renamed", constant("y")).unwrap();
    assert!(interp.command_epoch(id).unwrap() > renamed);
    assert!(!interp.is_command_live(id));
    interp.release_command(id);
    assert_eq!(interp.command_epoch(id), None);
}

#[test]
fn expansion_contributes_one_argument_per_element() {
    let mut interp = bare();
    let counts = Rc::new(RefCell::new(Vec::new()));
    let log = counts.clone();
    interp.create_command(
        "argc",
        CommandImpl::from_fn(move |_, args| {
            log.borrow_mut().push(args.len() - 1);
            Ok(Value::empty())
        }),
    );
    interp.set_var("none", "").unwrap();
    interp.set_var("four", "a b {c d} e").unwrap();
    interp.eval("argc {*}$none").unwrap();
    interp.eval("argc {*}$four").unwrap();
    interp.eval("argc x {*}$four {*}$none y").unwrap();
    assert_eq!(*counts.borrow(), [0, 4, 6]);
}

#[test]
fn self_delete_from_delete_trace() {
    let mut interp = bare();
    let id = interp.create_command("victim", constant("")).unwrap();
    let fired = Rc::new(Cell::new(0));
    let count = fired.clone();
    interp
        .trace_command(
            "victim",
            TraceOps::DELETE,
            Box::new(move |interp, _| {
                count.set(count.get() + 1);
                interp.delete_command_by_id(id);
                let _ = interp.delete_command("victim");
                Ok(())
            }),
        )
        .unwrap();

    interp.delete_command("victim").unwrap();
    assert_eq!(fired.get(), 1);
    assert!(!interp.command_exists("victim"));
    assert!(!interp.delete_command_by_id(id));
}

#[test]
fn recursion_limit_is_recoverable() {
    let mut interp = Interp::new(InterpConfig::bare().with_max_nesting_depth(50));
    interp.create_command("rec", CommandImpl::from_fn(|interp, _| interp.eval("rec")));
    interp.create_command("ok", constant("fine"));
    assert_eq!(
        interp.eval("rec").unwrap_err(),
        Exception::Error(EvalError::RecursionLimit)
    );
    assert_eq!(interp.nesting_depth(), 0);
    assert_eq!(interp.eval("ok").unwrap().as_str(), "fine");
}

#[test]
fn procedures_recurse_to_the_limit_and_recover() {
    let mut interp = Interp::new(InterpConfig::default().with_max_nesting_depth(80));
    interp.eval("proc spin {} { spin }").unwrap();
    assert!(matches!(
        interp.eval("spin").unwrap_err(),
        Exception::Error(EvalError::RecursionLimit)
    ));
    assert_eq!(interp.eval("list done").unwrap().as_str(), "done");
}

#[test]
fn diagnostics_reset_per_top_level_evaluation() {
    let mut interp = bare();
    interp.create_command(
        "fail",
        CommandImpl::from_fn(|_, _| Err(Exception::msg("nope"))),
    );
    interp.eval("fail").unwrap_err();
    assert_eq!(interp.error_info().unwrap(), "nope\n    while executing\n\"fail\"");
    assert_eq!(interp.error_code(), ["NONE"]);
    assert_eq!(interp.error_line(), 1);

    interp.create_command("noop", constant(""));
    interp.eval("noop").unwrap();
    assert_eq!(interp.error_info(), None);
    assert!(interp.error_code().is_empty());
}

#[test]
fn execution_traces_wrap_dispatch() {
    let mut interp = bare();
    interp.create_command("work", constant("done"));
    let events = Rc::new(RefCell::new(Vec::new()));
    let log = events.clone();
    interp
        .trace_command(
            "work",
            TraceOps::ENTER | TraceOps::LEAVE,
            Box::new(move |_, event| {
                let text = match event {
                    TraceEvent::Enter { words, .. } => format!("enter {}", words.len()),
                    TraceEvent::Leave { outcome, .. } => match outcome {
                        Ok(value) => format!("leave {}", value),
                        Err(exc) => format!("leave error {}", exc),
                    },
                    _ => String::new(),
                };
                log.borrow_mut().push(text);
                Ok(())
            }),
        )
        .unwrap();
    interp.eval("work a b").unwrap();
    assert_eq!(*events.borrow(), ["enter 3", "leave done"]);
}

#[test]
fn compiled_scripts_follow_redefinition() {
    let mut interp = bare();
    interp.create_command("value", constant("old"));
    let mut compiled = interp.compile("value").unwrap();
    assert_eq!(interp.eval_compiled(&mut compiled).unwrap().as_str(), "old");
    assert!(compiled.is_valid(&interp));

    interp.create_command("value", constant("new"));
    assert!(!compiled.is_valid(&interp));
    assert_eq!(interp.eval_compiled(&mut compiled).unwrap().as_str(), "new");
    assert_eq!(compiled.compilations(), 2);
}

#[test]
fn cancellation_overrides_the_result() {
    let mut interp = bare();
    let handle = interp.cancel_handle();
    interp.create_command(
        "stop",
        CommandImpl::from_fn(move |_, _| {
            handle.cancel();
            Ok(Value::from("ignored"))
        }),
    );
    interp.create_command("after", constant("unreached"));
    assert_eq!(
        interp.eval("stop; after").unwrap_err(),
        Exception::Error(EvalError::Canceled)
    );
    assert_eq!(interp.eval("after").unwrap().as_str(), "unreached");
}

#[test]
fn deleted_interpreter_rejects_work() {
    let mut interp = bare();
    interp.delete();
    assert!(interp.is_deleted());
    assert!(interp.create_command("late", constant("")).is_none());
    assert_eq!(
        interp.eval("anything").unwrap_err(),
        Exception::Error(EvalError::InterpreterDeleted)
    );
}

#[test]
fn scripts_print_through_the_output_channel() {
    let mut interp = Interp::new(InterpConfig::default());
    let out = MemWriter::new();
    interp.set_output(out.clone());
    interp
        .eval(
            "proc greet {who} { puts \"hello, $who\" }\n\
             foreach name {alice bob} { greet $name }",
        )
        .unwrap();
    assert_eq!(out.contents(), "hello, alice\nhello, bob\n");
}

#[test]
fn global_flag_evaluates_in_the_global_frame() {
    let mut interp = Interp::new(InterpConfig::default());
    interp.create_command(
        "at_global",
        CommandImpl::from_fn(|interp, args| interp.eval_with_flags(args[1].as_str(), EvalFlags::global())),
    );
    interp.eval("proc f {} { set x local; at_global {set x global}; set x }").unwrap();
    assert_eq!(interp.eval("f").unwrap().as_str(), "local");
    assert_eq!(interp.get_var("x").unwrap().as_str(), "global");
}
