//! Command-line front end.
//!
//! Usage:
//!   wordeval                  # interactive REPL
//!   wordeval -c <script>      # evaluate a script and exit
//!   wordeval path/to/script   # evaluate a file

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use argh::FromArgs;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wordeval::parser::{ParseErrorKind, parse_script};
use wordeval::{CommandImpl, Interp, InterpConfig, Value};

#[derive(FromArgs)]
/// Evaluate command-language scripts.
struct Options {
    #[argh(option, short = 'c')]
    /// script text to evaluate instead of a file.
    command: Option<String>,

    #[argh(option)]
    /// maximum nesting depth of evaluations.
    max_depth: Option<usize>,

    #[argh(switch)]
    /// let break, continue and custom codes escape top-level evaluations.
    allow_exceptions: bool,

    #[argh(positional)]
    /// script file to evaluate; starts the REPL when omitted.
    script: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let options: Options = argh::from_env();
    match run(options) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: Options) -> Result<ExitCode> {
    let mut config = InterpConfig::default().with_allow_exceptions(options.allow_exceptions);
    if let Some(depth) = options.max_depth {
        config = config.with_max_nesting_depth(depth);
    }
    let mut interp = Interp::new(config);
    interp.create_command(
        "exit",
        CommandImpl::from_fn(|_, args: &[Value]| {
            let code = match args.get(1) {
                Some(code) => code.as_int()?,
                None => 0,
            };
            std::process::exit(code as i32)
        }),
    );

    if let Some(script) = options.command {
        return Ok(evaluate(&mut interp, &script));
    }
    if let Some(path) = options.script {
        let script = std::fs::read_to_string(&path)
            .with_context(|| format!("can't read script {}", path.display()))?;
        return Ok(evaluate(&mut interp, &script));
    }
    repl(&mut interp)?;
    Ok(ExitCode::SUCCESS)
}

/// Evaluate a whole script, reporting a failure with its traceback.
fn evaluate(interp: &mut Interp, script: &str) -> ExitCode {
    match interp.eval(script) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            report(interp, &e);
            ExitCode::FAILURE
        }
    }
}

fn report(interp: &Interp, err: &wordeval::Exception) {
    match interp.error_info() {
        Some(info) => eprintln!("{}", info),
        None => eprintln!("error: {}", err),
    }
}

/// True while the input still has an open brace, quote or bracket.
fn is_incomplete(script: &str) -> bool {
    matches!(
        parse_script(script),
        Err(e) if matches!(
            e.kind,
            ParseErrorKind::UnfinishedBrace
                | ParseErrorKind::UnfinishedQuote
                | ParseErrorKind::UnfinishedBracket
        )
    )
}

fn repl(interp: &mut Interp) -> Result<()> {
    let mut rl = DefaultEditor::new().context("can't start line editor")?;
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "% " } else { "> " };
        match rl.readline(prompt) {
            Ok(line) => {
                pending.push_str(&line);
                pending.push('\n');
                if is_incomplete(&pending) {
                    continue;
                }
                let script = std::mem::take(&mut pending);
                rl.add_history_entry(script.trim_end())?;
                match interp.eval(&script) {
                    Ok(value) if !value.is_empty() => println!("{}", value),
                    Ok(_) => {}
                    Err(e) => report(interp, &e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                pending.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("can't read input"),
        }
    }

    Ok(())
}
