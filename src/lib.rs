//! An embeddable command-language interpreter core.
//!
//! Scripts are sequences of commands made of words. The engine substitutes
//! the words of each command, resolves the first word through a namespace-aware
//! command table and dispatches to the command's implementation. Around that
//! core sit the command lifecycle (create, rename, hide, expose, import,
//! alias, delete), command and execution traces, call frames with variables,
//! and a diagnostics surface that accumulates a traceback as errors unwind.
//!
//! The main entry point is [`Interp`]:
//!
//! ```
//! use wordeval::{Interp, InterpConfig};
//!
//! let mut interp = Interp::new(InterpConfig::default());
//! interp.eval("proc double {x} { list $x $x }").unwrap();
//! assert_eq!(interp.eval("double hi").unwrap().as_str(), "hi hi");
//! ```
//!
//! Native commands implement [`CommandProc`] (any suitable closure does) and
//! are registered with [`Interp::create_command`].

mod builtin;
pub mod command;
pub mod compile;
pub mod config;
pub mod error;
pub mod eval;
pub mod frame;
pub mod interp;
pub mod namespace;
pub mod output;
pub mod parser;
mod pattern;
mod table;
pub mod trace;
pub mod value;

pub use command::{CommandId, CommandImpl, CommandProc, DeleteProc, Ensemble};
pub use compile::CompiledScript;
pub use config::InterpConfig;
pub use error::{CmdResult, Code, EscapedFlow, EvalError, Exception};
pub use eval::EvalFlags;
pub use interp::{CancelHandle, Interp};
pub use namespace::NsId;
pub use output::MemWriter;
pub use trace::{TraceEvent, TraceId, TraceOps};
pub use value::Value;
