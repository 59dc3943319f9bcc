//! A tiny job-control shell.
//!
//! Each command line either runs a builtin in-process (`quit`, `jobs`, `bg`,
//! `fg`) or launches a program as a job in its own process group, in the
//! foreground or, with a trailing `&`, in the background. Keyboard signals are
//! forwarded to the foreground job, and child status changes are reaped
//! asynchronously into the job table.
//!
//! The job table is shared between the read-eval loop and the signal handlers.
//! It lives in a [`mask::SignalCell`], which is only entered with every signal
//! blocked. The main entry point is [`Interpreter`]; [`signals::install_handlers`]
//! must run first for job control to work.

mod builtin;
pub mod command;
pub mod env;
mod external;
mod interpreter;
mod io_adapters;
pub mod jobs;
mod lexer;
pub mod mask;
pub mod parser;
pub mod signals;
mod sio;
mod wait;

/// Usage text printed for `-h`.
pub const USAGE: &str = "Usage: shell [-hvp]\n   \
-h   print this message\n   \
-v   print additional diagnostic information\n   \
-p   do not emit a command prompt\n";

/// Convenient re-export of the read-eval loop.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
