use crate::env::Environment;
use crate::parser::Invocation;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Object-safe trait for any command that can be executed by the shell.
///
/// This is implemented by built-ins via a blanket impl and by the process launcher.
/// An `Err` means a system call failed and the shell cannot continue; problems the
/// user can fix are printed to `stdout` and reported through the exit code.
pub trait ExecutableCommand {
    /// Executes the command.
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment<'_>,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a parsed command line.
///
/// Returns `None` when the factory doesn't recognize the command name.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided invocation.
    fn try_create(
        &self,
        env: &Environment<'_>,
        invocation: &Invocation,
    ) -> Option<Box<dyn ExecutableCommand>>;
}
