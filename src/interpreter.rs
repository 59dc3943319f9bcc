use crate::command::{CommandFactory, ExitCode};
use crate::env::Environment;
use crate::io_adapters::LineReader;
use crate::jobs::JobTable;
use crate::lexer;
use crate::mask::SignalCell;
use crate::parser;
use crate::signals;
use anyhow::Result;
use std::io::Write;
use tracing::debug;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only support commands defined in this crate: the builtins and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The shell's command dispatcher and read-eval loop.
///
/// The interpreter owns an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried in order; the first one that recognizes the command name runs
/// it. The process launcher comes last and accepts every name.
///
/// Example
/// ```
/// use tsh::Interpreter;
/// use tsh::jobs::JobTable;
/// use tsh::mask::SignalCell;
///
/// let jobs = SignalCell::new(JobTable::new());
/// let mut sh = Interpreter::new(&jobs);
/// let mut out = Vec::new();
/// assert_eq!(sh.eval("jobs", &mut out).unwrap(), 0);
/// assert!(out.is_empty());
/// ```
pub struct Interpreter<'j> {
    env: Environment<'j>,
    commands: Vec<Box<dyn CommandFactory>>,
}

impl<'j> Interpreter<'j> {
    /// Create an interpreter with the builtins and the process launcher.
    pub fn new(jobs: &'j SignalCell<JobTable>) -> Self {
        use crate::builtin::*;
        use crate::external::ExternalCommand;
        Self::with_commands(
            jobs,
            vec![
                Box::new(Factory::<Quit>::default()),
                Box::new(Factory::<Jobs>::default()),
                Box::new(Factory::<Bg>::default()),
                Box::new(Factory::<Fg>::default()),
                Box::new(Factory::<ExternalCommand>::default()),
            ],
        )
    }

    /// Create an interpreter with a custom set of command factories.
    pub fn with_commands(
        jobs: &'j SignalCell<JobTable>,
        commands: Vec<Box<dyn CommandFactory>>,
    ) -> Self {
        Self {
            env: Environment::new(jobs),
            commands,
        }
    }

    /// Whether `quit` has been run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Evaluate one command line, writing the shell's own output to `stdout`.
    ///
    /// Mistakes in the line are reported to `stdout` and produce a non-zero exit
    /// code. An `Err` means a system call failed and the shell must stop.
    pub fn eval(&mut self, line: &str, stdout: &mut dyn Write) -> Result<ExitCode> {
        let tokens = match lexer::split_into_tokens(line) {
            Ok(tokens) => tokens,
            Err(err) => {
                writeln!(stdout, "{err}")?;
                return Ok(1);
            }
        };
        let Some(invocation) = parser::construct_invocation(tokens, line) else {
            return Ok(0);
        };
        debug!(argv = ?invocation.argv, background = invocation.background, "eval");

        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, &invocation) {
                return cmd.execute(stdout, &mut self.env);
            }
        }
        writeln!(stdout, "{}: Command not found", invocation.name())?;
        Ok(1)
    }

    /// Read and evaluate lines until end of input or `quit`.
    pub fn repl(&mut self, emit_prompt: bool) -> Result<()> {
        let mut input = LineReader::new(emit_prompt)?;
        while !self.should_exit() {
            let Some(line) = input.next_line()? else {
                break;
            };
            let mut stdout = std::io::stdout();
            self.eval(&line, &mut stdout)?;
            stdout.flush()?;
        }
        Ok(())
    }
}

impl Default for Interpreter<'static> {
    /// An interpreter bound to the job table the signal handlers update.
    fn default() -> Self {
        Self::new(signals::job_table())
    }
}
