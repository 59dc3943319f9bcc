use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::jobs::{Jid, JobState, JobTable};
use crate::mask::{MaskGuard, SignalCell};
use crate::parser::Invocation;
use crate::signals;
use crate::sio;
use crate::wait::wait_for_foreground;
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{SigSet, SigmaskHow, Signal, killpg, sigprocmask};
use nix::unistd::{ForkResult, Pid, execve, fork, setpgid};
use std::borrow::Cow;
use std::ffi::{CString, OsStr};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Command that is not a builtin: runs a program as a new job.
pub struct ExternalCommand {
    name: String,
    path: CString,
    argv: Vec<CString>,
    background: bool,
    line: String,
}

impl ExternalCommand {
    pub fn new(path: CString, invocation: &Invocation) -> Option<Self> {
        let argv = invocation
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()).ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            name: invocation.name().to_string(),
            path,
            argv,
            background: invocation.background,
            line: invocation.line.clone(),
        })
    }
}

/// Stand-in for a command line that cannot be handed to `execve`.
struct Unlaunchable {
    name: String,
}

impl ExecutableCommand for Unlaunchable {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _env: &mut Environment<'_>,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}: arguments may not contain NUL bytes", self.name)?;
        Ok(1)
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment<'_>,
        invocation: &Invocation,
    ) -> Option<Box<dyn ExecutableCommand>> {
        let name = invocation.name();
        let search_paths = env.get_var("PATH").unwrap_or_default();
        // Unresolved names are passed through so the child reports the failure.
        let path = match find_command_path(OsStr::new(&search_paths), Path::new(name)) {
            Some(found) => CString::new(found.as_os_str().as_bytes()).ok(),
            None => CString::new(name).ok(),
        };
        debug!(program = name, resolved = ?path, "external command");
        let command = path.and_then(|path| ExternalCommand::new(path, invocation));
        Some(match command {
            Some(command) => Box::new(command),
            None => Box::new(Unlaunchable {
                name: name.to_string(),
            }),
        })
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment<'_>,
    ) -> Result<ExitCode> {
        let envp = env.envp();
        let Some((pid, jid)) = self.launch(&envp, env.jobs)? else {
            writeln!(stdout, "Tried to create too many jobs")?;
            return Ok(1);
        };

        if self.background {
            writeln!(stdout, "[{jid}] ({pid}) {}", self.line)?;
        } else {
            stdout.flush()?;
            wait_for_foreground(env.jobs, pid)?;
        }
        Ok(0)
    }
}

impl ExternalCommand {
    /// Forks the child and registers it as a job.
    ///
    /// SIGCHLD stays blocked from before the fork until the job is in the table,
    /// so the handler cannot reap a child the table has not seen yet. Returns
    /// `None` if the table is full; the child is killed in that case.
    fn launch(&self, envp: &[CString], jobs: &SignalCell<JobTable>) -> Result<Option<(Pid, Jid)>> {
        let guard = MaskGuard::block_one(Signal::SIGCHLD).context("sigprocmask error")?;

        // SAFETY: the shell is single threaded, and the child only runs
        // async-signal-safe code before it execs or exits.
        match unsafe { fork() }.context("fork error")? {
            ForkResult::Child => self.exec_child(guard.previous(), envp),
            ForkResult::Parent { child } => {
                // Also done by the child; whichever runs first wins.
                match setpgid(child, child) {
                    Ok(()) | Err(Errno::EACCES) | Err(Errno::ESRCH) => {}
                    Err(err) => return Err(err).context("setpgid error"),
                }

                let state = if self.background {
                    JobState::Background
                } else {
                    JobState::Foreground
                };
                let added = jobs.with(|table| table.add(child, state, &self.line));
                let registered = match added {
                    Ok(jid) => {
                        debug!(jid, pid = child.as_raw(), cmdline = %self.line, "added job");
                        Some((child, jid))
                    }
                    Err(err) => {
                        warn!(pid = child.as_raw(), %err, "job not registered");
                        match killpg(child, Signal::SIGKILL) {
                            Ok(()) | Err(Errno::ESRCH) => {}
                            Err(err) => return Err(err).context("kill error"),
                        }
                        None
                    }
                };
                guard.restore().context("sigprocmask error")?;
                Ok(registered)
            }
        }
    }

    /// Runs in the forked child: never returns to shell logic.
    fn exec_child(&self, mask: &SigSet, envp: &[CString]) -> ! {
        if let Err(err) = signals::reset_to_default() {
            sio::die("sigaction error", err);
        }
        if let Err(err) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(mask), None) {
            sio::die("sigprocmask error", err);
        }
        if let Err(err) = setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
            sio::die("setpgid error", err);
        }
        let _ = execve(&self.path, &self.argv, envp);
        sio::print(format_args!("{}: Command not found\n", self.name));
        sio::exit(1)
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`) or `./foo`: returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() || path.starts_with("./") {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|path| path.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
