use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::jobs::{Jid, Job, JobState};
use crate::parser::Invocation;
use crate::wait::wait_for_foreground;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::io::Write;
use std::num::ParseIntError;
use std::str::FromStr;
use tracing::debug;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "jobs" or "fg".
    fn name() -> &'static str;

    /// Executes the command against the shell environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment<'_>) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment<'_>,
    ) -> Result<ExitCode> {
        <T as BuiltinCommand>::execute(*self, stdout, env)
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _env: &mut Environment<'_>,
    ) -> Result<ExitCode> {
        stdout.write_all(self.output.as_bytes())?;
        if !self.output.ends_with('\n') {
            writeln!(stdout)?;
        }
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment<'_>,
        invocation: &Invocation,
    ) -> Option<Box<dyn ExecutableCommand>> {
        let name = invocation.name();
        if name == T::name() {
            Some(match T::from_args(&[name], &invocation.args()) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Terminate the shell.
pub struct Quit {
    #[argh(positional, greedy)]
    /// ignored
    #[allow(dead_code)]
    args: Vec<String>,
}

impl BuiltinCommand for Quit {
    fn name() -> &'static str {
        "quit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment<'_>) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List the jobs known to the shell.
pub struct Jobs {}

impl BuiltinCommand for Jobs {
    fn name() -> &'static str {
        "jobs"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment<'_>) -> Result<ExitCode> {
        for job in env.jobs.with(|table| table.list()) {
            writeln!(stdout, "{job}")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Resume a job in the background.
pub struct Bg {
    #[argh(positional)]
    /// process id, or %jobid
    pub job: Option<String>,
}

impl BuiltinCommand for Bg {
    fn name() -> &'static str {
        "bg"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment<'_>) -> Result<ExitCode> {
        match switch_job(Self::name(), self.job.as_deref(), JobState::Background, stdout, env)? {
            Some(job) => {
                writeln!(stdout, "[{}] ({})  {}", job.jid, job.pid, job.cmdline)?;
                Ok(0)
            }
            None => Ok(1),
        }
    }
}

#[derive(FromArgs)]
/// Bring a job to the foreground and wait for it.
pub struct Fg {
    #[argh(positional)]
    /// process id, or %jobid
    pub job: Option<String>,
}

impl BuiltinCommand for Fg {
    fn name() -> &'static str {
        "fg"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment<'_>) -> Result<ExitCode> {
        match switch_job(Self::name(), self.job.as_deref(), JobState::Foreground, stdout, env)? {
            Some(job) => {
                stdout.flush()?;
                wait_for_foreground(env.jobs, job.pid)?;
                Ok(0)
            }
            None => Ok(1),
        }
    }
}

/// A job as named on the `bg`/`fg` command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    Pid(Pid),
    Jid(Jid),
}

/// Both forms must be plain decimal numbers. Trailing garbage (`12abc`) or a
/// sign after `%` (`%-1`) is a usage error, not a lookup miss.
impl FromStr for JobRef {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('%') {
            Some(jid) => jid.parse().map(JobRef::Jid),
            None => s.parse().map(|raw| JobRef::Pid(Pid::from_raw(raw))),
        }
    }
}

enum Lookup {
    Found(Job),
    Missing(String),
}

/// Resolves `arg`, continues the job if needed and moves it to `target`.
///
/// Lookup, signal and state change happen in one guarded section so a status
/// change reported in between cannot be lost. Problems with `arg` are printed
/// and yield `Ok(None)`.
fn switch_job(
    name: &str,
    arg: Option<&str>,
    target: JobState,
    stdout: &mut dyn Write,
    env: &mut Environment<'_>,
) -> Result<Option<Job>> {
    let Some(arg) = arg else {
        writeln!(stdout, "{name} command requires PID or %jobid argument")?;
        return Ok(None);
    };
    let Ok(job_ref) = arg.parse::<JobRef>() else {
        writeln!(stdout, "{name}: argument must be a PID or %jobid")?;
        return Ok(None);
    };

    let lookup = env.jobs.with(|table| -> Result<Lookup> {
        let found = match job_ref {
            JobRef::Jid(jid) => table.find_by_jid(jid).copied(),
            JobRef::Pid(pid) => table.find_by_pid(pid).copied(),
        };
        let Some(job) = found else {
            return Ok(Lookup::Missing(match job_ref {
                JobRef::Jid(jid) => format!("%{jid}: No such job"),
                JobRef::Pid(pid) => format!("({pid}): No such process"),
            }));
        };
        if target == JobState::Background || job.state == JobState::Stopped {
            killpg(job.pid, Signal::SIGCONT).context("kill error")?;
        }
        table.set_state(job.pid, target)?;
        Ok(Lookup::Found(Job {
            state: target,
            ..job
        }))
    })?;

    match lookup {
        Lookup::Found(job) => {
            debug!(jid = job.jid, pid = job.pid.as_raw(), state = job.state.name(), "job switched");
            Ok(Some(job))
        }
        Lookup::Missing(message) => {
            writeln!(stdout, "{message}")?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobTable;
    use crate::lexer::split_into_tokens;
    use crate::mask::SignalCell;
    use crate::parser::construct_invocation;
    use std::collections::HashMap;
    use std::os::unix::process::CommandExt;

    fn env_for(jobs: &SignalCell<JobTable>) -> Environment<'_> {
        Environment {
            vars: HashMap::new(),
            jobs,
            should_exit: false,
        }
    }

    fn output(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_job_ref_parsing() {
        assert_eq!("%3".parse::<JobRef>(), Ok(JobRef::Jid(3)));
        assert_eq!("1234".parse::<JobRef>(), Ok(JobRef::Pid(Pid::from_raw(1234))));
        assert!("%".parse::<JobRef>().is_err());
        assert!("abc".parse::<JobRef>().is_err());
        assert!("%x1".parse::<JobRef>().is_err());
        assert!("%-1".parse::<JobRef>().is_err());
        assert!("12abc".parse::<JobRef>().is_err());
    }

    #[test]
    fn test_malformed_numbers_are_usage_errors() {
        let jobs = SignalCell::new(JobTable::new());
        let mut env = env_for(&jobs);

        let mut out = Vec::new();
        assert_eq!(Fg { job: Some("%-1".into()) }.execute(&mut out, &mut env).unwrap(), 1);
        assert_eq!(Bg { job: Some("12abc".into()) }.execute(&mut out, &mut env).unwrap(), 1);
        assert_eq!(
            output(out),
            "fg: argument must be a PID or %jobid\nbg: argument must be a PID or %jobid\n"
        );
    }

    #[test]
    fn test_quit_requests_exit() {
        let jobs = SignalCell::new(JobTable::new());
        let mut env = env_for(&jobs);
        let code = Quit { args: vec![] }.execute(&mut Vec::new(), &mut env).unwrap();
        assert_eq!(code, 0);
        assert!(env.should_exit);
    }

    #[test]
    fn test_jobs_lists_every_job_in_jid_order() {
        let jobs = SignalCell::new(JobTable::new());
        jobs.with(|table| {
            table.add(Pid::from_raw(11), JobState::Background, "sleep 1 &").unwrap();
            table.add(Pid::from_raw(12), JobState::Stopped, "sleep 2").unwrap();
        });
        let mut env = env_for(&jobs);

        let mut out = Vec::new();
        assert_eq!(Jobs {}.execute(&mut out, &mut env).unwrap(), 0);
        assert_eq!(
            output(out),
            "[1] (11) Running sleep 1 &\n[2] (12) Stopped sleep 2\n"
        );
    }

    #[test]
    fn test_jobs_with_empty_table_prints_nothing() {
        let jobs = SignalCell::new(JobTable::new());
        let mut out = Vec::new();
        Jobs {}.execute(&mut out, &mut env_for(&jobs)).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_bg_fg_argument_errors() {
        let jobs = SignalCell::new(JobTable::new());
        let mut env = env_for(&jobs);

        let mut out = Vec::new();
        assert_eq!(Bg { job: None }.execute(&mut out, &mut env).unwrap(), 1);
        assert_eq!(output(out), "bg command requires PID or %jobid argument\n");

        let mut out = Vec::new();
        assert_eq!(Fg { job: Some("abc".into()) }.execute(&mut out, &mut env).unwrap(), 1);
        assert_eq!(output(out), "fg: argument must be a PID or %jobid\n");

        let mut out = Vec::new();
        assert_eq!(Bg { job: Some("%2".into()) }.execute(&mut out, &mut env).unwrap(), 1);
        assert_eq!(output(out), "%2: No such job\n");
    }

    #[test]
    fn test_fg_unknown_pid_reports_and_does_not_block() {
        let jobs = SignalCell::new(JobTable::new());
        jobs.with(|table| {
            table.add(Pid::from_raw(50), JobState::Stopped, "sleep 5").unwrap();
        });
        let mut env = env_for(&jobs);

        let mut out = Vec::new();
        assert_eq!(Fg { job: Some("9999".into()) }.execute(&mut out, &mut env).unwrap(), 1);
        assert_eq!(output(out), "(9999): No such process\n");
        assert_eq!(
            jobs.with(|table| table.find_by_pid(Pid::from_raw(50)).map(|j| j.state)),
            Some(JobState::Stopped)
        );
    }

    #[test]
    fn test_bg_resumes_stopped_process_group() {
        let mut child = std::process::Command::new("sleep")
            .arg("5")
            .process_group(0)
            .spawn()
            .expect("spawn sleep");
        let pid = Pid::from_raw(child.id() as i32);
        killpg(pid, Signal::SIGSTOP).unwrap();

        let jobs = SignalCell::new(JobTable::new());
        jobs.with(|table| table.add(pid, JobState::Stopped, "sleep 5").unwrap());
        let mut env = env_for(&jobs);

        let mut out = Vec::new();
        let code = Bg { job: Some("%1".into()) }.execute(&mut out, &mut env).unwrap();

        let _ = child.kill();
        let _ = child.wait();

        assert_eq!(code, 0);
        assert_eq!(output(out), format!("[1] ({pid})  sleep 5\n"));
        assert_eq!(
            jobs.with(|table| table.find_by_pid(pid).map(|j| j.state)),
            Some(JobState::Background)
        );
    }

    #[test]
    fn test_factory_reports_bad_arguments() {
        let jobs = SignalCell::new(JobTable::new());
        let mut env = env_for(&jobs);
        let line = "bg 1 2";
        let invocation = construct_invocation(split_into_tokens(line).unwrap(), line).unwrap();

        let cmd = Factory::<Bg>::default()
            .try_create(&env, &invocation)
            .expect("bg is recognized");
        let mut out = Vec::new();
        assert_eq!(cmd.execute(&mut out, &mut env).unwrap(), 1);
        assert!(!out.is_empty());

        assert!(Factory::<Fg>::default().try_create(&env, &invocation).is_none());
    }
}
