//! Signal handling for job control.
//!
//! Each handled signal maps to a [`Disposition`] through a fixed table. The
//! state changes a disposition makes are pure functions over [`JobTable`]
//! ([`apply_child_event`], [`forward_target`]) so they can be exercised with
//! synthetic events; the `extern "C"` entry point only wires them to the
//! process-wide table and to the system calls.

use crate::jobs::{Jid, JobState, JobTable};
use crate::mask::SignalCell;
use crate::sio;
use nix::errno::Errno;
use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, killpg, sigaction};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fmt;

static JOBS: SignalCell<JobTable> = SignalCell::new(JobTable::new());

/// The job table the installed handlers operate on.
pub fn job_table() -> &'static SignalCell<JobTable> {
    &JOBS
}

/// What the shell does when a signal arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Collect every pending child status change.
    ReapChildren,
    /// Pass the signal on to the foreground job's process group.
    Forward,
    /// Terminate the shell.
    Quit,
}

pub const DISPOSITIONS: [(Signal, Disposition); 4] = [
    (Signal::SIGCHLD, Disposition::ReapChildren),
    (Signal::SIGINT, Disposition::Forward),
    (Signal::SIGTSTP, Disposition::Forward),
    (Signal::SIGQUIT, Disposition::Quit),
];

pub fn disposition(signal: Signal) -> Option<Disposition> {
    DISPOSITIONS
        .iter()
        .find(|(sig, _)| *sig == signal)
        .map(|&(_, disposition)| disposition)
}

/// A status change of a child process as reported by `waitpid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    Exited { pid: Pid, status: i32 },
    Signaled { pid: Pid, signal: Signal },
    Stopped { pid: Pid, signal: Signal },
}

impl ChildEvent {
    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(pid, status) => Some(ChildEvent::Exited { pid, status }),
            WaitStatus::Signaled(pid, signal, _) => Some(ChildEvent::Signaled { pid, signal }),
            WaitStatus::Stopped(pid, signal) => Some(ChildEvent::Stopped { pid, signal }),
            _ => None,
        }
    }
}

/// Message printed after a child event changed the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Terminated { jid: Jid, pid: Pid, signal: Signal },
    Stopped { jid: Jid, pid: Pid, signal: Signal },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Notice::Terminated { jid, pid, signal } => {
                write!(f, "Job [{jid}] ({pid}) terminated by signal {}", signal as i32)
            }
            Notice::Stopped { jid, pid, signal } => {
                write!(f, "Job [{jid}] ({pid}) stopped by signal {}", signal as i32)
            }
        }
    }
}

/// Applies one child status change to the table.
///
/// Exited and signaled children are removed, stopped children stay registered
/// as [`JobState::Stopped`]. Events for unknown pids leave the table untouched.
pub fn apply_child_event(jobs: &mut JobTable, event: ChildEvent) -> Option<Notice> {
    match event {
        ChildEvent::Exited { pid, .. } => {
            jobs.remove(pid);
            None
        }
        ChildEvent::Signaled { pid, signal } => jobs
            .remove(pid)
            .map(|job| Notice::Terminated { jid: job.jid, pid, signal }),
        ChildEvent::Stopped { pid, signal } => {
            let jid = jobs.pid_to_jid(pid)?;
            jobs.set_state(pid, JobState::Stopped).ok()?;
            Some(Notice::Stopped { jid, pid, signal })
        }
    }
}

/// Process group a keyboard signal should be forwarded to.
pub fn forward_target(jobs: &JobTable) -> Option<Pid> {
    jobs.foreground_pid()
}

/// Installs the shell's handler for every signal in [`DISPOSITIONS`].
pub fn install_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for (signal, _) in DISPOSITIONS {
        // SAFETY: `handle_signal` only performs async-signal-safe operations.
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(())
}

/// Puts every handled signal back to its default action.
///
/// Called in a forked child before it unblocks signals, so nothing reaches the
/// shell's handlers in the child's copy of the table.
pub(crate) fn reset_to_default() -> nix::Result<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for (signal, _) in DISPOSITIONS {
        // SAFETY: restoring the default action installs no code.
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(())
}

extern "C" fn handle_signal(signo: c_int) {
    let Ok(signal) = Signal::try_from(signo) else {
        return;
    };
    match disposition(signal) {
        Some(Disposition::ReapChildren) => reap_children(&JOBS),
        Some(Disposition::Forward) => forward(&JOBS, signal),
        Some(Disposition::Quit) => {
            sio::puts(b"Terminating after receipt of SIGQUIT signal\n");
            sio::exit(1);
        }
        None => {}
    }
}

fn reap_children(jobs: &SignalCell<JobTable>) {
    loop {
        let status = waitpid(
            Pid::from_raw(-1),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        );
        match status {
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
            Ok(status) => {
                let Some(event) = ChildEvent::from_wait_status(status) else {
                    continue;
                };
                if let Some(notice) = jobs.with(|table| apply_child_event(table, event)) {
                    sio::print(format_args!("{notice}\n"));
                }
            }
            Err(Errno::EINTR) => continue,
            Err(err) => sio::die("waitpid error", err),
        }
    }
}

fn forward(jobs: &SignalCell<JobTable>, signal: Signal) {
    let Some(pid) = jobs.with(|table| forward_target(table)) else {
        return;
    };
    match killpg(pid, signal) {
        // The group may already be gone while its leader waits to be reaped.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => sio::die("kill error", err),
    }
}
