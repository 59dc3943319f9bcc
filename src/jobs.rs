//! The job table shared between the read-eval loop and the signal handlers.
//!
//! Everything here is plain data: no heap allocation happens when a job is added,
//! changed or removed, so the table can be touched from a signal handler. Access
//! from both sides goes through [`SignalCell`](crate::mask::SignalCell).

use nix::unistd::Pid;
use std::fmt;
use thiserror::Error;

/// Maximum number of jobs the shell tracks at once.
pub const MAXJOBS: usize = 16;

/// Maximum number of bytes of a command line kept for display.
pub const MAXLINE: usize = 1024;

/// Shell-assigned job id, always `>= 1` for a registered job.
pub type Jid = u32;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Undefined,
    Foreground,
    Background,
    Stopped,
}

impl JobState {
    /// Name shown by the `jobs` builtin.
    pub fn name(self) -> &'static str {
        match self {
            JobState::Undefined => "Undefined",
            JobState::Foreground => "Foreground",
            JobState::Background => "Running",
            JobState::Stopped => "Stopped",
        }
    }
}

/// Command line text stored inline in the job slot.
#[derive(Clone, Copy)]
pub struct CmdLine {
    buf: [u8; MAXLINE],
    len: usize,
}

impl CmdLine {
    pub const EMPTY: CmdLine = CmdLine {
        buf: [0; MAXLINE],
        len: 0,
    };

    /// Copies `text`, truncating at a character boundary if it is too long.
    pub fn new(text: &str) -> Self {
        let mut len = text.len().min(MAXLINE);
        while !text.is_char_boundary(len) {
            len -= 1;
        }
        let mut line = Self::EMPTY;
        line.buf[..len].copy_from_slice(&text.as_bytes()[..len]);
        line.len = len;
        line
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl fmt::Debug for CmdLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for CmdLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for CmdLine {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for CmdLine {}

/// A single registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub pid: Pid,
    pub jid: Jid,
    pub state: JobState,
    pub cmdline: CmdLine,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ({}) {} {}",
            self.jid,
            self.pid,
            self.state.name(),
            self.cmdline
        )
    }
}

/// Reasons the job table refuses an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JobTableError {
    /// Every slot is taken.
    #[error("Tried to create too many jobs")]
    Full,
    /// Pids must be positive.
    #[error("invalid pid {0}")]
    InvalidPid(Pid),
    /// A job with this pid is already registered.
    #[error("pid {0} is already a job")]
    DuplicatePid(Pid),
    /// Another job already holds the foreground.
    #[error("job ({0}) is already in the foreground")]
    ForegroundBusy(Pid),
    /// `Undefined` cannot be stored.
    #[error("jobs cannot be put in an undefined state")]
    InvalidState,
    /// No job with this pid.
    #[error("({0}): No such process")]
    NoSuchJob(Pid),
}

/// Fixed-capacity table of jobs keyed by pid.
#[derive(Debug)]
pub struct JobTable {
    slots: [Option<Job>; MAXJOBS],
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAXJOBS],
        }
    }

    /// Registers a job and returns the jid it was given.
    ///
    /// The jid is the smallest positive integer not used by another registered job.
    pub fn add(&mut self, pid: Pid, state: JobState, cmdline: &str) -> Result<Jid, JobTableError> {
        if pid.as_raw() < 1 {
            return Err(JobTableError::InvalidPid(pid));
        }
        if state == JobState::Undefined {
            return Err(JobTableError::InvalidState);
        }
        if self.find_by_pid(pid).is_some() {
            return Err(JobTableError::DuplicatePid(pid));
        }
        if state == JobState::Foreground {
            if let Some(current) = self.foreground_pid() {
                return Err(JobTableError::ForegroundBusy(current));
            }
        }

        let jid = self.smallest_free_jid();
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(JobTableError::Full)?;
        *slot = Some(Job {
            pid,
            jid,
            state,
            cmdline: CmdLine::new(cmdline),
        });
        Ok(jid)
    }

    /// Removes the job with `pid`, returning it if it was registered.
    pub fn remove(&mut self, pid: Pid) -> Option<Job> {
        self.slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(job) if job.pid == pid))
            .and_then(Option::take)
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.jobs().find(|job| job.pid == pid)
    }

    pub fn find_by_jid(&self, jid: Jid) -> Option<&Job> {
        self.jobs().find(|job| job.jid == jid)
    }

    /// Pid of the job currently in the foreground, if any.
    pub fn foreground_pid(&self) -> Option<Pid> {
        self.jobs()
            .find(|job| job.state == JobState::Foreground)
            .map(|job| job.pid)
    }

    pub fn pid_to_jid(&self, pid: Pid) -> Option<Jid> {
        self.find_by_pid(pid).map(|job| job.jid)
    }

    /// Moves a job to `state`, refusing to create a second foreground job.
    pub fn set_state(&mut self, pid: Pid, state: JobState) -> Result<(), JobTableError> {
        if state == JobState::Undefined {
            return Err(JobTableError::InvalidState);
        }
        if state == JobState::Foreground {
            if let Some(current) = self.foreground_pid().filter(|&fg| fg != pid) {
                return Err(JobTableError::ForegroundBusy(current));
            }
        }
        let job = self
            .slots
            .iter_mut()
            .flatten()
            .find(|job| job.pid == pid)
            .ok_or(JobTableError::NoSuchJob(pid))?;
        job.state = state;
        Ok(())
    }

    /// Registered jobs ordered by jid.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs().copied().collect();
        jobs.sort_by_key(|job| job.jid);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn jobs(&self) -> impl Iterator<Item = &Job> + '_ {
        self.slots.iter().flatten()
    }

    fn smallest_free_jid(&self) -> Jid {
        (1..)
            .find(|&jid| self.find_by_jid(jid).is_none())
            .unwrap_or(1)
    }
}
