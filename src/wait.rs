//! The foreground wait gate.

use crate::jobs::JobTable;
use crate::mask::{MaskGuard, SignalCell};
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::SigSet;
use nix::unistd::Pid;
use tracing::debug;

/// Blocks until `pid` is no longer the foreground job.
///
/// The check runs with every signal blocked and the wait is a `sigsuspend` on the
/// caller's previous mask, so a handler that clears the foreground between the
/// check and the wait still wakes us up.
pub fn wait_for_foreground(jobs: &SignalCell<JobTable>, pid: Pid) -> Result<()> {
    let guard = MaskGuard::block_all().context("sigprocmask error")?;
    debug!(pid = pid.as_raw(), "waiting for foreground job");
    while jobs.with(|table| table.foreground_pid()) == Some(pid) {
        suspend(guard.previous()).context("sigsuspend error")?;
    }
    guard.restore().context("sigprocmask error")?;
    debug!(pid = pid.as_raw(), "foreground released");
    Ok(())
}

/// Replaces the signal mask with `mask` until a handler has run.
fn suspend(mask: &SigSet) -> nix::Result<()> {
    // SAFETY: sigsuspend only reads the set, which outlives the call.
    let res = unsafe { libc::sigsuspend(mask.as_ref()) };
    match Errno::result(res) {
        Ok(_) | Err(Errno::EINTR) => Ok(()),
        Err(err) => Err(err),
    }
}
