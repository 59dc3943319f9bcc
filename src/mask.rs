//! Signal masking that makes job table updates atomic with respect to the
//! shell's own signal handlers.
//!
//! The shell runs on one thread. The only code that can interleave with the
//! read-eval loop is a signal handler, so blocking signals around a critical
//! section is enough to exclude it. Guards always restore the mask that was in
//! effect before they were taken, which keeps nested sections correct.

use crate::sio;
use nix::sys::signal::{SigSet, SigmaskHow, Signal, sigprocmask};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Blocks a set of signals until dropped, then restores the previous mask.
#[must_use = "the signals are unblocked as soon as the guard is dropped"]
pub struct MaskGuard {
    prev: SigSet,
    armed: bool,
}

impl MaskGuard {
    /// Adds `set` to the blocked signals of the calling thread.
    pub fn block(set: &SigSet) -> nix::Result<Self> {
        let mut prev = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(set), Some(&mut prev))?;
        Ok(Self { prev, armed: true })
    }

    pub fn block_all() -> nix::Result<Self> {
        Self::block(&SigSet::all())
    }

    pub fn block_one(signal: Signal) -> nix::Result<Self> {
        let mut set = SigSet::empty();
        set.add(signal);
        Self::block(&set)
    }

    /// The mask that was in effect when the guard was taken.
    pub fn previous(&self) -> &SigSet {
        &self.prev
    }

    /// Restores the previous mask now, reporting a failure to the caller.
    pub fn restore(mut self) -> nix::Result<()> {
        self.armed = false;
        sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.prev), None)
    }
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.prev), None) {
                sio::die("sigprocmask error", err);
            }
        }
    }
}

/// A value shared between the read-eval loop and signal handlers.
///
/// The only way in is [`SignalCell::with`], which runs the closure with every
/// signal blocked. Entering the same cell twice is a bug and aborts the shell.
pub struct SignalCell<T> {
    value: UnsafeCell<T>,
    held: AtomicBool,
}

// SAFETY: the value is only reachable through `with`, which excludes handlers by
// masking and rejects nested entry, so no two `&mut T` can exist at once on the
// shell's single thread.
unsafe impl<T: Send> Sync for SignalCell<T> {}

impl<T> SignalCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            held: AtomicBool::new(false),
        }
    }

    /// Runs `f` on the value with all signals blocked and returns its result.
    ///
    /// Safe to call from a signal handler as long as `f` is.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = match MaskGuard::block_all() {
            Ok(guard) => guard,
            Err(err) => sio::die("sigprocmask error", err),
        };
        if self.held.swap(true, Ordering::Acquire) {
            sio::puts(b"job table entered twice\n");
            sio::exit(1);
        }
        // SAFETY: `held` was false and signals are blocked, so this is the only
        // live reference to the value.
        let result = f(unsafe { &mut *self.value.get() });
        self.held.store(false, Ordering::Release);
        drop(guard);
        result
    }
}
