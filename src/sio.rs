//! Output that is safe to produce from a signal handler or a freshly forked child.
//!
//! Messages are formatted into a fixed stack buffer and written straight to file
//! descriptor 1, bypassing the locked and buffered `std::io::Stdout`.

use nix::errno::Errno;
use nix::libc;
use nix::unistd;
use std::fmt::{self, Write};
use std::os::fd::BorrowedFd;

const BUF_SIZE: usize = 256;

/// Stack buffer implementing `fmt::Write`; output beyond its capacity is dropped.
pub(crate) struct SigBuf {
    buf: [u8; BUF_SIZE],
    len: usize,
}

impl SigBuf {
    pub(crate) const fn new() -> Self {
        Self {
            buf: [0; BUF_SIZE],
            len: 0,
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Write for SigBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = s.len().min(BUF_SIZE - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Writes raw bytes to stdout, retrying short writes and `EINTR`.
pub(crate) fn puts(bytes: &[u8]) {
    // SAFETY: fd 1 stays open for the lifetime of the process.
    let stdout = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };
    let mut rest = bytes;
    while !rest.is_empty() {
        match unistd::write(stdout, rest) {
            Ok(0) => break,
            Ok(n) => rest = &rest[n..],
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
}

pub(crate) fn print(args: fmt::Arguments<'_>) {
    let mut buf = SigBuf::new();
    let _ = buf.write_fmt(args);
    puts(buf.as_bytes());
}

/// Reports a failed system call and terminates the process without unwinding.
pub(crate) fn die(context: &str, err: Errno) -> ! {
    print(format_args!("{context}: {}\n", err.desc()));
    exit(1)
}

/// `_exit(2)`: ends the process at once, skipping destructors and stdio flushing.
pub(crate) fn exit(code: i32) -> ! {
    // SAFETY: `_exit` is async-signal-safe and never returns.
    unsafe { libc::_exit(code) }
}
