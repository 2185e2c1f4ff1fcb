//! Platform-specific reactor backends.
//!
//! Every backend implements [`Driver`], the only surface the execution
//! context and reactor events depend on:
//! - open the reactor together with its wake source,
//! - block until up to N completions are available,
//! - wake exactly one blocked waiter,
//! - arm and disarm one single-shot registration, reporting who owns the
//!   payload of a disarmed one.
//!
//! The concrete backend is selected at compile time: `epoll` on Linux,
//! `kqueue` on macOS and the BSDs, I/O completion ports on Windows.

use crate::error::Result;

use std::io;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
mod kqueue;

#[cfg(windows)]
mod iocp;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub(crate) type Poller = kqueue::KqueuePoller;

#[cfg(windows)]
pub(crate) type Poller = iocp::IocpPoller;

/// What a single-shot registration waits for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Interest {
    /// The descriptor becomes readable.
    #[cfg(unix)]
    Readable(std::os::fd::RawFd),

    /// The descriptor becomes writable.
    #[cfg(unix)]
    Writable(std::os::fd::RawFd),

    /// A user event that triggers as soon as it is registered.
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    Notify,

    /// A completion packet posted straight to the port.
    #[cfg(windows)]
    Posted,

    /// An overlapped operation submitted by the caller.
    #[cfg(windows)]
    Overlapped,
}

/// What became of a registration withdrawn before it fired.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Disarm {
    /// The reactor will never hand the payload out; its reference belongs
    /// to the caller again.
    Withdrawn,
    /// No new delivery can happen, but an entry already dequeued by a
    /// running thread may still carry the payload.
    Detached,
    /// The payload is still delivered and the dispatcher releases it.
    Pending,
}

/// The reactor surface shared by all backends.
///
/// Payloads are opaque non-null pointers handed back verbatim by
/// [`completion`](Driver::completion). Entries with a null payload are
/// wake-ups and carry nothing to dispatch.
pub(crate) trait Driver: Sized + Send + Sync {
    /// Native completion record filled in by [`wait`](Driver::wait).
    type Entry: Copy;

    /// Opens the reactor and its wake source.
    fn open() -> Result<Self>;

    /// Blocks until at least one entry is available, filling `entries` up
    /// to its capacity.
    ///
    /// Signal interruptions surface as [`io::ErrorKind::Interrupted`].
    fn wait(&self, entries: &mut Vec<Self::Entry>) -> io::Result<()>;

    /// Returns the payload and the transferred byte count of `entry`.
    fn completion(entry: &Self::Entry) -> (*const (), usize);

    /// Wakes one thread blocked in [`wait`](Driver::wait).
    fn interrupt(&self);

    /// Registers a one-shot wait delivering `payload`.
    fn arm(&self, interest: Interest, payload: *const ()) -> io::Result<()>;

    /// Removes a registration that has not fired yet.
    fn disarm(&self, interest: Interest, payload: *const ()) -> Disarm;

    /// Tidies up after a registration fired.
    fn settle(&self, _interest: Interest) -> io::Result<()> {
        Ok(())
    }
}

/// Maps a `-1` return code to the last OS error.
#[cfg(unix)]
pub(crate) fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}
