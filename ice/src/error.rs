//! Error types shared by the reactor and the computation primitives.

use std::any::Any;
use std::io;

use thiserror::Error;

/// Errors surfaced by `ice`.
///
/// OS failures carry the name of the operation that failed together with
/// the underlying [`io::Error`]. Failures raised by user code inside an
/// [`Async`](crate::Async) or a [`Generator`](crate::Generator) are captured
/// and handed to whoever consumes the result.
#[derive(Debug, Error)]
pub enum Error {
    /// An OS call failed.
    #[error("{operation}: {source}")]
    System {
        /// Name of the failing operation (`epoll_create1`, `run`, ...).
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// The result of a computation was requested from a handle that was
    /// never bound, or whose result was already taken.
    #[error("broken promise")]
    BrokenPromise,

    /// User code panicked while the computation was running.
    #[error("computation panicked: {0}")]
    Panicked(String),

    /// The execution context was stopped before the computation finished.
    #[error("context stopped before the computation finished")]
    Stopped,

    /// An I/O error raised by user code.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn system(operation: &'static str, source: io::Error) -> Self {
        Self::System { operation, source }
    }

    /// Captures `errno` / `GetLastError` for `operation`.
    #[cfg_attr(not(windows), allow(dead_code))]
    pub(crate) fn last_os_error(operation: &'static str) -> Self {
        Self::system(operation, io::Error::last_os_error())
    }

    /// Turns a panic payload into [`Error::Panicked`].
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(payload.as_ref()))
    }

    /// Returns the OS error code, if this error wraps one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::System { source, .. } | Self::Io(source) => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
