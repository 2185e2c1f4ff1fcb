//! Owned OS handles.

use std::fmt;
use std::mem;

/// The raw platform value wrapped by [`Handle`].
#[cfg(unix)]
pub type RawHandle = std::os::fd::RawFd;

/// The raw platform value wrapped by [`Handle`].
#[cfg(windows)]
pub type RawHandle = windows_sys::Win32::Foundation::HANDLE;

#[cfg(unix)]
const INVALID: RawHandle = -1;

#[cfg(windows)]
const INVALID: RawHandle = std::ptr::null_mut();

#[cfg(unix)]
fn close_raw(value: RawHandle) {
    unsafe {
        libc::close(value);
    }
}

#[cfg(windows)]
fn close_raw(value: RawHandle) {
    unsafe {
        windows_sys::Win32::Foundation::CloseHandle(value);
    }
}

/// A move-only owner of an OS handle.
///
/// The handle is closed with its close function when the owner is dropped,
/// reset or explicitly closed. The invalid sentinel is `-1` on unix and a
/// null handle on Windows.
pub struct Handle {
    value: RawHandle,
    close: fn(RawHandle),
}

// Safety: the wrapped value is an integer (unix) or an opaque kernel handle
// (Windows); neither is tied to the thread that created it.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Handle {
    /// Takes ownership of `value`, closing it with the platform default.
    pub fn new(value: RawHandle) -> Self {
        Self::with_close(value, close_raw)
    }

    /// Takes ownership of `value`, closing it with `close`.
    pub fn with_close(value: RawHandle, close: fn(RawHandle)) -> Self {
        Self { value, close }
    }

    /// Returns a handle that owns nothing.
    pub fn invalid() -> Self {
        Self::new(INVALID)
    }

    /// Returns `true` if a live OS handle is owned.
    pub fn valid(&self) -> bool {
        self.value != INVALID
    }

    /// Returns the raw value without giving up ownership.
    pub fn value(&self) -> RawHandle {
        self.value
    }

    /// Gives up ownership and returns the raw value.
    pub fn release(&mut self) -> RawHandle {
        mem::replace(&mut self.value, INVALID)
    }

    /// Closes the owned handle and takes ownership of `value`.
    pub fn reset(&mut self, value: RawHandle) {
        let previous = mem::replace(&mut self.value, value);
        if previous != INVALID {
            (self.close)(previous);
        }
    }

    /// Closes the owned handle, leaving this owner invalid.
    pub fn close(&mut self) {
        self.reset(INVALID);
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.value).finish()
    }
}
