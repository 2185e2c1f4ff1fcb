//! Windows I/O completion port backend.
//!
//! Completion ports need no separate wake source: a packet posted with a
//! null `OVERLAPPED` pointer wakes one waiter and carries no payload.

use super::{Disarm, Driver, Interest};
use crate::error::{Error, Result};
use crate::handle::{Handle, RawHandle};

use std::io;
use std::ptr;

use windows_sys::Win32::Foundation::{ERROR_ABANDONED_WAIT_0, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::IO::{
    CreateIoCompletionPort, GetQueuedCompletionStatusEx, OVERLAPPED, OVERLAPPED_ENTRY,
    PostQueuedCompletionStatus,
};

const INFINITE: u32 = u32::MAX;

pub(crate) struct IocpPoller {
    port: Handle,
}

impl IocpPoller {
    /// Associates `handle` with the port so its overlapped operations
    /// complete here.
    pub(crate) fn associate(&self, handle: RawHandle) -> io::Result<()> {
        let port = unsafe { CreateIoCompletionPort(handle, self.port.value(), 0, 0) };
        if port.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn post(&self, payload: *const ()) -> io::Result<()> {
        let posted = unsafe {
            PostQueuedCompletionStatus(self.port.value(), 0, 0, payload as *mut OVERLAPPED)
        };
        if posted == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Driver for IocpPoller {
    type Entry = OVERLAPPED_ENTRY;

    fn open() -> Result<Self> {
        let port = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, ptr::null_mut(), 0, 0) };
        if port.is_null() {
            return Err(Error::last_os_error("CreateIoCompletionPort"));
        }

        Ok(Self {
            port: Handle::new(port),
        })
    }

    fn wait(&self, entries: &mut Vec<OVERLAPPED_ENTRY>) -> io::Result<()> {
        entries.clear();

        let mut count = 0u32;
        let dequeued = unsafe {
            GetQueuedCompletionStatusEx(
                self.port.value(),
                entries.as_mut_ptr(),
                entries.capacity() as u32,
                &mut count,
                INFINITE,
                0,
            )
        };

        if dequeued == 0 {
            let error = io::Error::last_os_error();
            if error.raw_os_error() == Some(ERROR_ABANDONED_WAIT_0 as i32) {
                return Err(io::ErrorKind::Interrupted.into());
            }
            return Err(error);
        }

        unsafe {
            entries.set_len(count as usize);
        }

        Ok(())
    }

    fn completion(entry: &OVERLAPPED_ENTRY) -> (*const (), usize) {
        (
            entry.lpOverlapped as *const (),
            entry.dwNumberOfBytesTransferred as usize,
        )
    }

    fn interrupt(&self) {
        let _ = self.post(ptr::null());
    }

    fn arm(&self, interest: Interest, payload: *const ()) -> io::Result<()> {
        match interest {
            Interest::Posted => self.post(payload),
            // Submitted by the caller with the registration's OVERLAPPED.
            Interest::Overlapped => Ok(()),
        }
    }

    fn disarm(&self, _interest: Interest, _payload: *const ()) -> Disarm {
        // Packets cannot be withdrawn; the dispatcher drops them on arrival.
        Disarm::Pending
    }
}
