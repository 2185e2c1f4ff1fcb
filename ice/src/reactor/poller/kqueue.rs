//! `kqueue` backend for macOS and the BSDs.
//!
//! The wake source is an `EVFILT_USER` event with identifier 0, added with
//! `EV_CLEAR` and fired with `NOTE_TRIGGER`. Registrations are added with
//! `EV_ONESHOT`, so the kernel drops them once they fire.

use super::{Disarm, Driver, Interest, cvt};
use crate::error::{Error, Result};
use crate::handle::Handle;

use libc::{
    EV_ADD, EV_CLEAR, EV_DELETE, EV_ONESHOT, EVFILT_READ, EVFILT_USER, EVFILT_WRITE, NOTE_TRIGGER,
};
use std::io;
use std::mem;
use std::ptr;

/// Identifier of the wake event. Registrations use their payload address,
/// which is never zero.
const WAKE_IDENT: libc::uintptr_t = 0;

pub(crate) struct KqueuePoller {
    kqueue: Handle,
}

fn change(
    ident: libc::uintptr_t,
    filter: i16,
    flags: u16,
    fflags: u32,
    udata: *const (),
) -> libc::kevent {
    let mut event: libc::kevent = unsafe { mem::zeroed() };
    event.ident = ident;
    event.filter = filter as _;
    event.flags = flags as _;
    event.fflags = fflags as _;
    event.udata = udata as *mut _;
    event
}

impl KqueuePoller {
    fn submit(&self, event: &libc::kevent) -> io::Result<()> {
        cvt(unsafe {
            libc::kevent(
                self.kqueue.value(),
                event,
                1,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        })?;
        Ok(())
    }

    fn describe(interest: Interest, payload: *const ()) -> (libc::uintptr_t, i16, u32) {
        match interest {
            Interest::Readable(fd) => (fd as libc::uintptr_t, EVFILT_READ as i16, 0),
            Interest::Writable(fd) => (fd as libc::uintptr_t, EVFILT_WRITE as i16, 0),
            Interest::Notify => (payload as libc::uintptr_t, EVFILT_USER as i16, NOTE_TRIGGER),
        }
    }
}

impl Driver for KqueuePoller {
    type Entry = libc::kevent;

    fn open() -> Result<Self> {
        let kqueue = Handle::new(
            cvt(unsafe { libc::kqueue() }).map_err(|e| Error::system("kqueue", e))?,
        );

        let poller = Self { kqueue };
        let wake = change(
            WAKE_IDENT,
            EVFILT_USER as i16,
            (EV_ADD | EV_CLEAR) as u16,
            0,
            ptr::null(),
        );
        poller
            .submit(&wake)
            .map_err(|e| Error::system("kevent", e))?;

        Ok(poller)
    }

    fn wait(&self, entries: &mut Vec<libc::kevent>) -> io::Result<()> {
        entries.clear();

        let count = cvt(unsafe {
            libc::kevent(
                self.kqueue.value(),
                ptr::null(),
                0,
                entries.as_mut_ptr(),
                entries.capacity() as _,
                ptr::null(),
            )
        })?;

        unsafe {
            entries.set_len(count as usize);
        }

        Ok(())
    }

    fn completion(entry: &libc::kevent) -> (*const (), usize) {
        (entry.udata as *const (), 0)
    }

    fn interrupt(&self) {
        let wake = change(WAKE_IDENT, EVFILT_USER as i16, 0, NOTE_TRIGGER, ptr::null());
        let _ = self.submit(&wake);
    }

    fn arm(&self, interest: Interest, payload: *const ()) -> io::Result<()> {
        let (ident, filter, fflags) = Self::describe(interest, payload);
        let event = change(ident, filter, (EV_ADD | EV_ONESHOT) as u16, fflags, payload);

        self.submit(&event)
    }

    fn disarm(&self, interest: Interest, payload: *const ()) -> Disarm {
        // `Notify` registrations fire on submission and cannot be withdrawn.
        if let Interest::Notify = interest {
            return Disarm::Pending;
        }

        let (ident, filter, _) = Self::describe(interest, payload);
        let event = change(ident, filter, EV_DELETE as u16, 0, ptr::null());

        // A one-shot knote is removed as it is delivered, so deleting it
        // only succeeds if nothing was handed out.
        match self.submit(&event) {
            Ok(()) => Disarm::Withdrawn,
            Err(_) => Disarm::Pending,
        }
    }
}
