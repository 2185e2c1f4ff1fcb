//! Linux `epoll` backend.
//!
//! The wake source is an `eventfd` registered with an empty one-shot
//! interest. Interrupting re-arms it for `EPOLLOUT`; an eventfd is always
//! writable, so exactly one `epoll_wait` returns with a null payload.

use super::{Disarm, Driver, Interest, cvt};
use crate::error::{Error, Result};
use crate::handle::Handle;

use libc::{
    EFD_CLOEXEC, EFD_NONBLOCK, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD,
    EPOLLIN, EPOLLONESHOT, EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait, eventfd,
};
use std::io;
use std::ptr;

/// `epoll` instance plus the eventfd used to interrupt it.
pub(crate) struct EpollPoller {
    epoll: Handle,
    wake: Handle,
}

impl Driver for EpollPoller {
    type Entry = epoll_event;

    fn open() -> Result<Self> {
        let epoll = Handle::new(
            cvt(unsafe { epoll_create1(EPOLL_CLOEXEC) })
                .map_err(|e| Error::system("epoll_create1", e))?,
        );

        let wake = Handle::new(
            cvt(unsafe { eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) })
                .map_err(|e| Error::system("eventfd", e))?,
        );

        let mut event = epoll_event {
            events: EPOLLONESHOT as u32,
            u64: 0,
        };

        cvt(unsafe { epoll_ctl(epoll.value(), EPOLL_CTL_ADD, wake.value(), &mut event) })
            .map_err(|e| Error::system("epoll_ctl", e))?;

        Ok(Self { epoll, wake })
    }

    fn wait(&self, entries: &mut Vec<epoll_event>) -> io::Result<()> {
        entries.clear();

        let count = cvt(unsafe {
            epoll_wait(
                self.epoll.value(),
                entries.as_mut_ptr(),
                entries.capacity() as i32,
                -1,
            )
        })?;

        unsafe {
            entries.set_len(count as usize);
        }

        Ok(())
    }

    fn completion(entry: &epoll_event) -> (*const (), usize) {
        (entry.u64 as usize as *const (), 0)
    }

    fn interrupt(&self) {
        let mut event = epoll_event {
            events: (EPOLLOUT | EPOLLONESHOT) as u32,
            u64: 0,
        };

        unsafe {
            epoll_ctl(
                self.epoll.value(),
                EPOLL_CTL_MOD,
                self.wake.value(),
                &mut event,
            );
        }
    }

    fn arm(&self, interest: Interest, payload: *const ()) -> io::Result<()> {
        let (fd, flags) = match interest {
            Interest::Readable(fd) => (fd, EPOLLIN),
            Interest::Writable(fd) => (fd, EPOLLOUT),
        };

        let mut event = epoll_event {
            events: (flags | EPOLLONESHOT) as u32,
            u64: payload as usize as u64,
        };

        cvt(unsafe { epoll_ctl(self.epoll.value(), EPOLL_CTL_ADD, fd, &mut event) })?;
        Ok(())
    }

    fn disarm(&self, interest: Interest, _payload: *const ()) -> Disarm {
        // A failed delete means the descriptor is already gone, which also
        // removed it from the interest list.
        let _ = self.settle(interest);
        Disarm::Detached
    }

    fn settle(&self, interest: Interest) -> io::Result<()> {
        let (Interest::Readable(fd) | Interest::Writable(fd)) = interest;

        cvt(unsafe { epoll_ctl(self.epoll.value(), EPOLL_CTL_DEL, fd, ptr::null_mut()) })?;
        Ok(())
    }
}
