use super::context::Context;
use super::poller::{Disarm, Driver, Interest, Poller};

use futures_util::task::AtomicWaker;

use std::cell::UnsafeCell;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{self, Poll};

#[cfg(windows)]
use windows_sys::Win32::System::IO::OVERLAPPED;

/// Not yet handed to the reactor.
const IDLE: u8 = 0;
/// Registered; the reactor owns one reference to the record.
const ARMED: u8 = 1;
/// The dispatcher is storing the result.
const FIRING: u8 = 2;
/// The result is available.
const FIRED: u8 = 3;
/// The waiting side went away before the reactor fired.
const CANCELLED: u8 = 4;
/// A cancelled registration was dispatched anyway and the dispatcher
/// released the reactor's reference.
const DISCARDED: u8 = 5;

/// The record the reactor points at.
///
/// On Windows the `OVERLAPPED` comes first so the pointer found in a
/// completion packet is also a pointer to the record.
#[repr(C)]
pub(crate) struct Registration {
    #[cfg(windows)]
    overlapped: UnsafeCell<OVERLAPPED>,
    state: AtomicU8,
    waker: AtomicWaker,
    interest: Interest,
    result: UnsafeCell<Option<io::Result<usize>>>,
}

// Safety: `result` is written by the dispatcher between FIRING and FIRED
// and read by the waiting side only after it observes FIRED.
unsafe impl Send for Registration {}
unsafe impl Sync for Registration {}

impl Registration {
    fn new(interest: Interest) -> Self {
        Self {
            #[cfg(windows)]
            overlapped: UnsafeCell::new(unsafe { std::mem::zeroed() }),
            state: AtomicU8::new(IDLE),
            waker: AtomicWaker::new(),
            interest,
            result: UnsafeCell::new(None),
        }
    }
}

/// Completes the registration behind `payload`.
///
/// # Safety
///
/// `payload` must come from a successful arm of an [`Event`], and each
/// payload may be dispatched once.
pub(crate) unsafe fn dispatch(driver: &Poller, payload: *const (), transferred: usize) {
    let registration = unsafe { Arc::from_raw(payload as *const Registration) };

    if let Err(state) = registration
        .state
        .compare_exchange(ARMED, FIRING, Ordering::Acquire, Ordering::Acquire)
    {
        debug_assert_eq!(state, CANCELLED);
        registration.state.store(DISCARDED, Ordering::Release);
        return;
    }

    let result = driver
        .settle(registration.interest)
        .map(|()| transferred);

    unsafe {
        *registration.result.get() = Some(result);
    }
    registration.state.store(FIRED, Ordering::Release);
    registration.waker.wake();
}

/// Releases the reactor's reference to a cancelled registration.
///
/// Must only be called once no running thread can still hold an entry
/// carrying it. A registration the dispatcher already discarded is left
/// alone.
pub(crate) fn reclaim(registration: Arc<Registration>) {
    if registration.state.load(Ordering::Acquire) == CANCELLED {
        unsafe {
            drop(Arc::from_raw(Arc::as_ptr(&registration)));
        }
    }
}

/// A single-shot wait on the reactor.
///
/// The event registers itself the first time it is polled and resolves
/// once the execution context dispatches it. The output is the number of
/// bytes transferred on completion-port platforms and `0` elsewhere.
/// If the registration itself fails, the event resolves immediately with
/// that OS error.
///
/// Dropping an event that has not fired withdraws the registration.
///
/// # Examples
///
/// ```rust,ignore
/// let context = ice::current().expect("inside a runtime");
/// Event::readable(&context, fd).await?;
/// ```
pub struct Event<'a> {
    context: &'a Context,
    registration: Arc<Registration>,
    #[cfg(windows)]
    submit: Option<Box<dyn FnOnce(*mut OVERLAPPED) -> io::Result<()> + Send + 'a>>,
}

impl<'a> Event<'a> {
    pub(crate) fn new(context: &'a Context, interest: Interest) -> Self {
        Self {
            context,
            registration: Arc::new(Registration::new(interest)),
            #[cfg(windows)]
            submit: None,
        }
    }

    /// Waits until `fd` becomes readable.
    #[cfg(unix)]
    pub fn readable(context: &'a Context, fd: std::os::fd::RawFd) -> Self {
        Self::new(context, Interest::Readable(fd))
    }

    /// Waits until `fd` becomes writable.
    #[cfg(unix)]
    pub fn writable(context: &'a Context, fd: std::os::fd::RawFd) -> Self {
        Self::new(context, Interest::Writable(fd))
    }

    /// Waits for an overlapped operation started by `submit`.
    ///
    /// `submit` receives the `OVERLAPPED` to pass to the operation. It must
    /// return `Ok(())` whenever a completion packet will be queued, which
    /// includes `ERROR_IO_PENDING`. The handle must have been associated
    /// with the context through [`Context::associate`]. The buffers used by
    /// the operation must outlive the completion even if the event is
    /// dropped early.
    #[cfg(windows)]
    pub fn overlapped<F>(context: &'a Context, submit: F) -> Self
    where
        F: FnOnce(*mut OVERLAPPED) -> io::Result<()> + Send + 'a,
    {
        let mut event = Self::new(context, Interest::Overlapped);
        event.submit = Some(Box::new(submit));
        event
    }

    /// Hands one reference to the reactor.
    fn arm(&mut self) -> io::Result<()> {
        let payload = Arc::into_raw(self.registration.clone()) as *const ();

        #[cfg(windows)]
        let armed = match self.submit.take() {
            Some(submit) => submit(payload as *mut OVERLAPPED),
            None => self
                .context
                .driver()
                .arm(self.registration.interest, payload),
        };

        #[cfg(not(windows))]
        let armed = self
            .context
            .driver()
            .arm(self.registration.interest, payload);

        if armed.is_err() {
            // The reactor never saw the payload.
            unsafe {
                drop(Arc::from_raw(payload as *const Registration));
            }
        }

        armed
    }

    fn take(&self) -> io::Result<usize> {
        match unsafe { (*self.registration.result.get()).take() } {
            Some(result) => result,
            None => panic!("`Event` polled after completion"),
        }
    }
}

impl Future for Event<'_> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match this.registration.state.load(Ordering::Acquire) {
            IDLE => {
                // The waker must be in place before the reactor can fire.
                this.registration.waker.register(cx.waker());
                this.registration.state.store(ARMED, Ordering::Release);

                if let Err(error) = this.arm() {
                    this.registration.state.store(FIRED, Ordering::Release);
                    return Poll::Ready(Err(error));
                }
            }
            FIRED => return Poll::Ready(this.take()),
            _ => this.registration.waker.register(cx.waker()),
        }

        if this.registration.state.load(Ordering::Acquire) == FIRED {
            Poll::Ready(this.take())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for Event<'_> {
    fn drop(&mut self) {
        if self
            .registration
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let payload = Arc::as_ptr(&self.registration) as *const ();

        match self
            .context
            .driver()
            .disarm(self.registration.interest, payload)
        {
            Disarm::Withdrawn => unsafe {
                drop(Arc::from_raw(payload as *const Registration));
            },
            Disarm::Detached => self.context.retire(self.registration.clone()),
            Disarm::Pending => {}
        }
    }
}
