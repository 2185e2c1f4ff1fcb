use super::event::{self, Event, Registration};
use super::poller::{Driver, Interest, Poller};
use crate::error::{Error, Result};

#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::handle::Handle;

use std::future::Future;
use std::io;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{self, Poll};

/// Bit 0 of the state word.
const STOP_REQUESTED: u32 = 1;

/// Each running thread adds this to the state word.
const THREAD_STEP: u32 = 2;

/// An execution context: one OS reactor plus its dispatch loop.
///
/// Any number of threads may call [`run`](Self::run) on the same context at
/// once. Every completion the reactor delivers resumes the computation that
/// waits on it, on the thread that dequeued it.
///
/// The context must not be dropped while a thread is still running it.
///
/// # Examples
///
/// ```rust,ignore
/// let context = Arc::new(Context::new()?);
///
/// let runner = {
///     let context = context.clone();
///     std::thread::spawn(move || context.run(64))
/// };
///
/// context.stop();
/// runner.join().unwrap()?;
/// ```
pub struct Context {
    /// Stop flag in bit 0, running threads times `THREAD_STEP` above it.
    state: AtomicU32,
    driver: Poller,
    /// Cancelled registrations whose reactor reference is released once no
    /// thread is running.
    retired: Mutex<Vec<Arc<Registration>>>,
}

/// Registers the calling thread as a runner for as long as it lives.
struct Runner<'a> {
    context: &'a Context,
}

impl<'a> Runner<'a> {
    fn enter(context: &'a Context) -> Self {
        let state = context.state.fetch_add(THREAD_STEP, Ordering::SeqCst);
        tracing::trace!(threads = state / THREAD_STEP + 1, "runner entered");

        Self { context }
    }
}

impl Drop for Runner<'_> {
    fn drop(&mut self) {
        let state = self.context.state.fetch_sub(THREAD_STEP, Ordering::SeqCst);
        let stop_requested = state & STOP_REQUESTED != 0;
        let threads = state / THREAD_STEP;

        tracing::trace!(threads = threads - 1, stop_requested, "runner left");

        if threads == 1 {
            self.context.collect();
        }

        // Pass the stop on to the next runner still blocked in the reactor.
        if stop_requested && threads > 1 {
            self.context.interrupt();
        }
    }
}

impl Context {
    /// Opens the OS reactor and its wake source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::System`] naming the OS call that failed.
    pub fn new() -> Result<Self> {
        let driver = Poller::open()?;
        tracing::debug!("reactor opened");

        Ok(Self {
            state: AtomicU32::new(0),
            driver,
            retired: Mutex::new(Vec::new()),
        })
    }

    /// Runs the dispatch loop on the calling thread until the context is
    /// stopped.
    ///
    /// Each wait dequeues up to `buffer_size` completions. Signal
    /// interruptions are retried.
    ///
    /// # Errors
    ///
    /// A failed reactor wait ends the loop and is returned once the thread
    /// has left the context, as `Error::System { operation: "run", .. }`.
    pub fn run(&self, buffer_size: usize) -> Result<()> {
        let mut entries = Vec::with_capacity(buffer_size.max(1));
        let runner = Runner::enter(self);
        let mut failure = None;

        while self.state.load(Ordering::Acquire) & STOP_REQUESTED == 0 {
            match self.driver.wait(&mut entries) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }

            for entry in &entries {
                let (payload, transferred) = Poller::completion(entry);

                // Null payloads are wake-ups.
                if !payload.is_null() {
                    unsafe { event::dispatch(&self.driver, payload, transferred) };
                }
            }
        }

        drop(runner);

        match failure {
            Some(error) => {
                tracing::debug!(%error, "reactor wait failed");
                Err(Error::system("run", error))
            }
            None => Ok(()),
        }
    }

    /// Wakes one thread blocked in [`run`](Self::run).
    ///
    /// With no thread running, the wake-up stays pending and is absorbed by
    /// the next wait.
    pub fn interrupt(&self) {
        self.driver.interrupt();
    }

    /// Requests every running thread to leave [`run`](Self::run).
    ///
    /// Returns `true` if no thread was running at the time of the call.
    pub fn stop(&self) -> bool {
        let state = self.state.fetch_or(STOP_REQUESTED, Ordering::Release);
        let stop_requested = state & STOP_REQUESTED != 0;
        let threads = state / THREAD_STEP;

        if !stop_requested && threads > 0 {
            self.interrupt();
        }

        tracing::debug!(threads, "stop requested");
        threads == 0
    }

    /// Clears a previous stop so the context can run again.
    ///
    /// The caller must know a stop was requested.
    pub fn reset(&self) {
        let state = self.state.fetch_and(!STOP_REQUESTED, Ordering::Release);
        debug_assert!(state & STOP_REQUESTED != 0, "reset without a pending stop");
    }

    /// Returns `true` while a stop is pending.
    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) & STOP_REQUESTED != 0
    }

    /// Returns the number of threads currently inside [`run`](Self::run).
    pub fn threads(&self) -> usize {
        (self.state.load(Ordering::SeqCst) / THREAD_STEP) as usize
    }

    /// Yields to the reactor.
    ///
    /// The returned future posts a no-op event and resolves once a thread
    /// running this context has dispatched it. If the no-op event cannot
    /// be created, it resolves immediately.
    pub fn schedule(&self) -> Schedule<'_> {
        Schedule::new(self)
    }

    /// Associates `handle` with the completion port so that overlapped
    /// operations on it complete through this context.
    #[cfg(windows)]
    pub fn associate(&self, handle: crate::handle::RawHandle) -> Result<()> {
        self.driver
            .associate(handle)
            .map_err(|e| Error::system("CreateIoCompletionPort", e))
    }

    pub(crate) fn driver(&self) -> &Poller {
        &self.driver
    }

    /// Takes over a cancelled registration that a running thread may still
    /// be about to dispatch.
    pub(crate) fn retire(&self, registration: Arc<Registration>) {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(registration);

        if self.threads() == 0 {
            self.collect();
        }
    }

    /// Releases the retired registrations if no thread is running.
    fn collect(&self) {
        let retired = mem::take(
            &mut *self
                .retired
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if retired.is_empty() {
            return;
        }

        // A runner that entered before the registrations were withdrawn may
        // still hold one of them.
        if self.threads() != 0 {
            self.retired
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(retired);
            return;
        }

        tracing::trace!(count = retired.len(), "retired registrations released");
        retired.into_iter().for_each(event::reclaim);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let state = self.state.fetch_or(STOP_REQUESTED, Ordering::Release);
        debug_assert_eq!(state / THREAD_STEP, 0, "context dropped while running");

        let retired = mem::take(self.retired.get_mut().unwrap_or_else(PoisonError::into_inner));
        retired.into_iter().for_each(event::reclaim);
    }
}

/// Future returned by [`Context::schedule`].
pub struct Schedule<'a> {
    // Declared before the eventfd so the registration goes first.
    event: Option<Event<'a>>,
    #[cfg(any(target_os = "linux", target_os = "android"))]
    _eventfd: Handle,
}

impl<'a> Schedule<'a> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn new(context: &'a Context) -> Self {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Self {
                event: None,
                _eventfd: Handle::invalid(),
            };
        }

        Self {
            event: Some(Event::new(context, Interest::Writable(fd))),
            _eventfd: Handle::new(fd),
        }
    }

    #[cfg(windows)]
    fn new(context: &'a Context) -> Self {
        Self {
            event: Some(Event::new(context, Interest::Posted)),
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
    fn new(context: &'a Context) -> Self {
        Self {
            event: Some(Event::new(context, Interest::Notify)),
        }
    }
}

impl Future for Schedule<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        let Some(event) = this.event.as_mut() else {
            return Poll::Ready(());
        };

        match Pin::new(event).poll(cx) {
            Poll::Ready(_) => {
                this.event = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
