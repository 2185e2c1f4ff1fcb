use super::core::Core;
use crate::continuation::Continuation;
use crate::diagnostic;
use crate::error::{Error, Result};

use futures_util::FutureExt;

use std::cell::UnsafeCell;
use std::future::Future;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};

/// The computation has not finished and nobody waits on it.
const RUNNING: u8 = 0;
/// A consumer continuation is stored and waits for the result.
const CONSUMER_SUSPENDED: u8 = 1;
/// The consumer gave up on the result.
const CONSUMER_DETACHED: u8 = 2;
/// The result slot is filled.
const FINISHED: u8 = 3;

/// State shared by an [`Async`] handle and the computation behind it.
struct Promise<T> {
    state: AtomicU8,

    /// Resumed once by the completing side if it finds `CONSUMER_SUSPENDED`.
    continuation: UnsafeCell<Continuation>,

    /// Written only on completion of an attached computation, read only
    /// after `FINISHED` is observed.
    result: UnsafeCell<Option<Result<T>>>,
}

unsafe impl<T: Send> Send for Promise<T> {}
unsafe impl<T: Send> Sync for Promise<T> {}

impl<T> Promise<T> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(RUNNING),
            continuation: UnsafeCell::new(Continuation::default()),
            result: UnsafeCell::new(None),
        }
    }

    fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) == FINISHED
    }

    /// Publishes the outcome of the computation.
    fn complete(&self, result: Result<T>) {
        if self.state.load(Ordering::Acquire) == CONSUMER_DETACHED {
            return;
        }

        unsafe {
            *self.result.get() = Some(result);
        }

        match self.state.swap(FINISHED, Ordering::AcqRel) {
            CONSUMER_SUSPENDED => {
                let continuation = unsafe { mem::take(&mut *self.continuation.get()) };
                continuation.resume();
            }
            CONSUMER_DETACHED => {
                // Detached while the result was being written.
                drop(unsafe { (*self.result.get()).take() });
            }
            _ => {}
        }
    }

    /// Stores `continuation` to be resumed on completion.
    ///
    /// Hands the continuation back if the computation finished first.
    fn attach(&self, continuation: Continuation) -> Result<(), Continuation> {
        let mut state = self.state.load(Ordering::Acquire);

        if state == CONSUMER_SUSPENDED {
            // Take back the slot before replacing what is stored in it.
            match self.state.compare_exchange(
                CONSUMER_SUSPENDED,
                RUNNING,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => state = RUNNING,
                Err(current) => state = current,
            }
        }

        if state != RUNNING {
            return Err(continuation);
        }

        unsafe {
            *self.continuation.get() = continuation;
        }

        match self.state.compare_exchange(
            RUNNING,
            CONSUMER_SUSPENDED,
            Ordering::Release,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(_) => Err(unsafe { mem::take(&mut *self.continuation.get()) }),
        }
    }

    fn take(&self) -> Result<T> {
        unsafe { (*self.result.get()).take() }.unwrap_or(Err(Error::BrokenPromise))
    }
}

/// An eagerly started computation producing one value.
///
/// The future passed to [`Async::new`] starts running immediately on the
/// calling thread and keeps going until its first suspension. Awaiting the
/// handle yields the value, or the [`Error`] the computation failed with.
///
/// An `Async` must either be awaited to completion or [detached](Self::detach).
/// Dropping a handle whose computation is still running aborts the process.
///
/// # Examples
///
/// ```rust,ignore
/// let answer = Async::new(async {
///     context.schedule().await;
///     42
/// });
///
/// assert_eq!(answer.await?, 42);
/// ```
pub struct Async<T> {
    promise: Option<Arc<Promise<T>>>,
}

impl<T: Send + 'static> Async<T> {
    /// Starts `future` and returns a handle to its result.
    ///
    /// A panic inside `future` is captured and surfaces as
    /// [`Error::Panicked`] when the handle is awaited.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::start(future.map(Ok))
    }

    /// Starts a fallible `future`; its error is handed to the consumer.
    pub fn try_new<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<Error>,
    {
        Self::start(future.map(|result| result.map_err(Into::into)))
    }

    fn start<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let promise = Arc::new(Promise::new());
        let producer = promise.clone();

        let core = Core::new(async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(Error::from_panic(payload)),
            };
            producer.complete(result);
        });
        core.schedule();

        Self {
            promise: Some(promise),
        }
    }
}

impl<T> Async<T> {
    /// Returns a handle that is bound to no computation.
    ///
    /// Awaiting it fails with [`Error::BrokenPromise`].
    pub fn empty() -> Self {
        Self { promise: None }
    }

    /// Returns `true` once the result is available.
    pub fn is_ready(&self) -> bool {
        self.promise.as_ref().is_some_and(|p| p.is_finished())
    }

    /// Waits for completion without taking the result.
    pub fn when_ready(&self) -> WhenReady<'_, T> {
        WhenReady { handle: self }
    }

    /// Returns a [`Starter`] through which an external scheduler can supply
    /// the continuation to run once the computation finishes.
    pub fn starter(&self) -> Starter<'_, T> {
        Starter { handle: self }
    }

    /// Gives up interest in the result.
    ///
    /// The computation keeps running; its result is dropped when it
    /// finishes. If it already finished, the result is dropped right here.
    pub fn detach(mut self) {
        if let Some(promise) = self.promise.take() {
            promise.state.swap(CONSUMER_DETACHED, Ordering::AcqRel);
        }
    }
}

impl<T> Default for Async<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Future for Async<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(promise) = self.promise.as_ref() else {
            return Poll::Ready(Err(Error::BrokenPromise));
        };

        if !promise.is_finished()
            && promise
                .attach(Continuation::from(cx.waker().clone()))
                .is_ok()
        {
            return Poll::Pending;
        }

        Poll::Ready(promise.take())
    }
}

impl<T> Drop for Async<T> {
    fn drop(&mut self) {
        if self.promise.as_ref().is_some_and(|p| !p.is_finished()) {
            diagnostic::fatal("an attached `Async` was dropped before its computation finished");
        }
    }
}

/// Future returned by [`Async::when_ready`].
pub struct WhenReady<'a, T> {
    handle: &'a Async<T>,
}

impl<T> Future for WhenReady<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.handle.promise.as_ref() {
            Some(promise)
                if !promise.is_finished()
                    && promise
                        .attach(Continuation::from(cx.waker().clone()))
                        .is_ok() =>
            {
                Poll::Pending
            }
            _ => Poll::Ready(()),
        }
    }
}

/// Lets an external scheduler hook a continuation onto an [`Async`].
pub struct Starter<'a, T> {
    handle: &'a Async<T>,
}

impl<T> Starter<'_, T> {
    /// Arranges for `continuation` to be resumed once the computation
    /// finishes.
    ///
    /// If it has already finished, or finishes while the continuation is
    /// being stored, or the handle is empty, the continuation is resumed
    /// right away on the calling thread.
    pub fn start(self, continuation: Continuation) {
        let pending = match self.handle.promise.as_ref() {
            Some(promise) if !promise.is_finished() => promise.attach(continuation),
            _ => Err(continuation),
        };

        if let Err(continuation) = pending {
            continuation.resume();
        }
    }
}
