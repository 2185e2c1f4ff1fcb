use super::context::enter_context;
use super::task::{self, Async};
use crate::continuation::Continuation;
use crate::error::{Error, Result};
use crate::reactor::Context;

use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Poll, Waker};
use std::thread;

/// A configured execution context plus the threads that drive it.
///
/// `Runtime` provides the synchronous entry point into the engine:
/// [`block_on`](Self::block_on) starts a computation, runs the dispatch
/// loop on the configured number of threads and returns once the
/// computation has finished.
///
/// Built through [`Builder`](crate::Builder).
pub struct Runtime {
    pub(crate) context: Arc<Context>,
    pub(crate) threads: usize,
    pub(crate) buffer_size: usize,
}

/// Continuation callback: stops the context `state` points to.
fn stop_context(state: *const ()) {
    let context = unsafe { &*(state as *const Context) };
    context.stop();
}

impl Runtime {
    /// Builds a runtime with the default configuration.
    pub fn new() -> Result<Self> {
        super::builder::Builder::new().build()
    }

    /// Returns the execution context driven by this runtime.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Starts a fire-and-forget task with this runtime's context installed
    /// as the current one.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future + Send + 'static,
        F::Output: task::Report,
    {
        enter_context(&self.context, || task::spawn(future));
    }

    /// Runs `future` to completion, blocking the current thread.
    ///
    /// The calling thread and `threads - 1` scoped helper threads run the
    /// dispatch loop until the computation finishes, then the context is
    /// reset so the runtime can be reused.
    ///
    /// # Errors
    ///
    /// - [`Error::Panicked`] if `future` panicked,
    /// - [`Error::Stopped`] if the context was stopped from elsewhere
    ///   before the computation finished (the computation is detached),
    /// - [`Error::System`] if the reactor wait failed.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let runtime = Builder::new().threads(2).build()?;
    /// let value = runtime.block_on(async { 42 })?;
    /// assert_eq!(value, 42);
    /// ```
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let mut computation = enter_context(&self.context, || Async::new(future));

        // Safety: the context outlives the computation's attachment; on
        // every early return below the computation is detached.
        let continuation = unsafe {
            Continuation::from_callback(stop_context, Arc::as_ptr(&self.context) as *const ())
        };
        computation.starter().start(continuation);

        let outcome = thread::scope(|scope| {
            let helpers: Vec<_> = (1..self.threads)
                .map(|_| scope.spawn(|| self.drive()))
                .collect();

            let mut outcome = self.drive();

            for helper in helpers {
                let joined = match helper.join() {
                    Ok(result) => result,
                    Err(payload) => panic::resume_unwind(payload),
                };
                outcome = outcome.and(joined);
            }

            outcome
        });

        if self.context.is_stopped() {
            self.context.reset();
        }

        if let Err(error) = outcome {
            if !computation.is_ready() {
                computation.detach();
            }
            return Err(error);
        }

        if !computation.is_ready() {
            computation.detach();
            return Err(Error::Stopped);
        }

        match Pin::new(&mut computation).poll(&mut std::task::Context::from_waker(Waker::noop())) {
            Poll::Ready(result) => result,
            Poll::Pending => Err(Error::Stopped),
        }
    }

    /// Runs the dispatch loop on the calling thread.
    fn drive(&self) -> Result<()> {
        let result = enter_context(&self.context, || self.context.run(self.buffer_size));

        if result.is_err() {
            // Release the other runners.
            self.context.stop();
        }

        result
    }
}
