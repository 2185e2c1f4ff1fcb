//! Suspendable computations.
//!
//! - [`spawn`] starts a fire-and-forget task whose failures go to the
//!   [diagnostic sink](crate::diagnostic).
//! - [`Async`] starts a computation whose result can be awaited, detached
//!   or hooked onto through a [`Starter`].
//!
//! Both start eagerly on the calling thread and are resumed in place by
//! whichever thread wakes them; there is no run queue.

pub(crate) mod core;
pub(crate) mod state;
pub(crate) mod waker;

mod promise;

pub use promise::{Async, Starter, WhenReady};

use self::core::Core;
use crate::diagnostic;
use crate::error::panic_message;

use futures_util::FutureExt;

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Outputs a fire-and-forget task may finish with.
///
/// Errors are written to the diagnostic sink since no one awaits the task.
pub trait Report {
    /// Hands a failure, if any, to the diagnostic sink.
    fn report(self);
}

impl Report for () {
    fn report(self) {}
}

impl<E: Display> Report for Result<(), E> {
    fn report(self) {
        if let Err(error) = self {
            diagnostic::report(&format!("unhandled task error: {error}"));
        }
    }
}

/// Starts `future` as a fire-and-forget task.
///
/// The task runs on the calling thread until its first suspension. Its
/// output is discarded; an `Err` output or a panic is reported to the
/// [diagnostic sink](crate::diagnostic) instead of being propagated.
///
/// # Examples
///
/// ```rust,ignore
/// ice::spawn(async move {
///     context.schedule().await;
///     serve(connection).await
/// });
/// ```
pub fn spawn<F>(future: F)
where
    F: Future + Send + 'static,
    F::Output: Report,
{
    let core = Core::new(async move {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(output) => output.report(),
            Err(payload) => {
                diagnostic::report(&format!(
                    "unhandled task panic: {}",
                    panic_message(payload.as_ref())
                ));
            }
        }
    });

    core.schedule();
}

/// Starts `future` eagerly and returns a handle to its result.
///
/// Shorthand for [`Async::new`].
pub fn start<F>(future: F) -> Async<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Async::new(future)
}
