use crate::reactor::Context;

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// The execution context the current thread is running, if any.
    ///
    /// Set by [`Runtime`](crate::Runtime) on every thread it drives, so
    /// code resumed by the dispatch loop can reach the reactor without
    /// explicit parameter passing.
    static CURRENT_CONTEXT: RefCell<Option<Arc<Context>>> = const { RefCell::new(None) };
}

/// Installs `context` as the current context while `f` runs.
///
/// The previous context is restored afterwards.
pub(crate) fn enter_context<R>(context: &Arc<Context>, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_CONTEXT.with(|current| current.replace(Some(context.clone())));

    let out = f();

    CURRENT_CONTEXT.with(|current| current.replace(previous));
    out
}

/// Returns the execution context driving the current thread.
///
/// Returns `None` outside of [`Runtime::block_on`](crate::Runtime::block_on).
///
/// # Examples
///
/// ```rust,ignore
/// let context = ice::current().expect("called inside a runtime");
/// context.schedule().await;
/// ```
pub fn current() -> Option<Arc<Context>> {
    CURRENT_CONTEXT.with(|current| current.borrow().clone())
}
