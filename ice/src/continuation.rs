use std::fmt;
use std::task::Waker;

/// A type-erased capability to resume one suspended computation.
///
/// A continuation is either a [`Waker`] or a plain callback paired with an
/// opaque state pointer. Resuming consumes the continuation, so a given
/// continuation can never be resumed twice.
///
/// # Examples
///
/// ```rust,ignore
/// let continuation = Continuation::from(cx.waker().clone());
/// assert!(continuation.is_bound());
/// continuation.resume();
/// ```
#[derive(Default)]
pub struct Continuation {
    target: Target,
}

#[derive(Default)]
enum Target {
    #[default]
    Empty,
    Waker(Waker),
    Callback {
        callback: fn(*const ()),
        state: *const (),
    },
}

// Safety: the callback form is only built through `from_callback`, whose
// contract requires `state` to be usable from whichever thread resumes.
unsafe impl Send for Continuation {}
unsafe impl Sync for Continuation {}

impl Continuation {
    /// Creates a continuation that wakes `waker` when resumed.
    pub fn from_waker(waker: Waker) -> Self {
        Self {
            target: Target::Waker(waker),
        }
    }

    /// Creates a continuation that calls `callback(state)` when resumed.
    ///
    /// # Safety
    ///
    /// `state` must stay valid until the continuation is resumed or dropped,
    /// and `callback` must be safe to invoke with it from any thread.
    pub unsafe fn from_callback(callback: fn(*const ()), state: *const ()) -> Self {
        Self {
            target: Target::Callback { callback, state },
        }
    }

    /// Returns `true` if a resumption target is bound.
    pub fn is_bound(&self) -> bool {
        !matches!(self.target, Target::Empty)
    }

    /// Transfers control to the bound target.
    ///
    /// The continuation must be bound. Resuming an empty one is a contract
    /// violation that trips a debug assertion; release builds ignore it.
    pub fn resume(self) {
        match self.target {
            Target::Waker(waker) => waker.wake(),
            Target::Callback { callback, state } => callback(state),
            Target::Empty => debug_assert!(false, "resumed an empty continuation"),
        }
    }
}

impl From<Waker> for Continuation {
    fn from(waker: Waker) -> Self {
        Self::from_waker(waker)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.target {
            Target::Empty => "empty",
            Target::Waker(_) => "waker",
            Target::Callback { .. } => "callback",
        };

        f.debug_struct("Continuation").field("target", &kind).finish()
    }
}
