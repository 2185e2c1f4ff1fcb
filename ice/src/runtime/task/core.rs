use super::state::{CANCELLED, COMPLETED, IDLE, NOTIFIED, RUNNING};
use super::waker::make_waker;

use std::cell::UnsafeCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A suspendable computation that is resumed in place.
///
/// There is no run queue: waking a core polls its future right away on the
/// waking thread. A wake-up that arrives while the future is being polled
/// makes the polling thread poll once more before it lets go.
pub(crate) struct Core {
    /// The future being driven.
    ///
    /// Only the thread that moved the state to `RUNNING` (or that moved it
    /// out of `IDLE` to cancel) touches it.
    future: UnsafeCell<Option<BoxFuture>>,

    /// Lifecycle state (`IDLE`, `RUNNING`, ...).
    state: AtomicUsize,
}

unsafe impl Send for Core {}
unsafe impl Sync for Core {}

impl Core {
    /// Creates an idle core. Nothing runs until the first
    /// [`schedule`](Self::schedule).
    pub(crate) fn new<F>(future: F) -> Arc<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Arc::new(Self {
            future: UnsafeCell::new(Some(Box::pin(future))),
            state: AtomicUsize::new(IDLE),
        })
    }

    /// Resumes the computation.
    ///
    /// - `IDLE`: polls the future on the calling thread.
    /// - `RUNNING`: flags the poller to poll again.
    /// - anything else: nothing to do.
    pub(crate) fn schedule(self: &Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.run();
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Drops the computation without resuming it.
    ///
    /// An idle future is dropped right away; a future being polled is
    /// dropped by its poller once the current poll returns.
    pub(crate) fn cancel(&self) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.release();
                        return;
                    }
                }
                state @ (RUNNING | NOTIFIED) => {
                    if self
                        .state
                        .compare_exchange(state, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Polls until the future completes or goes idle.
    ///
    /// The caller must have moved the state to `RUNNING`.
    fn run(self: &Arc<Self>) {
        let waker = make_waker(self.clone());
        let mut cx = Context::from_waker(&waker);

        'poll: loop {
            // Safety: RUNNING grants exclusive access to the future.
            let poll = match unsafe { &mut *self.future.get() } {
                Some(future) => future.as_mut().poll(&mut cx),
                None => Poll::Ready(()),
            };

            if poll.is_ready() {
                self.release();
                self.state.store(COMPLETED, Ordering::Release);
                return;
            }

            loop {
                match self.state.compare_exchange(
                    RUNNING,
                    IDLE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return,
                    Err(NOTIFIED) => {
                        if self
                            .state
                            .compare_exchange(
                                NOTIFIED,
                                RUNNING,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                        {
                            continue 'poll;
                        }
                    }
                    Err(_) => {
                        // Cancelled while polling.
                        self.release();
                        self.state.store(COMPLETED, Ordering::Release);
                        return;
                    }
                }
            }
        }
    }

    fn release(&self) {
        // Safety: callers hold exclusive access (RUNNING, or won IDLE -> COMPLETED).
        drop(unsafe { (*self.future.get()).take() });
    }

    #[cfg(test)]
    fn state(&self) -> usize {
        self.state.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::task::Waker;

    /// Resolves on the second poll; hands its waker out on the first.
    fn parked(slot: Arc<Mutex<Option<Waker>>>) -> impl Future<Output = ()> + Send {
        let mut first = true;
        std::future::poll_fn(move |cx| {
            if first {
                first = false;
                *slot.lock().unwrap() = Some(cx.waker().clone());
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
    }

    #[test]
    fn schedule_polls_inline() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        let core = Core::new(async move { flag.store(true, Ordering::SeqCst) });
        assert!(!done.load(Ordering::SeqCst));

        core.schedule();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(core.state(), COMPLETED);
    }

    #[test]
    fn wake_resumes_a_parked_future() {
        let slot = Arc::new(Mutex::new(None));
        let done = Arc::new(AtomicBool::new(false));

        let flag = done.clone();
        let wait = parked(slot.clone());
        let core = Core::new(async move {
            wait.await;
            flag.store(true, Ordering::SeqCst);
        });

        core.schedule();
        assert_eq!(core.state(), IDLE);

        let waker = slot.lock().unwrap().take().unwrap();
        waker.wake();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(core.state(), COMPLETED);
    }

    #[test]
    fn cancel_drops_an_idle_future_without_polling() {
        let polled = Arc::new(AtomicBool::new(false));
        let flag = polled.clone();

        let core = Core::new(async move { flag.store(true, Ordering::SeqCst) });
        core.cancel();
        core.schedule();

        assert!(!polled.load(Ordering::SeqCst));
        assert_eq!(core.state(), COMPLETED);
    }
}
