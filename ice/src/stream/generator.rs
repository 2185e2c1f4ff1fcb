use crate::error::{Error, Result};
use crate::runtime::task::core::Core;

use futures_core::Stream;
use futures_util::FutureExt;
use futures_util::task::AtomicWaker;

use std::cell::UnsafeCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};

/// No value ready; the consumer is running.
const CONSUMER_ACTIVE: u8 = 0;
/// No value ready; the consumer waits for one.
const CONSUMER_SUSPENDED: u8 = 1;
/// A value is ready; the producer is still running.
const PRODUCER_ACTIVE: u8 = 2;
/// A value is ready (or production has not started); the producer is parked.
const PRODUCER_SUSPENDED: u8 = 3;
/// The consumer is gone.
const CANCELLED: u8 = 4;

/// Outputs a generator body may finish with.
pub trait Completion {
    /// Converts the output into the generator's final outcome.
    fn into_result(self) -> Result<()>;
}

impl Completion for () {
    fn into_result(self) -> Result<()> {
        Ok(())
    }
}

impl<E: Into<Error>> Completion for Result<(), E> {
    fn into_result(self) -> Result<()> {
        self.map_err(Into::into)
    }
}

/// State shared by the consumer handle and the producer.
///
/// Producer and consumer take turns: user code on both sides never runs
/// against this state at the same time. `value` and `error` belong to
/// whichever side is active.
struct Shared<T> {
    state: AtomicU8,
    consumer: AtomicWaker,
    /// The yielded value. `None` once the producer is done.
    value: UnsafeCell<Option<T>>,
    error: UnsafeCell<Option<Error>>,
}

unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

/// Outcome of a producer handing a value over.
#[derive(Debug, PartialEq, Eq)]
enum Handoff {
    /// The consumer already asked for the next value.
    Continue,
    /// The producer is parked until the consumer asks again.
    Parked,
    /// The consumer is gone.
    Cancelled,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PRODUCER_SUSPENDED),
            consumer: AtomicWaker::new(),
            value: UnsafeCell::new(None),
            error: UnsafeCell::new(None),
        }
    }

    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    /// Marks the value ready and wakes the suspended consumer directly.
    ///
    /// Returns the state observed once the consumer has run, or `Err` with
    /// the current state if the consumer was no longer suspended. In that
    /// case nobody is woken.
    fn hand_to_consumer(&self) -> std::result::Result<u8, u8> {
        self.state.compare_exchange(
            CONSUMER_SUSPENDED,
            PRODUCER_ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        )?;

        self.consumer.wake();
        Ok(self.state())
    }

    /// Producer side of a yield, after the value slot was filled.
    fn handoff(&self) -> Handoff {
        let mut state = self.state();
        debug_assert!(state != PRODUCER_ACTIVE && state != PRODUCER_SUSPENDED);

        // Set once the consumer has been woken with the value.
        let mut handed = false;

        loop {
            match state {
                CONSUMER_SUSPENDED if handed => return Handoff::Continue,
                CONSUMER_SUSPENDED => match self.hand_to_consumer() {
                    Ok(CONSUMER_SUSPENDED) => return Handoff::Continue,
                    Ok(current) => {
                        handed = true;
                        state = current;
                    }
                    Err(current) => state = current,
                },
                CONSUMER_ACTIVE | PRODUCER_ACTIVE => {
                    match self.state.compare_exchange(
                        state,
                        PRODUCER_SUSPENDED,
                        Ordering::Release,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Handoff::Parked,
                        Err(current) => state = current,
                    }
                }
                _ => {
                    debug_assert_eq!(state, CANCELLED);
                    return Handoff::Cancelled;
                }
            }
        }
    }

    /// Records how the body ended and hands the end of the sequence over.
    fn finish(&self, outcome: Result<()>) {
        if let Err(error) = outcome {
            if self.state.load(Ordering::Relaxed) != CANCELLED {
                unsafe {
                    *self.error.get() = Some(error);
                }
            }
        }

        self.handoff();
    }
}

/// The producer half of a [`Generator`], passed to its body.
pub struct Yielder<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Yielder<T> {
    /// Hands `value` to the consumer.
    ///
    /// Resolves once the consumer asks for the next value. If the generator
    /// is dropped in the meantime, the producer is dropped at this point
    /// and never resumes.
    pub fn yield_value(&self, value: T) -> YieldValue<'_, T> {
        YieldValue {
            shared: &self.shared,
            value: Some(value),
        }
    }
}

/// Future returned by [`Yielder::yield_value`].
pub struct YieldValue<'a, T> {
    shared: &'a Shared<T>,
    value: Option<T>,
}

impl<T> Unpin for YieldValue<'_, T> {}

impl<T> Future for YieldValue<'_, T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let Some(value) = self.value.take() else {
            // Resumed after parking: go on unless still parked or cancelled.
            return match self.shared.state() {
                PRODUCER_SUSPENDED | CANCELLED => Poll::Pending,
                _ => Poll::Ready(()),
            };
        };

        unsafe {
            *self.shared.value.get() = Some(value);
        }

        match self.shared.handoff() {
            Handoff::Continue => Poll::Ready(()),
            Handoff::Parked | Handoff::Cancelled => Poll::Pending,
        }
    }
}

/// Drives the body; stops polling it once the consumer is gone.
struct Producer<T, F> {
    shared: Arc<Shared<T>>,
    body: Pin<Box<F>>,
}

impl<T, F> Future for Producer<T, F>
where
    F: Future<Output = Result<()>>,
{
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.shared.state() == CANCELLED {
            return Poll::Ready(());
        }

        match self.body.as_mut().poll(cx) {
            Poll::Ready(outcome) => {
                self.shared.finish(outcome);
                Poll::Ready(())
            }
            Poll::Pending if self.shared.state() == CANCELLED => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, F> Unpin for Producer<T, F> {}

struct Inner<T> {
    shared: Arc<Shared<T>>,
    producer: Arc<Core>,
}

/// An asynchronous, pull-based sequence.
///
/// The body passed to [`Generator::new`] does not run until the first
/// value is requested, and never runs ahead of demand: every
/// [`yield_value`](Yielder::yield_value) parks the producer until the
/// consumer asks for the next value. Handoffs are direct, the woken side
/// runs on the thread of the side that woke it.
///
/// Dropping the generator cancels the producer. A producer parked at a
/// yield (or never started) is dropped on the spot; a producer busy
/// elsewhere is dropped the next time it is resumed.
///
/// # Examples
///
/// ```rust,ignore
/// let mut numbers = Generator::new(|y| async move {
///     for n in 0..3 {
///         y.yield_value(n).await;
///     }
/// });
///
/// while let Some(n) = numbers.next().await? {
///     println!("{n}");
/// }
/// ```
pub struct Generator<T> {
    inner: Option<Inner<T>>,
    /// The consumer asked for a value it has not received yet.
    requested: bool,
    /// The end of the sequence was delivered.
    done: bool,
}

impl<T: Send + 'static> Generator<T> {
    /// Creates a generator from `body`.
    ///
    /// `body` is called right away to build the producer future, which is
    /// not polled until the first value is requested. A panic in the body
    /// or an `Err` output is delivered to the consumer after the values
    /// yielded before it.
    pub fn new<B, F>(body: B) -> Self
    where
        B: FnOnce(Yielder<T>) -> F,
        F: Future + Send + 'static,
        F::Output: Completion,
    {
        let shared = Arc::new(Shared::new());
        let yielder = Yielder {
            shared: shared.clone(),
        };

        let body = AssertUnwindSafe(body(yielder))
            .catch_unwind()
            .map(|outcome| match outcome {
                Ok(output) => output.into_result(),
                Err(payload) => Err(Error::from_panic(payload)),
            });

        let producer = Core::new(Producer {
            shared: shared.clone(),
            body: Box::pin(body),
        });

        Self {
            inner: Some(Inner { shared, producer }),
            requested: false,
            done: false,
        }
    }
}

impl<T> Generator<T> {
    /// Returns a generator that yields nothing.
    pub fn empty() -> Self {
        Self {
            inner: None,
            requested: false,
            done: true,
        }
    }

    /// Requests the next value.
    ///
    /// Resolves to `Ok(Some(value))`, or `Ok(None)` once the sequence is
    /// over (repeatedly). A failure of the body is delivered once as `Err`,
    /// after which the sequence is over.
    pub fn next(&mut self) -> Next<'_, T> {
        Next { generator: self }
    }

    fn poll_advance(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>>> {
        if self.done {
            return Poll::Ready(Ok(None));
        }
        let Some(inner) = self.inner.as_ref() else {
            self.done = true;
            return Poll::Ready(Ok(None));
        };
        let shared = &inner.shared;

        let mut state = shared.state();

        if !self.requested {
            self.requested = true;

            if state == PRODUCER_ACTIVE {
                // The producer has not parked since the last handoff; it
                // keeps going if we get in before it does.
                shared.consumer.register(cx.waker());
                match shared.state.compare_exchange(
                    PRODUCER_ACTIVE,
                    CONSUMER_SUSPENDED,
                    Ordering::Release,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Poll::Pending,
                    Err(current) => state = current,
                }
            }

            if state == PRODUCER_SUSPENDED {
                shared.state.store(CONSUMER_ACTIVE, Ordering::Release);
                inner.producer.schedule();
                state = shared.state();
            }
        }

        loop {
            match state {
                PRODUCER_ACTIVE | PRODUCER_SUSPENDED => return Poll::Ready(self.take()),
                CONSUMER_ACTIVE => {
                    shared.consumer.register(cx.waker());
                    match shared.state.compare_exchange(
                        CONSUMER_ACTIVE,
                        CONSUMER_SUSPENDED,
                        Ordering::Release,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Poll::Pending,
                        Err(current) => state = current,
                    }
                }
                CONSUMER_SUSPENDED => {
                    shared.consumer.register(cx.waker());
                    state = shared.state();
                    if state == CONSUMER_SUSPENDED {
                        return Poll::Pending;
                    }
                }
                _ => unreachable!("generator cancelled while its consumer is alive"),
            }
        }
    }

    /// Takes the handed-over value, or the end of the sequence.
    fn take(&mut self) -> Result<Option<T>> {
        self.requested = false;

        let Some(inner) = self.inner.as_ref() else {
            return Ok(None);
        };

        if let Some(value) = unsafe { (*inner.shared.value.get()).take() } {
            return Ok(Some(value));
        }

        self.done = true;
        match unsafe { (*inner.shared.error.get()).take() } {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }
}

impl<T> Default for Generator<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Drop for Generator<T> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };

        if self.requested {
            // Withdraw the pending request before cancelling.
            let _ = inner.shared.state.compare_exchange(
                CONSUMER_SUSPENDED,
                CONSUMER_ACTIVE,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        let previous = inner.shared.state.swap(CANCELLED, Ordering::AcqRel);
        debug_assert_ne!(previous, CANCELLED);

        if previous == PRODUCER_SUSPENDED {
            inner.producer.cancel();
        }
    }
}

impl<T> Stream for Generator<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .poll_advance(cx)
            .map(|advanced| advanced.transpose())
    }
}

/// Future returned by [`Generator::next`].
pub struct Next<'a, T> {
    generator: &'a mut Generator<T>,
}

impl<T> Future for Next<'_, T> {
    type Output = Result<Option<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.generator.poll_advance(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::task::{Wake, Waker};

    struct Count(AtomicUsize);

    impl Wake for Count {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn shared_with_consumer(state: u8) -> (Shared<u32>, Arc<Count>) {
        let count = Arc::new(Count(AtomicUsize::new(0)));
        let shared = Shared::new();
        shared.consumer.register(&Waker::from(count.clone()));
        shared.state.store(state, Ordering::SeqCst);
        (shared, count)
    }

    #[test]
    fn handoff_after_cancellation_leaves_the_consumer_alone() {
        // The consumer suspended, then went away before the value arrived.
        let (shared, count) = shared_with_consumer(CONSUMER_SUSPENDED);
        shared.state.store(CANCELLED, Ordering::SeqCst);

        assert_eq!(shared.hand_to_consumer(), Err(CANCELLED));
        assert_eq!(shared.handoff(), Handoff::Cancelled);

        assert_eq!(shared.state(), CANCELLED);
        assert_eq!(count.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handoff_while_the_consumer_withdraws_parks() {
        // The consumer withdrew its request and has not cancelled yet.
        let (shared, count) = shared_with_consumer(CONSUMER_ACTIVE);

        assert_eq!(shared.hand_to_consumer(), Err(CONSUMER_ACTIVE));
        assert_eq!(shared.handoff(), Handoff::Parked);

        assert_eq!(shared.state(), PRODUCER_SUSPENDED);
        assert_eq!(count.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handoff_to_a_suspended_consumer_wakes_it() {
        let (shared, count) = shared_with_consumer(CONSUMER_SUSPENDED);

        assert_eq!(shared.handoff(), Handoff::Parked);

        assert_eq!(shared.state(), PRODUCER_SUSPENDED);
        assert_eq!(count.0.load(Ordering::SeqCst), 1);
    }
}
