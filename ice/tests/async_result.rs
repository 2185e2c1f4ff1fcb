mod common;

use common::{DropCounter, Gate, WakeCounter, now, poll_once};
use ice::{Async, Continuation, Error};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Poll, Waker};

async fn explode() -> i32 {
    panic!("boom")
}

#[test]
fn test_async_ready_value_does_not_suspend() {
    let answer = Async::new(async { 7 });

    assert!(answer.is_ready());
    assert_eq!(now(answer).unwrap(), 7);
}

#[test]
fn test_async_resumes_consumer_exactly_once() {
    let gate = Gate::new();
    let wait = gate.wait();
    let mut value = Async::new(async move {
        wait.await;
        5
    });
    assert!(!value.is_ready());

    let counter = WakeCounter::new();
    let waker = Waker::from(counter.clone());
    assert!(poll_once(&mut value, &waker).is_pending());
    assert_eq!(counter.count(), 0);

    gate.open();

    assert!(value.is_ready());
    assert_eq!(counter.count(), 1);
    match poll_once(&mut value, &waker) {
        Poll::Ready(result) => assert_eq!(result.unwrap(), 5),
        Poll::Pending => panic!("finished computation reported pending"),
    }
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_async_repoll_replaces_the_waker() {
    let gate = Gate::new();
    let wait = gate.wait();
    let mut value = Async::new(async move {
        wait.await;
        "done"
    });

    let first = WakeCounter::new();
    let second = WakeCounter::new();
    assert!(poll_once(&mut value, &Waker::from(first.clone())).is_pending());
    assert!(poll_once(&mut value, &Waker::from(second.clone())).is_pending());

    gate.open();

    assert_eq!(first.count(), 0);
    assert_eq!(second.count(), 1);
    assert_eq!(now(value).unwrap(), "done");
}

#[test]
fn test_async_detach_drops_the_result_once() {
    let drops = DropCounter::new();
    let tracked = drops.track();

    let gate = Gate::new();
    let wait = gate.wait();
    let value = Async::new(async move {
        wait.await;
        tracked
    });

    value.detach();
    assert_eq!(drops.drops(), 0);

    gate.open();
    assert_eq!(drops.drops(), 1);
}

#[test]
fn test_async_finished_handle_drops_its_result() {
    let drops = DropCounter::new();
    let tracked = drops.track();

    let value = Async::new(async move { tracked });
    assert!(value.is_ready());

    drop(value);
    assert_eq!(drops.drops(), 1);
}

#[test]
fn test_async_empty_is_a_broken_promise() {
    let value = Async::<i32>::empty();

    assert!(!value.is_ready());
    assert!(matches!(now(value), Err(Error::BrokenPromise)));
}

#[test]
fn test_async_panic_reaches_the_consumer() {
    let value = Async::new(explode());

    match now(value) {
        Err(Error::Panicked(message)) => assert_eq!(message, "boom"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_async_error_reaches_the_consumer() {
    let value = Async::try_new(async { Err::<u8, _>(std::io::Error::other("refused")) });

    match now(value) {
        Err(Error::Io(error)) => assert_eq!(error.to_string(), "refused"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_async_when_ready_keeps_the_result() {
    let gate = Gate::new();
    let wait = gate.wait();
    let value = Async::new(async move {
        wait.await;
        11
    });

    let counter = WakeCounter::new();
    let waker = Waker::from(counter.clone());
    let mut ready = Box::pin(value.when_ready());
    assert!(poll_once(&mut ready, &waker).is_pending());

    gate.open();
    assert_eq!(counter.count(), 1);
    assert!(poll_once(&mut ready, &waker).is_ready());
    drop(ready);

    assert_eq!(now(value).unwrap(), 11);
}

static STARTED: AtomicUsize = AtomicUsize::new(0);

fn started(_: *const ()) {
    STARTED.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_async_starter_resumes_the_continuation() {
    let gate = Gate::new();
    let wait = gate.wait();
    let value = Async::new(async move {
        wait.await;
        3
    });

    let continuation = unsafe { Continuation::from_callback(started, std::ptr::null()) };
    value.starter().start(continuation);
    assert_eq!(STARTED.load(Ordering::SeqCst), 0);

    gate.open();
    assert_eq!(STARTED.load(Ordering::SeqCst), 1);

    // Already finished: resumed right away.
    let counter = WakeCounter::new();
    value
        .starter()
        .start(Continuation::from(Waker::from(counter.clone())));
    assert_eq!(counter.count(), 1);

    assert_eq!(now(value).unwrap(), 3);
}

#[test]
fn test_async_starter_on_empty_handle() {
    let value = Async::<()>::empty();
    let counter = WakeCounter::new();

    value
        .starter()
        .start(Continuation::from(Waker::from(counter.clone())));

    assert_eq!(counter.count(), 1);
}

#[test]
fn test_start_is_async_new() {
    let value = ice::start(async { String::from("eager") });

    assert!(value.is_ready());
    assert_eq!(now(value).unwrap(), "eager");
}
