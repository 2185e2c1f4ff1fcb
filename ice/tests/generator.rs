mod common;

use common::{DropCounter, Gate, WakeCounter, now, poll_once};
use futures_util::StreamExt;
use ice::{Builder, Error, Generator};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

fn explode(message: &str) {
    panic!("{message}")
}

#[test]
fn test_generator_yields_values_in_order() {
    let mut numbers = Generator::<u32>::new(|y| async move {
        for n in 0..5 {
            y.yield_value(n).await;
        }
    });

    let mut seen = Vec::new();
    while let Some(n) = now(numbers.next()).unwrap() {
        seen.push(n);
    }

    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_generator_end_is_stable() {
    let mut single = Generator::<&str>::new(|y| async move {
        y.yield_value("only").await;
    });

    assert_eq!(now(single.next()).unwrap(), Some("only"));
    assert_eq!(now(single.next()).unwrap(), None);
    assert_eq!(now(single.next()).unwrap(), None);
}

#[test]
fn test_generator_is_lazy() {
    let started = Arc::new(AtomicBool::new(false));
    let drops = DropCounter::new();

    let flag = started.clone();
    let tracked = drops.track();
    let generator = Generator::<u8>::new(move |y| async move {
        let _tracked = tracked;
        flag.store(true, Ordering::SeqCst);
        y.yield_value(1).await;
    });

    drop(generator);

    assert!(!started.load(Ordering::SeqCst));
    assert_eq!(drops.drops(), 1);
}

#[test]
fn test_generator_drop_cancels_a_parked_producer() {
    let finished = Arc::new(AtomicBool::new(false));
    let drops = DropCounter::new();

    let flag = finished.clone();
    let tracked = drops.track();
    let mut endless = Generator::<u64>::new(move |y| async move {
        let _tracked = tracked;
        for n in 0.. {
            y.yield_value(n).await;
        }
        flag.store(true, Ordering::SeqCst);
    });

    assert_eq!(now(endless.next()).unwrap(), Some(0));
    assert_eq!(now(endless.next()).unwrap(), Some(1));
    assert_eq!(drops.drops(), 0);

    drop(endless);

    assert_eq!(drops.drops(), 1);
    assert!(!finished.load(Ordering::SeqCst));
}

#[test]
fn test_generator_drop_cancels_a_busy_producer() {
    let gate = Gate::new();
    let drops = DropCounter::new();

    let wait = gate.wait();
    let tracked = drops.track();
    let mut slow = Generator::<u8>::new(move |y| async move {
        let _tracked = tracked;
        wait.await;
        y.yield_value(1).await;
    });

    let counter = WakeCounter::new();
    let waker = Waker::from(counter.clone());
    let mut next = Box::pin(slow.next());
    assert!(poll_once(&mut next, &waker).is_pending());
    drop(next);

    drop(slow);
    assert_eq!(drops.drops(), 0);

    // The producer notices the cancellation when it is resumed.
    gate.open();
    assert_eq!(drops.drops(), 1);
    assert_eq!(counter.count(), 0);
}

#[test]
fn test_generator_error_follows_the_values() {
    let mut failing = Generator::<i32>::new(|y| async move {
        y.yield_value(1).await;
        Err::<(), _>(std::io::Error::other("disk gone"))
    });

    assert_eq!(now(failing.next()).unwrap(), Some(1));
    match now(failing.next()) {
        Err(Error::Io(error)) => assert_eq!(error.to_string(), "disk gone"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(now(failing.next()).unwrap(), None);
}

#[test]
fn test_generator_panic_is_delivered_once() {
    let mut broken = Generator::<i32>::new(|y| async move {
        y.yield_value(1).await;
        explode("producer exploded");
    });

    assert_eq!(now(broken.next()).unwrap(), Some(1));
    match now(broken.next()) {
        Err(Error::Panicked(message)) => assert_eq!(message, "producer exploded"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(now(broken.next()).unwrap(), None);
}

#[test]
fn test_generator_empty() {
    let mut nothing = Generator::<String>::empty();

    assert_eq!(now(nothing.next()).unwrap(), None);
}

#[test]
fn test_generator_consumer_waits_for_a_suspended_producer() {
    let gate = Gate::new();
    let wait = gate.wait();
    let mut delayed = Generator::<&str>::new(move |y| async move {
        wait.await;
        y.yield_value("late").await;
    });

    let counter = WakeCounter::new();
    let waker = Waker::from(counter.clone());
    let mut next = Box::pin(delayed.next());
    assert!(poll_once(&mut next, &waker).is_pending());

    gate.open();
    assert_eq!(counter.count(), 1);

    match poll_once(&mut next, &waker) {
        std::task::Poll::Ready(value) => assert_eq!(value.unwrap(), Some("late")),
        std::task::Poll::Pending => panic!("value was handed over"),
    }
}

#[test]
fn test_generator_as_stream() {
    let runtime = Builder::new().threads(2).build().unwrap();

    let collected = runtime
        .block_on(async {
            let letters = Generator::<char>::new(|y| async move {
                for c in ['a', 'b', 'c'] {
                    y.yield_value(c).await;
                }
            });

            letters.collect::<Vec<_>>().await
        })
        .unwrap();

    let collected: Vec<char> = collected.into_iter().map(Result::unwrap).collect();
    assert_eq!(collected, vec!['a', 'b', 'c']);
}

#[test]
fn test_generator_across_reactor_threads() {
    let runtime = Builder::new().threads(4).build().unwrap();

    let sum = runtime
        .block_on(async {
            let mut numbers = Generator::<u64>::new(|y| async move {
                for n in 0..100 {
                    ice::yield_now().await;
                    y.yield_value(n).await;
                }
            });

            let mut sum = 0;
            while let Some(n) = numbers.next().await.unwrap() {
                ice::yield_now().await;
                sum += n;
            }
            sum
        })
        .unwrap();

    assert_eq!(sum, 4950);
}
