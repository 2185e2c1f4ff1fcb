mod common;

use common::{Gate, init_tracing, wait_until};
use ice::{Async, Builder, Error, Runtime};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

async fn explode() -> u8 {
    panic!("runtime body failed")
}

#[test]
fn test_block_on_returns_the_value() {
    let runtime = Builder::new().threads(2).build().unwrap();

    assert_eq!(runtime.block_on(async { 40 + 2 }).unwrap(), 42);
}

#[test]
fn test_block_on_with_default_configuration() {
    let runtime = Runtime::new().unwrap();

    let value = runtime
        .block_on(async {
            ice::yield_now().await;
            "done"
        })
        .unwrap();

    assert_eq!(value, "done");
}

#[test]
#[should_panic(expected = "threads must be > 0")]
fn test_builder_rejects_zero_threads() {
    let _ = Builder::new().threads(0);
}

#[test]
#[should_panic(expected = "buffer_size must be > 0")]
fn test_builder_rejects_zero_buffer() {
    let _ = Builder::new().buffer_size(0);
}

#[test]
fn test_runtime_is_reusable() {
    let runtime = Builder::new().threads(3).buffer_size(4).build().unwrap();

    for round in 0..5 {
        let value = runtime
            .block_on(async move {
                ice::yield_now().await;
                round * 2
            })
            .unwrap();
        assert_eq!(value, round * 2);
    }

    assert!(!runtime.context().is_stopped());
}

#[test]
fn test_current_context_inside_block_on() {
    assert!(ice::current().is_none());

    let runtime = Builder::new().threads(1).build().unwrap();
    let expected = Arc::as_ptr(runtime.context()) as usize;

    let seen = runtime
        .block_on(async { ice::current().map(|context| Arc::as_ptr(&context) as usize) })
        .unwrap();

    assert_eq!(seen, Some(expected));
    assert!(ice::current().is_none());
}

#[test]
fn test_block_on_reports_a_panic() {
    let runtime = Builder::new().threads(2).build().unwrap();

    match runtime.block_on(explode()) {
        Err(Error::Panicked(message)) => assert_eq!(message, "runtime body failed"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // Still usable afterwards.
    assert_eq!(runtime.block_on(async { 1 }).unwrap(), 1);
}

#[test]
fn test_block_on_stopped_from_outside() {
    let runtime = Arc::new(Builder::new().threads(2).build().unwrap());
    let gate = Gate::new();

    let stopper = {
        let runtime = runtime.clone();
        thread::spawn(move || {
            wait_until(|| runtime.context().threads() == 2);
            runtime.context().stop();
        })
    };

    let wait = gate.wait();
    let outcome = runtime.block_on(async move {
        wait.await;
        7
    });
    stopper.join().unwrap();

    assert!(matches!(outcome, Err(Error::Stopped)));
    assert!(!runtime.context().is_stopped());

    // The detached computation finishes later without a consumer.
    gate.open();
}

const COMPUTATIONS: usize = 1000;

#[test]
fn test_many_computations_across_threads() {
    init_tracing();
    #[cfg(unix)]
    common::raise_fd_limit();

    let runtime = Builder::new().threads(4).build().unwrap();

    let all_seen = runtime
        .block_on(async {
            let context = ice::current().unwrap();

            let handles: Vec<Async<usize>> = (0..COMPUTATIONS)
                .map(|i| {
                    let context = context.clone();
                    Async::new(async move {
                        context.schedule().await;
                        i
                    })
                })
                .collect();

            let mut seen = vec![false; COMPUTATIONS];
            for handle in handles {
                let i = handle.await.unwrap();
                assert!(!seen[i], "value {i} delivered twice");
                seen[i] = true;
            }

            seen.into_iter().all(|s| s)
        })
        .unwrap();

    assert!(all_seen);
}

#[test]
fn test_spawned_tasks_run_on_the_runtime() {
    let runtime = Builder::new().threads(2).build().unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let done = done.clone();
        runtime.spawn(async move {
            ice::yield_now().await;
            done.fetch_add(1, Ordering::SeqCst);
        });
    }

    let observed = {
        let done = done.clone();
        runtime.block_on(async move {
            while done.load(Ordering::SeqCst) < 10 {
                ice::yield_now().await;
            }
            done.load(Ordering::SeqCst)
        })
    };

    assert_eq!(observed.unwrap(), 10);
}
