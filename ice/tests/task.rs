mod common;

use common::Gate;
use ice::{diagnostic, spawn};

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Sink capturing diagnostic lines in memory.
#[derive(Clone, Default)]
struct Capture {
    lines: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.lines.lock().unwrap()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lines.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

async fn explode() {
    panic!("task exploded")
}

// Everything touching the process-wide sink lives in this one test.
#[test]
fn test_task_failures_reach_the_diagnostic_sink() {
    let capture = Capture::default();
    diagnostic::set_sink(capture.clone());

    spawn(async { Err::<(), _>("disk full") });
    spawn(explode());
    spawn(async {});

    let gate = Gate::new();
    let wait = gate.wait();
    spawn(async move {
        wait.await;
        Err::<(), _>(io::Error::other("late failure"))
    });
    assert!(!capture.text().contains("late failure"));
    gate.open();

    diagnostic::reset_sink();

    let text = capture.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "unhandled task error: disk full",
            "unhandled task panic: task exploded",
            "unhandled task error: late failure",
        ]
    );
}

#[test]
fn test_task_runs_eagerly() {
    let ran = Arc::new(Mutex::new(false));

    let flag = ran.clone();
    spawn(async move {
        *flag.lock().unwrap() = true;
    });

    assert!(*ran.lock().unwrap());
}
