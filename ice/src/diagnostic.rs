//! Process-wide diagnostic sink.
//!
//! Fire-and-forget tasks have nobody to hand their failures to, so they
//! report them here instead. Every report is emitted as a `tracing` error
//! event and written as one line to the installed sink (standard error by
//! default). Writes are serialized.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

type Sink = Box<dyn Write + Send>;

static SINK: Mutex<Option<Sink>> = Mutex::new(None);

/// Installs `writer` as the diagnostic sink and returns the previous one.
///
/// # Examples
///
/// ```rust,ignore
/// ice::diagnostic::set_sink(std::fs::File::create("ice.log")?);
/// ```
pub fn set_sink<W>(writer: W) -> Option<Box<dyn Write + Send>>
where
    W: Write + Send + 'static,
{
    let mut sink = SINK.lock().unwrap_or_else(PoisonError::into_inner);
    sink.replace(Box::new(writer))
}

/// Restores the default sink (standard error).
pub fn reset_sink() -> Option<Box<dyn Write + Send>> {
    SINK.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Writes one diagnostic line.
pub(crate) fn report(message: &str) {
    tracing::error!(target: "ice::diagnostic", "{message}");

    let mut sink = SINK.lock().unwrap_or_else(PoisonError::into_inner);
    let written = match sink.as_mut() {
        Some(writer) => writeln!(writer, "{message}").and_then(|()| writer.flush()),
        None => writeln!(io::stderr().lock(), "{message}"),
    };

    // Nothing sensible is left to report a sink failure to.
    let _ = written;
}

/// Reports a contract violation and aborts the process.
pub(crate) fn fatal(message: &str) -> ! {
    report(message);
    std::process::abort()
}
