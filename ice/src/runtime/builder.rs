use super::Runtime;
use crate::error::Result;
use crate::reactor::Context;

use std::sync::Arc;
use std::thread;

/// Builder for configuring and creating a [`Runtime`].
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = Builder::new()
///     .threads(4)
///     .buffer_size(128)
///     .build()?;
/// ```
#[derive(Clone, Debug)]
pub struct Builder {
    /// Number of threads running the dispatch loop.
    threads: usize,

    /// Completions dequeued per reactor wait.
    buffer_size: usize,
}

impl Builder {
    /// Creates a builder with default settings.
    ///
    /// The thread count defaults to the number of logical CPUs, falling
    /// back to `1`. The buffer size defaults to 64 completions.
    pub fn new() -> Self {
        let threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            threads,
            buffer_size: 64,
        }
    }

    /// Sets the number of threads that run the dispatch loop.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn threads(mut self, n: usize) -> Self {
        assert!(n > 0, "threads must be > 0");

        self.threads = n;
        self
    }

    /// Sets how many completions a single reactor wait may dequeue.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn buffer_size(mut self, n: usize) -> Self {
        assert!(n > 0, "buffer_size must be > 0");

        self.buffer_size = n;
        self
    }

    /// Opens the execution context and builds the runtime.
    ///
    /// # Errors
    ///
    /// Fails if the OS reactor cannot be opened.
    pub fn build(self) -> Result<Runtime> {
        let context = Arc::new(Context::new()?);

        Ok(Runtime {
            context,
            threads: self.threads,
            buffer_size: self.buffer_size,
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
