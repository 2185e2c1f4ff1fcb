//! Synchronization primitives for suspendable code.

mod mutex;

pub use mutex::{LockFuture, Mutex, MutexGuard, RawLock, RawMutex};
