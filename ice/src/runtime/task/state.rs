/// The task is suspended and waits for a wake-up.
///
/// Its future is not being polled by anyone.
pub(crate) const IDLE: usize = 0;

/// The task is being polled.
///
/// At most one thread observes this state at a time; that thread has
/// exclusive access to the future.
pub(crate) const RUNNING: usize = 1;

/// The task was woken while it was being polled.
///
/// The polling thread polls again instead of going idle.
pub(crate) const NOTIFIED: usize = 2;

/// The future returned `Poll::Ready` or was dropped.
///
/// Wake-ups are ignored from here on.
pub(crate) const COMPLETED: usize = 3;

/// The task was cancelled while it was being polled.
///
/// The polling thread drops the future as soon as the poll returns.
pub(crate) const CANCELLED: usize = 4;
