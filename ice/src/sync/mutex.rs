use futures_util::task::AtomicWaker;

use std::cell::UnsafeCell;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::task::{Context, Poll};

/// State word value of an unlocked mutex.
const NOT_LOCKED: usize = 1;
/// State word value of a locked mutex nobody waits on.
///
/// Any other value is a pointer to the most recently pushed [`Waiter`].
const LOCKED_NO_WAITERS: usize = 0;

const WAITING: u8 = 0;
const NOTIFIED: u8 = 1;
const CANCELLED: u8 = 2;

/// A queued lock request.
///
/// The waiter list owns one reference to each record, taken with
/// `Arc::into_raw` when it is pushed.
struct Waiter {
    waker: AtomicWaker,
    status: AtomicU8,
    /// Next record; written by the pusher before publication, then only by
    /// the lock holder.
    next: UnsafeCell<*const Waiter>,
}

unsafe impl Send for Waiter {}
unsafe impl Sync for Waiter {}

impl Waiter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            waker: AtomicWaker::new(),
            status: AtomicU8::new(WAITING),
            next: UnsafeCell::new(ptr::null()),
        })
    }
}

/// A mutual-exclusion lock that suspends instead of blocking.
///
/// Contenders push themselves onto a lock-free LIFO list stored in the
/// state word. The holder detaches that list in one swap and reverses it,
/// so waiters are served in arrival order within each detached batch.
/// Unlocking hands the lock straight to the next waiter.
///
/// `RawMutex` guards no data; see [`Mutex`] for the scoped variant.
pub struct RawMutex {
    state: AtomicUsize,
    /// FIFO cache of waiters, touched only by the lock holder.
    waiters: UnsafeCell<*const Waiter>,
}

unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    /// Creates an unlocked mutex.
    pub const fn new() -> Self {
        Self {
            state: AtomicUsize::new(NOT_LOCKED),
            waiters: UnsafeCell::new(ptr::null()),
        }
    }

    /// Acquires the lock if it is free.
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(
                NOT_LOCKED,
                LOCKED_NO_WAITERS,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Returns `true` while some holder owns the lock.
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != NOT_LOCKED
    }

    /// Acquires the lock, suspending until it is handed over.
    ///
    /// Once the returned future resolves, the caller owns the lock and must
    /// release it with [`unlock`](Self::unlock). Dropping the future before
    /// that withdraws the request.
    pub fn lock(&self) -> RawLock<'_> {
        RawLock {
            mutex: self,
            waiter: None,
            acquired: false,
        }
    }

    /// Releases the lock, handing it to the oldest waiter of the current
    /// batch if there is one.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock.
    pub unsafe fn unlock(&self) {
        loop {
            let mut head = unsafe { *self.waiters.get() };

            if head.is_null() {
                if self.state.load(Ordering::Relaxed) == LOCKED_NO_WAITERS
                    && self
                        .state
                        .compare_exchange(
                            LOCKED_NO_WAITERS,
                            NOT_LOCKED,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                {
                    return;
                }

                // Waiters arrived: detach them and restore arrival order.
                let mut node = self.state.swap(LOCKED_NO_WAITERS, Ordering::Acquire) as *const Waiter;
                while !node.is_null() {
                    let next = unsafe { *(*node).next.get() };
                    unsafe { *(*node).next.get() = head };
                    head = node;
                    node = next;
                }

                if head.is_null() {
                    continue;
                }
            }

            let waiter = unsafe { Arc::from_raw(head) };
            unsafe { *self.waiters.get() = *waiter.next.get() };

            if waiter
                .status
                .compare_exchange(WAITING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                waiter.waker.wake();
                return;
            }

            // The request was withdrawn.
            tracing::trace!("skipping cancelled lock waiter");
        }
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        let mut node = *self.waiters.get_mut();
        while !node.is_null() {
            let waiter = unsafe { Arc::from_raw(node) };
            node = unsafe { *waiter.next.get() };
        }

        let state = *self.state.get_mut();
        if state != NOT_LOCKED {
            let mut node = state as *const Waiter;
            while !node.is_null() {
                let waiter = unsafe { Arc::from_raw(node) };
                node = unsafe { *waiter.next.get() };
            }
        }
    }
}

/// Future returned by [`RawMutex::lock`].
#[must_use = "futures do nothing unless polled"]
pub struct RawLock<'a> {
    mutex: &'a RawMutex,
    waiter: Option<Arc<Waiter>>,
    acquired: bool,
}

impl Future for RawLock<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.acquired {
            return Poll::Ready(());
        }

        if let Some(waiter) = self.waiter.as_ref() {
            waiter.waker.register(cx.waker());
            if waiter.status.load(Ordering::Acquire) == NOTIFIED {
                self.acquired = true;
                return Poll::Ready(());
            }
            return Poll::Pending;
        }

        let mutex = self.mutex;
        let waiter = Waiter::new();
        waiter.waker.register(cx.waker());

        let mut state = mutex.state.load(Ordering::Relaxed);
        loop {
            if state == NOT_LOCKED {
                match mutex.state.compare_exchange(
                    NOT_LOCKED,
                    LOCKED_NO_WAITERS,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        self.acquired = true;
                        return Poll::Ready(());
                    }
                    Err(current) => {
                        state = current;
                        continue;
                    }
                }
            }

            unsafe { *waiter.next.get() = state as *const Waiter };

            match mutex.state.compare_exchange(
                state,
                Arc::as_ptr(&waiter) as usize,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    // The list now owns a reference.
                    let _ = Arc::into_raw(waiter.clone());
                    self.waiter = Some(waiter);
                    return Poll::Pending;
                }
                Err(current) => state = current,
            }
        }
    }
}

impl Drop for RawLock<'_> {
    fn drop(&mut self) {
        if self.acquired {
            return;
        }

        if let Some(waiter) = self.waiter.take() {
            if waiter
                .status
                .compare_exchange(WAITING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // Ownership was handed over before we could withdraw.
                unsafe { self.mutex.unlock() };
            }
        }
    }
}

/// An asynchronous mutex protecting a value of type `T`.
///
/// Tasks that cannot take the lock are suspended and resumed in place
/// when the lock is handed to them; no thread ever blocks.
///
/// # Examples
///
/// ```rust,ignore
/// let counter = Arc::new(Mutex::new(0));
///
/// let mut guard = counter.lock().await;
/// *guard += 1;
/// ```
pub struct Mutex<T> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates an unlocked mutex holding `value`.
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Returns a future resolving to a guard once the lock is acquired.
    pub fn lock(&self) -> LockFuture<'_, T> {
        LockFuture {
            mutex: self,
            raw: self.raw.lock(),
        }
    }

    /// Takes the lock if it is free.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.raw.try_lock().then(|| MutexGuard { mutex: self })
    }

    /// Returns a mutable reference to the value; no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the mutex, returning the value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Future returned by [`Mutex::lock`].
#[must_use = "futures do nothing unless polled"]
pub struct LockFuture<'a, T> {
    mutex: &'a Mutex<T>,
    raw: RawLock<'a>,
}

impl<'a, T> Future for LockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.raw).poll(cx) {
            Poll::Ready(()) => Poll::Ready(MutexGuard { mutex: self.mutex }),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Scoped access to the value of a [`Mutex`]; unlocks on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

unsafe impl<T: Sync> Sync for MutexGuard<'_, T> {}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        unsafe { self.mutex.raw.unlock() };
    }
}
