use super::core::Core;

use std::mem;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Vtable of wakers backed by an `Arc<Core>`.
///
/// Waking resumes the task inline on the calling thread, see
/// [`Core::schedule`].
static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

/// Creates a [`Waker`] that resumes `core` when woken.
///
/// The pointer stored in the `RawWaker` comes from `Arc::into_raw`, so every
/// clone owns one strong reference to the core.
pub(crate) fn make_waker(core: Arc<Core>) -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(Arc::into_raw(core) as *const (), &VTABLE)) }
}

fn clone_raw(ptr: *const ()) -> RawWaker {
    let core = unsafe { Arc::<Core>::from_raw(ptr as *const Core) };
    let cloned = core.clone();
    mem::forget(core);

    RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
}

fn wake_raw(ptr: *const ()) {
    let core = unsafe { Arc::<Core>::from_raw(ptr as *const Core) };
    core.schedule();
}

fn wake_by_ref_raw(ptr: *const ()) {
    let core = unsafe { Arc::<Core>::from_raw(ptr as *const Core) };
    core.schedule();
    mem::forget(core);
}

fn drop_raw(ptr: *const ()) {
    unsafe { drop(Arc::<Core>::from_raw(ptr as *const Core)) };
}
