//! Fallible allocation helpers.
//!
//! Kernel objects never abort on allocation failure: every constructor that
//! allocates goes through these helpers and reports [`Status::NoMemory`]
//! instead. A thread-local fault point lets tests force the failure path
//! deterministically; it only affects allocations made on the thread that
//! armed it.

use std::cell::Cell;
use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::Arc;

use crate::{KResult, Status};

thread_local! {
    static FAIL_AFTER: Cell<Option<u32>> = const { Cell::new(None) };
}

/// Armed fault point. Allocations on this thread fail until the guard drops.
#[must_use = "the fault point is disarmed when the guard is dropped"]
pub struct FailPoint {
    previous: Option<u32>,
    // Tied to the arming thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for FailPoint {
    fn drop(&mut self) {
        FAIL_AFTER.with(|slot| slot.set(self.previous));
    }
}

/// Lets `successes` allocations through on this thread, then fails every
/// subsequent one while the returned guard is alive.
pub fn fail_after(successes: u32) -> FailPoint {
    let previous = FAIL_AFTER.with(|slot| slot.replace(Some(successes)));
    FailPoint {
        previous,
        _not_send: PhantomData,
    }
}

/// Fails every allocation on this thread while the returned guard is alive.
pub fn fail_next() -> FailPoint {
    fail_after(0)
}

fn check(bytes: usize) -> KResult<()> {
    let fail = FAIL_AFTER.with(|slot| match slot.get() {
        Some(0) => true,
        Some(n) => {
            slot.set(Some(n - 1));
            false
        }
        None => false,
    });
    if fail {
        tracing::trace!(bytes, "injected allocation failure");
        return Err(Status::NoMemory);
    }
    Ok(())
}

/// Allocates a zero-filled buffer of exactly `len` bytes.
pub fn try_alloc_bytes(len: usize) -> KResult<Vec<u8>> {
    check(len)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Status::NoMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Moves `value` into a new reference-counted allocation.
pub fn try_arc<T>(value: T) -> KResult<Arc<T>> {
    check(size_of::<T>())?;
    Ok(Arc::new(value))
}
