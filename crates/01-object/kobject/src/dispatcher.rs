//! Reference-counted object base and the handles that name it.
//!
//! Every kernel object implements [`Dispatcher`]. A [`Handle`] pins the object
//! through an `Arc` and counts itself in the object's [`DispatcherBase`]. When
//! a handle closes, observers registered through it are cancelled; when the
//! last one closes the object's `on_zero_handles` hook runs. The object itself
//! lives on until its final `Arc` is released.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::{KResult, Rights, StateTracker, Status};

static NEXT_KOID: AtomicU64 = AtomicU64::new(1);
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Kernel object id, unique for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Koid(u64);

impl Koid {
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

/// Identity of one handle. Two handles to the same object differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

/// Bookkeeping shared by every dispatcher.
pub struct DispatcherBase {
    koid: Koid,
    handle_count: AtomicU32,
}

impl DispatcherBase {
    pub fn new() -> Self {
        Self {
            koid: Koid(NEXT_KOID.fetch_add(1, Ordering::Relaxed)),
            handle_count: AtomicU32::new(0),
        }
    }

    pub fn koid(&self) -> Koid {
        self.koid
    }

    pub fn handle_count(&self) -> u32 {
        self.handle_count.load(Ordering::Acquire)
    }

    fn add_handle(&self) {
        self.handle_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns true when the released handle was the last one.
    fn remove_handle(&self) -> bool {
        let previous = self.handle_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "handle count underflow");
        previous == 1
    }
}

impl Default for DispatcherBase {
    fn default() -> Self {
        Self::new()
    }
}

/// A kernel object reachable through handles.
pub trait Dispatcher: Send + Sync + 'static {
    fn base(&self) -> &DispatcherBase;

    /// Short, stable object type name used in logs.
    fn type_name(&self) -> &'static str;

    /// Signal source for waitable objects.
    fn state_tracker(&self) -> Option<&StateTracker> {
        None
    }

    /// Runs once, when the last handle to the object closes.
    fn on_zero_handles(&self) {}

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Capability naming one kernel object with a set of rights.
///
/// Handles cannot be duplicated; dropping one closes it.
pub struct Handle {
    id: HandleId,
    rights: Rights,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Handle {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, rights: Rights) -> Self {
        dispatcher.base().add_handle();
        Self {
            id: HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)),
            rights,
            dispatcher,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn rights(&self) -> Rights {
        self.rights
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Fails with [`Status::AccessDenied`] unless every bit of `required` is held.
    pub fn check_rights(&self, required: Rights) -> KResult<()> {
        if self.rights.contains(required) {
            Ok(())
        } else {
            Err(Status::AccessDenied)
        }
    }

    /// Typed view of the object, if it is a `T`.
    pub fn downcast<T: Dispatcher>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.dispatcher).into_any().downcast::<T>().ok()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("koid", &self.dispatcher.base().koid())
            .field("type", &self.dispatcher.type_name())
            .field("rights", &self.rights)
            .finish()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(tracker) = self.dispatcher.state_tracker() {
            tracker.cancel(self.id);
        }
        if self.dispatcher.base().remove_handle() {
            tracing::debug!(
                koid = self.dispatcher.base().koid().into_raw(),
                object = self.dispatcher.type_name(),
                "last handle closed"
            );
            self.dispatcher.on_zero_handles();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        base: DispatcherBase,
        zero_handle_calls: AtomicUsize,
    }

    impl Dispatcher for Counting {
        fn base(&self) -> &DispatcherBase {
            &self.base
        }

        fn type_name(&self) -> &'static str {
            "counting"
        }

        fn on_zero_handles(&self) {
            self.zero_handle_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[test]
    fn zero_handles_fires_once_on_last_close() {
        let object = Arc::new(Counting::default());
        let a = Handle::new(object.clone(), Rights::READ);
        let b = Handle::new(object.clone(), Rights::READ);
        assert_ne!(a.id(), b.id());
        assert_eq!(object.base().handle_count(), 2);

        drop(a);
        assert_eq!(object.zero_handle_calls.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(object.zero_handle_calls.load(Ordering::SeqCst), 1);
        assert_eq!(object.base().handle_count(), 0);
    }

    #[test]
    fn rights_and_downcast() {
        let object = Arc::new(Counting::default());
        let handle = Handle::new(object.clone(), Rights::READ | Rights::DUPLICATE);
        assert!(handle.check_rights(Rights::READ).is_ok());
        assert_eq!(handle.check_rights(Rights::WRITE), Err(Status::AccessDenied));

        let typed = handle.downcast::<Counting>().expect("downcast");
        assert!(Arc::ptr_eq(&typed, &object));
    }
}
