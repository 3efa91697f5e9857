use std::any::Any;
use std::sync::Arc;

use crate::{alloc, Dispatcher, DispatcherBase, KResult, Rights, Signals, StateTracker, Status};

/// Rights granted to a freshly created event.
pub const DEFAULT_EVENT_RIGHTS: Rights = Rights::DUPLICATE
    .union(Rights::TRANSFER)
    .union(Rights::READ)
    .union(Rights::WRITE);

/// Signals user code may raise or clear on an event.
const USER_SETTABLE: Signals = Signals::USER_ALL.union(Signals::SIGNALED);

/// Minimal waitable object whose signals are driven by its owner.
pub struct EventDispatcher {
    base: DispatcherBase,
    tracker: StateTracker,
}

impl EventDispatcher {
    pub fn create() -> KResult<(Arc<Self>, Rights)> {
        let event = alloc::try_arc(Self {
            base: DispatcherBase::new(),
            tracker: StateTracker::new(true, Signals::NONE),
        })?;
        Ok((event, DEFAULT_EVENT_RIGHTS))
    }

    /// Clears then sets user signals.
    pub fn signal(&self, clear: Signals, set: Signals) -> KResult<()> {
        if !USER_SETTABLE.contains(clear | set) {
            return Err(Status::InvalidArgs);
        }
        self.tracker.update_state(clear, set);
        Ok(())
    }

    pub fn signals(&self) -> Signals {
        self.tracker.signals()
    }
}

impl Dispatcher for EventDispatcher {
    fn base(&self) -> &DispatcherBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        "event"
    }

    fn state_tracker(&self) -> Option<&StateTracker> {
        Some(&self.tracker)
    }

    fn on_zero_handles(&self) {
        self.tracker.close();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
