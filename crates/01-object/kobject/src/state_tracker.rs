//! Signal source for waitable objects.
//!
//! A [`StateTracker`] holds the current [`Signals`] of one object plus the
//! observers watching them. Observer callbacks run while the tracker lock is
//! held, except [`StateObserver::on_did_cancel`], which runs after the
//! cancelled observers have been unlinked and the lock released. Observers may
//! take their own locks from inside callbacks; they must never call back into
//! the tracker from there.

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{HandleId, KResult, Signals, Status};

type ObserverList = SmallVec<[Arc<dyn StateObserver>; 4]>;

/// Callbacks delivered by a [`StateTracker`] to a registered observer.
pub trait StateObserver: Send + Sync {
    /// Registration succeeded; `initial` is the state at that moment.
    fn on_initialize(&self, initial: Signals);

    /// The tracked state changed to `new_state`.
    fn on_state_change(&self, new_state: Signals);

    /// A handle closed (`Some`) or the whole object is going away (`None`).
    /// Returning true unlinks the observer and schedules `on_did_cancel`.
    fn on_cancel(&self, handle: Option<HandleId>) -> bool;

    /// Runs after the observer was unlinked by a cancellation.
    fn on_did_cancel(&self);
}

struct TrackerInner {
    signals: Signals,
    observers: ObserverList,
    closed: bool,
}

pub struct StateTracker {
    waitable: bool,
    inner: Mutex<TrackerInner>,
}

impl StateTracker {
    pub fn new(waitable: bool, initial: Signals) -> Self {
        Self {
            waitable,
            inner: Mutex::new(TrackerInner {
                signals: initial,
                observers: SmallVec::new(),
                closed: false,
            }),
        }
    }

    pub fn is_waitable(&self) -> bool {
        self.waitable
    }

    pub fn signals(&self) -> Signals {
        self.inner.lock().signals
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    /// Registers `observer` and immediately reports the current state to it.
    ///
    /// Fails with [`Status::BadState`] once the tracker has been closed.
    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) -> KResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Status::BadState);
        }
        observer.on_initialize(inner.signals);
        inner.observers.push(observer);
        Ok(())
    }

    /// Unlinks `observer` without any callback. Returns whether it was linked.
    pub fn remove_observer(&self, observer: &Arc<dyn StateObserver>) -> bool {
        let mut inner = self.inner.lock();
        let target = Arc::as_ptr(observer) as *const ();
        match inner
            .observers
            .iter()
            .position(|o| Arc::as_ptr(o) as *const () == target)
        {
            Some(idx) => {
                inner.observers.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Clears then sets bits and notifies observers if anything changed.
    pub fn update_state(&self, clear: Signals, set: Signals) {
        let mut inner = self.inner.lock();
        let previous = inner.signals;
        let next = previous.difference(clear) | set;
        if next == previous {
            return;
        }
        inner.signals = next;
        for observer in inner.observers.iter() {
            observer.on_state_change(next);
        }
    }

    /// Cancels observers registered through `handle`.
    pub fn cancel(&self, handle: HandleId) {
        self.cancel_matching(Some(handle));
    }

    /// Cancels every observer.
    pub fn cancel_all(&self) {
        self.cancel_matching(None);
    }

    /// Refuses future observers and cancels the current ones.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.cancel_all();
    }

    fn cancel_matching(&self, handle: Option<HandleId>) {
        let mut cancelled = ObserverList::new();
        {
            let mut inner = self.inner.lock();
            let mut idx = 0;
            while idx < inner.observers.len() {
                if inner.observers[idx].on_cancel(handle) {
                    cancelled.push(inner.observers.swap_remove(idx));
                } else {
                    idx += 1;
                }
            }
        }
        for observer in cancelled {
            observer.on_did_cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Signals>>,
        accept_cancel: AtomicBool,
        did_cancel: AtomicUsize,
    }

    impl StateObserver for Recorder {
        fn on_initialize(&self, initial: Signals) {
            self.seen.lock().push(initial);
        }

        fn on_state_change(&self, new_state: Signals) {
            self.seen.lock().push(new_state);
        }

        fn on_cancel(&self, _handle: Option<HandleId>) -> bool {
            self.accept_cancel.load(Ordering::SeqCst)
        }

        fn on_did_cancel(&self) {
            self.did_cancel.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn observers_see_initial_and_changed_state() {
        let tracker = StateTracker::new(true, Signals::WRITABLE);
        let recorder = Arc::new(Recorder::default());
        tracker.add_observer(recorder.clone()).expect("add");

        tracker.update_state(Signals::NONE, Signals::READABLE);
        // No change, no callback.
        tracker.update_state(Signals::NONE, Signals::READABLE);
        tracker.update_state(Signals::WRITABLE, Signals::NONE);

        assert_eq!(
            *recorder.seen.lock(),
            vec![
                Signals::WRITABLE,
                Signals::WRITABLE | Signals::READABLE,
                Signals::READABLE,
            ]
        );
    }

    #[test]
    fn cancel_unlinks_only_accepting_observers() {
        let tracker = StateTracker::new(true, Signals::NONE);
        let keeps = Arc::new(Recorder::default());
        let leaves = Arc::new(Recorder::default());
        leaves.accept_cancel.store(true, Ordering::SeqCst);
        tracker.add_observer(keeps.clone()).expect("add");
        tracker.add_observer(leaves.clone()).expect("add");

        tracker.cancel_all();
        assert_eq!(tracker.observer_count(), 1);
        assert_eq!(keeps.did_cancel.load(Ordering::SeqCst), 0);
        assert_eq!(leaves.did_cancel.load(Ordering::SeqCst), 1);

        let keeps_dyn: Arc<dyn StateObserver> = keeps;
        assert!(tracker.remove_observer(&keeps_dyn));
        assert!(!tracker.remove_observer(&keeps_dyn));
        assert_eq!(tracker.observer_count(), 0);
    }

    #[test]
    fn closed_tracker_rejects_observers() {
        let tracker = StateTracker::new(true, Signals::NONE);
        tracker.close();
        let recorder = Arc::new(Recorder::default());
        assert_eq!(tracker.add_observer(recorder.clone()), Err(Status::BadState));
        assert!(recorder.seen.lock().is_empty());
    }
}
