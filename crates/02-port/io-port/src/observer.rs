//! Bindings between a watched object's signals and a port.
//!
//! An [`IoPortObserver`] is linked from two places while it is live: the
//! port's observer set and the watched object's [`StateTracker`]. It can be
//! torn down from either side: `IoPort::unbind` or a cancellation delivered
//! by the tracker when the watched handle closes. The two paths race on one
//! compare-and-swap out of [`ObserverPhase::New`]; only the winner unlinks
//! the observer from the port, and the loser returns without touching it.
//!
//! ```text
//!             unbind wins
//!   New ──────────────────► Unbound
//!    │
//!    │ cancellation wins
//!    ▼
//!  Cancelled
//! ```
//!
//! [`StateTracker`]: kobject::StateTracker

use std::sync::Arc;

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicU8, Ordering};
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicU8, Ordering};

use kobject::{HandleId, Signals, StateObserver};

use crate::packet::Packet;
use crate::port::IoPort;

/// Lifecycle of an observer. `Unbound` and `Cancelled` are terminal.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverPhase {
    New = 0,
    Unbound = 1,
    Cancelled = 2,
}

impl ObserverPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ObserverPhase::New,
            1 => ObserverPhase::Unbound,
            _ => ObserverPhase::Cancelled,
        }
    }
}

/// Atomic [`ObserverPhase`] that leaves `New` exactly once.
pub(crate) struct ObserverState(AtomicU8);

impl ObserverState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ObserverPhase::New as u8))
    }

    pub(crate) fn load(&self) -> ObserverPhase {
        ObserverPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Attempts `New -> to` and returns the phase seen before the attempt.
    /// The caller owns teardown iff the result is `New`.
    pub(crate) fn leave_new(&self, to: ObserverPhase) -> ObserverPhase {
        debug_assert_ne!(to, ObserverPhase::New);
        match self.0.compare_exchange(
            ObserverPhase::New as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => ObserverPhase::New,
            Err(previous) => ObserverPhase::from_u8(previous),
        }
    }
}

pub(crate) struct IoPortObserver {
    port: Arc<IoPort>,
    handle: HandleId,
    watched: Signals,
    key: u64,
    state: ObserverState,
}

impl IoPortObserver {
    pub(crate) fn new(port: Arc<IoPort>, handle: HandleId, watched: Signals, key: u64) -> Self {
        Self {
            port,
            handle,
            watched,
            key,
            state: ObserverState::new(),
        }
    }

    pub(crate) fn handle(&self) -> HandleId {
        self.handle
    }

    pub(crate) fn key(&self) -> u64 {
        self.key
    }

    pub(crate) fn phase(&self) -> ObserverPhase {
        self.state.load()
    }

    pub(crate) fn leave_new(&self, to: ObserverPhase) -> ObserverPhase {
        self.state.leave_new(to)
    }

    /// Posts a signal packet if any watched signal is active.
    fn maybe_queue(&self, state: Signals) {
        if self.phase() != ObserverPhase::New {
            return;
        }
        let satisfied = state & self.watched;
        if satisfied.is_empty() {
            return;
        }

        let packet = match Packet::signal(self.key, satisfied) {
            Ok(packet) => packet,
            Err(status) => {
                tracing::warn!(key = self.key, %status, "dropping signal packet");
                return;
            }
        };
        tracing::trace!(
            key = self.key,
            signals = satisfied.into_raw(),
            "observer queueing signal packet"
        );
        if let Err(err) = self.port.queue_signal(packet) {
            tracing::trace!(key = self.key, status = %err.status, "port rejected signal packet");
        }
    }
}

impl StateObserver for IoPortObserver {
    fn on_initialize(&self, initial: Signals) {
        self.maybe_queue(initial);
    }

    fn on_state_change(&self, new_state: Signals) {
        self.maybe_queue(new_state);
    }

    fn on_cancel(&self, handle: Option<HandleId>) -> bool {
        if handle.is_some_and(|closed| closed != self.handle) {
            return false;
        }
        // Losing means unbind already owns teardown, including unlinking us
        // from the tracker.
        self.leave_new(ObserverPhase::Cancelled) == ObserverPhase::New
    }

    fn on_did_cancel(&self) {
        self.port.cancel_observer(self);
    }
}

impl Drop for IoPortObserver {
    fn drop(&mut self) {
        tracing::trace!(key = self.key, phase = ?self.phase(), "observer destroyed");
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn leaves_new_exactly_once() {
        let state = ObserverState::new();
        assert_eq!(state.load(), ObserverPhase::New);
        assert_eq!(state.leave_new(ObserverPhase::Unbound), ObserverPhase::New);
        assert_eq!(state.load(), ObserverPhase::Unbound);
        assert_eq!(
            state.leave_new(ObserverPhase::Cancelled),
            ObserverPhase::Unbound
        );
        assert_eq!(state.load(), ObserverPhase::Unbound);
    }

    #[test]
    fn racing_threads_elect_one_winner() {
        for _ in 0..200 {
            let state = Arc::new(ObserverState::new());
            let contenders: Vec<_> = [ObserverPhase::Unbound, ObserverPhase::Cancelled]
                .into_iter()
                .map(|to| {
                    let state = Arc::clone(&state);
                    thread::spawn(move || state.leave_new(to) == ObserverPhase::New)
                })
                .collect();
            let wins = contenders
                .into_iter()
                .map(|t| t.join().expect("join"))
                .filter(|won| *won)
                .count();
            assert_eq!(wins, 1);
            assert_ne!(state.load(), ObserverPhase::New);
        }
    }
}
