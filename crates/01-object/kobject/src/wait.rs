//! Auto-unsignalling wait event used to park kernel threads.
//!
//! A [`WaitEvent`] releases at most one waiter per [`WaitEvent::signal`]. When
//! nobody is parked the signal latches and is consumed by the next waiter, so a
//! signal raised between "observed empty" and "went to sleep" is never lost.
//! Waking is a hint: callers re-validate their own condition afterwards.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::{KResult, Status};

/// Point in time after which a wait gives up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deadline {
    Infinite,
    At(Instant),
}

impl Deadline {
    /// Deadline `timeout` from now; saturates to [`Deadline::Infinite`].
    pub fn after(timeout: Duration) -> Self {
        Instant::now()
            .checked_add(timeout)
            .map_or(Deadline::Infinite, Deadline::At)
    }
}

#[derive(Default)]
struct EventState {
    signaled: bool,
    waiters: usize,
    pending_wakes: usize,
    canceled: bool,
}

/// Wake-one event with a sticky cancellation state.
#[derive(Default)]
pub struct WaitEvent {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl WaitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases one parked waiter, or latches the event if none is parked.
    /// Latched signals coalesce: callers that consume a wake and leave work
    /// behind must signal again to pass it on.
    ///
    /// Returns the number of threads woken (0 or 1).
    pub fn signal(&self) -> usize {
        let mut state = self.state.lock();
        if state.canceled {
            return 0;
        }
        if state.waiters > state.pending_wakes {
            state.pending_wakes += 1;
            self.cond.notify_one();
            1
        } else {
            state.signaled = true;
            0
        }
    }

    /// Parks until signalled, cancelled, or `deadline` passes.
    pub fn wait(&self, deadline: Deadline) -> KResult<()> {
        let mut state = self.state.lock();
        if state.canceled {
            return Err(Status::Canceled);
        }
        if state.signaled {
            state.signaled = false;
            return Ok(());
        }

        state.waiters += 1;
        let result = loop {
            if state.canceled {
                break Err(Status::Canceled);
            }
            if state.pending_wakes > 0 {
                state.pending_wakes -= 1;
                break Ok(());
            }
            match deadline {
                Deadline::Infinite => self.cond.wait(&mut state),
                Deadline::At(when) => {
                    if self.cond.wait_until(&mut state, when).timed_out() {
                        // A wake that raced the timeout still belongs to us.
                        if state.pending_wakes > 0 {
                            state.pending_wakes -= 1;
                            break Ok(());
                        }
                        break Err(Status::TimedOut);
                    }
                }
            }
        };
        state.waiters -= 1;
        result
    }

    /// Fails every current and future wait with [`Status::Canceled`].
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.canceled = true;
        state.signaled = false;
        self.cond.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        self.state.lock().canceled
    }

    /// Number of threads currently parked.
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters
    }
}
