//! Kernel object model shared by every dispatcher.
//!
//! This crate provides the collaborators an event port is built against:
//! * [`Dispatcher`] / [`Handle`] – reference-counted objects and the capabilities naming them.
//! * [`StateTracker`] / [`StateObserver`] – per-object signal state and its observers.
//! * [`WaitEvent`] – wake-one event with deadlines and sticky cancellation.
//! * [`user_copy`] – checked copies across the user/kernel boundary.
//! * [`alloc`] – fallible allocation with a test fault point.
//! * [`Status`] – the flat error surface returned by every operation.

pub mod alloc;
mod dispatcher;
mod error;
mod event_object;
mod rights;
mod signals;
mod state_tracker;
pub mod user_copy;
pub mod wait;

pub use dispatcher::{Dispatcher, DispatcherBase, Handle, HandleId, Koid};
pub use error::{KResult, Status};
pub use event_object::{EventDispatcher, DEFAULT_EVENT_RIGHTS};
pub use rights::Rights;
pub use signals::Signals;
pub use state_tracker::{StateObserver, StateTracker};
pub use user_copy::{UserPtr, UserPtrMut};
pub use wait::{Deadline, WaitEvent};
