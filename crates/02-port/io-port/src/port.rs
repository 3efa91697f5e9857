//! The port: one FIFO of packets shared by any number of producers and
//! consumers, plus the set of observers feeding it.
//!
//! A single mutex covers the queue, the observer set and the `no_clients`
//! flag. It is held only for short, non-blocking critical sections; waiting,
//! user copies and tracker calls all happen outside it. When a tracker calls
//! into the port (an observer queueing a signal packet) the tracker lock is
//! already held, so the port never calls into a tracker while locked.

use std::any::Any;
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use kobject::{
    alloc, Deadline, Dispatcher, DispatcherBase, Handle, KResult, Rights, Signals, StateObserver,
    Status, WaitEvent,
};
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::PortOptions;
use crate::observer::{IoPortObserver, ObserverPhase};
use crate::packet::Packet;

/// Rights granted to a freshly created port.
pub const DEFAULT_IO_PORT_RIGHTS: Rights = Rights::DUPLICATE
    .union(Rights::TRANSFER)
    .union(Rights::READ)
    .union(Rights::WRITE);

/// A rejected [`IoPort::queue`]. The port never took ownership of `packet`.
#[derive(Debug, Error)]
#[error("queue rejected: {status}")]
pub struct QueueError {
    pub status: Status,
    pub packet: Packet,
}

impl From<QueueError> for Status {
    fn from(err: QueueError) -> Status {
        err.status
    }
}

#[derive(Default)]
struct PortInner {
    packets: VecDeque<Packet>,
    observers: Vec<Arc<IoPortObserver>>,
    no_clients: bool,
}

pub struct IoPort {
    base: DispatcherBase,
    options: PortOptions,
    inner: Mutex<PortInner>,
    event: WaitEvent,
}

impl IoPort {
    /// Allocates a port and returns it with its default rights.
    pub fn create(options: PortOptions) -> KResult<(Arc<Self>, Rights)> {
        let port = alloc::try_arc(Self {
            base: DispatcherBase::new(),
            options,
            inner: Mutex::new(PortInner::default()),
            event: WaitEvent::new(),
        })?;
        tracing::debug!(koid = port.base.koid().into_raw(), "io port created");
        Ok((port, DEFAULT_IO_PORT_RIGHTS))
    }

    pub fn options(&self) -> PortOptions {
        self.options
    }

    /// Appends `packet` and wakes at most one waiter.
    ///
    /// Once the port has no clients the packet is handed back in the error.
    pub fn queue(&self, packet: Packet) -> Result<(), QueueError> {
        let woken = self.enqueue(packet).map_err(|err| {
            tracing::warn!(key = err.packet.key(), "queue on port without clients");
            err
        })?;
        if woken > 0 {
            // Give the woken consumer a chance to run before we continue producing.
            std::thread::yield_now();
        }
        Ok(())
    }

    /// Queue path for observers. The caller holds its signal source's lock,
    /// so this never yields.
    pub(crate) fn queue_signal(&self, packet: Packet) -> Result<(), QueueError> {
        self.enqueue(packet).map(drop).map_err(|err| {
            tracing::debug!(key = err.packet.key(), "signal packet for port without clients");
            err
        })
    }

    fn enqueue(&self, packet: Packet) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock();
        if inner.no_clients {
            return Err(QueueError {
                status: Status::NotAvailable,
                packet,
            });
        }
        tracing::trace!(key = packet.key(), kind = ?packet.kind(), "packet queued");
        inner.packets.push_back(packet);
        Ok(self.event.signal())
    }

    /// Blocks until a packet is available and returns the oldest one.
    pub fn wait(&self) -> KResult<Packet> {
        self.wait_deadline(Deadline::Infinite)
    }

    /// Like [`IoPort::wait`], but gives up with [`Status::TimedOut`] at `deadline`.
    pub fn wait_deadline(&self, deadline: Deadline) -> KResult<Packet> {
        loop {
            let next = {
                let mut inner = self.inner.lock();
                let next = inner.packets.pop_front();
                if next.is_some() && !inner.packets.is_empty() {
                    // Signals latched while nobody was parked coalesce; pass
                    // the wake on so a leftover packet is not stranded.
                    self.event.signal();
                }
                next
            };
            if let Some(packet) = next {
                tracing::trace!(key = packet.key(), kind = ?packet.kind(), "packet dequeued");
                return Ok(packet);
            }
            // A wake is only a hint; the queue is re-checked under the lock.
            self.event.wait(deadline)?;
        }
    }

    /// Delivers packets for `signals` on `handle`'s object, tagged with `key`.
    ///
    /// The same (handle, key) pair may be bound more than once.
    pub fn bind(self: &Arc<Self>, handle: &Handle, signals: Signals, key: u64) -> KResult<()> {
        let tracker = handle
            .dispatcher()
            .state_tracker()
            .filter(|tracker| tracker.is_waitable())
            .ok_or(Status::NotSupported)?;

        let observer = alloc::try_arc(IoPortObserver::new(
            Arc::clone(self),
            handle.id(),
            signals,
            key,
        ))?;
        self.inner.lock().observers.push(Arc::clone(&observer));

        let as_state_observer: Arc<dyn StateObserver> = observer.clone();
        if let Err(status) = tracker.add_observer(Arc::clone(&as_state_observer)) {
            if observer.leave_new(ObserverPhase::Cancelled) == ObserverPhase::New {
                self.cancel_observer(&observer);
            }
            tracing::debug!(key, %status, "bind failed to register with signal source");
            return Err(status);
        }

        // An unbind that ran between the two registrations could not unlink
        // us from the tracker yet.
        if observer.phase() == ObserverPhase::Unbound {
            tracker.remove_observer(&as_state_observer);
        }

        tracing::debug!(
            key,
            handle = handle.id().into_raw(),
            signals = signals.into_raw(),
            "observer bound"
        );
        Ok(())
    }

    /// Removes the binding for (`handle`, `key`).
    ///
    /// Fails with [`Status::BadHandle`] when there is none. Succeeds without
    /// further work when a concurrent cancellation already claimed it.
    pub fn unbind(&self, handle: &Handle, key: u64) -> KResult<()> {
        let observer = {
            let mut inner = self.inner.lock();
            let idx = inner
                .observers
                .iter()
                .position(|o| o.handle() == handle.id() && o.key() == key)
                .ok_or(Status::BadHandle)?;

            if inner.observers[idx].leave_new(ObserverPhase::Unbound) != ObserverPhase::New {
                tracing::trace!(key, "unbind lost to cancellation");
                return Ok(());
            }
            inner.observers.swap_remove(idx)
        };

        let observer: Arc<dyn StateObserver> = observer;
        if let Some(tracker) = handle.dispatcher().state_tracker() {
            tracker.remove_observer(&observer);
        }
        tracing::debug!(key, handle = handle.id().into_raw(), "observer unbound");
        Ok(())
    }

    /// Unlinks an observer whose cancellation won the teardown race.
    pub(crate) fn cancel_observer(&self, observer: &IoPortObserver) {
        let removed = {
            let mut inner = self.inner.lock();
            inner
                .observers
                .iter()
                .position(|o| std::ptr::eq(Arc::as_ptr(o), observer))
                .map(|idx| inner.observers.swap_remove(idx))
        };
        if removed.is_some() {
            tracing::debug!(key = observer.key(), "observer cancelled");
        }
    }

    /// Number of packets waiting to be consumed.
    pub fn queued_count(&self) -> usize {
        self.inner.lock().packets.len()
    }

    /// Number of observers currently in the port's set.
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    pub fn has_clients(&self) -> bool {
        !self.inner.lock().no_clients
    }
}

impl Dispatcher for IoPort {
    fn base(&self) -> &DispatcherBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        "io-port"
    }

    fn on_zero_handles(&self) {
        let discarded = {
            let mut inner = self.inner.lock();
            inner.no_clients = true;
            mem::take(&mut inner.packets)
        };
        // Parked consumers can no longer be fed.
        self.event.cancel();
        tracing::debug!(
            koid = self.base.koid().into_raw(),
            discarded = discarded.len(),
            "io port has no clients"
        );
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Drop for IoPort {
    fn drop(&mut self) {
        // Observers keep the port alive, so none can remain here.
        debug_assert!(self.inner.get_mut().observers.is_empty());
    }
}
