//! Kernel I/O port: a FIFO of packets that any number of threads block on.
//!
//! The crate is layered over the object model in `kobject`:
//! * [`Packet`] – an owned, variable-length header plus payload, built from kernel or user memory.
//! * [`IoPort`] – the shared queue, its waiters and the set of live bindings.
//! * observer bindings – deliver a signal packet whenever a bound object's watched signals are active.
//! * [`PortOptions`] – validated creation options.
//! * [`syscalls`] – handle-level entry points that enforce rights and copy across the user boundary.

mod config;
mod observer;
mod packet;
mod port;
pub mod syscalls;

pub use config::PortOptions;
pub use packet::{Packet, PacketHeader, PacketKind, HEADER_LEN, SIGNAL_PAYLOAD_LEN};
pub use port::{IoPort, QueueError, DEFAULT_IO_PORT_RIGHTS};
pub use syscalls::{
    sys_io_port_bind, sys_io_port_create, sys_io_port_queue, sys_io_port_unbind, sys_io_port_wait,
};
