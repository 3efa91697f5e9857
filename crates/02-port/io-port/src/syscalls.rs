//! Handle-level entry points.
//!
//! These resolve handles to ports, enforce rights and move packets across
//! the user boundary. Everything else is delegated to [`IoPort`].

use std::sync::Arc;

use kobject::{Deadline, Handle, KResult, Rights, Signals, Status, UserPtr, UserPtrMut};

use crate::config::PortOptions;
use crate::packet::Packet;
use crate::port::IoPort;

fn port_from(handle: &Handle, required: Rights) -> KResult<Arc<IoPort>> {
    let port = handle.downcast::<IoPort>().ok_or(Status::WrongType)?;
    handle.check_rights(required)?;
    Ok(port)
}

/// Creates a port and returns the only handle to it.
pub fn sys_io_port_create(options: u32) -> KResult<Handle> {
    let (port, rights) = IoPort::create(PortOptions::from_raw(options))?;
    Ok(Handle::new(port, rights))
}

/// Queues a user packet of `size` bytes read from `packet`.
pub fn sys_io_port_queue(handle: &Handle, packet: UserPtr<'_>, size: usize) -> KResult<()> {
    let port = port_from(handle, Rights::WRITE)?;
    let packet = Packet::create_from_user(packet, size)?;
    port.queue(packet).map_err(Status::from)
}

/// Waits for the next packet and copies it into `packet`.
///
/// `*size` holds the buffer capacity on entry and the packet length on
/// success. A packet that does not fit has already been dequeued and is
/// dropped.
pub fn sys_io_port_wait(
    handle: &Handle,
    deadline: Deadline,
    packet: &mut UserPtrMut<'_>,
    size: &mut usize,
) -> KResult<()> {
    let port = port_from(handle, Rights::READ)?;
    let next = port.wait_deadline(deadline)?;
    next.copy_out(packet, size).map_err(|status| {
        tracing::warn!(key = next.key(), len = next.len(), %status, "dropping undeliverable packet");
        status
    })
}

/// Binds `source`'s `signals` to the port under `key`.
pub fn sys_io_port_bind(port: &Handle, source: &Handle, signals: u32, key: u64) -> KResult<()> {
    let port = port_from(port, Rights::WRITE)?;
    port.bind(source, Signals::from_raw(signals), key)
}

/// Removes the binding of `source` under `key`.
pub fn sys_io_port_unbind(port: &Handle, source: &Handle, key: u64) -> KResult<()> {
    let port = port_from(port, Rights::WRITE)?;
    port.unbind(source, key)
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use kobject::{EventDispatcher, DEFAULT_EVENT_RIGHTS};

    use crate::packet::HEADER_LEN;

    #[test]
    fn create_keeps_options_word() {
        let handle = sys_io_port_create(0xDEAD_0004).expect("create");
        assert!(handle.rights().contains(Rights::READ | Rights::WRITE));
        let port = handle.downcast::<IoPort>().expect("port");
        assert_eq!(port.options().into_raw(), 0xDEAD_0004);
    }

    #[test]
    fn non_port_handle_is_wrong_type() {
        let (event, _) = EventDispatcher::create().expect("event");
        let event_handle = Handle::new(event, DEFAULT_EVENT_RIGHTS);
        let mut buf = [0u8; 32];
        let mut size = buf.len();
        assert_eq!(
            sys_io_port_wait(
                &event_handle,
                Deadline::Infinite,
                &mut UserPtrMut::new(&mut buf),
                &mut size
            ),
            Err(Status::WrongType)
        );
    }

    #[test]
    fn rights_are_enforced() {
        let port = sys_io_port_create(0).expect("create");
        let read_only = Handle::new(Arc::clone(port.dispatcher()), Rights::READ);
        let write_only = Handle::new(Arc::clone(port.dispatcher()), Rights::WRITE);

        let bytes = [0u8; HEADER_LEN];
        assert_eq!(
            sys_io_port_queue(&read_only, UserPtr::new(&bytes), bytes.len()),
            Err(Status::AccessDenied)
        );
        sys_io_port_queue(&write_only, UserPtr::new(&bytes), bytes.len()).expect("queue");

        let mut buf = [0u8; HEADER_LEN];
        let mut size = buf.len();
        assert_eq!(
            sys_io_port_wait(
                &write_only,
                Deadline::Infinite,
                &mut UserPtrMut::new(&mut buf),
                &mut size
            ),
            Err(Status::AccessDenied)
        );
        sys_io_port_wait(
            &read_only,
            Deadline::Infinite,
            &mut UserPtrMut::new(&mut buf),
            &mut size,
        )
        .expect("wait");
        assert_eq!(size, HEADER_LEN);

        let (event, rights) = EventDispatcher::create().expect("event");
        let source = Handle::new(event, rights);
        assert_eq!(
            sys_io_port_bind(&read_only, &source, Signals::USER_0.into_raw(), 1),
            Err(Status::AccessDenied)
        );
        assert_eq!(
            sys_io_port_unbind(&read_only, &source, 1),
            Err(Status::AccessDenied)
        );
    }

    #[test]
    fn oversized_packet_is_consumed_on_short_buffer() {
        let port = sys_io_port_create(0).expect("create");
        let mut wire = vec![0u8; HEADER_LEN + 4];
        wire[..8].copy_from_slice(&9u64.to_le_bytes());
        sys_io_port_queue(&port, UserPtr::new(&wire), wire.len()).expect("queue");

        let mut buf = [0u8; HEADER_LEN];
        let mut size = buf.len();
        assert_eq!(
            sys_io_port_wait(
                &port,
                Deadline::Infinite,
                &mut UserPtrMut::new(&mut buf),
                &mut size
            ),
            Err(Status::BufferTooSmall {
                needed: HEADER_LEN + 4,
                capacity: HEADER_LEN
            })
        );
        let ioport = port.downcast::<IoPort>().expect("port");
        assert_eq!(ioport.queued_count(), 0);
    }
}
