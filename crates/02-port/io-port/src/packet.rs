//! Variable-length packets delivered through an [`IoPort`](crate::IoPort).
//!
//! Wire layout (little endian), identical to what consumers receive:
//!
//! ```text
//! +---------+----------+-------------+----------------------------+
//! | key u64 | kind u32 | payload u32 | payload bytes ...          |
//! +---------+----------+-------------+----------------------------+
//!  0         8          12            16
//! ```
//!
//! A packet owns one contiguous buffer holding the encoded header followed by
//! the payload, plus a decoded copy of the header. Its length never changes
//! after construction.

use std::fmt;

use kobject::user_copy::{copy_from_user, copy_to_user};
use kobject::{alloc, KResult, Signals, Status, UserPtr, UserPtrMut};

/// Size of the encoded [`PacketHeader`].
pub const HEADER_LEN: usize = 16;

/// Payload size of a signal packet: `{ signals u32, reserved u32 }`.
pub const SIGNAL_PAYLOAD_LEN: usize = 8;

/// Origin of a packet.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Posted by trusted kernel code.
    Kernel = 0,
    /// Generated by an observer when watched signals became active.
    Signal = 1,
    /// Copied in from a user buffer.
    User = 2,
}

impl PacketKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(PacketKind::Kernel),
            1 => Some(PacketKind::Signal),
            2 => Some(PacketKind::User),
            _ => None,
        }
    }
}

/// Decoded packet header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    /// Caller-chosen key (the binding key for signal packets).
    pub key: u64,
    pub kind: PacketKind,
    /// Number of payload bytes following the header.
    pub payload_len: u32,
}

impl PacketHeader {
    fn encode_into(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.key.to_le_bytes());
        out[8..12].copy_from_slice(&(self.kind as u32).to_le_bytes());
        out[12..16].copy_from_slice(&self.payload_len.to_le_bytes());
    }

    /// Parses the header at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..HEADER_LEN)?;
        let mut key = [0u8; 8];
        key.copy_from_slice(&raw[0..8]);
        let mut kind = [0u8; 4];
        kind.copy_from_slice(&raw[8..12]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&raw[12..16]);
        Some(Self {
            key: u64::from_le_bytes(key),
            kind: PacketKind::from_u32(u32::from_le_bytes(kind))?,
            payload_len: u32::from_le_bytes(len),
        })
    }
}

/// An owned packet. Dropping it releases its single buffer.
pub struct Packet {
    header: PacketHeader,
    bytes: Vec<u8>,
}

impl Packet {
    /// Builds a packet by copying `payload` from kernel memory.
    pub fn create(kind: PacketKind, key: u64, payload: &[u8]) -> KResult<Self> {
        let payload_len = u32::try_from(payload.len()).map_err(|_| Status::InvalidArgs)?;
        let total = HEADER_LEN
            .checked_add(payload.len())
            .ok_or(Status::InvalidArgs)?;
        let mut bytes = alloc::try_alloc_bytes(total)?;

        let header = PacketHeader {
            key,
            kind,
            payload_len,
        };
        header.encode_into(&mut bytes);
        bytes[HEADER_LEN..].copy_from_slice(payload);
        Ok(Self { header, bytes })
    }

    /// Builds the packet an observer emits when `signals` became active.
    pub fn signal(key: u64, signals: Signals) -> KResult<Self> {
        let mut payload = [0u8; SIGNAL_PAYLOAD_LEN];
        payload[..4].copy_from_slice(&signals.into_raw().to_le_bytes());
        Self::create(PacketKind::Signal, key, &payload)
    }

    /// Builds a packet from `size` bytes of user memory laid out on the wire
    /// format. The caller's key is kept; the kind is forced to
    /// [`PacketKind::User`] and the length field to the real payload length.
    pub fn create_from_user(src: UserPtr<'_>, size: usize) -> KResult<Self> {
        let payload_len = size
            .checked_sub(HEADER_LEN)
            .and_then(|len| u32::try_from(len).ok())
            .ok_or(Status::InvalidArgs)?;
        let mut bytes = alloc::try_alloc_bytes(size)?;
        copy_from_user(&mut bytes, src)?;

        let mut key = [0u8; 8];
        key.copy_from_slice(&bytes[0..8]);
        let header = PacketHeader {
            key: u64::from_le_bytes(key),
            kind: PacketKind::User,
            payload_len,
        };
        header.encode_into(&mut bytes);
        Ok(Self { header, bytes })
    }

    pub fn header(&self) -> PacketHeader {
        self.header
    }

    pub fn key(&self) -> u64 {
        self.header.key
    }

    pub fn kind(&self) -> PacketKind {
        self.header.kind
    }

    /// Total wire length: header plus payload.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    /// Encoded header and payload, as copied out to consumers.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Signals carried by a signal packet.
    pub fn signals(&self) -> Option<Signals> {
        if self.header.kind != PacketKind::Signal {
            return None;
        }
        let raw = self.payload().get(..4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(raw);
        Some(Signals::from_raw(u32::from_le_bytes(buf)))
    }

    /// Copies the packet to `dest`, whose capacity is `*size` bytes.
    ///
    /// Fails without writing when the capacity is smaller than [`Packet::len`];
    /// otherwise stores the length in `*size` and copies.
    pub fn copy_out(&self, dest: &mut UserPtrMut<'_>, size: &mut usize) -> KResult<()> {
        if *size < self.bytes.len() {
            return Err(Status::BufferTooSmall {
                needed: self.bytes.len(),
                capacity: *size,
            });
        }
        *size = self.bytes.len();
        copy_to_user(dest, &self.bytes)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("key", &self.header.key)
            .field("kind", &self.header.kind)
            .field("payload_len", &self.header.payload_len)
            .finish()
    }
}
