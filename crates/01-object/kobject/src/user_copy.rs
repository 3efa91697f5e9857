//! Checked copies across the user/kernel boundary.
//!
//! User memory is modelled as a borrowed region that may be unmapped. A copy
//! either transfers every requested byte or fails with
//! [`Status::InvalidArgs`] without touching the destination.

use crate::{KResult, Status};

/// Read-only view of a user buffer.
#[derive(Clone, Copy, Debug)]
pub struct UserPtr<'a> {
    mem: Option<&'a [u8]>,
}

impl<'a> UserPtr<'a> {
    pub const fn new(mem: &'a [u8]) -> Self {
        Self { mem: Some(mem) }
    }

    /// A pointer into unmapped memory; every copy through it faults.
    pub const fn faulting() -> Self {
        Self { mem: None }
    }

    /// Mapped length, or zero for a faulting pointer.
    pub fn mapped_len(&self) -> usize {
        self.mem.map_or(0, <[u8]>::len)
    }
}

/// Writable view of a user buffer.
#[derive(Debug)]
pub struct UserPtrMut<'a> {
    mem: Option<&'a mut [u8]>,
}

impl<'a> UserPtrMut<'a> {
    pub fn new(mem: &'a mut [u8]) -> Self {
        Self { mem: Some(mem) }
    }

    pub const fn faulting() -> Self {
        Self { mem: None }
    }

    pub fn mapped_len(&self) -> usize {
        self.mem.as_deref().map_or(0, <[u8]>::len)
    }
}

/// Fills `dst` from the start of `src`.
pub fn copy_from_user(dst: &mut [u8], src: UserPtr<'_>) -> KResult<()> {
    let mem = src.mem.ok_or(Status::InvalidArgs)?;
    let bytes = mem.get(..dst.len()).ok_or(Status::InvalidArgs)?;
    dst.copy_from_slice(bytes);
    Ok(())
}

/// Writes all of `src` to the start of `dst`.
pub fn copy_to_user(dst: &mut UserPtrMut<'_>, src: &[u8]) -> KResult<()> {
    let mem = dst.mem.as_deref_mut().ok_or(Status::InvalidArgs)?;
    let out = mem.get_mut(..src.len()).ok_or(Status::InvalidArgs)?;
    out.copy_from_slice(src);
    Ok(())
}
