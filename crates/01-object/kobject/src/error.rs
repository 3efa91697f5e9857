//! Status codes shared by every kernel object operation.
//!
//! The object layer keeps a single flat error surface. Each variant maps to one
//! failure class a caller can act on; none of them carry heap data so they can
//! be produced on the allocation-failure path itself.

use thiserror::Error;

/// Convenience result alias for fallible kernel object operations.
pub type KResult<T, E = Status> = Result<T, E>;

/// Failure reported by a kernel object operation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum Status {
    /// An allocation failed. Nothing was constructed.
    #[error("out of memory")]
    NoMemory,

    /// The object does not support the requested operation.
    #[error("operation not supported by this object")]
    NotSupported,

    /// The handle (or handle/key pair) does not name a live binding.
    #[error("bad handle")]
    BadHandle,

    /// The target has no remaining clients and rejects new work.
    #[error("object not available")]
    NotAvailable,

    /// The caller's buffer cannot hold the data.
    #[error("buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// A user pointer faulted or an argument was malformed.
    #[error("invalid arguments")]
    InvalidArgs,

    /// The handle names an object of a different type.
    #[error("wrong object type")]
    WrongType,

    /// The handle lacks the rights required by the operation.
    #[error("access denied")]
    AccessDenied,

    /// The object is in a state where the operation cannot proceed.
    #[error("bad state")]
    BadState,

    /// The deadline passed before the wait was satisfied.
    #[error("timed out")]
    TimedOut,

    /// The wait was aborted from outside.
    #[error("wait canceled")]
    Canceled,
}

impl Status {
    /// Stable negative code used at the syscall boundary.
    pub const fn into_raw(self) -> i32 {
        match self {
            Status::NoMemory => -4,
            Status::NotSupported => -2,
            Status::BadHandle => -11,
            Status::NotAvailable => -31,
            Status::BufferTooSmall { .. } => -103,
            Status::InvalidArgs => -10,
            Status::WrongType => -54,
            Status::AccessDenied => -30,
            Status::BadState => -20,
            Status::TimedOut => -21,
            Status::Canceled => -23,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_are_negative_and_distinct() {
        let all = [
            Status::NoMemory,
            Status::NotSupported,
            Status::BadHandle,
            Status::NotAvailable,
            Status::BufferTooSmall {
                needed: 1,
                capacity: 0,
            },
            Status::InvalidArgs,
            Status::WrongType,
            Status::AccessDenied,
            Status::BadState,
            Status::TimedOut,
            Status::Canceled,
        ];
        let mut codes: Vec<i32> = all.iter().map(|s| s.into_raw()).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn buffer_too_small_reports_sizes() {
        let err = Status::BufferTooSmall {
            needed: 24,
            capacity: 8,
        };
        assert_eq!(err.to_string(), "buffer too small: need 24 bytes, have 8");
    }
}
