//! Signal bitsets observed on waitable objects.

use bitflags::bitflags;

bitflags! {
    /// A set of active (or watched) conditions on a kernel object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Signals: u32 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const PEER_CLOSED = 1 << 2;
        const SIGNALED = 1 << 3;

        const USER_0 = 1 << 24;
        const USER_1 = 1 << 25;
        const USER_2 = 1 << 26;
        const USER_3 = 1 << 27;
        const USER_4 = 1 << 28;
        const USER_5 = 1 << 29;
        const USER_6 = 1 << 30;
        const USER_7 = 1 << 31;

        /// Every user-settable bit.
        const USER_ALL = 0xFF00_0000;
    }
}

impl Signals {
    pub const NONE: Signals = Signals::empty();

    /// Raw masks from callers keep bits this kernel does not name.
    pub const fn from_raw(raw: u32) -> Self {
        Signals::from_bits_retain(raw)
    }

    pub const fn into_raw(self) -> u32 {
        self.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_all_covers_each_user_bit() {
        let each = Signals::USER_0
            | Signals::USER_1
            | Signals::USER_2
            | Signals::USER_3
            | Signals::USER_4
            | Signals::USER_5
            | Signals::USER_6
            | Signals::USER_7;
        assert_eq!(each, Signals::USER_ALL);
        assert!(!Signals::USER_ALL.intersects(Signals::READABLE | Signals::SIGNALED));
    }

    #[test]
    fn unknown_raw_bits_survive() {
        let raw = Signals::READABLE.bits() | (1 << 12);
        assert_eq!(Signals::from_raw(raw).into_raw(), raw);
        assert!(Signals::from_raw(raw).contains(Signals::READABLE));
    }
}
