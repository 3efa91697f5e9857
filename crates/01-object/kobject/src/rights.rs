use bitflags::bitflags;

bitflags! {
    /// Capability bits attached to a [`Handle`](crate::Handle).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        const DUPLICATE = 1 << 0;
        const TRANSFER = 1 << 1;
        const READ = 1 << 2;
        const WRITE = 1 << 3;
    }
}

impl Rights {
    pub const NONE: Rights = Rights::empty();

    /// Keeps unknown bits so a raw rights word survives a round trip.
    pub const fn from_raw(raw: u32) -> Self {
        Rights::from_bits_retain(raw)
    }

    pub const fn into_raw(self) -> u32 {
        self.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_checks_every_bit() {
        let rw = Rights::READ | Rights::WRITE;
        assert!(rw.contains(Rights::READ));
        assert!(rw.contains(Rights::READ | Rights::WRITE));
        assert!(!rw.contains(Rights::READ | Rights::TRANSFER));
        assert!(rw.contains(Rights::NONE));
    }

    #[test]
    fn debug_lists_names() {
        assert_eq!(
            format!("{:?}", Rights::READ | Rights::DUPLICATE),
            "Rights(DUPLICATE | READ)"
        );
    }

    #[test]
    fn raw_words_round_trip() {
        assert_eq!(Rights::from_raw(0b1100), Rights::READ | Rights::WRITE);
        assert_eq!(Rights::from_raw(1 << 20).into_raw(), 1 << 20);
    }
}
