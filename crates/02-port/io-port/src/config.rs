/// Creation options for an [`IoPort`](crate::IoPort): the raw `options` word
/// passed at creation, kept as given.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortOptions(u32);

impl PortOptions {
    pub const DEFAULT: PortOptions = PortOptions(0);

    pub const fn from_raw(raw: u32) -> Self {
        PortOptions(raw)
    }

    pub const fn into_raw(self) -> u32 {
        self.0
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::IoPort;

    #[test]
    fn any_options_word_is_kept() {
        for raw in [0, 1, 0x8000_0000, u32::MAX] {
            let (port, _) = IoPort::create(PortOptions::from_raw(raw)).expect("create");
            assert_eq!(port.options().into_raw(), raw);
        }
        assert_eq!(PortOptions::default(), PortOptions::DEFAULT);
    }
}
