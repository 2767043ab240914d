//! Control-channel commands, issued through an ioctl on the `/.ifsctl`
//! file by the companion admin tool.

/// `_IOW('E', 0, size_t)`: dump all four indexes to the log.
pub const IFSIOC_PRINTDB: u32 = 0x4008_4500;

/// `_IOW('E', 1, size_t)`: run the L1 eviction pass.
pub const IFSIOC_EVICT: u32 = 0x4008_4501;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    PrintDb,
    Evict,
}

impl ControlCommand {
    /// Decode a raw ioctl opcode; unknown opcodes are a bad request.
    pub fn from_raw(cmd: u32) -> Option<Self> {
        match cmd {
            IFSIOC_PRINTDB => Some(Self::PrintDb),
            IFSIOC_EVICT => Some(Self::Evict),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_decode() {
        assert_eq!(ControlCommand::from_raw(IFSIOC_PRINTDB), Some(ControlCommand::PrintDb));
        assert_eq!(ControlCommand::from_raw(IFSIOC_EVICT), Some(ControlCommand::Evict));
        assert_eq!(ControlCommand::from_raw(0xdead_beef), None);
    }
}
