use crate::{
    consts::commands::{CMD_BASE, CMD_INDEX_MASK},
    ErrorFor, SdCard, SdCardConfig, Transport,
};

/// Size of a command frame on the wire.
pub const FRAME_SIZE: usize = 6;

/// Command frame: start bits and index, big-endian argument, CRC byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame([u8; FRAME_SIZE]);

impl CommandFrame {
    /// Builds the frame of command `index` (0..=63).
    ///
    /// `crc` is the complete last byte, CRC-7 and stop bit.
    pub fn new(index: u8, arg: u32, crc: u8) -> Self {
        let arg = arg.to_be_bytes();
        CommandFrame([
            CMD_BASE | (index & CMD_INDEX_MASK),
            arg[0],
            arg[1],
            arg[2],
            arg[3],
            crc,
        ])
    }

    /// Command index, start bits stripped.
    pub fn index(&self) -> u8 {
        self.0[0] & CMD_INDEX_MASK
    }

    /// Bytes in wire order.
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }
}

impl<T: Transport, C: SdCardConfig> SdCard<T, C> {
    /// Send a command frame, select must already be asserted.
    pub(crate) fn send_command(&self, index: u8, arg: u32, crc: u8) -> Result<(), ErrorFor<T>> {
        self.send_slice(CommandFrame::new(index, arg, crc).as_bytes())
    }
}
