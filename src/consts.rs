/// Size of a data block in bytes.
pub const BLOCK_SIZE: usize = 512;

pub mod commands {
    /// Frame start bits, ORed into the command index.
    pub const CMD_BASE: u8 = 0x40;
    /// Mask of the 6-bit command index.
    pub const CMD_INDEX_MASK: u8 = 0x3F;
    /// GO_IDLE_STATE - init card in spi mode if CS low.
    pub const CMD0: u8 = 0;
    /// SEND_OP_COND - legacy initialization process.
    pub const CMD1: u8 = 1;
    /// SEND_IF_COND - verify SD Memory Card interface operating condition.
    pub const CMD8: u8 = 8;
    /// SET_BLOCKLEN - set the block length of a standard capacity card.
    pub const CMD16: u8 = 16;
    /// WRITE_BLOCK - write a single data block to the card.
    pub const CMD24: u8 = 24;
    /// SD_SEND_OP_COND - Sends host capacity support information and activates
    /// the card's initialization process. Must follow CMD55.
    pub const ACMD41: u8 = 41;
    /// APP_CMD - escape for application specific command.
    pub const CMD55: u8 = 55;
    /// READ_OCR - read the OCR register of a card.
    pub const CMD58: u8 = 58;
}

pub mod args {
    /// CMD8 argument: 2.7-3.6V supply range and the check pattern.
    pub const IF_COND: u32 = 0x0000_01AA;
    /// Check pattern echoed back in the last byte of the R7 payload.
    pub const CHECK_PATTERN: u8 = 0xAA;
    /// ACMD41 argument with the host capacity support bit set.
    pub const HCS: u32 = 0x4000_0000;
}

pub mod crc {
    use crate::crc::frame_crc;

    use super::{args, commands};

    /// Framing byte of CMD0, the one command the card always CRC checks.
    pub const CMD0: u8 = frame_crc(commands::CMD0, 0x0000_0000);
    /// Framing byte of CMD8, checked by cards of version 2 and later.
    pub const CMD8: u8 = frame_crc(commands::CMD8, args::IF_COND);
    /// Framing byte sent while CRC checking is off: any CRC value, stop bit set.
    pub const DISABLED: u8 = 0x01;
}

pub mod tokens {
    /// Bus idle level, also clocked out to receive a byte.
    pub const IDLE: u8 = 0xFF;
    /// Level the card holds the bus at while programming a block.
    pub const BUSY: u8 = 0x00;
    /// Start data token for write single block.
    pub const DATA_START_BLOCK: u8 = 0xFE;
    /// Placeholder for the data CRC the card ignores.
    pub const CRC_FILLER: u8 = 0xFF;
    /// Mask for data response tokens after a write block operation.
    pub const DATA_RES_MASK: u8 = 0x1F;
    /// Write data accepted token.
    pub const DATA_RES_ACCEPTED: u8 = 0x05;
    /// Write data rejected because of a CRC error.
    pub const DATA_RES_CRC_ERROR: u8 = 0x0B;
    /// Write data rejected because of a write error.
    pub const DATA_RES_WRITE_ERROR: u8 = 0x0D;
}
