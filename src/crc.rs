use crate::consts::commands::CMD_BASE;

/// CRC-7 calculation.
pub const fn crc7(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    let mut i = 0;
    while i < data.len() {
        let mut byte = data[i];
        let mut bit = 0;
        while bit < 8 {
            crc <<= 1;
            if ((byte & 0x80) ^ (crc & 0x80)) != 0 {
                crc ^= 0x09;
            }
            byte <<= 1;
            bit += 1;
        }
        i += 1;
    }
    crc & 0x7F
}

/// Last byte of a command frame: CRC-7 of the first five bytes with the stop bit.
pub const fn frame_crc(index: u8, arg: u32) -> u8 {
    let bytes = arg.to_be_bytes();
    let head = [CMD_BASE | index, bytes[0], bytes[1], bytes[2], bytes[3]];
    (crc7(&head) << 1) | 0x01
}
