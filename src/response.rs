use crate::consts::tokens;

use bitfield::bitfield;

bitfield! {
    /// R1 response bitset.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
    pub struct R1Response(u8);
    impl Debug;
    pub in_idle_state, _: 0;
    pub erase_reset, _: 1;
    pub illegal_command, _: 2;
    pub command_crc_error, _: 3;
    pub erase_sequence_error, _: 4;
    pub address_error, _: 5;
    pub parameter_error, _: 6;
    pub start_bit, _: 7;
}

impl R1Response {
    /// Card left the idle state and no error is flagged.
    pub const READY_STATE: Self = R1Response(0x00);
    /// Card is idle and no error is flagged.
    pub const IN_IDLE_STATE: Self = R1Response(0x01);
    /// Error flags, bits 1 to 6.
    const ERROR_MASK: u8 = 0x7E;

    /// A response token always has bit 7 clear.
    pub fn is_valid(&self) -> bool {
        !self.start_bit()
    }

    /// Any of the six error flags is set.
    pub fn has_error(&self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }

    /// Raw token.
    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// R3 OCR and R7 interface condition payload.
pub type ExtendedPayload = [u8; 4];

bitfield! {
    /// Operation Conditions Register, as returned by CMD58.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
    pub struct Ocr(u32);
    impl Debug;
    pub u16, voltage_window, _: 23, 15;
    pub switching_to_1v8_accepted, _: 24;
    pub card_capacity_status, _: 30;
    pub power_up_complete, _: 31;
}

impl From<ExtendedPayload> for Ocr {
    fn from(payload: ExtendedPayload) -> Self {
        Ocr(u32::from_be_bytes(payload))
    }
}

/// How the card addresses its blocks, reported through the OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum CapacityClass {
    /// Standard capacity (SDSC).
    Standard,
    /// High or extended capacity (SDHC/SDXC).
    High,
}

impl Ocr {
    /// Capacity class, meaningful once the card finished powering up.
    pub fn capacity_class(&self) -> CapacityClass {
        if self.power_up_complete() && self.card_capacity_status() {
            CapacityClass::High
        } else {
            CapacityClass::Standard
        }
    }
}

/// Data response token returned after a data packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum DataResponse {
    Accepted,
    CrcError,
    WriteError,
    /// Any pattern outside the three defined above.
    Unknown(u8),
}

impl From<u8> for DataResponse {
    fn from(token: u8) -> Self {
        match token & tokens::DATA_RES_MASK {
            tokens::DATA_RES_ACCEPTED => DataResponse::Accepted,
            tokens::DATA_RES_CRC_ERROR => DataResponse::CrcError,
            tokens::DATA_RES_WRITE_ERROR => DataResponse::WriteError,
            _ => DataResponse::Unknown(token),
        }
    }
}
