//! Simulated cards for host tests.

use std::collections::VecDeque;

use crate::{
    consts::{tokens, BLOCK_SIZE},
    crc::frame_crc,
    transport::{BusConfig, Transport},
    SdCardConfig, FRAME_SIZE,
};

use core::convert::Infallible;

/// Small bounds so exhaustion tests stay fast.
pub struct TestConfig;

impl SdCardConfig for TestConfig {
    const READ_R1_ATTEMPTS: usize = 8;
    const ENTER_SPI_MODE_ATTEMPTS: usize = 3;
    const INIT_MAX_ATTEMPTS: usize = 5;
    const WRITE_BUSY_ATTEMPTS: usize = 16;
    const DELAY_DUMMY_CYCLES: usize = 0;
}

/// Bus replaying scripted MISO bytes, `0xFF` once the script runs out.
#[derive(Default)]
pub struct ScriptedBus {
    pub miso: VecDeque<u8>,
    pub mosi: Vec<u8>,
    pub selects: Vec<bool>,
}

impl ScriptedBus {
    pub fn with_miso(miso: &[u8]) -> Self {
        ScriptedBus {
            miso: miso.iter().copied().collect(),
            ..Default::default()
        }
    }
}

impl Transport for ScriptedBus {
    type Error = Infallible;

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        self.mosi.push(byte);
        Ok(self.miso.pop_front().unwrap_or(tokens::IDLE))
    }

    fn select(&mut self, asserted: bool) -> Result<(), Self::Error> {
        self.selects.push(asserted);
        Ok(())
    }
}

/// Everything the driver did to the bus, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Transfer(u8),
    Select(bool),
    Configure(BusConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Command,
    AwaitDataToken,
    Data,
    Crc(usize),
}

/// Card model answering at the byte level.
pub struct SimCard {
    /// CMD0 frames ignored before the card starts answering.
    pub silent_cmd0: usize,
    /// R1 of successive CMD0 frames, idle state once exhausted.
    pub cmd0_responses: Vec<u8>,
    /// Whether CMD8 is understood.
    pub supports_cmd8: bool,
    /// Overrides the echoed CMD8 check pattern.
    pub check_pattern: Option<u8>,
    /// Activation commands answered with idle before the card is ready.
    pub idle_rounds: usize,
    /// Commands that are received but never answered.
    pub silent: Vec<u8>,
    /// `(index, r1)` pairs replacing the R1 the card would send.
    pub r1_overrides: Vec<(u8, u8)>,
    pub high_capacity: bool,
    /// Idle bytes before every R1.
    pub response_delay: usize,
    pub cmd24_response: u8,
    pub data_response: u8,
    /// Busy bytes after an accepted block.
    pub busy_polls: usize,

    pub events: Vec<Event>,
    pub mosi: Vec<u8>,
    pub frames: Vec<[u8; FRAME_SIZE]>,
    pub blocks: Vec<(u32, Vec<u8>)>,

    pub(crate) selected: bool,
    pub(crate) phase: Phase,
    pub(crate) frame: Vec<u8>,
    pub(crate) out: VecDeque<u8>,
    pub(crate) busy: usize,
    pub(crate) app_cmd: bool,
    pub(crate) ready: bool,
    pub(crate) rounds: usize,
    pub(crate) index: u8,
    pub(crate) address: u32,
    pub(crate) block: Vec<u8>,
}

impl Default for SimCard {
    fn default() -> Self {
        SimCard {
            silent_cmd0: 0,
            cmd0_responses: Vec::new(),
            supports_cmd8: true,
            check_pattern: None,
            idle_rounds: 0,
            silent: Vec::new(),
            r1_overrides: Vec::new(),
            high_capacity: false,
            response_delay: 0,
            cmd24_response: 0x00,
            data_response: tokens::DATA_RES_ACCEPTED,
            busy_polls: 0,
            events: Vec::new(),
            mosi: Vec::new(),
            frames: Vec::new(),
            blocks: Vec::new(),
            selected: false,
            phase: Phase::Command,
            frame: Vec::new(),
            out: VecDeque::new(),
            busy: 0,
            app_cmd: false,
            ready: false,
            rounds: 0,
            index: 0,
            address: 0,
            block: Vec::new(),
        }
    }
}

impl SimCard {
    /// Command indices in the order they were received.
    pub fn indices(&self) -> Vec<u8> {
        self.frames.iter().map(|frame| frame[0] & 0x3F).collect()
    }

    /// Number of frames received for command `index`.
    pub fn count(&self, index: u8) -> usize {
        self.indices().iter().filter(|i| **i == index).count()
    }

    fn idle_flag(&self) -> u8 {
        if self.ready {
            0x00
        } else {
            0x01
        }
    }

    fn respond(&mut self, r1: u8, payload: &[u8]) {
        let r1 = self
            .r1_overrides
            .iter()
            .find(|(index, _)| *index == self.index)
            .map_or(r1, |(_, r1)| *r1);

        self.out.extend(core::iter::repeat(tokens::IDLE).take(self.response_delay));
        self.out.push_back(r1);
        self.out.extend(payload.iter().copied());
    }

    fn activation_round(&mut self) -> u8 {
        if self.ready {
            return 0x00;
        }
        if self.rounds < self.idle_rounds {
            self.rounds += 1;
            0x01
        } else {
            self.ready = true;
            0x00
        }
    }

    fn handle_frame(&mut self) {
        let frame: [u8; FRAME_SIZE] = self.frame[..].try_into().unwrap();
        self.frame.clear();
        self.frames.push(frame);

        let index = frame[0] & 0x3F;
        let arg = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
        let app_cmd = core::mem::replace(&mut self.app_cmd, false);
        self.index = index;

        if self.silent.contains(&index) {
            return;
        }

        // CMD0 and CMD8 are CRC checked even with CRC off.
        if (index == 0 || index == 8) && frame[5] != frame_crc(index, arg) {
            self.respond(0x09, &[]);
            return;
        }

        match index {
            0 => {
                if self.silent_cmd0 > 0 {
                    self.silent_cmd0 -= 1;
                    return;
                }
                self.ready = false;
                self.rounds = 0;
                let r1 = if self.cmd0_responses.is_empty() {
                    0x01
                } else {
                    self.cmd0_responses.remove(0)
                };
                self.respond(r1, &[]);
            }
            1 => {
                let r1 = self.activation_round();
                self.respond(r1, &[]);
            }
            8 => {
                if self.supports_cmd8 {
                    let pattern = self.check_pattern.unwrap_or(arg as u8);
                    self.respond(self.idle_flag(), &[0x00, 0x00, 0x01, pattern]);
                } else {
                    self.respond(0x05, &[]);
                }
            }
            16 => self.respond(self.idle_flag(), &[]),
            24 => {
                let r1 = if self.ready { self.cmd24_response } else { 0x04 };
                self.respond(r1, &[]);
                if r1 == 0x00 {
                    self.address = arg;
                    self.phase = Phase::AwaitDataToken;
                }
            }
            41 if app_cmd => {
                let r1 = self.activation_round();
                self.respond(r1, &[]);
            }
            55 => {
                self.app_cmd = true;
                self.respond(self.idle_flag(), &[]);
            }
            58 => {
                let mut ocr: u32 = 0x00FF_8000;
                if self.ready {
                    ocr |= 0x8000_0000;
                    if self.high_capacity {
                        ocr |= 0x4000_0000;
                    }
                }
                self.respond(self.idle_flag(), &ocr.to_be_bytes());
            }
            _ => self.respond(0x04 | self.idle_flag(), &[]),
        }
    }

    fn receive(&mut self, byte: u8) -> u8 {
        if let Some(out) = self.out.pop_front() {
            return out;
        }
        if self.busy > 0 {
            self.busy -= 1;
            return tokens::BUSY;
        }

        match self.phase {
            Phase::Command => {
                if !self.frame.is_empty() || byte & 0xC0 == 0x40 {
                    self.frame.push(byte);
                    if self.frame.len() == FRAME_SIZE {
                        self.handle_frame();
                    }
                }
            }
            Phase::AwaitDataToken => {
                if byte == tokens::DATA_START_BLOCK {
                    self.block.clear();
                    self.phase = Phase::Data;
                }
            }
            Phase::Data => {
                self.block.push(byte);
                if self.block.len() == BLOCK_SIZE {
                    self.phase = Phase::Crc(2);
                }
            }
            Phase::Crc(remaining) => {
                if remaining > 1 {
                    self.phase = Phase::Crc(remaining - 1);
                } else {
                    self.phase = Phase::Command;
                    self.out.push_back(self.data_response);
                    if self.data_response & tokens::DATA_RES_MASK == tokens::DATA_RES_ACCEPTED {
                        self.blocks.push((self.address, core::mem::take(&mut self.block)));
                        self.busy = self.busy_polls;
                    }
                }
            }
        }

        tokens::IDLE
    }
}

/// Bus error raised by [`FailingBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

/// [`SimCard`] behind a bus that fails one transfer.
pub struct FailingBus {
    pub card: SimCard,
    /// Zero based index of the transfer that fails.
    pub fail_at: usize,
    pub transfers: usize,
}

impl FailingBus {
    pub fn new(card: SimCard, fail_at: usize) -> Self {
        FailingBus {
            card,
            fail_at,
            transfers: 0,
        }
    }
}

impl Transport for FailingBus {
    type Error = BusFault;

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        let n = self.transfers;
        self.transfers += 1;

        if n == self.fail_at {
            return Err(BusFault);
        }

        Ok(self.card.transfer(byte).unwrap_or(tokens::IDLE))
    }

    fn select(&mut self, asserted: bool) -> Result<(), Self::Error> {
        let _ = self.card.select(asserted);
        Ok(())
    }

    fn configure(&mut self, config: &BusConfig) -> Result<(), Self::Error> {
        let _ = self.card.configure(config);
        Ok(())
    }
}

impl Transport for SimCard {
    type Error = Infallible;

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        self.events.push(Event::Transfer(byte));
        self.mosi.push(byte);

        if !self.selected {
            return Ok(tokens::IDLE);
        }

        Ok(self.receive(byte))
    }

    fn select(&mut self, asserted: bool) -> Result<(), Self::Error> {
        self.events.push(Event::Select(asserted));
        self.selected = asserted;
        if !asserted {
            self.frame.clear();
            self.out.clear();
            self.phase = Phase::Command;
        }
        Ok(())
    }

    fn configure(&mut self, config: &BusConfig) -> Result<(), Self::Error> {
        self.events.push(Event::Configure(*config));
        Ok(())
    }
}
