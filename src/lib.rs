//! Write-only SD card driver for data loggers, written in Embedded Rust.
//!
//! This crate brings an SD card up over an SPI bus and writes single 512-byte
//! blocks to it, once per logging cycle.
//!
//! CRC checking is never enabled on the card (CMD59 is not sent). Only CMD0 and
//! CMD8 carry a real CRC, all other frames end with a fixed `0x01` byte. Cards
//! that insist on CRC protected transfers are not supported.
//!
//! # Features
//!
//! * `log` (default): log through the [log](https://crates.io/crates/log) facade.
//! * `defmt-log`: log through [defmt](https://crates.io/crates/defmt) instead.
//!
//! Exactly one of the two must be enabled.

#![cfg_attr(not(test), no_std)]

mod command;
mod config;
mod consts;
mod crc;
mod init;
mod response;
mod sequential;
mod transport;
mod write;

#[cfg(test)]
mod sim;

pub use crate::command::{CommandFrame, FRAME_SIZE};
pub use crate::config::{DefaultSdCardConfig, SdCardConfig};
pub use crate::consts::BLOCK_SIZE;
pub use crate::crc::{crc7, frame_crc};
pub use crate::init::InitStrategy;
pub use crate::response::{CapacityClass, DataResponse, ExtendedPayload, Ocr, R1Response};
pub use crate::sequential::SequentialWriter;
pub use crate::transport::{
    BitOrder, BusConfig, ReconfigureFn, SpiTransport, Transport, TransportError,
};
pub use diskio::{
    BlockSize, DiskioDevice, Error as DiskioError, IoctlCmd, Lba, Status, StatusFlag,
};

use crate::consts::tokens;

use core::{
    cell::{Cell, RefCell},
    marker::PhantomData,
};

#[cfg(feature = "log")]
use log::warn;

#[cfg(feature = "defmt-log")]
use defmt::warn;

#[cfg(all(feature = "defmt-log", feature = "log"))]
compile_error!("Cannot enable both log and defmt-log");

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
compile_error!("Must enable either log or defmt-log");

/// [`SdCard`] result error.
///
/// `E` - transport error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Error<E> {
    /// Error from the transport.
    Transport(E),
    /// No response token to this command within the poll budget.
    Timeout(u8),
    /// The card never confirmed the idle state after CMD0.
    CardUnresponsive,
    /// The card flagged an error in the R1 of this command.
    CommandError { cmd: u8, r1: R1Response },
    /// The card could not be brought to the operational state.
    CardInitFailed,
    /// The card refused the write command.
    WriteCommandRejected(R1Response),
    /// The card rejected the data packet because of a CRC error.
    WriteRejectedCrc,
    /// The card rejected the data packet because of a write error.
    WriteRejectedInternal,
    /// Unrecognized data response token.
    WriteProtocolError(u8),
    /// The card did not leave the busy state after a write.
    WriteTimeout,
    /// Can't perform this operation with the card in this state.
    NotInitialized,
    /// Block index past the last addressable block.
    OutOfRange,
}

/// Driver side view of the card, walked through by [`SdCard::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum CardState {
    PoweredOff,
    /// Clocks sent with the card deselected, card is in native mode.
    NativeReset,
    /// CMD0 answered with the idle state, card is in SPI mode.
    IdleConfirmed,
    /// Activation loop running (CMD1 or ACMD41).
    NegotiatingCapability,
    /// Card left the idle state.
    PollingReady,
    Operational,
    /// Initialization gave up, writes are refused until the next initialization.
    Faulted,
}

/// Error type alias.
type ErrorFor<T> = Error<<T as Transport>::Error>;

/// SD Card driver.
///
/// `T` - byte transport.
/// `C` - Config implementation of driver config trait.
pub struct SdCard<T: Transport, C: SdCardConfig = DefaultSdCardConfig> {
    transport: RefCell<T>,
    state: Cell<CardState>,
    strategy: Cell<Option<InitStrategy>>,
    ocr: Cell<Option<Ocr>>,
    config: PhantomData<C>,
}

impl<T: Transport, C: SdCardConfig> SdCard<T, C> {
    /// Creates a new [`SdCard<T, C>`], the card is considered powered off.
    ///
    /// `transport` - byte transport to the card.
    pub fn new(transport: T) -> Self {
        SdCard {
            transport: RefCell::new(transport),
            state: Cell::new(CardState::PoweredOff),
            strategy: Cell::new(None),
            ocr: Cell::new(None),
            config: PhantomData::<C>,
        }
    }

    /// Current card state.
    pub fn state(&self) -> CardState {
        self.state.get()
    }

    /// Activation path picked by the last initialization.
    pub fn strategy(&self) -> Option<InitStrategy> {
        self.strategy.get()
    }

    /// OCR read at the end of the last successful initialization.
    pub fn ocr(&self) -> Option<Ocr> {
        self.ocr.get()
    }

    /// Capacity class reported by the OCR, `None` before initialization.
    pub fn capacity_class(&self) -> Option<CapacityClass> {
        self.ocr.get().map(|ocr| ocr.capacity_class())
    }

    /// Forgets the card, [`SdCard::initialize`] has to run again before writing.
    pub fn reset(&mut self) {
        self.state.set(CardState::PoweredOff);
        self.strategy.set(None);
        self.ocr.set(None);
    }

    /// Gives the transport back.
    pub fn release(self) -> T {
        self.transport.into_inner()
    }

    /// Delay.
    fn delay() {
        for _ in 0..C::DELAY_DUMMY_CYCLES {
            core::hint::spin_loop();
        }
    }

    /// Drive chip select.
    fn select(&self, asserted: bool) -> Result<(), ErrorFor<T>> {
        self.transport
            .borrow_mut()
            .select(asserted)
            .map_err(Error::Transport)
    }

    /// Apply bus settings.
    fn configure(&self, config: &BusConfig) -> Result<(), ErrorFor<T>> {
        self.transport
            .borrow_mut()
            .configure(config)
            .map_err(Error::Transport)
    }

    /// CS scope: select, run `f`, deselect and clock one byte so the card
    /// releases the bus.
    fn cs_scope<R, F>(&self, f: F) -> Result<R, ErrorFor<T>>
    where
        F: FnOnce(&Self) -> Result<R, ErrorFor<T>>,
    {
        self.select(true)?;
        let result = f(self);
        self.select(false)?;
        self.skip_byte()?;

        result
    }

    /// Send one byte and receive one byte.
    fn transfer(&self, data: u8) -> Result<u8, ErrorFor<T>> {
        self.transport
            .borrow_mut()
            .transfer(data)
            .map_err(Error::Transport)
    }

    /// Receive a byte from the SD card by clocking in an 0xFF byte.
    fn receive(&self) -> Result<u8, ErrorFor<T>> {
        self.transfer(tokens::IDLE)
    }

    /// Send a byte to the SD card.
    fn send(&self, data: u8) -> Result<(), ErrorFor<T>> {
        self.transfer(data).map(|_| ())
    }

    /// Send a slice to the SD card.
    fn send_slice(&self, data: &[u8]) -> Result<(), ErrorFor<T>> {
        for byte in data.iter() {
            self.send(*byte)?;
        }

        Ok(())
    }

    /// Skip byte.
    fn skip_byte(&self) -> Result<(), ErrorFor<T>> {
        self.receive().map(|_| ())
    }

    /// Poll for the R1 token of command `cmd`, skipping idle bytes.
    ///
    /// Fails with [`Error::Timeout`] once `max_polls` bytes were read without one.
    fn read_r1(&self, cmd: u8, max_polls: usize) -> Result<R1Response, ErrorFor<T>> {
        for _ in 0..max_polls {
            let r1 = R1Response(self.receive()?);

            if r1.is_valid() {
                return Ok(r1);
            }
        }

        Err(Error::Timeout(cmd))
    }

    /// Read the payload following an R1 for R3/R7 responses.
    fn read_extended(&self, payload: &mut [u8]) -> Result<(), ErrorFor<T>> {
        for byte in payload.iter_mut() {
            *byte = self.receive()?;
        }

        Ok(())
    }

    /// Full exchange of a command answered with R1.
    fn command(&self, cmd: u8, arg: u32, crc: u8) -> Result<R1Response, ErrorFor<T>> {
        self.cs_scope(|s| {
            s.send_command(cmd, arg, crc)?;
            s.read_r1(cmd, C::READ_R1_ATTEMPTS)
        })
    }

    /// Full exchange of a command answered with R3 or R7.
    fn command_extended(
        &self,
        cmd: u8,
        arg: u32,
        crc: u8,
    ) -> Result<(R1Response, ExtendedPayload), ErrorFor<T>> {
        self.cs_scope(|s| {
            s.send_command(cmd, arg, crc)?;
            let r1 = s.read_r1(cmd, C::READ_R1_ATTEMPTS)?;

            let mut payload: ExtendedPayload = Default::default();
            s.read_extended(&mut payload)?;

            Ok((r1, payload))
        })
    }

    /// Wait until the card stops holding the bus low.
    fn wait_not_busy(&self) -> Result<(), ErrorFor<T>> {
        for _ in 0..C::WRITE_BUSY_ATTEMPTS {
            if self.receive()? != tokens::BUSY {
                return Ok(());
            }

            Self::delay();
        }

        warn!("SD still busy after {} polls", C::WRITE_BUSY_ATTEMPTS);
        Err(Error::WriteTimeout)
    }
}

impl<T: Transport, C: SdCardConfig> DiskioDevice for SdCard<T, C> {
    type HardwareError = ErrorFor<T>;

    fn status(&self) -> Status {
        match self.state.get() {
            CardState::Operational => Status::default(),
            CardState::Faulted => StatusFlag::ErrorOccured | StatusFlag::NotInitialized,
            _ => StatusFlag::NotInitialized.into(),
        }
    }

    fn reset(&mut self) {
        SdCard::reset(self);
    }

    fn initialize(&mut self) -> Result<(), DiskioError<Self::HardwareError>> {
        if self.state.get() == CardState::Operational {
            warn!("SD already is initialized");
            return Err(DiskioError::AlreadyInitialized);
        }

        self.init().map_err(DiskioError::Hardware)
    }

    fn read(&self, _buf: &mut [u8], _lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        Err(DiskioError::NotSupported)
    }

    fn write(&self, buf: &[u8], lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        let block: &[u8; BLOCK_SIZE] = buf.try_into().map_err(|_| DiskioError::InvalidArgument)?;
        let address = u32::try_from(lba).map_err(|_| DiskioError::InvalidArgument)?;

        self.write_block(address, block).map_err(|err| match err {
            Error::NotInitialized => DiskioError::NotInitialized,
            err => DiskioError::Hardware(err),
        })
    }

    fn ioctl(&self, cmd: IoctlCmd) -> Result<(), DiskioError<Self::HardwareError>> {
        match cmd {
            IoctlCmd::CtrlSync => {
                if self.state.get() != CardState::Operational {
                    return Err(DiskioError::NotInitialized);
                }
                self.cs_scope(|s| s.wait_not_busy())
                    .map_err(DiskioError::Hardware)
            }
            IoctlCmd::GetBlockSize(block_size) => {
                *block_size = BLOCK_SIZE;
                Ok(())
            }
            _ => Err(DiskioError::NotSupported),
        }
    }
}
