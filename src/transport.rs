use core::fmt;

use embedded_hal::{
    blocking::spi::Transfer,
    spi::{Mode, Phase, Polarity, MODE_0},
};
use switch_hal::OutputSwitch;

/// Order in which the bits of a byte are shifted out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// Bus settings handed to the [`Transport`] whenever the driver changes phase.
#[derive(Clone, Copy, PartialEq)]
pub struct BusConfig {
    pub bit_order: BitOrder,
    pub mode: Mode,
    /// Divider applied to the bus master clock.
    pub clock_divider: u16,
}

impl BusConfig {
    /// Conservative settings for the card identification phase (<= 400 kHz).
    pub const INITIALIZATION: BusConfig = BusConfig {
        bit_order: BitOrder::MsbFirst,
        mode: MODE_0,
        clock_divider: 64,
    };
    /// Settings once the card reached the operational state.
    pub const OPERATIONAL: BusConfig = BusConfig {
        bit_order: BitOrder::MsbFirst,
        mode: MODE_0,
        clock_divider: 2,
    };
}

impl fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let polarity = match self.mode.polarity {
            Polarity::IdleLow => "IdleLow",
            Polarity::IdleHigh => "IdleHigh",
        };
        let phase = match self.mode.phase {
            Phase::CaptureOnFirstTransition => "CaptureOnFirstTransition",
            Phase::CaptureOnSecondTransition => "CaptureOnSecondTransition",
        };

        f.debug_struct("BusConfig")
            .field("bit_order", &self.bit_order)
            .field("polarity", &format_args!("{}", polarity))
            .field("phase", &format_args!("{}", phase))
            .field("clock_divider", &self.clock_divider)
            .finish()
    }
}

/// Byte level access to the card.
///
/// Every call blocks until the exchange is physically complete.
pub trait Transport {
    /// Bus error type.
    type Error: core::fmt::Debug;

    /// Clocks `byte` out while clocking a byte in.
    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error>;

    /// Drives the chip select line, `true` asserts it.
    fn select(&mut self, asserted: bool) -> Result<(), Self::Error>;

    /// Applies new bus settings.
    fn configure(&mut self, config: &BusConfig) -> Result<(), Self::Error> {
        let _ = config;
        Ok(())
    }
}

/// [`SpiTransport`] error.
///
/// `S` - SPI error type.
/// `C` - select switch error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum TransportError<S, C> {
    /// Error from the SPI peripheral.
    Spi(S),
    /// Couldn't set a select.
    Select(C),
}

/// Hook reprogramming the SPI peripheral for a [`BusConfig`].
pub type ReconfigureFn<Spi> = fn(&mut Spi, &BusConfig);

/// [`Transport`] over a blocking SPI bus and a chip select output switch.
///
/// `Spi` - SPI.
/// `Cs` - Chip select output switch.
pub struct SpiTransport<Spi: Transfer<u8>, Cs: OutputSwitch> {
    spi: Spi,
    cs: Cs,
    reconfigure: Option<ReconfigureFn<Spi>>,
}

impl<Spi: Transfer<u8>, Cs: OutputSwitch> SpiTransport<Spi, Cs> {
    /// Creates a new [`SpiTransport<Spi, Cs>`] that never touches the bus settings.
    ///
    /// `spi` - SPI instance, already configured.
    /// `cs` - chip select output switch.
    pub fn new(spi: Spi, cs: Cs) -> Self {
        SpiTransport {
            spi,
            cs,
            reconfigure: None,
        }
    }

    /// Creates a new [`SpiTransport<Spi, Cs>`] calling `reconfigure` on every bus change.
    pub fn with_reconfigure(spi: Spi, cs: Cs, reconfigure: ReconfigureFn<Spi>) -> Self {
        SpiTransport {
            spi,
            cs,
            reconfigure: Some(reconfigure),
        }
    }

    /// Gives the bus and the switch back.
    pub fn release(self) -> (Spi, Cs) {
        (self.spi, self.cs)
    }
}

impl<Spi: Transfer<u8>, Cs: OutputSwitch> Transport for SpiTransport<Spi, Cs>
where
    Spi::Error: core::fmt::Debug,
    Cs::Error: core::fmt::Debug,
{
    type Error = TransportError<Spi::Error, Cs::Error>;

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        self.spi
            .transfer(&mut [byte])
            .map(|b| b[0])
            .map_err(TransportError::Spi)
    }

    fn select(&mut self, asserted: bool) -> Result<(), Self::Error> {
        let result = if asserted {
            self.cs.on()
        } else {
            self.cs.off()
        };

        result.map_err(TransportError::Select)
    }

    fn configure(&mut self, config: &BusConfig) -> Result<(), Self::Error> {
        if let Some(reconfigure) = self.reconfigure {
            reconfigure(&mut self.spi, config);
        }
        Ok(())
    }
}
