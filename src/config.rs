use crate::transport::BusConfig;

/// Represents config for [`SdCard`](crate::SdCard).
///
/// Every poll loop of the driver is bounded by one of these limits.
pub trait SdCardConfig {
    /// Max idle bytes read while waiting for an R1 token.
    const READ_R1_ATTEMPTS: usize;
    /// Max CMD0 exchanges while entering SPI mode.
    const ENTER_SPI_MODE_ATTEMPTS: usize;
    /// Max CMD1 or CMD58/CMD55/ACMD41 rounds while the card reports idle.
    const INIT_MAX_ATTEMPTS: usize;
    /// Max bytes read while the card holds the bus busy after a write, with
    /// a delay between reads.
    const WRITE_BUSY_ATTEMPTS: usize;
    /// Count of dummy cycles for delay.
    const DELAY_DUMMY_CYCLES: usize;
    /// Bus settings used from power on until the card is operational.
    const INIT_BUS: BusConfig = BusConfig::INITIALIZATION;
    /// Bus settings used once the card is operational.
    const OPERATIONAL_BUS: BusConfig = BusConfig::OPERATIONAL;
}

/// Default implementation of [`SdCardConfig`](crate::SdCardConfig).
pub struct DefaultSdCardConfig;

impl SdCardConfig for DefaultSdCardConfig {
    const READ_R1_ATTEMPTS: usize = 128;
    const ENTER_SPI_MODE_ATTEMPTS: usize = 10;
    const INIT_MAX_ATTEMPTS: usize = 1024;
    /// Covers the 250 ms write time of SDSC cards at 8 MHz without counting
    /// the delay.
    const WRITE_BUSY_ATTEMPTS: usize = 500_000;
    const DELAY_DUMMY_CYCLES: usize = 32;
}
