use crate::{
    consts::{args, commands, crc, tokens, BLOCK_SIZE},
    CardState, Error, ErrorFor, Ocr, R1Response, SdCard, SdCardConfig, Transport,
};

#[cfg(feature = "log")]
use log::{error, info, warn};

#[cfg(feature = "defmt-log")]
use defmt::{error, info, warn};

/// Activation path, chosen at runtime by the CMD8 reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum InitStrategy {
    /// Card rejected CMD8 or echoed a wrong pattern: CMD1 until ready.
    Legacy,
    /// Card echoed the CMD8 pattern: CMD58, CMD55, ACMD41 until ready.
    Negotiated,
}

impl InitStrategy {
    /// Command whose R1 tells whether the card left the idle state.
    fn activation_command(&self) -> u8 {
        match self {
            InitStrategy::Legacy => commands::CMD1,
            InitStrategy::Negotiated => commands::ACMD41,
        }
    }
}

impl<T: Transport, C: SdCardConfig> SdCard<T, C> {
    /// Init sequence size, at least 74 clocks.
    const INIT_SET_SIZE: usize = 10;

    /// Brings the card from power on to the operational state.
    ///
    /// Can be called again at any time, the whole sequence is replayed.
    pub fn initialize(&mut self) -> Result<(), ErrorFor<T>> {
        self.init()
    }

    /// Initialize SD.
    pub(crate) fn init(&mut self) -> Result<(), ErrorFor<T>> {
        info!("SD initialize started");

        self.strategy.set(None);
        self.ocr.set(None);
        self.state.set(CardState::PoweredOff);

        match self.run_state_machine() {
            Ok(()) => {
                self.state.set(CardState::Operational);
                info!(
                    "SD successfully initialized, strategy: {:?}, capacity: {:?}",
                    self.strategy.get(),
                    self.capacity_class()
                );
                Ok(())
            }
            Err(err) => {
                let failed_in = self.state.replace(CardState::Faulted);
                #[cfg(feature = "log")]
                error!("Failed to initialize SD in {:?}: {:?}", failed_in, err);
                #[cfg(feature = "defmt-log")]
                error!(
                    "Failed to initialize SD in {:?}: {:?}",
                    failed_in,
                    defmt::Debug2Format(&err)
                );
                Err(Error::CardInitFailed)
            }
        }
    }

    /// Walk every state up to the operational bus settings.
    fn run_state_machine(&self) -> Result<(), ErrorFor<T>> {
        self.power_on()?;
        self.state.set(CardState::NativeReset);

        self.enter_spi_mode()?;
        self.state.set(CardState::IdleConfirmed);

        let strategy = self.send_if_cond()?;
        self.strategy.set(Some(strategy));
        self.state.set(CardState::NegotiatingCapability);

        self.activate(strategy)?;
        self.state.set(CardState::PollingReady);

        self.finish()
    }

    /// Clock the card into native mode with select deasserted.
    fn power_on(&self) -> Result<(), ErrorFor<T>> {
        self.configure(&C::INIT_BUS)?;
        self.select(false)?;

        for _ in 0..Self::INIT_SET_SIZE {
            self.send(tokens::IDLE)?;
        }

        Ok(())
    }

    /// Enter SD to SPI mode.
    fn enter_spi_mode(&self) -> Result<(), ErrorFor<T>> {
        for i in 0..C::ENTER_SPI_MODE_ATTEMPTS {
            info!("Enter to SPI mode for SD, attempt: {}", i + 1);

            match self.command(commands::CMD0, 0x0000_0000, crc::CMD0) {
                Ok(R1Response::IN_IDLE_STATE) => return Ok(()),
                Ok(r) => warn!("Wrong response from CMD0: 0b{:02X}", r.bits()),
                Err(Error::Timeout(_)) => {}
                Err(err) => return Err(err),
            }

            Self::delay();
        }

        Err(Error::CardUnresponsive)
    }

    /// Verify SD Memory Card interface operating condition.
    fn send_if_cond(&self) -> Result<InitStrategy, ErrorFor<T>> {
        info!("Verifying SD Memory Card interface operating condition");

        let (r1, payload) = self.command_extended(commands::CMD8, args::IF_COND, crc::CMD8)?;

        if r1.illegal_command() || payload[3] != args::CHECK_PATTERN {
            info!("CMD8 not supported, using legacy initialization");
            Ok(InitStrategy::Legacy)
        } else {
            Ok(InitStrategy::Negotiated)
        }
    }

    /// Repeat the activation command until the card leaves the idle state.
    fn activate(&self, strategy: InitStrategy) -> Result<(), ErrorFor<T>> {
        info!("Waiting for SD to leave the idle state");

        for _ in 0..C::INIT_MAX_ATTEMPTS {
            let r1 = match strategy {
                InitStrategy::Legacy => {
                    self.command(commands::CMD1, 0x0000_0000, crc::DISABLED)?
                }
                InitStrategy::Negotiated => self.send_op_cond_round()?,
            };

            if !Self::check_idle(strategy.activation_command(), r1)? {
                return Ok(());
            }

            Self::delay();
        }

        warn!(
            "SD still idle after {} activation attempts",
            C::INIT_MAX_ATTEMPTS
        );
        Err(Error::CardInitFailed)
    }

    /// One CMD58, CMD55, ACMD41 round, returns the R1 of ACMD41.
    fn send_op_cond_round(&self) -> Result<R1Response, ErrorFor<T>> {
        let (r1, _) = self.command_extended(commands::CMD58, 0x0000_0000, crc::DISABLED)?;
        Self::check_error(commands::CMD58, r1)?;

        let r1 = self.command(commands::CMD55, 0x0000_0000, crc::DISABLED)?;
        Self::check_error(commands::CMD55, r1)?;

        self.command(commands::ACMD41, args::HCS, crc::DISABLED)
    }

    /// Read the OCR once more and fix the block length.
    ///
    /// Only error flags fail here, the idle flag of these replies is ignored.
    fn finish(&self) -> Result<(), ErrorFor<T>> {
        let (r1, payload) = self.command_extended(commands::CMD58, 0x0000_0000, crc::DISABLED)?;
        Self::check_error(commands::CMD58, r1)?;
        self.ocr.set(Some(Ocr::from(payload)));

        let r1 = self.command(commands::CMD16, BLOCK_SIZE as u32, crc::DISABLED)?;
        Self::check_error(commands::CMD16, r1)?;

        self.configure(&C::OPERATIONAL_BUS)
    }

    /// Whether the card is still idle, card-reported errors are surfaced.
    fn check_idle(cmd: u8, r1: R1Response) -> Result<bool, ErrorFor<T>> {
        Self::check_error(cmd, r1)?;
        Ok(r1.in_idle_state())
    }

    /// Fail with [`Error::CommandError`] if `r1` carries an error flag.
    fn check_error(cmd: u8, r1: R1Response) -> Result<(), ErrorFor<T>> {
        if r1.has_error() {
            Err(Error::CommandError { cmd, r1 })
        } else {
            Ok(())
        }
    }
}
