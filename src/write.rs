use crate::{
    consts::{commands, crc, tokens, BLOCK_SIZE},
    CardState, DataResponse, Error, ErrorFor, R1Response, SdCard, SdCardConfig, Transport,
};

#[cfg(feature = "log")]
use log::debug;

#[cfg(feature = "defmt-log")]
use defmt::debug;

impl<T: Transport, C: SdCardConfig> SdCard<T, C> {
    /// Writes one block at block index `address`.
    ///
    /// The card must be operational, otherwise [`Error::NotInitialized`] is
    /// returned without touching the bus.
    pub fn write_block(&self, address: u32, data: &[u8; BLOCK_SIZE]) -> Result<(), ErrorFor<T>> {
        if self.state.get() != CardState::Operational {
            return Err(Error::NotInitialized);
        }

        debug!("SD write block {}", address);

        self.cs_scope(|s| {
            s.send_command(commands::CMD24, address, crc::DISABLED)?;

            let r1 = s.read_r1(commands::CMD24, C::READ_R1_ATTEMPTS)?;
            if r1 != R1Response::READY_STATE {
                return Err(Error::WriteCommandRejected(r1));
            }

            // One byte gap before the data packet.
            s.skip_byte()?;
            s.write_data(data)?;
            s.wait_not_busy()
        })
    }

    /// Write data packet and check the data response.
    fn write_data(&self, data: &[u8]) -> Result<(), ErrorFor<T>> {
        self.send(tokens::DATA_START_BLOCK)?;
        self.send_slice(data)?;
        self.send(tokens::CRC_FILLER)?;
        self.send(tokens::CRC_FILLER)?;

        match DataResponse::from(self.receive()?) {
            DataResponse::Accepted => Ok(()),
            DataResponse::CrcError => Err(Error::WriteRejectedCrc),
            DataResponse::WriteError => Err(Error::WriteRejectedInternal),
            DataResponse::Unknown(token) => Err(Error::WriteProtocolError(token)),
        }
    }
}
