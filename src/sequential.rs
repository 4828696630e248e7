use crate::{consts::BLOCK_SIZE, Error, ErrorFor, SdCard, SdCardConfig, Transport};

/// Appends blocks at consecutive block indices, one per logging cycle.
pub struct SequentialWriter<'a, T: Transport, C: SdCardConfig> {
    card: &'a SdCard<T, C>,
    /// `None` once the last block index was written.
    next: Option<u32>,
}

impl<'a, T: Transport, C: SdCardConfig> SequentialWriter<'a, T, C> {
    /// Starts writing at block index `first`.
    pub fn new(card: &'a SdCard<T, C>, first: u32) -> Self {
        SequentialWriter {
            card,
            next: Some(first),
        }
    }

    /// Block index the next [`append`](Self::append) writes to, `None` when
    /// the address range is used up.
    pub fn position(&self) -> Option<u32> {
        self.next
    }

    /// Writes `data` at the current position, advancing it only on success.
    ///
    /// Returns the block index written. Fails with [`Error::OutOfRange`]
    /// instead of wrapping back to block 0.
    pub fn append(&mut self, data: &[u8; BLOCK_SIZE]) -> Result<u32, ErrorFor<T>> {
        let address = self.next.ok_or(Error::OutOfRange)?;
        self.card.write_block(address, data)?;
        self.next = address.checked_add(1);

        Ok(address)
    }
}
