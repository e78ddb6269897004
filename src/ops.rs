//! Card operations on an initialized card.

use crate::{
    card::CardInfo,
    cid::{Cid, CidData},
    consts::{arguments, clocks, commands, functions, tokens, BLOCK_SIZE},
    csd::Csd,
    scr::Scr,
    switch::{SwitchStatus, SwitchStatusData},
    Error, ErrorFor, SdSpi, SdSpiConfig, StatusFlag, Transport,
};

impl<'a, T, Config> SdSpi<'a, T, Config>
where
    T: Transport,
    Config: SdSpiConfig,
{
    /// Initialized card or [`Error::NotInitialized`].
    fn card(&self) -> Result<&CardInfo, ErrorFor<T>> {
        self.card.as_ref().ok_or(Error::NotInitialized)
    }

    /// Get count of blocks in buffer.
    fn buffer_blocks(buf_len: usize) -> Result<u32, ErrorFor<T>> {
        if buf_len == 0 || buf_len % BLOCK_SIZE != 0 {
            error!(
                "SD invalid buffer, length: {}, block size: {}",
                buf_len, BLOCK_SIZE
            );
            return Err(Error::InvalidArgument);
        }

        u32::try_from(buf_len / BLOCK_SIZE).map_err(|_| Error::InvalidArgument)
    }

    /// Validates a block range and returns the command address of its start.
    fn start_address(card: &CardInfo, start: u32, count: u32) -> Result<u32, ErrorFor<T>> {
        if !card.contains_range(start, count) {
            warn!(
                "SD range out of card, start: {}, count: {}, blocks: {}",
                start, count, card.block_count
            );
            return Err(Error::OutOfRange);
        }

        card.block_address(start).ok_or(Error::OutOfRange)
    }

    /// Read blocks into `buf`, whose length sets the number of blocks.
    pub fn read_blocks(&self, buf: &mut [u8], start_block: u32) -> Result<(), ErrorFor<T>> {
        let card = self.card()?;
        let count = Self::buffer_blocks(buf.len())?;
        let address = Self::start_address(card, start_block, count)?;

        if count == 1 {
            self.send_command_expect_ready(commands::CMD17, address)?;
            self.read_data(buf)
        } else {
            self.send_command_expect_ready(commands::CMD18, address)?;
            let result = buf
                .chunks_mut(BLOCK_SIZE)
                .try_for_each(|block| self.read_data(block));
            let stopped = self.stop_read();

            result.and(stopped)
        }
    }

    /// Write blocks from `buf`, whose length sets the number of blocks.
    pub fn write_blocks(&self, buf: &[u8], start_block: u32) -> Result<(), ErrorFor<T>> {
        let card = self.card()?;

        if card.csd.is_write_protected() {
            warn!("SD is write protected");
            return Err(Error::WriteProtected);
        }

        let count = Self::buffer_blocks(buf.len())?;
        let address = Self::start_address(card, start_block, count)?;

        if count == 1 {
            self.send_command_expect_ready(commands::CMD24, address)?;
            self.write_data(tokens::DATA_START_BLOCK, buf)?;
            self.wait_ready()?;

            let status = self.send_command_expect_ready(commands::CMD13, 0x0000_0000)?;
            if status.status() != 0 {
                return Err(Error::ErrorCommand(commands::CMD13.index(), status.status()));
            }

            Ok(())
        } else {
            self.send_command_expect_ready(commands::CMD25, address)?;
            let result = buf
                .chunks(BLOCK_SIZE)
                .try_for_each(|block| self.write_data(tokens::WRITE_MULTIPLE, block));
            let stopped = self.stop_write();

            result.and(stopped)
        }
    }

    /// Erase `count` blocks starting at `start_block`, one erase sector at a
    /// time.
    pub fn erase_blocks(&self, start_block: u32, count: u32) -> Result<(), ErrorFor<T>> {
        let card = self.card()?;

        if card.csd.is_write_protected() {
            warn!("SD is write protected");
            return Err(Error::WriteProtected);
        }
        if count == 0 {
            return Err(Error::InvalidArgument);
        }
        Self::start_address(card, start_block, count)?;

        let sector = card.csd.erase_sector_blocks();
        let mut erased = 0;

        while erased < count {
            let chunk = (count - erased).min(sector);
            let first = start_block + erased;

            self.erase_range(card, first, first + (chunk - 1))?;
            erased += chunk;
        }

        Ok(())
    }

    /// Erase the inclusive block range `first..=last`.
    fn erase_range(&self, card: &CardInfo, first: u32, last: u32) -> Result<(), ErrorFor<T>> {
        let start = card.block_address(first).ok_or(Error::OutOfRange)?;
        let end = card.block_address(last).ok_or(Error::OutOfRange)?;

        trace!("SD erase, blocks: {}..={}", first, last);

        self.wait_ready()?;
        self.send_command_expect_ready(commands::CMD32, start)?;
        self.send_command_expect_ready(commands::CMD33, end)?;
        self.send_command_expect_ready(commands::CMD38, 0x0000_0000)?;

        Ok(())
    }

    /// Tell the card how many blocks the next multiple block write covers, so
    /// it can pre-erase them.
    pub fn erase_blocks_pre(&self, count: u32) -> Result<(), ErrorFor<T>> {
        self.card()?;

        if count == 0 || count > arguments::MAX_ERASE_COUNT {
            return Err(Error::InvalidArgument);
        }

        self.send_command_expect_ready(commands::ACMD23, count)
            .map(|_| ())
    }

    /// SWITCH_FUNC for one function of one group.
    fn switch_function(
        &self,
        mode: u32,
        group: u32,
        function: u32,
    ) -> Result<SwitchStatus, ErrorFor<T>> {
        let shift = group * 4;
        let arg = (((mode << 31) | 0x00FF_FFFF) & !(0x0F << shift)) | (function << shift);
        let mut status: SwitchStatusData = [0; 64];

        self.send_command_expect_ready(commands::CMD6, arg)?;
        self.read_data(&mut status)?;

        Ok(SwitchStatus::from(status))
    }

    /// Switch the card to high speed and raise the bus clock.
    ///
    /// Fails with [`Error::NotSupported`] when the card lacks the switch
    /// command class or does not offer high speed.
    pub fn switch_to_high_speed(&self) -> Result<(), ErrorFor<T>> {
        let card = self.card()?;

        if !card.csd.supports_switch() {
            info!("SD has no switch function support");
            return Err(Error::NotSupported);
        }

        let status = self.switch_function(
            functions::MODE_CHECK,
            functions::GROUP_ACCESS_MODE,
            functions::FUNCTION_HIGH_SPEED,
        )?;
        if !status.can_switch(functions::GROUP_ACCESS_MODE, functions::FUNCTION_HIGH_SPEED) {
            info!("SD has no high speed support");
            return Err(Error::NotSupported);
        }

        let status = self.switch_function(
            functions::MODE_SET,
            functions::GROUP_ACCESS_MODE,
            functions::FUNCTION_HIGH_SPEED,
        )?;
        let selected = u32::from(status.selected(functions::GROUP_ACCESS_MODE));
        if selected != functions::FUNCTION_HIGH_SPEED {
            warn!("SD refused high speed");
            return Err(Error::SwitchFailed);
        }

        self.set_frequency(clocks::HIGH_SPEED_HZ.min(self.max_frequency))?;
        info!("SD switched to high speed");

        Ok(())
    }

    /// Read the CID register and keep it in the card info.
    pub fn read_cid(&mut self) -> Result<Cid, ErrorFor<T>> {
        self.card()?;

        let mut cid_data: CidData = Default::default();
        self.send_command_expect_ready(commands::CMD10, 0x0000_0000)?;
        self.read_data(&mut cid_data)?;

        let cid = Cid::from(cid_data);
        if let Some(card) = self.card.as_mut() {
            card.cid = Some(cid);
        }

        Ok(cid)
    }

    /// Re-read the CSD register and refresh the card geometry.
    pub fn read_csd(&mut self) -> Result<Csd, ErrorFor<T>> {
        self.card()?;

        let csd = self.fetch_csd()?;
        if let Some(card) = self.card.as_mut() {
            card.apply_csd(csd);
        }

        Ok(csd)
    }

    /// Re-read the SCR register.
    pub fn read_scr(&mut self) -> Result<Scr, ErrorFor<T>> {
        self.card()?;

        let scr = self.fetch_scr()?;
        if let Some(card) = self.card.as_mut() {
            card.scr = scr;
        }

        Ok(scr)
    }

    /// Card is write protected. An uninitialized card reports `false`.
    pub fn is_read_only(&self) -> bool {
        self.card
            .as_ref()
            .map_or(false, |card| card.csd.is_write_protected())
    }

    /// Total 512-byte blocks.
    pub fn block_count(&self) -> Result<u64, ErrorFor<T>> {
        self.card().map(|card| card.block_count)
    }

    /// Block size, bytes.
    pub fn block_size(&self) -> Result<u32, ErrorFor<T>> {
        self.card().map(|card| card.block_size)
    }

    /// Everything known about the card, once initialized.
    pub fn card_info(&self) -> Option<&CardInfo> {
        self.card.as_ref()
    }

    /// Forget the card. The transport stays as it is.
    pub fn deinit(&mut self) {
        info!("SD deinitialized");
        self.card = None;
        self.status = StatusFlag::NotInitialized.into();
    }
}
