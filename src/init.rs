//! Card bring-up.

use crate::{
    card::{CardInfo, CardType},
    consts::{arguments, clocks, commands, tokens, BLOCK_SIZE_U32, INIT_SET_SIZE},
    csd::{CapacityProvider, Csd, CsdData},
    response::R1Response,
    scr::{Scr, ScrData},
    Error, ErrorFor, SdSpi, SdSpiConfig, Status, StatusFlag, Transport,
};

/// Steps of the initialization sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitStage {
    /// Bus bring-up and identification clock.
    TransportInit,
    /// GO_IDLE_STATE.
    Reset,
    /// SEND_IF_COND.
    InterfaceCondition,
    /// CRC_ON_OFF, only with CRC protection.
    EnableCrc,
    /// SD_SEND_OP_COND until the card leaves idle state.
    OperatingCondition,
    /// READ_OCR.
    ReadOcr,
    /// SET_BLOCKLEN to 512 bytes.
    FixBlockSize,
    /// SEND_CSD.
    FetchCsd,
    /// Data transfer clock.
    RaiseFrequency,
    /// SEND_SCR.
    FetchScr,
}

impl<'a, T, Config> SdSpi<'a, T, Config>
where
    T: Transport,
    Config: SdSpiConfig,
{
    /// Initialize the card.
    ///
    /// On success the card is in data transfer state, clocked at the lower of
    /// its own maximum and the transport ceiling. Re-running it starts over
    /// from reset.
    pub fn init(&mut self) -> Result<(), ErrorFor<T>> {
        info!("SD initialize started");

        self.card = None;
        self.status = StatusFlag::NotInitialized.into();

        match self.init_sequence() {
            Ok(card) => {
                info!(
                    "SD successfully initialized, kind: {:?}, blocks: {}, capacity: {} bytes",
                    card.card_type.kind(),
                    card.block_count,
                    card.csd.card_capacity().bytes()
                );
                self.status = Status::default();
                self.card = Some(card);
                Ok(())
            }
            Err(err) => {
                self.status = StatusFlag::ErrorOccured | StatusFlag::NotInitialized;
                Err(err)
            }
        }
    }

    fn init_sequence(&self) -> Result<CardInfo, ErrorFor<T>> {
        self.enter(InitStage::TransportInit);
        self.transport
            .borrow_mut()
            .init()
            .map_err(Error::TransportInit)?;
        self.set_frequency(clocks::IDENTIFICATION_HZ)?;
        self.send_slice(&[tokens::AVAILABLE; INIT_SET_SIZE][..])?;

        self.enter(InitStage::Reset);
        self.go_idle()?;

        self.enter(InitStage::InterfaceCondition);
        let op_cond_arg = self.send_if_cond()?;

        if Config::CRC_PROTECTION {
            self.enter(InitStage::EnableCrc);
            self.enable_crc()?;
        }

        self.enter(InitStage::OperatingCondition);
        self.send_op_cond(op_cond_arg)?;

        self.enter(InitStage::ReadOcr);
        let card_type = self.read_ocr()?;

        self.enter(InitStage::FixBlockSize);
        self.set_block_size()?;

        self.enter(InitStage::FetchCsd);
        let csd = self
            .fetch_csd()
            .map_err(|err| self.fail(InitStage::FetchCsd, err, Error::SendCsdFailed))?;
        let mut card = CardInfo::new(card_type, csd);

        self.enter(InitStage::RaiseFrequency);
        self.set_frequency(csd.max_transfer_rate_hz().min(self.max_frequency))?;

        self.enter(InitStage::FetchScr);
        card.scr = self
            .fetch_scr()
            .map_err(|err| self.fail(InitStage::FetchScr, err, Error::SendScrFailed))?;

        Ok(card)
    }

    fn enter(&self, stage: InitStage) {
        debug!("SD init stage: {:?}", stage);
    }

    /// Logs a failed stage and replaces the cause with the stage error.
    fn fail(&self, stage: InitStage, cause: ErrorFor<T>, error: ErrorFor<T>) -> ErrorFor<T> {
        if cause.is_transport() {
            error!("SD init stage {:?} failed on transport", stage);
        } else {
            error!("SD init stage {:?} failed", stage);
        }
        error
    }

    /// Enter SPI mode.
    ///
    /// Some cards never report the idle flag but still work, so exhausting
    /// the attempts is tolerated once any valid R1 was seen.
    fn go_idle(&self) -> Result<(), ErrorFor<T>> {
        let mut responded = false;

        for attempt in 0..Config::GO_IDLE_ATTEMPTS {
            match self.send_command(commands::CMD0, 0x0000_0000) {
                Ok(response) if response.r1() == R1Response::IN_IDLE_STATE => return Ok(()),
                Ok(response) => {
                    trace!(
                        "Wrong response from CMD0, attempt: {}, r1: {}",
                        attempt + 1,
                        response.r1().bits()
                    );
                    responded = true;
                }
                Err(err) if err.is_transport() => {
                    return Err(self.fail(InitStage::Reset, err, Error::GoIdleFailed))
                }
                Err(_) => {}
            }
        }

        if responded {
            warn!("SD never reported idle state, continuing");
            Ok(())
        } else {
            Err(self.fail(InitStage::Reset, Error::TimeoutCommand(0), Error::GoIdleFailed))
        }
    }

    /// Verify SD Memory Card interface operating condition.
    ///
    /// Returns the SD_SEND_OP_COND argument: host capacity support for
    /// version 2 cards, nothing for legacy cards.
    fn send_if_cond(&self) -> Result<u32, ErrorFor<T>> {
        for _ in 0..Config::IF_COND_ATTEMPTS {
            let response = self
                .send_command(commands::CMD8, arguments::IF_COND)
                .map_err(|err| {
                    self.fail(InitStage::InterfaceCondition, err, Error::SendIfCondFailed)
                })?;

            if response.r1().illegal_command() {
                info!("SD card predates SEND_IF_COND");
                return Ok(0);
            }

            let [_, _, voltage, pattern] = response.trailing();

            if voltage == 0x01 && pattern == 0xAA {
                return Ok(arguments::HOST_CAPACITY_SUPPORT);
            }

            if voltage == 0x00 {
                error!("SD rejected the supply voltage");
                return Err(Error::InvalidVoltage);
            }
        }

        Err(self.fail(
            InitStage::InterfaceCondition,
            Error::TimeoutCommand(commands::CMD8.index()),
            Error::SendIfCondFailed,
        ))
    }

    /// Enable CRC.
    fn enable_crc(&self) -> Result<(), ErrorFor<T>> {
        match self.send_command(commands::CMD59, arguments::CRC_ON) {
            Ok(response) if !response.r1().has_error() => Ok(()),
            Ok(response) => Err(self.fail(
                InitStage::EnableCrc,
                Error::ErrorCommand(commands::CMD59.index(), response.r1().bits()),
                Error::EnableCrcFailed,
            )),
            Err(err) => Err(self.fail(InitStage::EnableCrc, err, Error::EnableCrcFailed)),
        }
    }

    /// Sends host capacity support information and activates.
    fn send_op_cond(&self, arg: u32) -> Result<(), ErrorFor<T>> {
        for _ in 0..Config::OP_COND_ATTEMPTS {
            match self.send_command(commands::ACMD41, arg) {
                Ok(response) if !response.r1().in_idle_state() => return Ok(()),
                Ok(_) => {}
                Err(err) if err.is_transport() => {
                    return Err(self.fail(
                        InitStage::OperatingCondition,
                        err,
                        Error::SendOpCondFailed,
                    ))
                }
                Err(_) => {}
            }
        }

        Err(self.fail(
            InitStage::OperatingCondition,
            Error::TimeoutCommand(commands::ACMD41.index()),
            Error::SendOpCondFailed,
        ))
    }

    /// Read OCR and derive the capacity flag.
    fn read_ocr(&self) -> Result<CardType, ErrorFor<T>> {
        let response = self
            .send_command_expect_ready(commands::CMD58, 0x0000_0000)
            .map_err(|err| self.fail(InitStage::ReadOcr, err, Error::ReadOcrFailed))?;

        if response.payload() & arguments::OCR_CARD_CAPACITY_STATUS != 0 {
            Ok(CardType::HIGH_CAPACITY)
        } else {
            Ok(CardType::empty())
        }
    }

    /// Fix the block length at 512 bytes.
    fn set_block_size(&self) -> Result<(), ErrorFor<T>> {
        for _ in 0..Config::SET_BLOCK_SIZE_ATTEMPTS {
            match self.send_command(commands::CMD16, BLOCK_SIZE_U32) {
                Ok(_) => return Ok(()),
                Err(err) if err.is_transport() => {
                    return Err(self.fail(InitStage::FixBlockSize, err, Error::SetBlockSizeFailed))
                }
                Err(_) => {}
            }
        }

        Err(self.fail(
            InitStage::FixBlockSize,
            Error::TimeoutCommand(commands::CMD16.index()),
            Error::SetBlockSizeFailed,
        ))
    }

    /// Read CSD.
    pub(crate) fn fetch_csd(&self) -> Result<Csd, ErrorFor<T>> {
        let mut csd_data: CsdData = Default::default();

        self.send_command_expect_ready(commands::CMD9, 0x0000_0000)?;
        self.read_data(&mut csd_data)?;

        Ok(Csd::from(csd_data))
    }

    /// Read SCR.
    pub(crate) fn fetch_scr(&self) -> Result<Scr, ErrorFor<T>> {
        let mut scr_data: ScrData = Default::default();

        self.send_command_expect_ready(commands::ACMD51, 0x0000_0000)?;
        self.read_data(&mut scr_data)?;

        Ok(Scr::from(scr_data))
    }
}
