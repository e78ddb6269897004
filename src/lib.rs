//! SD card block driver over SPI, written in Embedded Rust.
//!
//! This crate brings up SD memory cards (SDSC, SDHC, SDXC) in SPI mode and
//! reads, writes and erases their 512-byte blocks. The bus is consumed through
//! the [`Transport`] trait; [`SpiTransport`] adapts an `embedded-hal` SPI bus
//! and a chip select switch. [`SdSpi`] also implements
//! [`DiskioDevice`] so a filesystem layer can sit on top.

#![cfg_attr(not(test), no_std)]

mod fmt;

mod card;
mod cid;
mod command;
mod config;
mod consts;
mod crc;
mod csd;
mod init;
mod ops;
mod response;
mod scr;
mod switch;
mod transfer;
mod transport;

pub use crate::card::{CardInfo, CardKind, CardType};
pub use crate::cid::{Cid, CidData};
pub use crate::command::Command;
pub use crate::config::{DefaultSdSpiConfig, SdSpiConfig};
pub use crate::consts::{clocks, BLOCK_SIZE};
pub use crate::csd::{CapacityProvider, Csd, CsdData, CsdV1, CsdV2};
pub use crate::init::InitStage;
pub use crate::response::{R1Response, Response, ResponseType};
pub use crate::scr::{Scr, ScrData, SdSpecVersion};
pub use crate::switch::{SwitchStatus, SwitchStatusData};
pub use crate::transport::{SpiError, SpiTransport, Transport};
pub use diskio::{
    BlockSize, DiskioDevice, Error as DiskioError, IoctlCmd, Lba, Status, StatusFlag,
};

use core::{cell::RefCell, marker::PhantomData};

/// [`SdSpi`] result error.
///
/// `T` - transport error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<T> {
    /// Transport failed to bring up the bus.
    TransportInit(T),
    /// Transport refused a bus clock.
    SetFrequency(T),
    /// Transport failed to exchange bytes.
    Transport(T),
    /// No response when waiting for the card to not be busy.
    WaitReadyFailed,
    /// No response when executing this command.
    TimeoutCommand(u8),
    /// Command answered with error bits (index, response).
    ErrorCommand(u8, u8),
    /// No response when reading data from the card.
    TimeoutReadBuffer,
    /// Unexpected data token or rejected data block.
    ResponseError(u8),
    /// CRC mismatch (card, host).
    CrcError(u16, u16),
    /// Card did not enter SPI mode.
    GoIdleFailed,
    /// Interface condition check failed.
    SendIfCondFailed,
    /// Card does not accept the supply voltage.
    InvalidVoltage,
    /// Failed to enable CRC checking on the card.
    EnableCrcFailed,
    /// Card never left idle state.
    SendOpCondFailed,
    /// Failed to read the OCR register.
    ReadOcrFailed,
    /// Failed to set the block length.
    SetBlockSizeFailed,
    /// Failed to read the Card Specific Data register.
    SendCsdFailed,
    /// Failed to read the SD Configuration Register.
    SendScrFailed,
    /// Card is write protected.
    WriteProtected,
    /// Buffer length or block count is not usable.
    InvalidArgument,
    /// Blocks beyond the end of the card.
    OutOfRange,
    /// Card is not initialized.
    NotInitialized,
    /// Card lacks the requested function.
    NotSupported,
    /// Card refused to switch function.
    SwitchFailed,
}

impl<T> Error<T> {
    /// Error raised by the transport itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::TransportInit(_) | Error::SetFrequency(_) | Error::Transport(_)
        )
    }
}

/// Error type alias.
pub type ErrorFor<T> = Error<<T as Transport>::Error>;

/// SD Card SPI driver.
///
/// `T` - Transport.
/// `Config` - Config implementation of driver config trait.
pub struct SdSpi<'a, T: Transport, Config: SdSpiConfig = DefaultSdSpiConfig> {
    transport: RefCell<&'a mut T>,
    max_frequency: u32,
    status: Status,
    card: Option<CardInfo>,
    config: PhantomData<Config>,
}

impl<'a, T: Transport, Config: SdSpiConfig> SdSpi<'a, T, Config> {
    /// Creates a new [`SdSpi<T, Config>`].
    ///
    /// `transport` - bus to the card, borrowed for the driver's lifetime.
    /// `max_frequency` - bus clock ceiling, Hz.
    pub fn new(transport: &'a mut T, max_frequency: u32) -> Self {
        SdSpi {
            transport: RefCell::new(transport),
            max_frequency,
            status: StatusFlag::NotInitialized.into(),
            card: None,
            config: PhantomData::<Config>,
        }
    }

    /// Convert lba.
    fn convert_lba(lba: Lba) -> Result<u32, DiskioError<ErrorFor<T>>> {
        u32::try_from(lba).map_err(|_| DiskioError::InvalidArgument)
    }

    /// Map a driver error onto the block device contract.
    fn diskio_error(err: ErrorFor<T>) -> DiskioError<ErrorFor<T>> {
        match err {
            Error::InvalidArgument => DiskioError::InvalidArgument,
            Error::NotInitialized => DiskioError::NotInitialized,
            err => DiskioError::Hardware(err),
        }
    }
}

impl<'a, T: Transport, Config: SdSpiConfig> DiskioDevice for SdSpi<'a, T, Config> {
    type HardwareError = ErrorFor<T>;

    fn status(&self) -> Status {
        self.status
    }

    fn reset(&mut self) {
        info!("SD reset invoked");
        self.deinit();
    }

    fn initialize(&mut self) -> Result<(), DiskioError<Self::HardwareError>> {
        if !self.status.contains(StatusFlag::NotInitialized) {
            warn!("SD already is initialized");
            return Err(DiskioError::AlreadyInitialized);
        }

        self.init().map_err(DiskioError::Hardware)
    }

    fn read(&self, buf: &mut [u8], lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        self.read_blocks(buf, Self::convert_lba(lba)?)
            .map_err(Self::diskio_error)
    }

    fn write(&self, buf: &[u8], lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        self.write_blocks(buf, Self::convert_lba(lba)?)
            .map_err(Self::diskio_error)
    }

    fn ioctl(&self, cmd: IoctlCmd) -> Result<(), DiskioError<Self::HardwareError>> {
        match cmd {
            IoctlCmd::CtrlSync => self.wait_ready().map_err(Self::diskio_error),
            IoctlCmd::GetBlockSize(block_size) => {
                *block_size = BLOCK_SIZE;
                Ok(())
            }
            _ => Err(DiskioError::NotSupported),
        }
    }
}
