//! Data block framing.

use crate::{
    consts::{commands, tokens},
    crc::crc16,
    Error, ErrorFor, SdSpi, SdSpiConfig, Transport,
};

impl<'a, T, Config> SdSpi<'a, T, Config>
where
    T: Transport,
    Config: SdSpiConfig,
{
    /// Read a data block that follows a read command.
    pub(crate) fn read_data(&self, data: &mut [u8]) -> Result<(), ErrorFor<T>> {
        let token =
            self.wait_for_token(|token| token != tokens::AVAILABLE, Error::TimeoutReadBuffer)?;

        if token != tokens::DATA_START_BLOCK {
            warn!("SD unexpected data token: {}", token);
            return Err(Error::ResponseError(token));
        }

        self.receive_slice(data)?;

        let mut crc = [0u8; 2];
        self.receive_slice(&mut crc[..])?;

        if Config::CRC_PROTECTION {
            let card = u16::from_be_bytes(crc);
            let host = crc16(data);

            if card != host {
                warn!("SD data CRC mismatch, card: {}, host: {}", card, host);
                return Err(Error::CrcError(card, host));
            }
        }

        Ok(())
    }

    /// Write a data block after a write command, starting with `token`.
    pub(crate) fn write_data(&self, token: u8, data: &[u8]) -> Result<(), ErrorFor<T>> {
        self.wait_ready()?;
        self.send_slice(&[token][..])?;
        self.send_slice(data)?;

        let crc = if Config::CRC_PROTECTION {
            crc16(data)
        } else {
            0xFFFF
        };
        self.send_slice(&crc.to_be_bytes()[..])?;

        let response = self.receive()?;
        if response & tokens::DATA_RES_MASK != tokens::DATA_RES_ACCEPTED {
            warn!("SD data rejected: {}", response);
            return Err(Error::ResponseError(response));
        }

        Ok(())
    }

    /// End a multiple block write and wait for programming.
    pub(crate) fn stop_write(&self) -> Result<(), ErrorFor<T>> {
        self.wait_ready()?;
        self.send_slice(&[tokens::STOP_TRAN][..])?;
        self.wait_ready()
    }

    /// End a multiple block read.
    pub(crate) fn stop_read(&self) -> Result<(), ErrorFor<T>> {
        self.send_command(commands::CMD12, 0).map(|_| ())
    }
}
