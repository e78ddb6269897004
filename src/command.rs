//! Command frames and responses.

use crate::{
    consts::{commands, tokens},
    crc::crc7,
    response::{R1Response, Response, ResponseType},
    Error, ErrorFor, SdSpi, SdSpiConfig, Transport,
};

/// A command as sent on the bus: index, response shape and whether it must be
/// announced with APP_CMD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command {
    index: u8,
    response: ResponseType,
    app: bool,
}

impl Command {
    /// Start and transmission bits of the first frame byte.
    const START_BITS: u8 = 0x40;
    /// Frame length, bytes.
    pub const FRAME_LEN: usize = 6;

    /// Generic command.
    pub const fn new(index: u8, response: ResponseType) -> Self {
        Command {
            index,
            response,
            app: false,
        }
    }

    /// Application specific command.
    pub const fn app(index: u8, response: ResponseType) -> Self {
        Command {
            index,
            response,
            app: true,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn response_type(&self) -> ResponseType {
        self.response
    }

    pub fn is_app(&self) -> bool {
        self.app
    }

    /// Encodes the command frame.
    ///
    /// Without CRC protection the card only checks the CRC of GO_IDLE_STATE
    /// and SEND_IF_COND, which get their fixed CRC bytes.
    pub fn frame(&self, arg: u32, crc_protection: bool) -> [u8; Self::FRAME_LEN] {
        let [a3, a2, a1, a0] = arg.to_be_bytes();
        let mut frame = [Self::START_BITS | (self.index & 0x3F), a3, a2, a1, a0, 0];

        frame[5] = if crc_protection {
            (crc7(&frame[..5]) << 1) | 0x01
        } else if *self == commands::CMD0 {
            tokens::CMD0_CRC
        } else if *self == commands::CMD8 {
            tokens::CMD8_CRC
        } else {
            tokens::DUMMY_CRC
        };

        frame
    }
}

impl<'a, T, Config> SdSpi<'a, T, Config>
where
    T: Transport,
    Config: SdSpiConfig,
{
    /// Exchange bytes with the card.
    pub(crate) fn exchange(
        &self,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
    ) -> Result<(), ErrorFor<T>> {
        self.transport
            .borrow_mut()
            .exchange(tx, rx)
            .map_err(Error::Transport)
    }

    /// Receive a byte from the SD card by clocking in an 0xFF byte.
    pub(crate) fn receive(&self) -> Result<u8, ErrorFor<T>> {
        let mut byte = [0u8];
        self.exchange(None, Some(&mut byte[..]))?;
        Ok(byte[0])
    }

    /// Receive a slice from the SD card.
    pub(crate) fn receive_slice(&self, data: &mut [u8]) -> Result<(), ErrorFor<T>> {
        self.exchange(None, Some(data))
    }

    /// Send a slice to the SD card.
    pub(crate) fn send_slice(&self, data: &[u8]) -> Result<(), ErrorFor<T>> {
        self.exchange(Some(data), None)
    }

    /// Skip byte.
    fn skip_byte(&self) -> Result<(), ErrorFor<T>> {
        self.receive().map(|_| ())
    }

    /// Wait for token.
    pub(crate) fn wait_for_token<F: Fn(u8) -> bool>(
        &self,
        token_validator: F,
        error: ErrorFor<T>,
    ) -> Result<u8, ErrorFor<T>> {
        for _ in 0..Config::TRANSFER_RETRY_TIMES {
            let token = self.receive()?;

            if token_validator(token) {
                return Ok(token);
            }
        }

        Err(error)
    }

    /// Wait until the card releases the bus.
    pub(crate) fn wait_ready(&self) -> Result<(), ErrorFor<T>> {
        self.wait_for_token(|token| token == tokens::AVAILABLE, Error::WaitReadyFailed)
            .map(|_| ())
    }

    /// Send command implementation.
    fn send_command_impl(&self, cmd: Command, arg: u32) -> Result<Response, ErrorFor<T>> {
        // The card is streaming data when STOP_TRANSMISSION is due.
        if cmd != commands::CMD0 && cmd != commands::CMD12 {
            self.wait_ready()?;
        }

        self.send_slice(&cmd.frame(arg, Config::CRC_PROTECTION))?;

        if cmd == commands::CMD12 {
            self.skip_byte()?;
        }

        let mut r1 = None;
        for _ in 0..Config::RESPONSE_ATTEMPTS {
            let byte = R1Response::from_byte(self.receive()?);

            if byte.is_valid() {
                r1 = Some(byte);
                break;
            }
        }
        let r1 = r1.ok_or(Error::TimeoutCommand(cmd.index()))?;

        let mut trailing = [0u8; 4];
        let trailing_len = cmd.response_type().trailing_len();
        if trailing_len > 0 {
            self.receive_slice(&mut trailing[..trailing_len])?;
        }

        if cmd.response_type() == ResponseType::R1b {
            self.wait_ready()?;
        }

        Ok(Response::new(r1, trailing))
    }

    /// Send APP_CMD.
    ///
    /// Any R1 with the idle flag set is accepted, since the card may still be
    /// initializing.
    fn send_app_command(&self) -> Result<(), ErrorFor<T>> {
        let r1 = self.send_command_impl(commands::CMD55, 0x0000_0000)?.r1();

        if r1 != R1Response::READY_STATE && !r1.in_idle_state() {
            Err(Error::ErrorCommand(commands::CMD55.index(), r1.bits()))
        } else {
            Ok(())
        }
    }

    /// Send command, prefixed with APP_CMD for application commands.
    pub(crate) fn send_command(&self, cmd: Command, arg: u32) -> Result<Response, ErrorFor<T>> {
        if cmd.is_app() {
            self.send_app_command()?;
        }

        self.send_command_impl(cmd, arg)
    }

    /// Send command and require a clean R1.
    pub(crate) fn send_command_expect_ready(
        &self,
        cmd: Command,
        arg: u32,
    ) -> Result<Response, ErrorFor<T>> {
        let response = self.send_command(cmd, arg)?;

        if response.r1() != R1Response::READY_STATE {
            Err(Error::ErrorCommand(cmd.index(), response.r1().bits()))
        } else {
            Ok(response)
        }
    }

    /// Ask the transport for a new bus clock.
    pub(crate) fn set_frequency(&self, hz: u32) -> Result<(), ErrorFor<T>> {
        debug!("SD bus clock: {} Hz", hz);

        self.transport
            .borrow_mut()
            .set_frequency(hz)
            .map_err(Error::SetFrequency)
    }
}
