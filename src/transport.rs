//! Bus capability consumed by the driver.

use crate::consts::{clocks, tokens, INIT_SET_SIZE};

use embedded_hal::blocking::spi::Transfer;
use switch_hal::OutputSwitch;

/// Bytes moved per SPI transfer call.
const CHUNK_SIZE: usize = 32;

/// Byte transport to a single card.
///
/// The driver borrows the transport for its whole lifetime and never tears it
/// down.
pub trait Transport {
    /// Transport error type.
    type Error: core::fmt::Debug;

    /// Brings up the bus and leaves the card addressable.
    ///
    /// The driver clocks the power-up idle bytes itself once the
    /// identification clock is set.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Sets the bus clock, Hz.
    fn set_frequency(&mut self, hz: u32) -> Result<(), Self::Error>;

    /// Exchanges bytes full-duplex.
    ///
    /// A missing `tx` clocks out `0xFF` filler, a missing `rx` discards what
    /// the card sends. When both are given they must be the same length.
    fn exchange(&mut self, tx: Option<&[u8]>, rx: Option<&mut [u8]>) -> Result<(), Self::Error>;
}

/// [`SpiTransport`] error.
///
/// `T` - SPI error type.
/// `S` - select switch error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiError<T, S> {
    /// Error from the SPI peripheral.
    Transport(T),
    /// Couldn't set a select.
    SelectError(S),
    /// Transmit and receive buffers differ in length.
    BufferMismatch,
}

/// [`Transport`] over a blocking `embedded-hal` SPI bus and a chip select
/// switch.
///
/// `Spi` - SPI.
/// `Cs` - Chip select output switch.
/// `Clock` - Sets the SPI clock, Hz.
pub struct SpiTransport<Spi, Cs, Clock> {
    spi: Spi,
    cs: Cs,
    clock: Clock,
}

impl<Spi, Cs, Clock> SpiTransport<Spi, Cs, Clock>
where
    Spi: Transfer<u8>,
    Cs: OutputSwitch,
    Clock: FnMut(&mut Spi, u32) -> Result<(), Spi::Error>,
{
    /// Creates a new [`SpiTransport<Spi, Cs, Clock>`].
    ///
    /// `spi` - SPI instance.
    /// `cs` - chip select output switch.
    /// `clock` - reprograms the SPI clock.
    pub fn new(spi: Spi, cs: Cs, clock: Clock) -> Self {
        SpiTransport { spi, cs, clock }
    }

    /// Releases the bus parts.
    pub fn release(self) -> (Spi, Cs) {
        (self.spi, self.cs)
    }

    /// Activate chip select.
    fn select(&mut self) -> Result<(), SpiError<Spi::Error, Cs::Error>> {
        self.cs.on().map_err(SpiError::SelectError)
    }

    /// Deactivate chip select.
    fn unselect(&mut self) -> Result<(), SpiError<Spi::Error, Cs::Error>> {
        self.cs.off().map_err(SpiError::SelectError)
    }
}

impl<Spi, Cs, Clock> Transport for SpiTransport<Spi, Cs, Clock>
where
    Spi: Transfer<u8>,
    Spi::Error: core::fmt::Debug,
    Cs: OutputSwitch,
    Cs::Error: core::fmt::Debug,
    Clock: FnMut(&mut Spi, u32) -> Result<(), Spi::Error>,
{
    type Error = SpiError<Spi::Error, Cs::Error>;

    /// Clocks idle bytes with chip select released, then selects the card for
    /// good.
    fn init(&mut self) -> Result<(), Self::Error> {
        self.unselect()?;
        self.set_frequency(clocks::IDENTIFICATION_HZ)?;
        self.exchange(Some(&[tokens::AVAILABLE; INIT_SET_SIZE][..]), None)?;
        self.select()
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), Self::Error> {
        (self.clock)(&mut self.spi, hz).map_err(SpiError::Transport)
    }

    fn exchange(
        &mut self,
        tx: Option<&[u8]>,
        mut rx: Option<&mut [u8]>,
    ) -> Result<(), Self::Error> {
        let len = match (tx, rx.as_deref()) {
            (Some(tx), Some(rx)) if tx.len() != rx.len() => {
                return Err(SpiError::BufferMismatch)
            }
            (Some(tx), _) => tx.len(),
            (None, Some(rx)) => rx.len(),
            (None, None) => 0,
        };

        let mut offset = 0;
        while offset < len {
            let n = (len - offset).min(CHUNK_SIZE);
            let mut chunk = [tokens::AVAILABLE; CHUNK_SIZE];

            if let Some(tx) = tx {
                chunk[..n].copy_from_slice(&tx[offset..offset + n]);
            }

            let received = self
                .spi
                .transfer(&mut chunk[..n])
                .map_err(SpiError::Transport)?;

            if let Some(rx) = rx.as_deref_mut() {
                rx[offset..offset + n].copy_from_slice(&received[..n]);
            }

            offset += n;
        }

        Ok(())
    }
}
