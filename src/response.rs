use bitfield::bitfield;

bitfield! {
    /// R1 response bitset.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct R1Response(u8);
    impl Debug;
    pub in_idle_state, _: 0;
    pub erase_reset, _: 1;
    pub illegal_command, _: 2;
    pub command_crc_error, _: 3;
    pub erase_sequence_error, _: 4;
    pub address_error, _: 5;
    pub parameter_error, _: 6;
    pub start_bit, _: 7;
}

impl R1Response {
    /// Card is ready, no error bits.
    pub const READY_STATE: R1Response = R1Response(0x00);
    /// Card is in idle state, no error bits.
    pub const IN_IDLE_STATE: R1Response = R1Response(0x01);

    pub const fn from_byte(byte: u8) -> Self {
        R1Response(byte)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// A response byte always starts with a zero bit.
    pub fn is_valid(&self) -> bool {
        !self.start_bit()
    }

    /// Any bit other than the idle flag is set.
    pub fn has_error(&self) -> bool {
        self.0 & !Self::IN_IDLE_STATE.0 != 0
    }
}

/// Shape of a command's reply in SPI mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseType {
    /// One byte.
    R1,
    /// One byte, then the card holds the bus busy.
    R1b,
    /// Two bytes.
    R2,
    /// R1 plus the 32-bit OCR.
    R3,
    /// R1 plus the 32-bit interface condition echo.
    R7,
}

impl ResponseType {
    /// Bytes that follow the R1 byte.
    pub const fn trailing_len(self) -> usize {
        match self {
            ResponseType::R1 | ResponseType::R1b => 0,
            ResponseType::R2 => 1,
            ResponseType::R3 | ResponseType::R7 => 4,
        }
    }
}

/// A received response: the R1 byte and up to four trailing bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    r1: R1Response,
    trailing: [u8; 4],
}

impl Response {
    pub fn new(r1: R1Response, trailing: [u8; 4]) -> Self {
        Response { r1, trailing }
    }

    pub fn r1(&self) -> R1Response {
        self.r1
    }

    /// Second status byte of an R2 response.
    pub fn status(&self) -> u8 {
        self.trailing[0]
    }

    /// Raw trailing bytes, wire order.
    pub fn trailing(&self) -> [u8; 4] {
        self.trailing
    }

    /// 32-bit payload of an R3/R7 response, transferred MSB first.
    pub fn payload(&self) -> u32 {
        u32::from_be_bytes(self.trailing)
    }
}
