/// Normalized block size, bytes.
pub const BLOCK_SIZE: usize = 512;
/// Normalized block size, bytes.
pub const BLOCK_SIZE_U32: u32 = BLOCK_SIZE as u32;
/// Normalized block size, bytes.
pub const BLOCK_SIZE_U64: u64 = BLOCK_SIZE as u64;
/// Init sequence size, at least 74 clock cycles.
pub(crate) const INIT_SET_SIZE: usize = 10;

pub mod commands {
    use crate::{command::Command, response::ResponseType};

    /// GO_IDLE_STATE - init card in spi mode if CS low.
    pub const CMD0: Command = Command::new(0, ResponseType::R1);
    /// SWITCH_FUNC - check or switch card function.
    pub const CMD6: Command = Command::new(6, ResponseType::R1);
    /// SEND_IF_COND - verify SD Memory Card interface operating condition.
    pub const CMD8: Command = Command::new(8, ResponseType::R7);
    /// SEND_CSD - read the Card Specific Data (CSD register).
    pub const CMD9: Command = Command::new(9, ResponseType::R1);
    /// SEND_CID - read the Card Identification (CID register).
    pub const CMD10: Command = Command::new(10, ResponseType::R1);
    /// STOP_TRANSMISSION - end multiple block read sequence.
    pub const CMD12: Command = Command::new(12, ResponseType::R1b);
    /// SEND_STATUS - read the card status register.
    pub const CMD13: Command = Command::new(13, ResponseType::R2);
    /// SET_BLOCKLEN - set the block length of standard capacity cards.
    pub const CMD16: Command = Command::new(16, ResponseType::R1);
    /// READ_SINGLE_BLOCK - read a single data block from the card.
    pub const CMD17: Command = Command::new(17, ResponseType::R1);
    /// READ_MULTIPLE_BLOCK - read a multiple data blocks from the card.
    pub const CMD18: Command = Command::new(18, ResponseType::R1);
    /// WRITE_BLOCK - write a single data block to the card.
    pub const CMD24: Command = Command::new(24, ResponseType::R1);
    /// WRITE_MULTIPLE_BLOCK - write blocks of data until a stop token.
    pub const CMD25: Command = Command::new(25, ResponseType::R1);
    /// ERASE_WR_BLK_START_ADDR - address of the first block to be erased.
    pub const CMD32: Command = Command::new(32, ResponseType::R1);
    /// ERASE_WR_BLK_END_ADDR - address of the last block to be erased.
    pub const CMD33: Command = Command::new(33, ResponseType::R1);
    /// ERASE - erase the selected blocks.
    pub const CMD38: Command = Command::new(38, ResponseType::R1b);
    /// APP_CMD - escape for application specific command.
    pub const CMD55: Command = Command::new(55, ResponseType::R1);
    /// READ_OCR - read the OCR register of a card.
    pub const CMD58: Command = Command::new(58, ResponseType::R3);
    /// CRC_ON_OFF - enable or disable CRC checking.
    pub const CMD59: Command = Command::new(59, ResponseType::R1);
    /// SET_WR_BLK_ERASE_COUNT - number of blocks to pre-erase before writing.
    pub const ACMD23: Command = Command::app(23, ResponseType::R1);
    /// SD_SEND_OP_COMD - Sends host capacity support information and activates
    /// the card's initialization process.
    pub const ACMD41: Command = Command::app(41, ResponseType::R1);
    /// SEND_SCR - read the SD Configuration Register.
    pub const ACMD51: Command = Command::app(51, ResponseType::R1);
}

pub mod arguments {
    /// Supply voltage 2.7-3.6V plus the `0xAA` check pattern.
    pub const IF_COND: u32 = 0x0000_01AA;
    /// Host capacity support, ACMD41 argument bit.
    pub const HOST_CAPACITY_SUPPORT: u32 = 1 << 30;
    /// Card capacity status, OCR bit.
    pub const OCR_CARD_CAPACITY_STATUS: u32 = 1 << 30;
    /// Enable CRC checking on CMD59.
    pub const CRC_ON: u32 = 0x0000_0001;
    /// Widest SET_WR_BLK_ERASE_COUNT value, 23 bits.
    pub const MAX_ERASE_COUNT: u32 = 0x007F_FFFF;
}

pub mod tokens {
    /// Idle bus byte, also the card's "not busy" answer.
    pub const AVAILABLE: u8 = 0xFF;
    /// Start data token for read or write single block.
    pub const DATA_START_BLOCK: u8 = 0xFE;
    /// Stop token for write multiple blocks.
    pub const STOP_TRAN: u8 = 0xFD;
    /// Start data token for write multiple blocks.
    pub const WRITE_MULTIPLE: u8 = 0xFC;
    /// Mask for data response tokens after a write block operation.
    pub const DATA_RES_MASK: u8 = 0x1F;
    /// Write data accepted token.
    pub const DATA_RES_ACCEPTED: u8 = 0x05;
    /// CRC byte of GO_IDLE_STATE, valid regardless of CRC mode.
    pub const CMD0_CRC: u8 = 0x95;
    /// CRC byte of SEND_IF_COND with the default argument.
    pub const CMD8_CRC: u8 = 0x87;
    /// Placeholder CRC with the end bit set.
    pub const DUMMY_CRC: u8 = 0x01;
}

pub mod clocks {
    /// Identification mode clock.
    pub const IDENTIFICATION_HZ: u32 = 400_000;
    /// Default speed mode clock.
    pub const DEFAULT_SPEED_HZ: u32 = 25_000_000;
    /// High speed mode clock.
    pub const HIGH_SPEED_HZ: u32 = 50_000_000;
}

pub mod functions {
    /// Switch function mode: query.
    pub const MODE_CHECK: u32 = 0;
    /// Switch function mode: apply.
    pub const MODE_SET: u32 = 1;
    /// Access mode (bus speed) function group, zero based.
    pub const GROUP_ACCESS_MODE: u32 = 0;
    /// SDR25 / high speed function of the access mode group.
    pub const FUNCTION_HIGH_SPEED: u32 = 1;
    /// Command class 10, switch function.
    pub const CCC_SWITCH: u16 = 1 << 10;
}
