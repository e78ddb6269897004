use crate::consts::{clocks, BLOCK_SIZE_U32, BLOCK_SIZE_U64};

use bitfield::bitfield;
use size::{consts::KiB, Size};

/// Card Specific Data block.
pub type CsdData = [u8; 16];

bitfield! {
    /// Card Specific Data, version 1.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct CsdV1(u128);
    impl Debug;
    pub u8, version, _: 127, 126;
    pub u8, data_read_access_time1, _: 119, 112;
    pub u8, data_read_access_time2, _: 111, 104;
    pub u8, max_data_transfer_rate, _: 103, 96;
    pub u16, card_command_classes, _: 95, 84;
    pub u8, read_block_length, _: 83, 80;
    pub read_partial_blocks, _: 79;
    pub write_block_misalignment, _: 78;
    pub read_block_misalignment, _: 77;
    pub dsr_implemented, _: 76;
    pub u16, device_size, _: 73, 62;
    pub u8, max_read_current_vdd_min, _: 61, 59;
    pub u8, max_read_current_vdd_max, _: 58, 56;
    pub u8, max_write_current_vdd_min, _: 55, 53;
    pub u8, max_write_current_vdd_max, _: 52, 50;
    pub u8, device_size_multiplier, _: 49, 47;
    pub erase_single_block_enabled, _: 46;
    pub u8, erase_sector_size, _: 45, 39;
    pub u8, write_protect_group_size, _: 38, 32;
    pub write_protect_group_enable, _: 31;
    pub u8, write_speed_factor, _: 28, 26;
    pub u8, max_write_data_length, _: 25, 22;
    pub write_partial_blocks_allowed, _: 21;
    pub file_format_group, _: 15;
    pub copy_flag, _: 14;
    pub permanent_write_protection, _: 13;
    pub temporary_write_protection, _: 12;
    pub u8, file_format, _: 11, 10;
    pub u8, crc, _: 7, 1;
}

bitfield! {
    /// Card Specific Data, version 2.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct CsdV2(u128);
    impl Debug;
    pub u8, version, _: 127, 126;
    pub u8, data_read_access_time1, _: 119, 112;
    pub u8, data_read_access_time2, _: 111, 104;
    pub u8, max_data_transfer_rate, _: 103, 96;
    pub u16, card_command_classes, _: 95, 84;
    pub u8, read_block_length, _: 83, 80;
    pub read_partial_blocks, _: 79;
    pub write_block_misalignment, _: 78;
    pub read_block_misalignment, _: 77;
    pub dsr_implemented, _: 76;
    pub u32, device_size, _: 69, 48;
    pub erase_single_block_enabled, _: 46;
    pub u8, erase_sector_size, _: 45, 39;
    pub u8, write_protect_group_size, _: 38, 32;
    pub write_protect_group_enable, _: 31;
    pub u8, write_speed_factor, _: 28, 26;
    pub u8, max_write_data_length, _: 25, 22;
    pub write_partial_blocks_allowed, _: 21;
    pub file_format_group, _: 15;
    pub copy_flag, _: 14;
    pub permanent_write_protection, _: 13;
    pub temporary_write_protection, _: 12;
    pub u8, file_format, _: 11, 10;
    pub u8, crc, _: 7, 1;
}

/// Card Specific Data, generic container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Csd {
    V1(CsdV1),
    V2(CsdV2),
}

/// Represents capacity provider.
///
/// Block geometry is normalized to 512-byte blocks whatever the card's
/// native read block length is.
pub trait CapacityProvider {
    /// Returns the card capacity in bytes.
    fn card_capacity(&self) -> Size {
        Size::from_bytes(self.card_capacity_blocks() * BLOCK_SIZE_U64)
    }

    /// Returns the card capacity in 512-byte blocks.
    fn card_capacity_blocks(&self) -> u64;

    /// Returns the normalized block size.
    fn block_size(&self) -> u32 {
        BLOCK_SIZE_U32
    }
}

impl From<CsdData> for CsdV1 {
    fn from(csd_data: CsdData) -> Self {
        CsdV1(u128::from_be_bytes(csd_data))
    }
}

impl From<CsdData> for CsdV2 {
    fn from(csd_data: CsdData) -> Self {
        CsdV2(u128::from_be_bytes(csd_data))
    }
}

impl From<CsdData> for Csd {
    /// Picks the layout from the CSD_STRUCTURE field.
    ///
    /// Structure versions above 1 share the version 2 layout for every field
    /// this driver reads except the device size.
    fn from(csd_data: CsdData) -> Self {
        match csd_data[0] >> 6 {
            0 => Csd::V1(CsdV1::from(csd_data)),
            _ => Csd::V2(CsdV2::from(csd_data)),
        }
    }
}

impl CapacityProvider for CsdV1 {
    fn card_capacity_blocks(&self) -> u64 {
        let native_blocks =
            (u64::from(self.device_size()) + 1) << (self.device_size_multiplier() + 2);
        let native_block_size = 1u64 << self.read_block_length();

        if native_block_size == BLOCK_SIZE_U64 {
            native_blocks
        } else {
            native_blocks * native_block_size / BLOCK_SIZE_U64
        }
    }
}

impl CapacityProvider for CsdV2 {
    /// Only structure version 2 has a 22-bit device size; later structures
    /// report no capacity.
    fn card_capacity_blocks(&self) -> u64 {
        if self.version() != 1 {
            return 0;
        }

        (u64::from(self.device_size()) + 1) * (KiB as u64)
    }
}

impl CsdV2 {
    /// Device size at or above this value means an SDXC card.
    pub const SDXC_DEVICE_SIZE: u32 = 0xFFFF;

    /// Returns true if the device size only fits an SDXC card.
    pub fn is_sdxc(&self) -> bool {
        self.device_size() >= Self::SDXC_DEVICE_SIZE
    }
}

impl CapacityProvider for Csd {
    fn card_capacity_blocks(&self) -> u64 {
        match self {
            Csd::V1(csd) => csd.card_capacity_blocks(),
            Csd::V2(csd) => csd.card_capacity_blocks(),
        }
    }
}

macro_rules! csd_common {
    ($($(#[$meta:meta])* $name:ident -> $ty:ty;)*) => {
        impl Csd {
            $(
                $(#[$meta])*
                pub fn $name(&self) -> $ty {
                    match self {
                        Csd::V1(csd) => csd.$name(),
                        Csd::V2(csd) => csd.$name(),
                    }
                }
            )*
        }
    };
}

csd_common! {
    /// CSD_STRUCTURE field.
    version -> u8;
    /// TRAN_SPEED raw byte.
    max_data_transfer_rate -> u8;
    /// CCC bitmap.
    card_command_classes -> u16;
    /// READ_BL_LEN, log2 of the native block length.
    read_block_length -> u8;
    erase_single_block_enabled -> bool;
    /// SECTOR_SIZE, erase granularity minus one, in write blocks.
    erase_sector_size -> u8;
    write_protect_group_enable -> bool;
    copy_flag -> bool;
    permanent_write_protection -> bool;
    temporary_write_protection -> bool;
    file_format -> u8;
}

impl Csd {
    /// TRAN_SPEED time values, tenths.
    const TIME_VALUES: [u32; 16] = [0, 10, 12, 13, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60, 70, 80];
    /// TRAN_SPEED rate units, Hz per tenth.
    const RATE_UNITS: [u32; 4] = [10_000, 100_000, 1_000_000, 10_000_000];

    /// Returns the raw register bytes.
    pub fn raw(&self) -> CsdData {
        match self {
            Csd::V1(csd) => csd.0.to_be_bytes(),
            Csd::V2(csd) => csd.0.to_be_bytes(),
        }
    }

    /// Either write protection flag is set.
    pub fn is_write_protected(&self) -> bool {
        self.permanent_write_protection() || self.temporary_write_protection()
    }

    /// Max bus clock declared by TRAN_SPEED.
    ///
    /// Reserved encodings fall back to the default speed clock.
    pub fn max_transfer_rate_hz(&self) -> u32 {
        let tran_speed = self.max_data_transfer_rate();
        let unit = usize::from(tran_speed & 0x07);
        let time = Self::TIME_VALUES[usize::from((tran_speed >> 3) & 0x0F)];

        match Self::RATE_UNITS.get(unit) {
            Some(rate) if time != 0 => rate * time,
            _ => clocks::DEFAULT_SPEED_HZ,
        }
    }

    /// Blocks covered by one erase sector.
    pub fn erase_sector_blocks(&self) -> u32 {
        u32::from(self.erase_sector_size()) + 1
    }

    /// The card supports SWITCH_FUNC (command class 10).
    pub fn supports_switch(&self) -> bool {
        self.card_command_classes() & crate::consts::functions::CCC_SWITCH != 0
    }
}
