use bitfield::bitfield;

/// SD Configuration Register block.
pub type ScrData = [u8; 8];

bitfield! {
    /// SD Configuration Register.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Scr(u64);
    impl Debug;
    pub u8, structure, _: 63, 60;
    pub u8, sd_spec, _: 59, 56;
    pub data_stat_after_erase, _: 55;
    pub u8, sd_security, _: 54, 52;
    pub u8, sd_bus_widths, _: 51, 48;
    pub sd_spec3, _: 47;
    pub u8, extended_security, _: 46, 43;
    pub sd_spec4, _: 42;
    pub u8, sd_specx, _: 41, 38;
    pub u8, cmd_support, _: 35, 32;
}

/// Physical layer specification version the card conforms to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SdSpecVersion {
    V1_0,
    V1_10,
    V2_00,
    V3_0X,
    V4_XX,
    V5_XX,
    V6_XX,
    V7_XX,
    V8_XX,
    V9_XX,
    Unknown,
}

impl From<ScrData> for Scr {
    fn from(scr_data: ScrData) -> Self {
        Scr(u64::from_be_bytes(scr_data))
    }
}

impl Scr {
    /// Returns the raw register bytes.
    pub fn raw(&self) -> ScrData {
        self.0.to_be_bytes()
    }

    /// Data bus 1 bit wide is supported.
    pub fn supports_1bit_bus(&self) -> bool {
        self.sd_bus_widths() & 0b0001 != 0
    }

    /// Data bus 4 bit wide is supported.
    pub fn supports_4bit_bus(&self) -> bool {
        self.sd_bus_widths() & 0b0100 != 0
    }

    /// SET_BLOCK_COUNT (CMD23) is supported.
    pub fn supports_set_block_count(&self) -> bool {
        self.cmd_support() & 0b0010 != 0
    }

    pub fn spec_version(&self) -> SdSpecVersion {
        match (self.sd_spec(), self.sd_spec3(), self.sd_spec4(), self.sd_specx()) {
            (0, false, false, 0) => SdSpecVersion::V1_0,
            (1, false, false, 0) => SdSpecVersion::V1_10,
            (2, false, false, 0) => SdSpecVersion::V2_00,
            (2, true, false, 0) => SdSpecVersion::V3_0X,
            (2, true, true, 0) => SdSpecVersion::V4_XX,
            (2, true, _, 1) => SdSpecVersion::V5_XX,
            (2, true, _, 2) => SdSpecVersion::V6_XX,
            (2, true, _, 3) => SdSpecVersion::V7_XX,
            (2, true, _, 4) => SdSpecVersion::V8_XX,
            (2, true, _, 5) => SdSpecVersion::V9_XX,
            _ => SdSpecVersion::Unknown,
        }
    }
}
