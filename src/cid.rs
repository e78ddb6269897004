use bitfield::bitfield;

/// Card Identification block.
pub type CidData = [u8; 16];

bitfield! {
    /// Card Identification register.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Cid(u128);
    impl Debug;
    pub u8, manufacturer_id, _: 127, 120;
    pub u16, oem_id, _: 119, 104;
    pub u64, product_name_bits, _: 103, 64;
    pub u8, product_revision, _: 63, 56;
    pub u32, serial_number, _: 55, 24;
    pub u16, manufacturing_date, _: 19, 8;
    pub u8, crc, _: 7, 1;
}

impl From<CidData> for Cid {
    fn from(cid_data: CidData) -> Self {
        Cid(u128::from_be_bytes(cid_data))
    }
}

impl Cid {
    /// Returns the raw register bytes.
    pub fn raw(&self) -> CidData {
        self.0.to_be_bytes()
    }

    /// Five ASCII characters, as stored by the card.
    pub fn product_name(&self) -> [u8; 5] {
        let raw = self.raw();
        [raw[3], raw[4], raw[5], raw[6], raw[7]]
    }

    /// Product revision as `(major, minor)`.
    pub fn revision(&self) -> (u8, u8) {
        let prv = self.product_revision();
        (prv >> 4, prv & 0x0F)
    }

    /// Manufacturing year.
    pub fn year(&self) -> u16 {
        2000 + (self.manufacturing_date() >> 4)
    }

    /// Manufacturing month, 1 to 12.
    pub fn month(&self) -> u8 {
        (self.manufacturing_date() & 0x0F) as u8
    }
}
