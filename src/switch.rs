/// Switch function status block.
pub type SwitchStatusData = [u8; 64];

/// Status returned by SWITCH_FUNC, 512 bits transferred MSB first.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SwitchStatus(SwitchStatusData);

impl From<SwitchStatusData> for SwitchStatus {
    fn from(data: SwitchStatusData) -> Self {
        SwitchStatus(data)
    }
}

impl SwitchStatus {
    /// Maximum current consumption for the selected functions, mA.
    pub fn max_current(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    /// Supported functions bitmap of a function group (bits 415:400 for
    /// group 0, then 16 bits per group upward).
    pub fn supported(&self, group: u32) -> u16 {
        let offset = 12 - 2 * (group as usize).min(5);
        u16::from_be_bytes([self.0[offset], self.0[offset + 1]])
    }

    /// Function selected (or selectable) in a function group, bits 379:376
    /// for group 0, then 4 bits per group upward.
    pub fn selected(&self, group: u32) -> u8 {
        let functions = u32::from_be_bytes([0, self.0[14], self.0[15], self.0[16]]);
        ((functions >> (4 * group.min(5))) & 0x0F) as u8
    }

    /// The function is listed as supported and currently selectable.
    pub fn can_switch(&self, group: u32, function: u32) -> bool {
        let supported = self.supported(group) & (1 << function) != 0;
        supported && u32::from(self.selected(group)) == function
    }
}
