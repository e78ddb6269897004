use crate::{
    cid::Cid,
    csd::{CapacityProvider, Csd},
    scr::Scr,
};

use bitflags::bitflags;

bitflags! {
    /// Card type flags, fixed once initialization finishes.
    ///
    /// SDHC and SDXC always come with `HIGH_CAPACITY`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CardType: u8 {
        /// Addressed in 512-byte blocks instead of bytes.
        const HIGH_CAPACITY = 1 << 0;
        const SDHC = 1 << 1;
        const SDXC = 1 << 2;
        const SDSC = 1 << 3;
    }
}

/// Card capacity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardKind {
    Sdsc,
    Sdhc,
    Sdxc,
}

impl CardType {
    /// Capacity class implied by the flags.
    pub fn kind(&self) -> CardKind {
        if self.contains(CardType::SDXC) {
            CardKind::Sdxc
        } else if self.contains(CardType::SDHC) {
            CardKind::Sdhc
        } else {
            CardKind::Sdsc
        }
    }
}

/// Everything known about an initialized card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardInfo {
    /// Relative card address, always zero in SPI mode.
    pub relative_address: u32,
    pub card_type: CardType,
    pub csd: Csd,
    /// Only present after an explicit CID query.
    pub cid: Option<Cid>,
    pub scr: Scr,
    /// Total 512-byte blocks.
    pub block_count: u64,
    pub block_size: u32,
}

impl CardInfo {
    /// Builds the handle contents from a freshly read CSD.
    ///
    /// `card_type` carries the high capacity flag from the OCR; the capacity
    /// class flag is derived here, and a version 2 CSD forces high capacity.
    pub(crate) fn new(card_type: CardType, csd: Csd) -> Self {
        let mut info = CardInfo {
            relative_address: 0,
            card_type,
            csd,
            cid: None,
            scr: Scr::from([0; 8]),
            block_count: 0,
            block_size: 0,
        };
        info.apply_csd(csd);
        info
    }

    /// Replaces the CSD and re-derives geometry and capacity class.
    pub(crate) fn apply_csd(&mut self, csd: Csd) {
        self.csd = csd;
        self.block_count = csd.card_capacity_blocks();
        self.block_size = csd.block_size();
        self.card_type.remove(CardType::SDSC | CardType::SDHC | CardType::SDXC);

        if self.block_count == 0 {
            warn!("SD CSD structure {} has no known capacity", csd.version());
        }

        match csd {
            Csd::V1(_) => self.card_type |= CardType::SDSC,
            Csd::V2(v2) => {
                if !self.card_type.contains(CardType::HIGH_CAPACITY) {
                    warn!("SD CSD version 2 without capacity status in OCR");
                }
                self.card_type |= CardType::HIGH_CAPACITY;
                self.card_type |= if v2.is_sdxc() {
                    CardType::SDXC
                } else {
                    CardType::SDHC
                };
            }
        }
    }

    pub fn is_high_capacity(&self) -> bool {
        self.card_type.contains(CardType::HIGH_CAPACITY)
    }

    /// Card command address of a block: byte offset for standard capacity,
    /// block index for high capacity.
    pub fn block_address(&self, block: u32) -> Option<u32> {
        if self.is_high_capacity() {
            Some(block)
        } else {
            block.checked_mul(self.block_size)
        }
    }

    /// Checks that `count` blocks starting at `start` are on the card.
    pub fn contains_range(&self, start: u32, count: u32) -> bool {
        u64::from(start) + u64::from(count) <= self.block_count
    }
}
