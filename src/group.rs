//! Control-byte groups scanned eight at a time.
//!
//! A group's eight control bytes are loaded into one `u64` and matched with
//! word-wide bit tricks, so a probe step inspects a whole group with a handful
//! of integer instructions.
//!
//! Control byte encoding:
//! - `EMPTY` (`0b1111_1111`): never used since the last rebuild;
//! - `DELETED` (`0b1000_0000`): tombstone;
//! - `0b0ttt_tttt`: full, `t` is the 7-bit tag of the entry's hash.

use crate::layout::GROUP_SLOTS;

pub(crate) const EMPTY: u8 = 0b1111_1111;
pub(crate) const DELETED: u8 = 0b1000_0000;

const fn repeat(byte: u8) -> u64 {
    u64::from_le_bytes([byte; GROUP_SLOTS])
}

const LSB: u64 = repeat(0x01);
const MSB: u64 = repeat(0x80);

#[derive(Copy, Clone, Debug)]
pub(crate) struct Group(u64);

impl Group {
    #[inline]
    pub fn load(ctrl: &[u8; GROUP_SLOTS]) -> Self {
        Group(u64::from_le_bytes(*ctrl))
    }

    /// Bytes that may hold `tag`. May report false positives next to a true
    /// match; callers confirm against the stored hash.
    #[inline]
    pub fn match_tag(self, tag: u8) -> BitMask {
        let cmp = self.0 ^ repeat(tag);
        BitMask(cmp.wrapping_sub(LSB) & !cmp & MSB)
    }

    #[inline]
    pub fn match_empty(self) -> BitMask {
        BitMask(self.0 & (self.0 << 1) & MSB)
    }

    #[inline]
    pub fn match_empty_or_deleted(self) -> BitMask {
        BitMask(self.0 & MSB)
    }

    #[cfg(test)]
    pub fn match_full(self) -> BitMask {
        BitMask(!self.0 & MSB)
    }
}

/// Set of byte positions within a group, lowest first.
#[derive(Copy, Clone, Debug)]
pub(crate) struct BitMask(u64);

impl BitMask {
    #[inline]
    pub fn any_bit_set(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize / 8)
        }
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let bit = self.lowest_set_bit()?;
        self.0 &= self.0 - 1;
        Some(bit)
    }
}
