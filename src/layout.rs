//! Bit layout of hash codes.
//!
//! A 64-bit hash code is read from both ends:
//! - the most significant bits form the routing prefix that selects a
//!   directory slot (and thus a segment); a depth of `d` consumes the top `d`
//!   bits, so extending the depth by one only reinterprets one more high bit;
//! - the least significant bits locate an entry inside its segment: the lowest
//!   `HASH_BASE_GROUP_INDEX_BITS` pick the base group and the next
//!   `HASH_TAG_BITS` form the control-byte tag.
//!
//! Routing never consumes bits below `HASH_SEGMENT_LOOKUP_SHIFT`, so the two
//! windows are disjoint at every depth.

use static_assertions::const_assert;

/// Bits of the hash code that select the base group within a segment.
pub const HASH_BASE_GROUP_INDEX_BITS: u32 = 3;

/// Bits of the hash code stored in a full control byte.
pub const HASH_TAG_BITS: u32 = 7;

/// Bits below this shift belong to the intra-segment locator.
pub const HASH_SEGMENT_LOOKUP_SHIFT: u32 = HASH_BASE_GROUP_INDEX_BITS + HASH_TAG_BITS;

/// Maximum number of routing bits a segment or the directory may use.
pub const MAX_DEPTH: u32 = 30;

/// Slots scanned together as one unit.
pub const GROUP_SLOTS: usize = 8;

/// Groups per segment.
pub const SEGMENT_GROUPS: usize = 1 << HASH_BASE_GROUP_INDEX_BITS;

/// Physical slots per segment.
pub const SEGMENT_SLOTS: usize = GROUP_SLOTS * SEGMENT_GROUPS;

/// Live entries a segment may hold before it must split or inflate.
pub const SEGMENT_CAPACITY: usize = SEGMENT_SLOTS * 3 / 4;

const TAG_MASK: u64 = (1 << HASH_TAG_BITS) - 1;

const_assert!(MAX_DEPTH + HASH_SEGMENT_LOOKUP_SHIFT <= u64::BITS);
const_assert!(SEGMENT_CAPACITY < SEGMENT_SLOTS);
const_assert!(GROUP_SLOTS == core::mem::size_of::<u64>());
const_assert!(HASH_TAG_BITS < 8);

/// Directory index of `hash` when the directory discriminates on `depth` bits.
#[inline]
pub fn routing_prefix(hash: u64, depth: u32) -> usize {
    debug_assert!(depth <= MAX_DEPTH);
    if depth == 0 {
        0
    } else {
        (hash >> (u64::BITS - depth)) as usize
    }
}

/// The routing bit that becomes significant when a segment of `local_depth`
/// splits into two segments of `local_depth + 1`.
#[inline]
pub fn split_bit(hash: u64, local_depth: u32) -> bool {
    debug_assert!(local_depth < MAX_DEPTH);
    (hash >> (u64::BITS - 1 - local_depth)) & 1 == 1
}

/// Mask of the routing bits that become significant between depths `from`
/// (exclusive of the bits already used) and `to`.
#[inline]
pub fn routing_mask(from: u32, to: u32) -> u64 {
    debug_assert!(from <= to && to <= MAX_DEPTH);
    (u64::MAX >> from) & !(u64::MAX >> to)
}

/// Intra-segment locator of a hash code: where probing starts and what tag
/// the control byte carries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Locator {
    pub group: usize,
    pub tag: u8,
}

impl Locator {
    #[inline]
    pub fn from_hash(hash: u64) -> Self {
        Locator {
            group: (hash as usize) & (SEGMENT_GROUPS - 1),
            tag: ((hash >> HASH_BASE_GROUP_INDEX_BITS) & TAG_MASK) as u8,
        }
    }
}

/// Depth a directory would settle at for `len` uniformly hashed entries.
#[inline]
pub fn natural_depth(len: usize) -> u32 {
    if len < SEGMENT_CAPACITY {
        0
    } else {
        (len / SEGMENT_CAPACITY).ilog2().min(MAX_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: extending the depth by one appends exactly the split bit
    /// to the routing prefix.
    #[test]
    fn prefix_extends_by_split_bit() {
        let hashes = [
            0u64,
            u64::MAX,
            0x8000_0000_0000_0000,
            0x9e37_79b9_7f4a_7c15,
            0x0123_4567_89ab_cdef,
        ];
        for &h in &hashes {
            for d in 0..MAX_DEPTH {
                let next = routing_prefix(h, d + 1);
                let expected = routing_prefix(h, d) * 2 + split_bit(h, d) as usize;
                assert_eq!(next, expected, "hash {:#x} depth {}", h, d);
            }
        }
    }

    #[test]
    fn routing_uses_most_significant_bits() {
        let h = 0xC000_0000_0000_0000u64;
        assert_eq!(routing_prefix(h, 0), 0);
        assert_eq!(routing_prefix(h, 1), 1);
        assert_eq!(routing_prefix(h, 2), 3);
        assert_eq!(routing_prefix(h, 3), 6);
        // Intra-segment bits never change the route.
        assert_eq!(routing_prefix(h | 0x3FF, MAX_DEPTH), routing_prefix(h, MAX_DEPTH));
    }

    #[test]
    fn routing_mask_covers_requested_bits() {
        assert_eq!(routing_mask(0, 0), 0);
        assert_eq!(routing_mask(0, 1), 0x8000_0000_0000_0000);
        assert_eq!(routing_mask(1, 3), 0x6000_0000_0000_0000);
        assert_eq!(routing_mask(0, MAX_DEPTH).count_ones(), MAX_DEPTH);
    }

    #[test]
    fn locator_reads_low_bits() {
        let l = Locator::from_hash(0b1010101_101);
        assert_eq!(l.group, 0b101);
        assert_eq!(l.tag, 0b1010101);
        assert!(Locator::from_hash(u64::MAX).tag < 0x80);
    }

    #[test]
    fn natural_depth_tracks_segment_count() {
        assert_eq!(natural_depth(0), 0);
        assert_eq!(natural_depth(SEGMENT_CAPACITY - 1), 0);
        assert_eq!(natural_depth(SEGMENT_CAPACITY * 2), 1);
        assert_eq!(natural_depth(SEGMENT_CAPACITY * 1024 + 7), 10);
    }
}
