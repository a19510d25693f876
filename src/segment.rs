//! Segment: a fixed-capacity open-addressing table of grouped slots.
//!
//! A segment owns up to `SEGMENT_CAPACITY` entries in `SEGMENT_SLOTS` slots
//! split into `SEGMENT_GROUPS` groups. Probing starts at the entry's base group
//! and visits the remaining groups in triangular order, which covers every
//! group exactly once because the group count is a power of two. A probe ends
//! at the first group holding an `EMPTY` control byte.
//!
//! Entries are stored inline in the slot array together with their hash, so
//! rebuilding a segment never calls back into user hashing code.

use crate::group::{Group, DELETED, EMPTY};
use crate::layout::{Locator, GROUP_SLOTS, SEGMENT_CAPACITY, SEGMENT_GROUPS, SEGMENT_SLOTS};

/// Compaction kicks in once live entries plus tombstones reach this count.
const COMPACTION_THRESHOLD: usize = SEGMENT_SLOTS - GROUP_SLOTS;

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub key: K,
    pub value: V,
    pub hash: u64,
}

/// Returned by `Segment::insert` when the segment has no room; carries the
/// rejected entry back to the caller, which must split or inflate.
#[derive(Debug)]
pub(crate) struct SegmentFull<K, V>(pub Entry<K, V>);

pub(crate) struct Segment<K, V> {
    ctrl: [[u8; GROUP_SLOTS]; SEGMENT_GROUPS],
    slots: Box<[Option<Entry<K, V>>]>,
    len: u32,
    tombstones: u32,
    local_depth: u32,
}

/// Group indices in probe order for a base group.
struct ProbeSeq {
    group: usize,
    stride: usize,
}

impl Iterator for ProbeSeq {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.stride == SEGMENT_GROUPS {
            return None;
        }
        let current = self.group;
        self.stride += 1;
        self.group = (self.group + self.stride) & (SEGMENT_GROUPS - 1);
        Some(current)
    }
}

#[inline]
fn probe_seq(base_group: usize) -> ProbeSeq {
    ProbeSeq {
        group: base_group,
        stride: 0,
    }
}

impl<K, V> Segment<K, V> {
    pub fn new(local_depth: u32) -> Self {
        Self {
            ctrl: [[EMPTY; GROUP_SLOTS]; SEGMENT_GROUPS],
            slots: std::iter::repeat_with(|| None).take(SEGMENT_SLOTS).collect(),
            len: 0,
            tombstones: 0,
            local_depth,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= SEGMENT_CAPACITY
    }

    #[inline]
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / SEGMENT_CAPACITY as f64
    }

    #[inline]
    pub fn local_depth(&self) -> u32 {
        self.local_depth
    }

    #[inline]
    pub fn set_local_depth(&mut self, depth: u32) {
        self.local_depth = depth;
    }

    #[cfg(test)]
    pub fn tombstones(&self) -> usize {
        self.tombstones as usize
    }

    #[inline]
    fn ctrl_byte(&self, slot: usize) -> u8 {
        self.ctrl[slot / GROUP_SLOTS][slot % GROUP_SLOTS]
    }

    #[inline]
    fn set_ctrl(&mut self, slot: usize, byte: u8) {
        self.ctrl[slot / GROUP_SLOTS][slot % GROUP_SLOTS] = byte;
    }

    /// Slot of the entry with `hash` whose key satisfies `eq`.
    pub fn find(&self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Option<usize> {
        let locator = Locator::from_hash(hash);
        for g in probe_seq(locator.group) {
            let group = Group::load(&self.ctrl[g]);
            for i in group.match_tag(locator.tag) {
                let slot = g * GROUP_SLOTS + i;
                if let Some(e) = &self.slots[slot] {
                    if e.hash == hash && eq(&e.key) {
                        return Some(slot);
                    }
                }
            }
            if group.match_empty().any_bit_set() {
                return None;
            }
        }
        None
    }

    fn find_insert_slot(&self, hash: u64) -> Option<usize> {
        let locator = Locator::from_hash(hash);
        probe_seq(locator.group).find_map(|g| {
            Group::load(&self.ctrl[g])
                .match_empty_or_deleted()
                .lowest_set_bit()
                .map(|i| g * GROUP_SLOTS + i)
        })
    }

    /// Insert an entry whose key is known to be absent.
    pub fn insert(&mut self, entry: Entry<K, V>) -> Result<usize, SegmentFull<K, V>> {
        if self.is_full() {
            return Err(SegmentFull(entry));
        }
        if self.tombstones > 0 && self.len() + self.tombstones as usize >= COMPACTION_THRESHOLD {
            self.compact();
        }
        let Some(slot) = self.find_insert_slot(entry.hash) else {
            return Err(SegmentFull(entry));
        };
        if self.ctrl_byte(slot) == DELETED {
            self.tombstones -= 1;
        }
        self.set_ctrl(slot, Locator::from_hash(entry.hash).tag);
        self.slots[slot] = Some(entry);
        self.len += 1;
        Ok(slot)
    }

    pub fn get(&self, slot: usize) -> Option<&Entry<K, V>> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Entry<K, V>> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Remove the entry at `slot`. The slot becomes a tombstone unless its
    /// group still has an `EMPTY` byte: no probe ever continued past such a
    /// group, so the slot can go straight back to `EMPTY`.
    pub fn remove(&mut self, slot: usize) -> Option<Entry<K, V>> {
        let entry = self.slots.get_mut(slot)?.take()?;
        let group = Group::load(&self.ctrl[slot / GROUP_SLOTS]);
        if group.match_empty().any_bit_set() {
            self.set_ctrl(slot, EMPTY);
        } else {
            self.set_ctrl(slot, DELETED);
            self.tombstones += 1;
        }
        self.len -= 1;
        Some(entry)
    }

    /// Rebuild the control bytes in place, dropping every tombstone.
    fn compact(&mut self) {
        let entries = self.take_entries();
        for e in entries {
            // Cannot fail: the segment was emptied and held these entries before.
            let _ = self.insert(e);
        }
    }

    /// Move every entry out, leaving an empty segment with the same
    /// allocation and local depth.
    pub fn take_entries(&mut self) -> Vec<Entry<K, V>> {
        let mut out = Vec::with_capacity(self.len());
        for slot in self.slots.iter_mut() {
            if let Some(e) = slot.take() {
                out.push(e);
            }
        }
        self.ctrl = [[EMPTY; GROUP_SLOTS]; SEGMENT_GROUPS];
        self.len = 0;
        self.tombstones = 0;
        out
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) -> usize {
        let mut removed = 0;
        for slot in 0..SEGMENT_SLOTS {
            let drop_it = match &mut self.slots[slot] {
                Some(e) => !keep(&e.key, &mut e.value),
                None => false,
            };
            if drop_it {
                self.remove(slot);
                removed += 1;
            }
        }
        removed
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter(self.slots.iter())
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut(self.slots.iter_mut())
    }

    /// Bytes of the slot array, entries included.
    pub fn heap_bytes(&self) -> usize {
        self.slots.len() * core::mem::size_of::<Option<Entry<K, V>>>()
    }
}

/// Occupied entries of a segment in slot order.
pub(crate) struct Iter<'a, K, V>(core::slice::Iter<'a, Option<Entry<K, V>>>);

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.find_map(Option::as_ref)
    }
}

pub(crate) struct IterMut<'a, K, V>(core::slice::IterMut<'a, Option<Entry<K, V>>>);

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = &'a mut Entry<K, V>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.find_map(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: u32, hash: u64) -> Entry<u32, u32> {
        Entry {
            key,
            value: key * 10,
            hash,
        }
    }

    fn spread(i: u32) -> u64 {
        (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    }

    /// Invariant: the probe sequence visits every group exactly once.
    #[test]
    fn probe_sequence_covers_all_groups() {
        for base in 0..SEGMENT_GROUPS {
            let mut seen: Vec<usize> = probe_seq(base).collect();
            assert_eq!(seen[0], base);
            seen.sort_unstable();
            assert_eq!(seen, (0..SEGMENT_GROUPS).collect::<Vec<_>>());
        }
    }

    #[test]
    fn insert_find_remove() {
        let mut s = Segment::new(0);
        for i in 0..20 {
            s.insert(entry(i, spread(i))).unwrap();
        }
        assert_eq!(s.len(), 20);
        for i in 0..20 {
            let slot = s.find(spread(i), |k| *k == i).expect("present");
            assert_eq!(s.get(slot).unwrap().value, i * 10);
        }
        assert!(s.find(spread(99), |k| *k == 99).is_none());

        let slot = s.find(spread(7), |k| *k == 7).unwrap();
        let removed = s.remove(slot).unwrap();
        assert_eq!(removed.key, 7);
        assert!(s.find(spread(7), |k| *k == 7).is_none());
        assert!(s.remove(slot).is_none(), "second remove of the same slot is a no-op");
        assert_eq!(s.len(), 19);
    }

    /// Invariant: a segment holds exactly `SEGMENT_CAPACITY` entries and then
    /// rejects further inserts, handing the entry back.
    #[test]
    fn full_segment_rejects_and_returns_entry() {
        let mut s = Segment::new(0);
        for i in 0..SEGMENT_CAPACITY as u32 {
            s.insert(entry(i, spread(i))).unwrap();
        }
        assert!(s.is_full());
        assert_eq!(s.fill_ratio(), 1.0);
        match s.insert(entry(1000, spread(1000))) {
            Err(SegmentFull(e)) => assert_eq!(e.key, 1000),
            Ok(_) => panic!("segment accepted an entry beyond capacity"),
        }
    }

    /// Invariant: identical hashes still resolve by key equality, because the
    /// probe sequence reaches every group.
    #[test]
    fn identical_hashes_fill_whole_segment() {
        let mut s = Segment::new(0);
        for i in 0..SEGMENT_CAPACITY as u32 {
            s.insert(entry(i, 0)).unwrap();
        }
        for i in 0..SEGMENT_CAPACITY as u32 {
            assert!(s.find(0, |k| *k == i).is_some());
        }
    }

    /// Invariant: tombstones keep probe chains intact and are reclaimed by
    /// compaction once they pile up.
    #[test]
    fn tombstones_are_reclaimed() {
        let mut s = Segment::new(0);
        for i in 0..SEGMENT_CAPACITY as u32 {
            s.insert(entry(i, 0)).unwrap();
        }
        for i in 0..24 {
            let slot = s.find(0, |k| *k == i).unwrap();
            s.remove(slot);
        }
        assert!(s.tombstones() > 0);
        for i in 24..SEGMENT_CAPACITY as u32 {
            assert!(s.find(0, |k| *k == i).is_some(), "chain broken for {}", i);
        }
        for i in 100..124 {
            s.insert(entry(i, 0)).unwrap();
        }
        assert_eq!(s.len(), SEGMENT_CAPACITY);
        assert!(s.tombstones() + s.len() <= SEGMENT_SLOTS);
        for i in (24..SEGMENT_CAPACITY as u32).chain(100..124) {
            assert!(s.find(0, |k| *k == i).is_some());
        }
    }

    #[test]
    fn take_entries_empties_segment() {
        let mut s = Segment::new(3);
        for i in 0..10 {
            s.insert(entry(i, spread(i))).unwrap();
        }
        let mut keys: Vec<u32> = s.take_entries().into_iter().map(|e| e.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..10).collect::<Vec<_>>());
        assert_eq!(s.len(), 0);
        assert_eq!(s.local_depth(), 3);
        assert_eq!(s.iter().count(), 0);
    }

    #[test]
    fn retain_and_iter_mut() {
        let mut s = Segment::new(0);
        for i in 0..30 {
            s.insert(entry(i, spread(i))).unwrap();
        }
        for e in s.iter_mut() {
            e.value += 1;
        }
        let removed = s.retain(|k, _| k % 3 == 0);
        assert_eq!(removed, 20);
        assert_eq!(s.len(), 10);
        assert!(s.iter().all(|e| e.key % 3 == 0 && e.value == e.key * 10 + 1));
    }
}
