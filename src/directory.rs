//! Directory: the extendible-hashing routing table.
//!
//! The directory maps the top `global_depth` bits of a hash code to a segment.
//! A segment of local depth `d` is referenced from `2^(global_depth - d)`
//! contiguous slots; because routing bits are read from the most significant
//! end, those slots are exactly the ones sharing the segment's `d`-bit prefix.
//!
//! Segments live in a generational `SlotMap` owned by the directory, which is
//! the single owner of segment lifetime; table slots hold `SegmentId`s.

use crate::layout::{routing_prefix, MAX_DEPTH};
use crate::segment::Entry;
use crate::storage::{Slot, Storage};
use core::ops::{Index, IndexMut, Range};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Generational handle of a segment owned by the directory.
    pub(crate) struct SegmentId;
}

/// Location of an entry: its segment and its slot inside that segment.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Position {
    pub segment: SegmentId,
    pub slot: Slot,
}

pub(crate) struct Directory<K, V> {
    global_depth: u32,
    table: Vec<SegmentId>,
    segments: SlotMap<SegmentId, Storage<K, V>>,
}

impl<K, V> Directory<K, V> {
    /// A directory of `2^depth` empty segments, each of local depth `depth`.
    pub fn new(depth: u32) -> Self {
        let depth = depth.min(MAX_DEPTH);
        let n = 1usize << depth;
        let mut segments = SlotMap::with_capacity_and_key(n);
        let table = (0..n)
            .map(|_| segments.insert(Storage::Grouped(crate::segment::Segment::new(depth))))
            .collect();
        Self {
            global_depth: depth,
            table,
            segments,
        }
    }

    #[inline]
    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn index_of(&self, hash: u64) -> usize {
        routing_prefix(hash, self.global_depth)
    }

    /// The segment `hash` routes to.
    #[inline]
    pub fn resolve(&self, hash: u64) -> SegmentId {
        self.table[self.index_of(hash)]
    }

    #[inline]
    pub fn id_at(&self, index: usize) -> SegmentId {
        self.table[index]
    }

    /// Directory slots referencing the segment of `local_depth` that covers
    /// `index`.
    pub fn range(&self, index: usize, local_depth: u32) -> Range<usize> {
        debug_assert!(local_depth <= self.global_depth);
        let span = 1usize << (self.global_depth - local_depth);
        let start = index & !(span - 1);
        start..start + span
    }

    /// Double the table; every reference is duplicated into the two slots
    /// derived from it, so every hash keeps routing to the same segment.
    pub fn grow(&mut self) {
        assert!(self.global_depth < MAX_DEPTH, "directory depth limit reached");
        let mut table = Vec::with_capacity(self.table.len() * 2);
        for &id in &self.table {
            table.push(id);
            table.push(id);
        }
        self.table = table;
        self.global_depth += 1;
        log::debug!(
            "directory grown to depth {} ({} slots, {} segments)",
            self.global_depth,
            self.table.len(),
            self.segments.len()
        );
    }

    /// Halve the table while no segment discriminates on the full global depth.
    pub fn shrink(&mut self) {
        let mut shrunk = false;
        while self.global_depth > 0
            && self
                .segments
                .values()
                .all(|s| s.local_depth() < self.global_depth)
        {
            self.table = self.table.iter().step_by(2).copied().collect();
            self.global_depth -= 1;
            shrunk = true;
        }
        if shrunk {
            log::debug!(
                "directory shrunk to depth {} ({} segments)",
                self.global_depth,
                self.segments.len()
            );
        }
    }

    /// After splitting the segment covering `index` to `new_local_depth`,
    /// point the half of its range whose new routing bit is 1 at `new_segment`.
    pub fn install(&mut self, index: usize, new_local_depth: u32, new_segment: SegmentId) {
        debug_assert!(new_local_depth >= 1);
        let range = self.range(index, new_local_depth - 1);
        let mid = range.start + range.len() / 2;
        self.assign(mid..range.end, new_segment);
    }

    pub fn assign(&mut self, range: Range<usize>, id: SegmentId) {
        for slot in &mut self.table[range] {
            *slot = id;
        }
    }

    pub fn insert_segment(&mut self, storage: Storage<K, V>) -> SegmentId {
        self.segments.insert(storage)
    }

    pub fn remove_segment(&mut self, id: SegmentId) -> Option<Storage<K, V>> {
        self.segments.remove(id)
    }

    pub fn entry(&self, pos: Position) -> Option<&Entry<K, V>> {
        self.segments.get(pos.segment)?.get(pos.slot)
    }

    pub fn entry_mut(&mut self, pos: Position) -> Option<&mut Entry<K, V>> {
        self.segments.get_mut(pos.segment)?.get_mut(pos.slot)
    }

    pub fn segments(&self) -> slotmap::basic::Values<'_, SegmentId, Storage<K, V>> {
        self.segments.values()
    }

    pub fn segments_mut(&mut self) -> slotmap::basic::ValuesMut<'_, SegmentId, Storage<K, V>> {
        self.segments.values_mut()
    }

    /// Bytes allocated for the table, the segment arena and every segment's
    /// slot storage.
    pub fn heap_bytes(&self) -> usize {
        self.table.capacity() * core::mem::size_of::<SegmentId>()
            + self.segments.capacity() * core::mem::size_of::<(Storage<K, V>, u32)>()
            + self.segments.values().map(Storage::heap_bytes).sum::<usize>()
    }

    /// Check the structural invariants; panics on violation.
    #[cfg(test)]
    pub fn check_invariants(&self) {
        use std::collections::HashMap;

        assert_eq!(self.table.len(), 1usize << self.global_depth);
        let mut refs: HashMap<SegmentId, Vec<usize>> = HashMap::new();
        for (i, &id) in self.table.iter().enumerate() {
            refs.entry(id).or_default().push(i);
        }
        assert_eq!(refs.len(), self.segments.len(), "unreferenced or dangling segment");
        for (id, indices) in &refs {
            let storage = &self.segments[*id];
            let d = storage.local_depth();
            assert!(d <= self.global_depth);
            assert_eq!(indices.len(), 1usize << (self.global_depth - d));
            let range = self.range(indices[0], d);
            assert_eq!(indices.clone(), range.collect::<Vec<_>>(), "non-contiguous sharing");
            for e in storage.iter() {
                assert_eq!(self.resolve(e.hash), *id, "entry routed to a foreign segment");
            }
        }
    }
}

impl<K, V> Index<SegmentId> for Directory<K, V> {
    type Output = Storage<K, V>;

    #[inline]
    fn index(&self, id: SegmentId) -> &Storage<K, V> {
        &self.segments[id]
    }
}

impl<K, V> IndexMut<SegmentId> for Directory<K, V> {
    #[inline]
    fn index_mut(&mut self, id: SegmentId) -> &mut Storage<K, V> {
        &mut self.segments[id]
    }
}
