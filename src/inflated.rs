//! InflatedSegment: unbounded overflow storage for a segment whose entries
//! cannot be separated by routing bits.
//!
//! Entries live in a generational `SlotMap`, indexed by a `HashTable` of slot
//! keys. Each entry stores its precomputed `u64` hash and indexing always uses
//! the stored hash, so growing the index never calls user hashing code. Keys
//! that collide on the full hash degrade to a linear scan of the colliding
//! run, which is the accepted fallback for pathological strategies.

use crate::segment::Entry;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};

pub(crate) struct InflatedSegment<K, V> {
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<K, V>>,
    local_depth: u32,
    // A TOO_LARGE_INFLATED_SEGMENT occasion was already reported for this
    // segment or the segment it was split from.
    reported: bool,
    // `spread` has a bit set wherever some stored hash differs from `anchor`,
    // the hash of the first entry placed into an empty segment. Removals
    // leave it a superset of the true spread.
    anchor: u64,
    spread: u64,
}

impl<K, V> InflatedSegment<K, V> {
    pub fn new(local_depth: u32) -> Self {
        Self {
            index: HashTable::new(),
            slots: SlotMap::with_key(),
            local_depth,
            reported: false,
            anchor: 0,
            spread: 0,
        }
    }

    pub fn from_entries(entries: Vec<Entry<K, V>>, local_depth: u32) -> Self {
        let mut s = Self::new(local_depth);
        for e in entries {
            s.insert(e);
        }
        s
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn local_depth(&self) -> u32 {
        self.local_depth
    }

    #[inline]
    pub fn reported(&self) -> bool {
        self.reported
    }

    #[inline]
    pub fn mark_reported(&mut self) {
        self.reported = true;
    }

    pub fn find(&self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Option<DefaultKey> {
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.hash == hash && eq(&e.key))
                    .unwrap_or(false)
            })
            .copied()
    }

    /// Insert an entry whose key is known to be absent.
    pub fn insert(&mut self, entry: Entry<K, V>) -> DefaultKey {
        let hash = entry.hash;
        if self.slots.is_empty() {
            self.anchor = hash;
            self.spread = 0;
        } else {
            self.spread |= hash ^ self.anchor;
        }
        let k = self.slots.insert(entry);
        let slots = &self.slots;
        self.index.insert_unique(hash, k, |&kk| {
            slots.get(kk).map(|e| e.hash).unwrap_or(0)
        });
        k
    }

    pub fn get(&self, k: DefaultKey) -> Option<&Entry<K, V>> {
        self.slots.get(k)
    }

    pub fn get_mut(&mut self, k: DefaultKey) -> Option<&mut Entry<K, V>> {
        self.slots.get_mut(k)
    }

    pub fn remove(&mut self, k: DefaultKey) -> Option<Entry<K, V>> {
        let entry = self.slots.remove(k)?;
        // Unlink from index via occupied entry removal.
        if let Ok(occupied) = self.index.find_entry(entry.hash, |&kk| kk == k) {
            occupied.remove();
        }
        Some(entry)
    }

    /// Whether the stored hashes and `hash` disagree on any bit of `mask`.
    /// Constant time; may answer `true` for bits only removed entries held.
    #[inline]
    pub fn differs_under(&self, hash: u64, mask: u64) -> bool {
        !self.slots.is_empty() && (self.spread | (hash ^ self.anchor)) & mask != 0
    }

    pub fn take_entries(&mut self) -> Vec<Entry<K, V>> {
        self.spread = 0;
        self.index.clear();
        self.slots.drain().map(|(_, e)| e).collect()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) -> usize {
        let doomed: Vec<DefaultKey> = self
            .slots
            .iter_mut()
            .filter_map(|(k, e)| (!keep(&e.key, &mut e.value)).then_some(k))
            .collect();
        for &k in &doomed {
            self.remove(k);
        }
        doomed.len()
    }

    pub fn iter(&self) -> slotmap::basic::Values<'_, DefaultKey, Entry<K, V>> {
        self.slots.values()
    }

    pub fn iter_mut(&mut self) -> slotmap::basic::ValuesMut<'_, DefaultKey, Entry<K, V>> {
        self.slots.values_mut()
    }

    /// Approximate bytes of the index (one control byte per bucket) and the
    /// slot arena (one version word per slot).
    pub fn heap_bytes(&self) -> usize {
        self.index.capacity() * (core::mem::size_of::<DefaultKey>() + 1)
            + self.slots.capacity() * (core::mem::size_of::<Entry<K, V>>() + core::mem::size_of::<u32>())
    }
}
