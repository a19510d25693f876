//! Storage: the two shapes a directory-addressed segment can take.

use crate::inflated::InflatedSegment;
use crate::layout::SEGMENT_CAPACITY;
use crate::segment::{self, Entry, Segment, SegmentFull};
use slotmap::DefaultKey;

pub(crate) enum Storage<K, V> {
    Grouped(Segment<K, V>),
    Inflated(InflatedSegment<K, V>),
}

/// Location of an entry within its storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Slot {
    Grouped(usize),
    Inflated(DefaultKey),
}

impl<K, V> Storage<K, V> {
    /// Grouped when the entries fit a segment, inflated otherwise.
    pub fn from_entries(entries: Vec<Entry<K, V>>, local_depth: u32) -> Self {
        if entries.len() <= SEGMENT_CAPACITY {
            let mut s = Segment::new(local_depth);
            for e in entries {
                // Cannot fail: at most SEGMENT_CAPACITY entries.
                let _ = s.insert(e);
            }
            Storage::Grouped(s)
        } else {
            Storage::Inflated(InflatedSegment::from_entries(entries, local_depth))
        }
    }

    /// Refill a storage emptied by `take_entries`, reusing its allocation when
    /// the shape does not change.
    pub fn refill(&mut self, entries: Vec<Entry<K, V>>, local_depth: u32) {
        if let Storage::Grouped(s) = self {
            if entries.len() <= SEGMENT_CAPACITY {
                debug_assert_eq!(s.len(), 0);
                s.set_local_depth(local_depth);
                for e in entries {
                    let _ = s.insert(e);
                }
                return;
            }
        }
        *self = Storage::from_entries(entries, local_depth);
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Storage::Grouped(s) => s.len(),
            Storage::Inflated(s) => s.len(),
        }
    }

    #[inline]
    pub fn local_depth(&self) -> u32 {
        match self {
            Storage::Grouped(s) => s.local_depth(),
            Storage::Inflated(s) => s.local_depth(),
        }
    }

    #[inline]
    pub fn is_inflated(&self) -> bool {
        matches!(self, Storage::Inflated(_))
    }

    pub fn inflation_reported(&self) -> bool {
        match self {
            Storage::Grouped(_) => false,
            Storage::Inflated(s) => s.reported(),
        }
    }

    pub fn mark_inflation_reported(&mut self) {
        if let Storage::Inflated(s) = self {
            s.mark_reported();
        }
    }

    #[inline]
    pub fn find(&self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<Slot> {
        match self {
            Storage::Grouped(s) => s.find(hash, eq).map(Slot::Grouped),
            Storage::Inflated(s) => s.find(hash, eq).map(Slot::Inflated),
        }
    }

    pub fn insert(&mut self, entry: Entry<K, V>) -> Result<Slot, SegmentFull<K, V>> {
        match self {
            Storage::Grouped(s) => s.insert(entry).map(Slot::Grouped),
            Storage::Inflated(s) => Ok(Slot::Inflated(s.insert(entry))),
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&Entry<K, V>> {
        match (self, slot) {
            (Storage::Grouped(s), Slot::Grouped(i)) => s.get(i),
            (Storage::Inflated(s), Slot::Inflated(k)) => s.get(k),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Entry<K, V>> {
        match (self, slot) {
            (Storage::Grouped(s), Slot::Grouped(i)) => s.get_mut(i),
            (Storage::Inflated(s), Slot::Inflated(k)) => s.get_mut(k),
            _ => None,
        }
    }

    pub fn remove(&mut self, slot: Slot) -> Option<Entry<K, V>> {
        match (self, slot) {
            (Storage::Grouped(s), Slot::Grouped(i)) => s.remove(i),
            (Storage::Inflated(s), Slot::Inflated(k)) => s.remove(k),
            _ => None,
        }
    }

    pub fn take_entries(&mut self) -> Vec<Entry<K, V>> {
        match self {
            Storage::Grouped(s) => s.take_entries(),
            Storage::Inflated(s) => s.take_entries(),
        }
    }

    pub fn retain(&mut self, keep: impl FnMut(&K, &mut V) -> bool) -> usize {
        match self {
            Storage::Grouped(s) => s.retain(keep),
            Storage::Inflated(s) => s.retain(keep),
        }
    }

    pub fn iter(&self) -> StorageIter<'_, K, V> {
        match self {
            Storage::Grouped(s) => StorageIter::Grouped(s.iter()),
            Storage::Inflated(s) => StorageIter::Inflated(s.iter()),
        }
    }

    pub fn iter_mut(&mut self) -> StorageIterMut<'_, K, V> {
        match self {
            Storage::Grouped(s) => StorageIterMut::Grouped(s.iter_mut()),
            Storage::Inflated(s) => StorageIterMut::Inflated(s.iter_mut()),
        }
    }

    pub fn heap_bytes(&self) -> usize {
        match self {
            Storage::Grouped(s) => s.heap_bytes(),
            Storage::Inflated(s) => s.heap_bytes(),
        }
    }
}

pub(crate) enum StorageIter<'a, K, V> {
    Grouped(segment::Iter<'a, K, V>),
    Inflated(slotmap::basic::Values<'a, DefaultKey, Entry<K, V>>),
}

impl<'a, K, V> Iterator for StorageIter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            StorageIter::Grouped(it) => it.next(),
            StorageIter::Inflated(it) => it.next(),
        }
    }
}

pub(crate) enum StorageIterMut<'a, K, V> {
    Grouped(segment::IterMut<'a, K, V>),
    Inflated(slotmap::basic::ValuesMut<'a, DefaultKey, Entry<K, V>>),
}

impl<'a, K, V> Iterator for StorageIterMut<'a, K, V> {
    type Item = &'a mut Entry<K, V>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            StorageIterMut::Grouped(it) => it.next(),
            StorageIterMut::Inflated(it) => it.next(),
        }
    }
}
