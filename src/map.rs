//! SmoothieMap: the engine tying directory, segments, split controller and
//! hash quality monitor together.

use crate::builder::{initial_depth, SmoothieMapBuilder};
use crate::directory::{Directory, Position};
use crate::equivalence::{DefaultEquivalence, Equivalence};
use crate::error::InsertError;
use crate::iter::{Iter, IterMut, Keys, Values, ValuesMut};
use crate::monitor::HashQualityMonitor;
use crate::segment::{Entry, SegmentFull};
use crate::split::SplitController;
use core::borrow::Borrow;
use core::fmt;
use core::hash::Hash;
use core::mem;

/// A segmented hash map for very large, memory-sensitive workloads.
///
/// Entries live in small open-addressing segments addressed through an
/// extendible-hashing directory. Growth splits one segment at a time, so
/// there is never a whole-table rehash. Keys whose hash codes cannot be told
/// apart by routing bits go to an inflated overflow segment instead of
/// deepening the directory, and an optional monitor reports hash code
/// distributions that are unlikely under a good hash function.
///
/// Equality and hashing of keys and values are delegated to the `KE` and `VE`
/// strategies (see `Equivalence`), chosen once at construction.
///
/// ```
/// use smoothie_map::SmoothieMap;
///
/// let mut map = SmoothieMap::new();
/// assert_eq!(map.insert("apple", 3), None);
/// assert_eq!(map.insert("apple", 4), Some(3));
/// assert_eq!(map.get("apple"), Some(&4));
/// assert_eq!(map.remove("apple"), Some(4));
/// assert!(map.is_empty());
/// ```
pub struct SmoothieMap<K, V, KE = DefaultEquivalence, VE = DefaultEquivalence> {
    directory: Directory<K, V>,
    len: usize,
    initial_depth: u32,
    split_controller: SplitController,
    monitor: HashQualityMonitor,
    key_equivalence: KE,
    value_equivalence: VE,
}

static_assertions::assert_impl_all!(SmoothieMap<String, u64>: Send, Sync);

impl<K, V> SmoothieMap<K, V> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// A map pre-sized for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_parts(
            initial_depth(capacity),
            SplitController::new(1.0),
            HashQualityMonitor::disabled(),
            DefaultEquivalence::default(),
            DefaultEquivalence::default(),
        )
    }

    pub fn builder() -> SmoothieMapBuilder<K, V> {
        SmoothieMapBuilder::new()
    }
}

impl<K, V> Default for SmoothieMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, KE, VE> SmoothieMap<K, V, KE, VE> {
    pub(crate) fn from_parts(
        initial_depth: u32,
        split_controller: SplitController,
        monitor: HashQualityMonitor,
        key_equivalence: KE,
        value_equivalence: VE,
    ) -> Self {
        Self {
            directory: Directory::new(initial_depth),
            len: 0,
            initial_depth,
            split_controller,
            monitor,
            key_equivalence,
            value_equivalence,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn key_equivalence(&self) -> &KE {
        &self.key_equivalence
    }

    pub fn value_equivalence(&self) -> &VE {
        &self.value_equivalence
    }

    /// Remove every entry and return to the initial directory shape.
    pub fn clear(&mut self) {
        self.directory = Directory::new(self.initial_depth);
        self.len = 0;
        self.split_controller.reset();
    }

    /// Keep only the entries for which `keep` returns `true`.
    ///
    /// Segments emptied this way are not merged; later removals in their
    /// neighbourhood merge them.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut removed = 0;
        for storage in self.directory.segments_mut() {
            removed += storage.retain(&mut keep);
        }
        self.len -= removed;
    }

    /// Call `action` on every entry, in unspecified order.
    pub fn for_each_entry<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V),
    {
        for storage in self.directory.segments() {
            for e in storage.iter() {
                action(&e.key, &e.value);
            }
        }
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.directory.segments(), self.len)
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut::new(self.directory.segments_mut(), self.len)
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self.iter())
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self.iter())
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut::new(self.iter_mut())
    }

    /// Bytes taken by the map's own fields, excluding the equivalence
    /// strategies and the padding they add.
    pub const fn fixed_size_in_bytes() -> usize {
        mem::size_of::<SmoothieMap<K, V, (), ()>>()
    }

    /// Fixed size plus every byte allocated for the directory and segments.
    /// Heap memory owned by keys and values themselves is not counted.
    pub fn footprint_in_bytes(&self) -> usize {
        Self::fixed_size_in_bytes() + self.directory.heap_bytes()
    }

    pub fn segment_count(&self) -> usize {
        self.directory.segment_count()
    }

    pub fn global_depth(&self) -> u32 {
        self.directory.global_depth()
    }

    pub fn inflated_segment_count(&self) -> usize {
        self.directory.segments().filter(|s| s.is_inflated()).count()
    }

    fn value_at_mut(&mut self, pos: Position) -> &mut V {
        &mut self
            .directory
            .entry_mut(pos)
            .expect("position must refer to a live entry")
            .value
    }

    /// Place an entry whose key is known to be absent.
    fn insert_new(&mut self, mut entry: Entry<K, V>) -> Position {
        self.split_controller.before_insert(
            &mut self.directory,
            &mut self.monitor,
            entry.hash,
            self.len,
        );
        loop {
            let segment = self.directory.resolve(entry.hash);
            match self.directory[segment].insert(entry) {
                Ok(slot) => {
                    self.len += 1;
                    return Position { segment, slot };
                }
                Err(SegmentFull(rejected)) => {
                    entry = rejected;
                    self.split_controller.make_room(
                        &mut self.directory,
                        &mut self.monitor,
                        segment,
                        entry.hash,
                        self.len,
                    );
                }
            }
        }
    }

    fn remove_at(&mut self, pos: Position) -> Option<Entry<K, V>> {
        let entry = self.directory[pos.segment].remove(pos.slot)?;
        self.len -= 1;
        self.split_controller
            .after_remove(&mut self.directory, entry.hash);
        Some(entry)
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        self.directory.check_invariants();
        assert_eq!(
            self.len,
            self.directory.segments().map(|s| s.len()).sum::<usize>()
        );
    }
}

impl<K, V, KE, VE> SmoothieMap<K, V, KE, VE>
where
    KE: Equivalence<K>,
{
    fn find_hashed<Q>(&self, hash: u64, key: &Q) -> Option<Position>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        let segment = self.directory.resolve(hash);
        let ke = &self.key_equivalence;
        let slot = self.directory[segment].find(hash, |stored| ke.equivalent(key, stored.borrow()))?;
        Some(Position { segment, slot })
    }

    fn find<Q>(&self, key: &Q) -> Option<Position>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        self.find_hashed(self.key_equivalence.hash(key), key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        let e = self.directory.entry(self.find(key)?)?;
        Some((&e.key, &e.value))
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        let pos = self.find(key)?;
        self.directory.entry_mut(pos).map(|e| &mut e.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        self.find(key).is_some()
    }

    /// Insert `value` under `key`, returning the value it replaces. When an
    /// equivalent key is already present, the stored key is kept.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.key_equivalence.hash(&key);
        if let Some(e) = self
            .find_hashed(hash, &key)
            .and_then(|pos| self.directory.entry_mut(pos))
        {
            return Some(mem::replace(&mut e.value, value));
        }
        self.insert_new(Entry { key, value, hash });
        None
    }

    /// Insert only if no equivalent key is present; otherwise hand the pair
    /// back.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<&mut V, InsertError<K, V>> {
        let hash = self.key_equivalence.hash(&key);
        if self.find_hashed(hash, &key).is_some() {
            return Err(InsertError::DuplicateKey { key, value });
        }
        let pos = self.insert_new(Entry { key, value, hash });
        Ok(self.value_at_mut(pos))
    }

    /// The value under `key`, inserting `default()` first when absent.
    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let hash = self.key_equivalence.hash(&key);
        let pos = match self.find_hashed(hash, &key) {
            Some(pos) => pos,
            None => self.insert_new(Entry {
                key,
                value: default(),
                hash,
            }),
        };
        self.value_at_mut(pos)
    }

    /// Replace the value under `key` only if the key is present.
    pub fn replace<Q>(&mut self, key: &Q, value: V) -> Option<V>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        self.get_mut(key).map(|v| mem::replace(v, value))
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        let pos = self.find(key)?;
        let e = self.remove_at(pos)?;
        Some((e.key, e.value))
    }
}

impl<K, V, KE, VE> SmoothieMap<K, V, KE, VE>
where
    KE: Equivalence<K>,
    VE: Equivalence<V>,
{
    /// Replace the value under `key` with `new_value` if the current value is
    /// equivalent to `old_value`.
    pub fn replace_if_equals<Q>(&mut self, key: &Q, old_value: &V, new_value: V) -> bool
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        let Some(pos) = self.find(key) else {
            return false;
        };
        let ve = &self.value_equivalence;
        match self.directory.entry_mut(pos) {
            Some(e) if ve.equivalent(old_value, &e.value) => {
                e.value = new_value;
                true
            }
            _ => false,
        }
    }

    /// Remove the entry under `key` if its value is equivalent to `value`.
    pub fn remove_if_equals<Q>(&mut self, key: &Q, value: &V) -> bool
    where
        Q: ?Sized,
        K: Borrow<Q>,
        KE: Equivalence<Q>,
    {
        let Some(pos) = self.find(key) else {
            return false;
        };
        let matches = self
            .directory
            .entry(pos)
            .is_some_and(|e| self.value_equivalence.equivalent(value, &e.value));
        matches && self.remove_at(pos).is_some()
    }

    /// Linear scan for a value equivalent to `value`.
    pub fn contains_value(&self, value: &V) -> bool {
        self.values()
            .any(|v| self.value_equivalence.equivalent(value, v))
    }

    /// Order-independent hash of the whole map: the wrapping sum over entries
    /// of key hash XOR value hash.
    pub fn aggregate_hash_code(&self) -> u64 {
        let mut h = 0u64;
        self.for_each_entry_hashed(|hash, v| {
            h = h.wrapping_add(hash ^ self.value_equivalence.hash(v));
        });
        h
    }

    fn for_each_entry_hashed(&self, mut f: impl FnMut(u64, &V)) {
        for storage in self.directory.segments() {
            for e in storage.iter() {
                f(e.hash, &e.value);
            }
        }
    }
}

impl<K, V, KE, VE> PartialEq for SmoothieMap<K, V, KE, VE>
where
    KE: Equivalence<K>,
    VE: Equivalence<V>,
{
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self.iter().all(|(k, v)| {
                other
                    .get(k)
                    .is_some_and(|ov| self.value_equivalence.equivalent(v, ov))
            })
    }
}

impl<K, V, KE, VE> Eq for SmoothieMap<K, V, KE, VE>
where
    KE: Equivalence<K>,
    VE: Equivalence<V>,
{
}

impl<K: fmt::Debug, V: fmt::Debug, KE, VE> fmt::Debug for SmoothieMap<K, V, KE, VE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, KE, VE> Extend<(K, V)> for SmoothieMap<K, V, KE, VE>
where
    KE: Equivalence<K>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for SmoothieMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity(iter.size_hint().0);
        map.extend(iter);
        map
    }
}

impl<'a, K, V, KE, VE> IntoIterator for &'a SmoothieMap<K, V, KE, VE> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V, KE, VE> IntoIterator for &'a mut SmoothieMap<K, V, KE, VE> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}
