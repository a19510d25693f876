//! SplitController: keeps segments within capacity.
//!
//! All structural changes of the directory are decided here:
//!
//! - A full grouped segment is split on its next routing bit when its entries
//!   can still be told apart by routing bits below the depth cap, and inflated
//!   otherwise.
//! - A grouped segment above the configured fill ratio is split before the
//!   next insertion reaches it.
//! - Inflated segments are re-examined periodically and split again once the
//!   depth cap allows it.
//! - After removals, a segment and its buddy (the segment sharing all routing
//!   bits but the last) merge when they are small enough together, and
//!   inflated segments that shrank deflate back into grouped ones.
//!
//! Structural changes only happen before an entry is placed or after one is
//! taken out, never between locating an entry and handing it to the caller.

use crate::directory::{Directory, SegmentId};
use crate::inflated::InflatedSegment;
use crate::layout::{natural_depth, routing_mask, split_bit, MAX_DEPTH, SEGMENT_CAPACITY};
use crate::monitor::{HashQualityMonitor, MapStats, INFLATED_CHECK_INTERVAL};
use crate::storage::Storage;

/// Routing bits a segment may use beyond the depth a uniformly distributed
/// map of the current size needs.
const DEPTH_SLACK: u32 = 3;

/// Summary of one split, for diagnostics and tests.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct SplitOutcome {
    pub retained: usize,
    pub moved: usize,
    pub from_inflated: bool,
}

pub(crate) struct SplitController {
    max_segment_fill_ratio: f64,
    merge_threshold: usize,
    inflated_inserts: usize,
}

impl SplitController {
    pub fn new(max_segment_fill_ratio: f64) -> Self {
        let split_at = (max_segment_fill_ratio * SEGMENT_CAPACITY as f64) as usize;
        Self {
            max_segment_fill_ratio,
            merge_threshold: (split_at / 2).min(SEGMENT_CAPACITY / 2),
            inflated_inserts: 0,
        }
    }

    pub fn reset(&mut self) {
        self.inflated_inserts = 0;
    }

    /// Prepare the segment `hash` routes to for the insertion of a new entry.
    pub fn before_insert<K, V>(
        &mut self,
        dir: &mut Directory<K, V>,
        monitor: &mut HashQualityMonitor,
        hash: u64,
        len: usize,
    ) {
        let id = dir.resolve(hash);
        match &dir[id] {
            Storage::Grouped(s) => {
                if self.max_segment_fill_ratio < 1.0
                    && s.fill_ratio() >= self.max_segment_fill_ratio
                    && can_split(&dir[id], hash, depth_cap(dir.global_depth(), len))
                {
                    self.split(dir, monitor, id, hash, len);
                }
            }
            Storage::Inflated(_) => {
                self.inflated_inserts += 1;
                if self.inflated_inserts % INFLATED_CHECK_INTERVAL == 0 {
                    if can_split(&dir[id], hash, depth_cap(dir.global_depth(), len)) {
                        self.split(dir, monitor, id, hash, len);
                    } else {
                        check_inflated(dir, monitor, id, len);
                    }
                }
            }
        }
    }

    /// Make room in the full segment `id` for an entry with `hash`.
    pub fn make_room<K, V>(
        &mut self,
        dir: &mut Directory<K, V>,
        monitor: &mut HashQualityMonitor,
        id: SegmentId,
        hash: u64,
        len: usize,
    ) {
        if can_split(&dir[id], hash, depth_cap(dir.global_depth(), len)) {
            self.split(dir, monitor, id, hash, len);
        } else {
            inflate(dir, monitor, id, len);
        }
    }

    /// Split segment `id` (which `hash` routes to) on its next routing bit.
    fn split<K, V>(
        &mut self,
        dir: &mut Directory<K, V>,
        monitor: &mut HashQualityMonitor,
        id: SegmentId,
        hash: u64,
        len: usize,
    ) -> SplitOutcome {
        let depth = dir[id].local_depth();
        debug_assert!(depth < MAX_DEPTH);
        if depth == dir.global_depth() {
            dir.grow();
        }
        let index = dir.index_of(hash);
        let from_inflated = dir[id].is_inflated();
        let reported = dir[id].inflation_reported();

        let (moved, retained): (Vec<_>, Vec<_>) = dir[id]
            .take_entries()
            .into_iter()
            .partition(|e| split_bit(e.hash, depth));
        let outcome = SplitOutcome {
            retained: retained.len(),
            moved: moved.len(),
            from_inflated,
        };

        dir[id].refill(retained, depth + 1);
        let mut sibling = Storage::from_entries(moved, depth + 1);
        if reported {
            dir[id].mark_inflation_reported();
            sibling.mark_inflation_reported();
        }
        let sibling = dir.insert_segment(sibling);
        dir.install(index, depth + 1, sibling);

        log::trace!(
            "split segment at depth {}: {} retained, {} moved{}",
            depth,
            outcome.retained,
            outcome.moved,
            if from_inflated { " (inflated)" } else { "" }
        );
        if !from_inflated {
            monitor.observe_split(outcome.retained, outcome.moved, stats(dir, len));
        }
        outcome
    }

    /// Shrink the structure around the segment `hash` routes to after a
    /// removal from it.
    pub fn after_remove<K, V>(&mut self, dir: &mut Directory<K, V>, hash: u64) {
        let id = dir.resolve(hash);
        if let Storage::Inflated(s) = &dir[id] {
            if s.len() > SEGMENT_CAPACITY / 2 {
                return;
            }
            let depth = s.local_depth();
            let entries = dir[id].take_entries();
            log::debug!("deflating segment of {} entries at depth {}", entries.len(), depth);
            dir[id] = Storage::from_entries(entries, depth);
        }
        while self.try_merge(dir, hash) {}
    }

    /// Merge the segment `hash` routes to with its buddy when both are
    /// grouped, at the same depth, and small enough together.
    fn try_merge<K, V>(&mut self, dir: &mut Directory<K, V>, hash: u64) -> bool {
        let id = dir.resolve(hash);
        let depth = dir[id].local_depth();
        if depth == 0 || dir[id].is_inflated() {
            return false;
        }
        let index = dir.index_of(hash);
        let buddy = dir.id_at(index ^ (1usize << (dir.global_depth() - depth)));
        let buddy_storage = &dir[buddy];
        if buddy_storage.is_inflated()
            || buddy_storage.local_depth() != depth
            || buddy_storage.len() + dir[id].len() > self.merge_threshold
        {
            return false;
        }
        let Some(mut absorbed) = dir.remove_segment(buddy) else {
            return false;
        };
        let mut entries = dir[id].take_entries();
        entries.extend(absorbed.take_entries());
        log::trace!("merged buddy segments at depth {} ({} entries)", depth, entries.len());
        dir[id].refill(entries, depth - 1);
        let range = dir.range(index, depth - 1);
        dir.assign(range, id);
        dir.shrink();
        true
    }
}

/// Deepest local depth a segment may split to for a map of `len` entries.
fn depth_cap(global_depth: u32, len: usize) -> u32 {
    global_depth
        .max(natural_depth(len) + DEPTH_SLACK)
        .min(MAX_DEPTH)
}

/// Whether splitting `storage` could separate its entries and an incoming
/// `hash` using routing bits below `cap`. Inflated segments answer from their
/// running spread of hash bits instead of scanning.
fn can_split<K, V>(storage: &Storage<K, V>, hash: u64, cap: u32) -> bool {
    let depth = storage.local_depth();
    if depth >= cap {
        return false;
    }
    let mask = routing_mask(depth, cap);
    match storage {
        Storage::Grouped(s) => s.iter().any(|e| (e.hash ^ hash) & mask != 0),
        Storage::Inflated(s) => s.differs_under(hash, mask),
    }
}

fn inflate<K, V>(
    dir: &mut Directory<K, V>,
    monitor: &mut HashQualityMonitor,
    id: SegmentId,
    len: usize,
) {
    let depth = dir[id].local_depth();
    let entries = dir[id].take_entries();
    log::debug!("inflating segment of {} entries at depth {}", entries.len(), depth);
    dir[id] = Storage::Inflated(InflatedSegment::from_entries(entries, depth));
    check_inflated(dir, monitor, id, len);
}

fn check_inflated<K, V>(
    dir: &mut Directory<K, V>,
    monitor: &mut HashQualityMonitor,
    id: SegmentId,
    len: usize,
) {
    let storage = &dir[id];
    if storage.inflation_reported() {
        return;
    }
    let (size, depth) = (storage.len(), storage.local_depth());
    if monitor.observe_inflated(size, depth, stats(dir, len)) {
        dir[id].mark_inflation_reported();
    }
}

fn stats<K, V>(dir: &Directory<K, V>, len: usize) -> MapStats {
    MapStats {
        len,
        global_depth: dir.global_depth(),
        segment_count: dir.segment_count(),
    }
}
