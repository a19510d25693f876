//! smoothie-map: a memory-efficient segmented hash map that detects poor
//! hash code distributions.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a map for very large key-value workloads whose memory overhead
//!   stays low and even, and which keeps working when hash codes are bad.
//! - Layers:
//!   - Segment: 64 slots in 8 groups of 8, at most 48 live entries, probed
//!     with SWAR matching over one control byte per slot.
//!   - InflatedSegment: unbounded overflow for entries whose routing bits
//!     cannot be told apart.
//!   - Directory: extendible-hashing table of `2^global_depth` references
//!     to segments, addressed by the top bits of the hash code.
//!   - SplitController: decides splits, inflation, merges and deflation.
//!   - HashQualityMonitor: estimates how unlikely the observed splits and
//!     inflated segments are, and reports the unlikely ones.
//!   - SmoothieMap: the public engine tying the above together.
//!
//! Constraints
//! - Growth is incremental: a full segment splits into two; the directory
//!   doubles by duplicating references, never by moving entries.
//! - Each entry stores its `u64` hash; splits, merges and compaction never
//!   call back into the key equivalence.
//! - One engine: key and value equivalence are type parameters chosen at
//!   construction, so there is no per-call dispatch on configuration.
//! - Single writer: every mutation takes `&mut self`. The map is
//!   `Send + Sync` when its contents and strategies are, so an external
//!   `RwLock` gives concurrent readers; splits and directory growth happen
//!   inside the writer's call.
//!
//! Hash code layout
//! - Routing bits are read from the most significant end: the directory
//!   uses the top `global_depth` bits, a segment of local depth `d` owns one
//!   `d`-bit prefix, and a split tests bit `d`.
//! - Intra-segment bits are read from the least significant end: 3 bits pick
//!   the base group and the next 7 bits are the control-byte tag.
//! - The two ends never meet (`MAX_DEPTH + HASH_SEGMENT_LOOKUP_SHIFT <= 64`),
//!   so a split never changes where an entry sits inside a segment's probe
//!   order.
//!
//! Poor hash codes
//! - When a full segment's entries agree on every routing bit the map may
//!   still use, the segment inflates instead of doubling the directory over
//!   and over. Inflated segments are split again once the map grows enough to
//!   allow deeper routing.
//! - With a reporting action configured, the monitor reports
//!   `TOO_LARGE_INFLATED_SEGMENT` and `TOO_MANY_SKEWED_SEGMENT_SPLITS`
//!   occasions whose probability under uniform hashing is at most the
//!   configured maximum.
//!
//! Notes and non-goals
//! - No persistence, distribution or transactions.
//! - Iteration order is unspecified and changes with splits and merges.
//! - `retain` does not merge segments.

pub mod builder;
mod directory;
pub mod equivalence;
pub mod error;
mod group;
mod inflated;
pub mod iter;
pub mod layout;
mod map;
mod map_proptest;
mod monitor;
pub mod occasion;
mod segment;
mod split;
mod storage;

// Public surface
pub use builder::SmoothieMapBuilder;
pub use equivalence::{DefaultEquivalence, Equivalence};
pub use error::{BuildError, InsertError};
pub use map::SmoothieMap;
pub use monitor::ReportingAction;
pub use occasion::{DebugValue, OccasionType, PoorHashCodeDistributionOccasion};
