//! SmoothieMapBuilder: configuration consumed by the engine at construction.

use crate::equivalence::{DefaultEquivalence, Equivalence};
use crate::error::BuildError;
use crate::layout::SEGMENT_CAPACITY;
use crate::map::SmoothieMap;
use crate::monitor::{HashQualityMonitor, ReportingAction};
use crate::occasion::PoorHashCodeDistributionOccasion;
use crate::split::SplitController;
use core::fmt;
use core::marker::PhantomData;

/// Expected number of entries per segment in a map grown by splitting.
const TYPICAL_SEGMENT_FILL: usize = SEGMENT_CAPACITY * 3 / 4;

/// Deepest directory pre-allocated for an initial capacity.
const MAX_INITIAL_DEPTH: u32 = 20;

/// Directory depth giving `capacity` entries room without splits.
pub(crate) fn initial_depth(capacity: usize) -> u32 {
    let segments = capacity.div_ceil(TYPICAL_SEGMENT_FILL);
    if segments <= 1 {
        0
    } else {
        (usize::BITS - (segments - 1).leading_zeros()).min(MAX_INITIAL_DEPTH)
    }
}

/// Builder for `SmoothieMap`.
///
/// `SmoothieMapBuilder::new()` starts from `DefaultEquivalence` for keys and
/// values; `SmoothieMapBuilder::custom()` starts without strategies, and
/// `build` fails unless both are supplied.
///
/// ```
/// use smoothie_map::SmoothieMapBuilder;
///
/// let mut map = SmoothieMapBuilder::<String, u32>::new()
///     .initial_capacity(1_000)
///     .report_poor_hash_code_distribution(1e-6, |occasion| {
///         eprintln!("{}", occasion);
///     })
///     .build()
///     .unwrap();
/// map.insert("a".to_string(), 1);
/// assert_eq!(map.get("a"), Some(&1));
/// ```
pub struct SmoothieMapBuilder<K, V, KE = DefaultEquivalence, VE = DefaultEquivalence> {
    initial_capacity: usize,
    max_segment_fill_ratio: f64,
    max_occasion_probability: f64,
    reporting_action: Option<ReportingAction>,
    key_equivalence: Option<KE>,
    value_equivalence: Option<VE>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> SmoothieMapBuilder<K, V> {
    pub fn new() -> Self {
        Self {
            key_equivalence: Some(DefaultEquivalence::default()),
            value_equivalence: Some(DefaultEquivalence::default()),
            ..Self::custom()
        }
    }
}

impl<K, V> Default for SmoothieMapBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, KE, VE> SmoothieMapBuilder<K, V, KE, VE> {
    /// A builder with no equivalence strategies.
    pub fn custom() -> Self {
        Self {
            initial_capacity: 0,
            max_segment_fill_ratio: 1.0,
            max_occasion_probability: 0.0,
            reporting_action: None,
            key_equivalence: None,
            value_equivalence: None,
            _marker: PhantomData,
        }
    }

    /// Number of entries to pre-size the directory for.
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Fraction of segment capacity above which a segment is split ahead of
    /// the insertion that would fill it. Must be in `(0, 1]`; the default
    /// `1.0` splits only full segments.
    pub fn max_segment_fill_ratio(mut self, ratio: f64) -> Self {
        self.max_segment_fill_ratio = ratio;
        self
    }

    /// Enable poor hash code distribution reporting. `action` is called
    /// synchronously, on the thread of the triggering insertion, for every
    /// occasion whose probability is at most `max_occasion_probability`.
    pub fn report_poor_hash_code_distribution<F>(
        mut self,
        max_occasion_probability: f64,
        action: F,
    ) -> Self
    where
        F: FnMut(&PoorHashCodeDistributionOccasion) + Send + Sync + 'static,
    {
        self.max_occasion_probability = max_occasion_probability;
        self.reporting_action = Some(Box::new(action));
        self
    }

    pub fn key_equivalence<KE2>(self, key_equivalence: KE2) -> SmoothieMapBuilder<K, V, KE2, VE> {
        SmoothieMapBuilder {
            initial_capacity: self.initial_capacity,
            max_segment_fill_ratio: self.max_segment_fill_ratio,
            max_occasion_probability: self.max_occasion_probability,
            reporting_action: self.reporting_action,
            key_equivalence: Some(key_equivalence),
            value_equivalence: self.value_equivalence,
            _marker: PhantomData,
        }
    }

    pub fn value_equivalence<VE2>(
        self,
        value_equivalence: VE2,
    ) -> SmoothieMapBuilder<K, V, KE, VE2> {
        SmoothieMapBuilder {
            initial_capacity: self.initial_capacity,
            max_segment_fill_ratio: self.max_segment_fill_ratio,
            max_occasion_probability: self.max_occasion_probability,
            reporting_action: self.reporting_action,
            key_equivalence: self.key_equivalence,
            value_equivalence: Some(value_equivalence),
            _marker: PhantomData,
        }
    }

    pub fn build(self) -> Result<SmoothieMap<K, V, KE, VE>, BuildError>
    where
        KE: Equivalence<K>,
        VE: Equivalence<V>,
    {
        let ratio = self.max_segment_fill_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(BuildError::InvalidFillRatio(ratio));
        }
        let key_equivalence = self
            .key_equivalence
            .ok_or(BuildError::MissingKeyEquivalence)?;
        let value_equivalence = self
            .value_equivalence
            .ok_or(BuildError::MissingValueEquivalence)?;
        let monitor = match self.reporting_action {
            Some(action) => {
                let p = self.max_occasion_probability;
                if !(p > 0.0 && p <= 1.0) {
                    return Err(BuildError::InvalidOccasionProbability(p));
                }
                HashQualityMonitor::new(p, action)
            }
            None => HashQualityMonitor::disabled(),
        };
        Ok(SmoothieMap::from_parts(
            initial_depth(self.initial_capacity),
            SplitController::new(ratio),
            monitor,
            key_equivalence,
            value_equivalence,
        ))
    }
}

impl<K, V, KE, VE> fmt::Debug for SmoothieMapBuilder<K, V, KE, VE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmoothieMapBuilder")
            .field("initial_capacity", &self.initial_capacity)
            .field("max_segment_fill_ratio", &self.max_segment_fill_ratio)
            .field("max_occasion_probability", &self.max_occasion_probability)
            .field("reporting", &self.reporting_action.is_some())
            .field("key_equivalence", &self.key_equivalence.is_some())
            .field("value_equivalence", &self.value_equivalence.is_some())
            .finish()
    }
}
