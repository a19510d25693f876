//! HashQualityMonitor: detects and reports poor hash code distributions.
//!
//! The monitor observes split and inflation outcomes and estimates, for each
//! candidate occasion, how likely it would be if hash codes were uniformly
//! distributed. Only occasions at most as likely as the configured
//! `max_occasion_probability` reach the reporting action: the rarer an
//! occasion, the more suspicious it is.
//!
//! Probability estimates use one tail bound. For a sum `X` of independent
//! Bernoulli trials with mean `μ`, and `k > μ`,
//!
//! ```text
//! P(X ≥ k) ≤ exp(k − μ + k·ln(μ / k))
//! ```
//!
//! (the multiplicative Chernoff bound), and `1` when `k ≤ μ`. Being an upper
//! bound, it errs towards not reporting.
//!
//! - Skewed splits. A split of `n` entries is skewed when its smaller side
//!   holds at most `n / 3` entries; under uniform hashing the side sizes are
//!   `Binomial(n, 1/2)` and the skew probability `p(n)` is computed exactly.
//!   With `k` skewed splits out of splits of sizes `n_i`, the occasion
//!   probability is the bound at `μ = Σ p(n_i)`. Splits are counted map-wide,
//!   not per segment lineage.
//! - Inflated segments. With `N` entries in the map, a segment of size `n`
//!   and `D = max(local depth, natural depth of N)`, a uniform hash puts
//!   `Binomial(N, 2^-D)` entries under a `D`-bit prefix; the occasion
//!   probability is `2^D` (a union bound over prefixes) times the tail bound at
//!   `μ = N / 2^D`.
//!
//! Reporting runs synchronously on the thread performing the triggering
//! insertion, so the action's latency adds to that insertion. A panicking
//! action is caught and logged; it never unwinds into the map.

use crate::layout::{natural_depth, SEGMENT_CAPACITY};
use crate::occasion::{DebugValue, OccasionType, PoorHashCodeDistributionOccasion};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Callback receiving poor hash code distribution occasions.
pub type ReportingAction = Box<dyn FnMut(&PoorHashCodeDistributionOccasion) + Send + Sync>;

/// Splits of fewer entries are too noisy to classify.
const MIN_SKEW_SPLIT_SIZE: usize = 16;

/// Splits observed before skew statistics are evaluated.
const MIN_SPLITS_FOR_SKEW_CHECK: u64 = 32;

/// Insertions into an inflated segment between two size checks.
pub(crate) const INFLATED_CHECK_INTERVAL: usize = 16;

/// Map-wide figures captured when an outcome is observed.
#[derive(Copy, Clone, Debug)]
pub(crate) struct MapStats {
    pub len: usize,
    pub global_depth: u32,
    pub segment_count: usize,
}

pub(crate) struct HashQualityMonitor {
    max_occasion_probability: f64,
    reporting_action: Option<ReportingAction>,
    // Indexed by split size.
    skew_probability: Vec<f64>,
    num_splits: u64,
    num_skewed_splits: u64,
    expected_skewed_splits: f64,
    skew_reported: bool,
}

impl HashQualityMonitor {
    pub fn disabled() -> Self {
        Self {
            max_occasion_probability: 0.0,
            reporting_action: None,
            skew_probability: Vec::new(),
            num_splits: 0,
            num_skewed_splits: 0,
            expected_skewed_splits: 0.0,
            skew_reported: false,
        }
    }

    pub fn new(max_occasion_probability: f64, reporting_action: ReportingAction) -> Self {
        Self {
            max_occasion_probability,
            reporting_action: Some(reporting_action),
            skew_probability: (0..=SEGMENT_CAPACITY).map(skewed_split_probability).collect(),
            ..Self::disabled()
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.reporting_action.is_some()
    }

    /// Account for a split of a grouped segment into `retained` and `moved`
    /// entries.
    pub fn observe_split(&mut self, retained: usize, moved: usize, stats: MapStats) {
        if !self.is_enabled() {
            return;
        }
        let n = retained + moved;
        if !(MIN_SKEW_SPLIT_SIZE..=SEGMENT_CAPACITY).contains(&n) {
            return;
        }
        self.num_splits += 1;
        self.expected_skewed_splits += self.skew_probability[n];
        if !is_skewed(n, retained.min(moved)) {
            return;
        }
        self.num_skewed_splits += 1;
        if self.skew_reported || self.num_splits < MIN_SPLITS_FOR_SKEW_CHECK {
            return;
        }
        let probability =
            chernoff_upper_tail(self.expected_skewed_splits, self.num_skewed_splits as f64);
        if probability > self.max_occasion_probability {
            return;
        }
        self.skew_reported = true;
        let occasion = PoorHashCodeDistributionOccasion::new(
            OccasionType::TooManySkewedSegmentSplits,
            probability,
            vec![
                ("maxOccasionProbability", DebugValue::Float(self.max_occasion_probability)),
                ("numSplits", DebugValue::Count(self.num_splits)),
                ("numSkewedSplits", DebugValue::Count(self.num_skewed_splits)),
                ("expectedSkewedSplits", DebugValue::Float(self.expected_skewed_splits)),
                ("lastSplitRetained", DebugValue::Count(retained as u64)),
                ("lastSplitMoved", DebugValue::Count(moved as u64)),
                ("mapSize", DebugValue::Count(stats.len as u64)),
                ("globalDepth", DebugValue::Count(stats.global_depth as u64)),
                ("numSegments", DebugValue::Count(stats.segment_count as u64)),
            ],
        );
        self.report(occasion);
    }

    /// Check the size of an inflated segment. Returns whether an occasion was
    /// reported.
    pub fn observe_inflated(&mut self, segment_len: usize, local_depth: u32, stats: MapStats) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let probability = inflated_segment_probability(stats.len, segment_len, local_depth);
        if probability > self.max_occasion_probability {
            return false;
        }
        let occasion = PoorHashCodeDistributionOccasion::new(
            OccasionType::TooLargeInflatedSegment,
            probability,
            vec![
                ("maxOccasionProbability", DebugValue::Float(self.max_occasion_probability)),
                ("segmentSize", DebugValue::Count(segment_len as u64)),
                ("segmentLocalDepth", DebugValue::Count(local_depth as u64)),
                ("mapSize", DebugValue::Count(stats.len as u64)),
                ("globalDepth", DebugValue::Count(stats.global_depth as u64)),
                ("numSegments", DebugValue::Count(stats.segment_count as u64)),
            ],
        );
        self.report(occasion);
        true
    }

    fn report(&mut self, occasion: PoorHashCodeDistributionOccasion) {
        let Some(action) = self.reporting_action.as_mut() else {
            return;
        };
        log::info!("poor hash code distribution: {}", occasion);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| action(&occasion))) {
            log::warn!(
                "poor hash code distribution reporting action panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[inline]
fn is_skewed(n: usize, minor: usize) -> bool {
    minor <= n / 3
}

/// `P(min(X, n − X) ≤ n / 3)` for `X ~ Binomial(n, 1/2)`.
fn skewed_split_probability(n: usize) -> f64 {
    if n < MIN_SKEW_SPLIT_SIZE {
        return 1.0;
    }
    let m = n / 3;
    let mut pmf = 0.5f64.powi(n as i32);
    let mut cdf = 0.0;
    for i in 0..=m {
        cdf += pmf;
        pmf = pmf * (n - i) as f64 / (i + 1) as f64;
    }
    (2.0 * cdf).min(1.0)
}

/// Natural log of the Chernoff bound on `P(X ≥ observed)` for mean `mean`.
fn ln_chernoff_upper_tail(mean: f64, observed: f64) -> f64 {
    if observed <= mean {
        0.0
    } else {
        observed - mean + observed * (mean / observed).ln()
    }
}

fn chernoff_upper_tail(mean: f64, observed: f64) -> f64 {
    ln_chernoff_upper_tail(mean, observed).exp().min(1.0)
}

fn inflated_segment_probability(map_len: usize, segment_len: usize, local_depth: u32) -> f64 {
    let depth = local_depth.max(natural_depth(map_len));
    let mean = map_len as f64 / (depth as f64).exp2();
    let ln_p = depth as f64 * core::f64::consts::LN_2
        + ln_chernoff_upper_tail(mean, segment_len as f64);
    ln_p.exp().min(1.0)
}
