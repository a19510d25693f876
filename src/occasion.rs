//! Poor hash code distribution occasions delivered to the reporting callback.

use core::fmt;
use std::collections::BTreeMap;

/// Kind of anomaly detected in the distribution of hash codes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OccasionType {
    /// An inflated segment grew far beyond what uniformly distributed hash
    /// codes would place under one routing prefix.
    TooLargeInflatedSegment,
    /// Segment splits were unbalanced much more often than uniformly
    /// distributed hash codes would make them.
    TooManySkewedSegmentSplits,
}

impl fmt::Display for OccasionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OccasionType::TooLargeInflatedSegment => "TOO_LARGE_INFLATED_SEGMENT",
            OccasionType::TooManySkewedSegmentSplits => "TOO_MANY_SKEWED_SEGMENT_SPLITS",
        })
    }
}

/// A value in the debug information snapshot of an occasion.
#[derive(Clone, Debug, PartialEq)]
pub enum DebugValue {
    Float(f64),
    Count(u64),
}

impl DebugValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            DebugValue::Float(x) => x,
            DebugValue::Count(n) => n as f64,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            DebugValue::Count(n) => Some(n),
            DebugValue::Float(_) => None,
        }
    }
}

impl fmt::Display for DebugValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugValue::Float(x) => write!(f, "{:e}", x),
            DebugValue::Count(n) => write!(f, "{}", n),
        }
    }
}

/// One detected anomaly: its type, how likely it would be under uniformly
/// distributed hash codes, and a snapshot of the counters that led to it.
///
/// Occasions are created at detection time, passed to the reporting callback
/// and dropped; the map keeps no history of them.
#[derive(Clone, Debug)]
pub struct PoorHashCodeDistributionOccasion {
    occasion_type: OccasionType,
    occasion_probability: f64,
    counters: Vec<(&'static str, DebugValue)>,
}

impl PoorHashCodeDistributionOccasion {
    pub(crate) fn new(
        occasion_type: OccasionType,
        occasion_probability: f64,
        counters: Vec<(&'static str, DebugValue)>,
    ) -> Self {
        Self {
            occasion_type,
            occasion_probability,
            counters,
        }
    }

    pub fn occasion_type(&self) -> OccasionType {
        self.occasion_type
    }

    /// Estimated probability of this occasion under uniformly distributed
    /// hash codes at the observed scale. An upper bound: the true probability
    /// is at most this value.
    pub fn occasion_probability(&self) -> f64 {
        self.occasion_probability
    }

    /// Debug information keyed by name. Always contains
    /// `"occasionProbability"`.
    pub fn assemble_debug_information(&self) -> BTreeMap<&'static str, DebugValue> {
        let mut info: BTreeMap<&'static str, DebugValue> = self.counters.iter().cloned().collect();
        info.insert(
            "occasionProbability",
            DebugValue::Float(self.occasion_probability),
        );
        info
    }
}

impl fmt::Display for PoorHashCodeDistributionOccasion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.occasion_type)?;
        for (k, v) in self.assemble_debug_information() {
            write!(f, " {}={}", k, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_information_always_has_probability() {
        let o = PoorHashCodeDistributionOccasion::new(
            OccasionType::TooLargeInflatedSegment,
            1e-9,
            vec![("segmentSize", DebugValue::Count(120))],
        );
        let info = o.assemble_debug_information();
        assert_eq!(info["occasionProbability"], DebugValue::Float(1e-9));
        assert_eq!(info["segmentSize"].as_u64(), Some(120));
        assert_eq!(o.occasion_type(), OccasionType::TooLargeInflatedSegment);
        let text = o.to_string();
        assert!(text.starts_with("TOO_LARGE_INFLATED_SEGMENT"));
        assert!(text.contains("segmentSize=120"));
    }
}
