use thiserror::Error;

/// Errors reported by `SmoothieMapBuilder::build`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// A builder created with `custom()` was never given a key equivalence.
    #[error("no key equivalence strategy configured")]
    MissingKeyEquivalence,

    /// A builder created with `custom()` was never given a value equivalence.
    #[error("no value equivalence strategy configured")]
    MissingValueEquivalence,

    /// The maximum occasion probability must lie in `(0, 1]`.
    #[error("max occasion probability must be in (0, 1], got {0}")]
    InvalidOccasionProbability(f64),

    /// The maximum segment fill ratio must lie in `(0, 1]`.
    #[error("max segment fill ratio must be in (0, 1], got {0}")]
    InvalidFillRatio(f64),
}

/// Returned by `SmoothieMap::try_insert`; hands the rejected pair back.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InsertError<K, V> {
    #[error("an equivalent key is already present")]
    DuplicateKey { key: K, value: V },
}

impl<K, V> InsertError<K, V> {
    pub fn into_inner(self) -> (K, V) {
        match self {
            InsertError::DuplicateKey { key, value } => (key, value),
        }
    }
}
