//! Pluggable equality and hashing.
//!
//! The map never compares or hashes keys (or values) directly: every such
//! operation goes through an `Equivalence`. Strategies are selected once, at
//! construction, as type parameters of `SmoothieMap`, so dispatch is a direct,
//! monomorphized call.
//!
//! Hash codes are read from both ends (see `layout`): a strategy should spread
//! entropy over all 64 bits. Strategies that do not are exactly what the
//! poor hash code distribution reporting is meant to catch.

use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;

/// Equality and hashing for values of type `T`.
///
/// Implementations must be consistent: `equivalent(a, b)` implies
/// `hash(a) == hash(b)`. When a map is queried with a borrowed form `Q` of its
/// keys (`K: Borrow<Q>`), the strategy must also agree between `Q` and the
/// borrowed key, as with `std::collections::HashMap`.
pub trait Equivalence<T: ?Sized> {
    /// Whether `query` and `stored` denote the same mapping.
    fn equivalent(&self, query: &T, stored: &T) -> bool;

    /// Full 64-bit hash code of `value`.
    fn hash(&self, value: &T) -> u64;
}

/// `Eq` equality and `Hash` hashing through a `BuildHasher`.
#[derive(Clone, Debug, Default)]
pub struct DefaultEquivalence<S = RandomState> {
    hasher: S,
}

impl<S> DefaultEquivalence<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }
}

impl<T, S> Equivalence<T> for DefaultEquivalence<S>
where
    T: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    #[inline]
    fn equivalent(&self, query: &T, stored: &T) -> bool {
        query == stored
    }

    #[inline]
    fn hash(&self, value: &T) -> u64 {
        self.hasher.hash_one(value)
    }
}

impl<T: ?Sized, E: Equivalence<T> + ?Sized> Equivalence<T> for &E {
    #[inline]
    fn equivalent(&self, query: &T, stored: &T) -> bool {
        (**self).equivalent(query, stored)
    }

    #[inline]
    fn hash(&self, value: &T) -> u64 {
        (**self).hash(value)
    }
}

impl<T: ?Sized, E: Equivalence<T> + ?Sized> Equivalence<T> for std::sync::Arc<E> {
    #[inline]
    fn equivalent(&self, query: &T, stored: &T) -> bool {
        (**self).equivalent(query, stored)
    }

    #[inline]
    fn hash(&self, value: &T) -> u64 {
        (**self).hash(value)
    }
}
