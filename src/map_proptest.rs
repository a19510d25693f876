#![cfg(test)]

// Property tests for SmoothieMap kept inside the crate so the structural
// invariant checks of the directory and segments stay reachable.

use crate::equivalence::{DefaultEquivalence, Equivalence};
use crate::{SmoothieMap, SmoothieMapBuilder};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

// Key equivalence with a pluggable hash function over u64 keys.
#[derive(Clone, Copy)]
struct HashFn(fn(u64) -> u64);

impl Equivalence<u64> for HashFn {
    fn equivalent(&self, a: &u64, b: &u64) -> bool {
        a == b
    }
    fn hash(&self, k: &u64) -> u64 {
        (self.0)(*k)
    }
}

fn mix(k: u64) -> u64 {
    let mut z = k.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn constant(_: u64) -> u64 {
    0
}

// Only intra-segment bits vary: routing never separates keys.
fn low_bits(k: u64) -> u64 {
    k
}

// Only routing bits vary: every key shares one probe sequence.
fn high_bits(k: u64) -> u64 {
    k << 48
}

const HASH_FNS: [fn(u64) -> u64; 4] = [mix, constant, low_bits, high_bits];

#[derive(Clone, Debug)]
enum Op {
    Insert(u64, u32),
    TryInsert(u64, u32),
    Remove(u64),
    Get(u64),
    ReplaceIfEquals(u64, u32, u32),
    RemoveIfEquals(u64, u32),
    Retain(u64),
    Clear,
    Iterate,
}

fn arb_op(keys: u64) -> impl Strategy<Value = Op> {
    prop_oneof![
        30 => (0..keys, 0..4u32).prop_map(|(k, v)| Op::Insert(k, v)),
        10 => (0..keys, 0..4u32).prop_map(|(k, v)| Op::TryInsert(k, v)),
        15 => (0..keys).prop_map(Op::Remove),
        10 => (0..keys).prop_map(Op::Get),
        5 => (0..keys, 0..4u32, 0..4u32).prop_map(|(k, o, n)| Op::ReplaceIfEquals(k, o, n)),
        5 => (0..keys, 0..4u32).prop_map(|(k, v)| Op::RemoveIfEquals(k, v)),
        1 => (2..5u64).prop_map(Op::Retain),
        1 => Just(Op::Clear),
        3 => Just(Op::Iterate),
    ]
}

fn arb_scenario() -> impl Strategy<Value = (usize, usize, Vec<Op>)> {
    (0..HASH_FNS.len(), 0..3usize).prop_flat_map(|(h, r)| {
        proptest::collection::vec(arb_op(300), 1..600).prop_map(move |ops| (h, r, ops))
    })
}

const FILL_RATIOS: [f64; 3] = [1.0, 0.75, 0.4];

// Property: State-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - Every mutation agrees with the model on its return value.
// - Lookups agree with the model for present and absent keys.
// - Iteration yields each live entry exactly once.
// - After each op: len parity, directory sharing and routing invariants, and
//   every stored entry is reachable through the segment its hash routes to.
proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((h, r, ops) in arb_scenario()) {
        let mut sut: SmoothieMap<u64, u32, HashFn> = SmoothieMapBuilder::new()
            .key_equivalence(HashFn(HASH_FNS[h]))
            .max_segment_fill_ratio(FILL_RATIOS[r])
            .build()
            .unwrap();
        let mut model: HashMap<u64, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    prop_assert_eq!(sut.insert(k, v), model.insert(k, v));
                }
                Op::TryInsert(k, v) => {
                    let already = model.contains_key(&k);
                    match sut.try_insert(k, v) {
                        Ok(slot) => {
                            prop_assert!(!already);
                            prop_assert_eq!(*slot, v);
                            model.insert(k, v);
                        }
                        Err(e) => {
                            prop_assert!(already);
                            prop_assert_eq!(e.into_inner(), (k, v));
                        }
                    }
                }
                Op::Remove(k) => {
                    prop_assert_eq!(sut.remove(&k), model.remove(&k));
                }
                Op::Get(k) => {
                    prop_assert_eq!(sut.get(&k), model.get(&k));
                    prop_assert_eq!(sut.contains_key(&k), model.contains_key(&k));
                }
                Op::ReplaceIfEquals(k, old, new) => {
                    let expect = model.get(&k) == Some(&old);
                    prop_assert_eq!(sut.replace_if_equals(&k, &old, new), expect);
                    if expect {
                        model.insert(k, new);
                    }
                }
                Op::RemoveIfEquals(k, v) => {
                    let expect = model.get(&k) == Some(&v);
                    prop_assert_eq!(sut.remove_if_equals(&k, &v), expect);
                    if expect {
                        model.remove(&k);
                    }
                }
                Op::Retain(m) => {
                    sut.retain(|k, _| k % m != 0);
                    model.retain(|k, _| k % m != 0);
                }
                Op::Clear => {
                    sut.clear();
                    model.clear();
                }
                Op::Iterate => {
                    let s: BTreeMap<u64, u32> = sut.iter().map(|(k, v)| (*k, *v)).collect();
                    let m: BTreeMap<u64, u32> = model.iter().map(|(k, v)| (*k, *v)).collect();
                    prop_assert_eq!(sut.iter().count(), sut.len());
                    prop_assert_eq!(s, m);
                }
            }

            prop_assert_eq!(sut.len(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
            sut.check_invariants();
        }
    }
}

// Property: removing every key after arbitrary insertions collapses the
// directory to a single segment, whatever the hash function.
proptest! {
    #![proptest_config(ProptestConfig { cases: 24, .. ProptestConfig::default() })]
    #[test]
    fn prop_drain_collapses_directory(
        h in 0..HASH_FNS.len(),
        keys in proptest::collection::hash_set(0..10_000u64, 0..800),
    ) {
        let mut sut: SmoothieMap<u64, u64, HashFn> = SmoothieMapBuilder::new()
            .key_equivalence(HashFn(HASH_FNS[h]))
            .build()
            .unwrap();
        for &k in &keys {
            sut.insert(k, k);
        }
        sut.check_invariants();
        for &k in &keys {
            prop_assert_eq!(sut.remove(&k), Some(k));
        }
        sut.check_invariants();
        prop_assert!(sut.is_empty());
        prop_assert_eq!(sut.segment_count(), 1);
        prop_assert_eq!(sut.global_depth(), 0);
        prop_assert_eq!(sut.inflated_segment_count(), 0);
    }
}

// Property: maps with the same entries compare equal and share an aggregate
// hash code regardless of insertion order and structural history.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_equality_ignores_history(
        entries in proptest::collection::hash_map(0..5_000u64, any::<u32>(), 0..400),
        extra in proptest::collection::vec(5_000..6_000u64, 0..200),
    ) {
        let ke: DefaultEquivalence = DefaultEquivalence::default();
        let ve: DefaultEquivalence = DefaultEquivalence::default();
        let build = || SmoothieMapBuilder::<u64, u32>::new()
            .key_equivalence(ke.clone())
            .value_equivalence(ve.clone())
            .build()
            .unwrap();
        let mut a = build();
        let mut b = build();
        for (&k, &v) in &entries {
            a.insert(k, v);
        }
        // b goes through extra splits and merges.
        for &k in &extra {
            b.insert(k, 0);
        }
        let mut sorted: Vec<_> = entries.iter().collect();
        sorted.sort();
        for (&k, &v) in sorted.into_iter().rev() {
            b.insert(k, v);
        }
        for &k in &extra {
            b.remove(&k);
        }
        b.check_invariants();
        prop_assert!(a == b);
        prop_assert_eq!(a.aggregate_hash_code(), b.aggregate_hash_code());
    }
}
