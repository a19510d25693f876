// SmoothieMap public API test suite.
//
// Each test documents what behavior is being verified and which
// invariants are assumed or asserted. The core invariants exercised:
// - Uniqueness: at most one entry per equivalence class of keys.
// - Put/get/remove agree with a plain HashMap for any sequence.
// - Growth: splits never lose entries; many segments are used as the map
//   grows, and the directory shrinks back as it empties.
// - Borrowed lookups: `String` keys are queried with `&str`.
// - Thread safety: the map is usable behind an RwLock from many threads.
use smoothie_map::{Equivalence, InsertError, SmoothieMap, SmoothieMapBuilder};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

// Test: basic put/get/remove with borrowed lookup.
// Verifies: put returns the previous value; remove returns the value once.
#[test]
fn put_get_remove() {
    let mut m = SmoothieMap::new();
    assert!(m.is_empty());
    assert_eq!(m.insert("alpha".to_string(), 1), None);
    assert_eq!(m.insert("beta".to_string(), 2), None);
    assert_eq!(m.insert("alpha".to_string(), 3), Some(1));
    assert_eq!(m.len(), 2);
    assert_eq!(m.get("alpha"), Some(&3));
    assert!(m.contains_key("beta"));
    assert!(!m.contains_key("gamma"));
    assert_eq!(m.get_key_value("beta"), Some((&"beta".to_string(), &2)));

    assert_eq!(m.remove("alpha"), Some(3));
    assert_eq!(m.remove("alpha"), None);
    assert_eq!(m.len(), 1);
}

// Test: absent keys on an empty map.
// Verifies: get/remove on absent keys are no-ops.
#[test]
fn empty_map_lookups() {
    let mut m: SmoothieMap<u64, u64> = SmoothieMap::default();
    assert_eq!(m.get(&1), None);
    assert_eq!(m.remove(&1), None);
    assert_eq!(m.replace(&1, 5), None);
    assert!(m.is_empty());
    assert_eq!(m.segment_count(), 1);
    assert_eq!(m.global_depth(), 0);
}

// Test: a large workload split across many segments, checked against a
// HashMap model.
// Verifies: every present key maps to its last put value; absent keys miss.
#[test]
fn large_workload_matches_model() {
    let mut m = SmoothieMap::new();
    let mut model = HashMap::new();
    for (i, x) in lcg(3).take(200_000).enumerate() {
        let k = x % 150_000;
        assert_eq!(m.insert(k, i), model.insert(k, i));
        if i % 7 == 0 {
            let r = (x >> 17) % 150_000;
            assert_eq!(m.remove(&r), model.remove(&r));
        }
    }
    assert_eq!(m.len(), model.len());
    for (k, v) in &model {
        assert_eq!(m.get(k), Some(v));
    }
    for k in 150_000..151_000u64 {
        assert_eq!(m.get(&k), None);
    }
    assert!(m.segment_count() > model.len() / 48);
    assert_eq!(m.inflated_segment_count(), 0);
}

// Test: try_insert and get_or_insert_with.
// Verifies: duplicates come back intact; the default runs only when absent.
#[test]
fn conditional_inserts() {
    let mut m = SmoothieMap::new();
    assert_eq!(*m.try_insert("k", 1).unwrap(), 1);
    match m.try_insert("k", 2) {
        Err(InsertError::DuplicateKey { key, value }) => assert_eq!((key, value), ("k", 2)),
        Ok(_) => panic!("expected duplicate"),
    }
    let mut calls = 0;
    *m.get_or_insert_with("n", || {
        calls += 1;
        10
    }) += 1;
    let v = *m.get_or_insert_with("n", || {
        calls += 1;
        0
    });
    assert_eq!(v, 11);
    assert_eq!(calls, 1);
}

// Test: replace only affects present keys.
#[test]
fn replace_and_conditional_variants() {
    let mut m = SmoothieMap::new();
    assert_eq!(m.replace(&1, 1), None);
    assert!(!m.contains_key(&1));
    m.insert(1, 10);
    assert_eq!(m.replace(&1, 11), Some(10));
    assert!(!m.replace_if_equals(&1, &10, 12));
    assert!(m.replace_if_equals(&1, &11, 12));
    assert_eq!(m.get(&1), Some(&12));
    assert!(!m.remove_if_equals(&1, &11));
    assert!(m.contains_value(&12));
    assert!(m.remove_if_equals(&1, &12));
    assert!(m.is_empty());
    assert!(!m.contains_value(&12));
}

// Test: for_each_entry and iteration agree with the contents.
#[test]
fn traversal_visits_everything() {
    let m: SmoothieMap<u32, u32> = (0..10_000).map(|i| (i, i + 1)).collect();
    let mut seen = 0u64;
    let mut sum = 0u64;
    m.for_each_entry(|k, v| {
        assert_eq!(*v, k + 1);
        seen += 1;
        sum += *k as u64;
    });
    assert_eq!(seen, 10_000);
    assert_eq!(sum, (0..10_000u64).sum());
    assert_eq!(m.iter().len(), 10_000);
    assert_eq!(m.keys().count(), 10_000);
}

// Test: removing all entries shrinks the structure.
// Verifies: buddy merges and directory shrink bring the map back to its
// initial shape.
#[test]
fn structure_shrinks_after_removals() {
    let mut m = SmoothieMap::new();
    let keys: Vec<u64> = lcg(5).take(20_000).collect();
    for &k in &keys {
        m.insert(k, ());
    }
    let peak_segments = m.segment_count();
    let peak_bytes = m.footprint_in_bytes();
    assert!(m.global_depth() > 5);
    for &k in &keys {
        assert_eq!(m.remove(&k), Some(()));
    }
    assert!(m.is_empty());
    assert_eq!(m.segment_count(), 1);
    assert_eq!(m.global_depth(), 0);
    assert!(m.segment_count() < peak_segments);
    assert!(m.footprint_in_bytes() < peak_bytes);
}

// Test: a lower max segment fill ratio trades memory for shorter probes.
// Verifies: more segments for the same entries, same contents.
#[test]
fn fill_ratio_increases_segment_count() {
    let keys: Vec<u64> = lcg(9).take(20_000).collect();
    let mut dense = SmoothieMap::new();
    let mut sparse = SmoothieMap::<u64, u64>::builder()
        .max_segment_fill_ratio(0.5)
        .build()
        .unwrap();
    for &k in &keys {
        dense.insert(k, k);
        sparse.insert(k, k);
    }
    assert!(sparse.segment_count() > dense.segment_count());
    assert!(keys.iter().all(|k| sparse.get(k) == Some(k)));
}

// Test: Debug formatting and equality.
#[test]
fn debug_and_equality() {
    let mut a: SmoothieMap<i32, &str> = SmoothieMap::new();
    a.insert(1, "one");
    assert_eq!(format!("{:?}", a), "{1: \"one\"}");
    let mut b = SmoothieMap::<i32, &str>::builder()
        .key_equivalence(a.key_equivalence().clone())
        .value_equivalence(a.value_equivalence().clone())
        .build()
        .unwrap();
    assert_ne!(a, b);
    b.insert(1, "one");
    assert_eq!(a, b);
}

#[derive(Clone, Copy, Default)]
struct Identity;

impl Equivalence<u64> for Identity {
    fn equivalent(&self, a: &u64, b: &u64) -> bool {
        a == b
    }
    fn hash(&self, k: &u64) -> u64 {
        *k
    }
}

fn identity_inserts(n: u64) -> Duration {
    let mut m: SmoothieMap<u64, u64, Identity> = SmoothieMapBuilder::new()
        .key_equivalence(Identity)
        .build()
        .unwrap();
    let start = Instant::now();
    for k in 0..n {
        m.insert(k, k);
    }
    let elapsed = start.elapsed();
    assert_eq!(m.len() as u64, n);
    assert_eq!(m.inflated_segment_count(), 1);
    elapsed
}

// Test: small sequential keys hashed by identity all share their routing
// bits and pile into one inflated segment.
// Verifies: inserts stay amortized constant time; quadrupling the key count
// costs far less than the sixteenfold a per-insert scan would.
#[test]
fn inflated_segment_inserts_scale_linearly() {
    let small = (0..3).map(|_| identity_inserts(50_000)).min().unwrap();
    let large = (0..3).map(|_| identity_inserts(200_000)).min().unwrap();
    assert!(
        large < small * 10,
        "50k inserts took {:?}, 200k took {:?}",
        small,
        large
    );
}

// Test: concurrent readers behind an RwLock with a single writer.
// Assumes: SmoothieMap is Send + Sync.
// Verifies: readers always observe a consistent map while the writer
// triggers splits.
#[test]
fn concurrent_readers_with_rwlock() {
    let map = Arc::new(RwLock::new(SmoothieMap::new()));
    {
        let mut w = map.write().unwrap();
        for k in 0..1_000u64 {
            w.insert(k, k);
        }
    }
    let writer = {
        let map = map.clone();
        thread::spawn(move || {
            for k in 1_000..20_000u64 {
                map.write().unwrap().insert(k, k);
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let map = map.clone();
            thread::spawn(move || {
                for round in 0..200u64 {
                    let r = map.read().unwrap();
                    for k in (round % 10..1_000).step_by(10) {
                        assert_eq!(r.get(&k), Some(&k));
                    }
                    assert_eq!(r.iter().count(), r.len());
                }
            })
        })
        .collect();
    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(map.read().unwrap().len(), 20_000);
}
