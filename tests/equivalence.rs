// Custom key and value equivalence tests.
//
// The map never compares or hashes keys and values itself; these tests
// plug in strategies that disagree with `Eq`/`Hash` and check that every
// operation follows the strategy:
// - Keys equal ignoring ASCII case collapse into one entry.
// - Borrowed lookups go through the strategy's `str` implementation.
// - Conditional replace/remove and `contains_value` use the value strategy.
// - Map equality and the aggregate hash code use both strategies.
// - Strategies can be shared by reference or through an Arc.
use smoothie_map::{BuildError, Equivalence, SmoothieMap, SmoothieMapBuilder};
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::Arc;

#[derive(Clone, Default)]
struct IgnoreAsciiCase(RandomState);

impl Equivalence<str> for IgnoreAsciiCase {
    fn equivalent(&self, a: &str, b: &str) -> bool {
        a.eq_ignore_ascii_case(b)
    }
    fn hash(&self, s: &str) -> u64 {
        self.0.hash_one(s.to_ascii_lowercase())
    }
}

impl Equivalence<String> for IgnoreAsciiCase {
    fn equivalent(&self, a: &String, b: &String) -> bool {
        Equivalence::<str>::equivalent(self, a, b)
    }
    fn hash(&self, s: &String) -> u64 {
        Equivalence::<str>::hash(self, s)
    }
}

type CaseMap = SmoothieMap<String, String, IgnoreAsciiCase, IgnoreAsciiCase>;

fn case_map(strategy: &IgnoreAsciiCase) -> CaseMap {
    SmoothieMapBuilder::<String, String, IgnoreAsciiCase, IgnoreAsciiCase>::custom()
        .key_equivalence(strategy.clone())
        .value_equivalence(strategy.clone())
        .build()
        .unwrap()
}

// Test: keys differing only in case are one key.
// Verifies: the first stored key is kept, the value is replaced.
#[test]
fn case_insensitive_keys_collapse() {
    let mut m = case_map(&IgnoreAsciiCase::default());
    assert_eq!(m.insert("Key".to_string(), "a".to_string()), None);
    assert_eq!(m.insert("KEY".to_string(), "b".to_string()), Some("a".to_string()));
    assert_eq!(m.len(), 1);
    assert_eq!(m.get("key"), Some(&"b".to_string()));
    let (k, _) = m.get_key_value("kEy").unwrap();
    assert_eq!(k, "Key");
    assert!(m.try_insert("kEY".to_string(), "c".to_string()).is_err());
    assert_eq!(m.remove("KeY"), Some("b".to_string()));
    assert!(m.is_empty());
}

// Test: value equivalence drives conditional operations.
#[test]
fn value_equivalence_drives_conditional_ops() {
    let mut m = case_map(&IgnoreAsciiCase::default());
    m.insert("k".to_string(), "Value".to_string());
    assert!(m.contains_value(&"VALUE".to_string()));
    assert!(!m.contains_value(&"other".to_string()));
    assert!(m.replace_if_equals("K", &"value".to_string(), "next".to_string()));
    assert_eq!(m.get("k").map(String::as_str), Some("next"));
    assert!(!m.replace_if_equals("k", &"value".to_string(), "x".to_string()));
    assert!(!m.remove_if_equals("k", &"nope".to_string()));
    assert!(m.remove_if_equals("k", &"NEXT".to_string()));
    assert!(m.is_empty());
}

// Test: many keys through a custom strategy across splits.
// Verifies: every case variant finds the entry after the map has grown.
#[test]
fn case_insensitive_lookup_after_growth() {
    let mut m = case_map(&IgnoreAsciiCase::default());
    for i in 0..5_000 {
        m.insert(format!("key-{}", i), format!("v{}", i));
    }
    assert!(m.segment_count() > 1);
    for i in (0..5_000).step_by(7) {
        assert_eq!(m.get(&format!("KEY-{}", i)), Some(&format!("v{}", i)));
    }
    for i in 0..5_000 {
        m.insert(format!("KEY-{}", i), format!("w{}", i));
    }
    assert_eq!(m.len(), 5_000);
}

// Test: equality and aggregate hash code follow the strategies.
#[test]
fn equality_uses_strategies() {
    let strategy = IgnoreAsciiCase::default();
    let mut a = case_map(&strategy);
    let mut b = case_map(&strategy);
    a.insert("Alpha".to_string(), "One".to_string());
    a.insert("beta".to_string(), "two".to_string());
    b.insert("BETA".to_string(), "TWO".to_string());
    b.insert("alpha".to_string(), "one".to_string());
    assert_eq!(a, b);
    assert_eq!(a.aggregate_hash_code(), b.aggregate_hash_code());
    b.insert("gamma".to_string(), "three".to_string());
    assert_ne!(a, b);
}

// Test: strategies shared by reference and through Arc.
#[test]
fn shared_strategies() {
    let strategy = IgnoreAsciiCase::default();
    let mut by_ref: SmoothieMap<String, u32, &IgnoreAsciiCase> = SmoothieMapBuilder::new()
        .key_equivalence(&strategy)
        .build()
        .unwrap();
    by_ref.insert("A".to_string(), 1);
    assert_eq!(by_ref.get("a"), Some(&1));

    let shared = Arc::new(strategy.clone());
    let mut by_arc: SmoothieMap<String, u32, Arc<IgnoreAsciiCase>> = SmoothieMapBuilder::new()
        .key_equivalence(shared.clone())
        .build()
        .unwrap();
    by_arc.insert("B".to_string(), 2);
    assert_eq!(by_arc.get("b"), Some(&2));
    assert_eq!(Arc::strong_count(&shared), 2);
}

// Test: a custom builder without strategies is rejected.
#[test]
fn missing_strategies_rejected() {
    let err = SmoothieMapBuilder::<String, String, IgnoreAsciiCase, IgnoreAsciiCase>::custom()
        .key_equivalence(IgnoreAsciiCase::default())
        .build()
        .unwrap_err();
    assert_eq!(err, BuildError::MissingValueEquivalence);
    assert_eq!(
        err.to_string(),
        "no value equivalence strategy configured"
    );
}
