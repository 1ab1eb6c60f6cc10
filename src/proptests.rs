use super::*;

use crate::cint::leaf_estimate;
use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

/// Structural checks for whatever representation `a` is in.
fn validate_array<V>(a: &Array<V>) {
    match &a.repr {
        Repr::Null => {}
        Repr::Cint(c) => {
            assert!(c.integer_len() > 0, "drained HAT array must be promoted");
            c.validate();
        }
        Repr::Int(i) => {
            assert!(i.integer_len() > 0, "drained hash array must be promoted");
            i.validate();
        }
        Repr::Str(s) => assert!(!s.is_empty(), "empty string array must reset"),
    }
}

fn contents(a: &Array<u64>) -> BTreeMap<String, u64> {
    a.iter(Order::Ascending)
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        6 => (0u32..3000).prop_map(|k| k.to_string()),
        2 => (0..=i32::MAX).prop_map(|k| k.to_string()),
        1 => (-50i32..0).prop_map(|k| k.to_string()),
        2 => "[a-z]{1,3}",
        1 => prop::sample::select(vec!["03", "+3", "-0", "1.5", ""]).prop_map(String::from),
    ]
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 50)]
    Insert(#[proptest(strategy = "key_strategy()")] String, u64),
    #[proptest(weight = 25)]
    Remove(#[proptest(strategy = "key_strategy()")] String),
    #[proptest(weight = 24)]
    Get(#[proptest(strategy = "key_strategy()")] String),
    #[proptest(weight = 1)]
    Clear,
}

fn config_strategy() -> impl Strategy<Value = ArrayConfig> {
    (2u32..=12, 1usize..=3, any::<bool>()).prop_map(|(nhat, chain_max, hashed)| {
        let backend = if hashed {
            IntegerBackend::Hashed
        } else {
            IntegerBackend::Hat
        };
        ArrayConfig::new(nhat, chain_max)
            .expect("strategy stays in range")
            .with_integer_backend(backend)
    })
}

fn run_against_model(config: ArrayConfig, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut a: Array<u64> = Array::with_config(config);
    let mut m: BTreeMap<String, u64> = BTreeMap::new();

    for (i, op) in ops.into_iter().enumerate() {
        match op {
            Op::Insert(key, value) => {
                let old_a = a.insert(&key, value);
                let old_m = m.insert(key, value);
                prop_assert_eq!(old_a, old_m);
            }
            Op::Remove(key) => {
                prop_assert_eq!(a.remove(&key), m.remove(&key));
            }
            Op::Get(key) => {
                prop_assert_eq!(a.get(&key).copied(), m.get(&key).copied());
            }
            Op::Clear => {
                a.clear();
                m.clear();
            }
        }
        prop_assert_eq!(a.len(), m.len());
        // Wide HAT roots make a full walk costly; sample it.
        if i % 64 == 0 {
            validate_array(&a);
        }
    }

    validate_array(&a);
    prop_assert_eq!(contents(&a), m);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_default(ops in prop::collection::vec(any::<Op>(), 0..=2000)) {
        run_against_model(ArrayConfig::default(), ops)?;
    }

    #[test]
    fn prop_equivalence_any_config(
        config in config_strategy(),
        ops in prop::collection::vec(any::<Op>(), 0..=1000),
    ) {
        run_against_model(config, ops)?;
    }

    /// Every key the tree accepts passed the waste gate, and with inserts only the
    /// unused slots never exceed the threshold by more than one leaf.
    #[test]
    fn prop_capacity_gate(
        nhat in 2u32..=10,
        keys in prop::collection::vec(0..=i32::MAX, 0..=500),
    ) {
        let config = ArrayConfig::new(nhat, 2).expect("valid");
        let mut c: CintArray<u64> = CintArray::new(&config);
        let bound = c.threshold() + (1 << nhat);

        for k in keys {
            let k = k as u32;
            let (capacity, count) = (c.capacity(), c.integer_len());
            *c.lookup(Subscript::from(k)) = u64::from(k);

            if c.integer_len() > count {
                let m = cint::bucket_of(k, nhat) as u32 - 1;
                prop_assert!(capacity + leaf_estimate(m, nhat) - count <= c.threshold());
            }
            prop_assert!(c.capacity() - c.integer_len() <= bound);
            prop_assert_eq!(c.exists(Subscript::from(k)), Some(&u64::from(k)));
        }
        c.validate();
    }

    /// Insert/remove churn never leaves hollow chain heads or stale counts.
    #[test]
    fn prop_hash_chains(
        ops in prop::collection::vec((any::<bool>(), -200i32..200), 0..=1000),
    ) {
        let config = ArrayConfig::new(10, 1).expect("valid");
        let mut t: IntArray<u64> = IntArray::new(&config);
        let mut m: BTreeMap<i32, u64> = BTreeMap::new();

        for (insert, k) in ops {
            if insert {
                *t.lookup(Subscript::from(k)) = k.unsigned_abs().into();
                m.insert(k, k.unsigned_abs().into());
            } else {
                prop_assert_eq!(t.remove(Subscript::from(k)), m.remove(&k));
            }
            t.validate();
        }
        prop_assert_eq!(t.len(), m.len());
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(
        items: &[T],
        used: &mut [bool],
        out: &mut Vec<T>,
        f: &mut impl FnMut(Vec<T>),
    ) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

const MIXED_KEYS: [&str; 6] = ["0", "1", "1024", "-1", "a", "1048576"];

#[test]
fn exhaustive_insert_order_small_set() {
    for_each_permutation(&MIXED_KEYS, |perm| {
        let mut a: Array<u64> = Array::with_config(ArrayConfig::default());
        let mut m: BTreeMap<String, u64> = BTreeMap::new();

        for (i, k) in perm.iter().enumerate() {
            let v = i as u64;
            assert_eq!(a.insert(*k, v), m.insert(k.to_string(), v));
            validate_array(&a);
        }
        assert_eq!(contents(&a), m);
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let mut base: Array<u64> = Array::with_config(ArrayConfig::default());
    for (i, k) in MIXED_KEYS.iter().enumerate() {
        *base.lookup(*k) = i as u64;
    }
    assert_eq!(base.kind(), ArrayKind::Cint);

    for_each_permutation(&MIXED_KEYS, |perm| {
        let mut a = base.clone();
        let mut left = MIXED_KEYS.len();

        for k in perm {
            assert!(a.remove(k).is_some(), "lost {k}");
            left -= 1;
            assert_eq!(a.len(), left);
            validate_array(&a);
        }
        assert_eq!(a.kind(), ArrayKind::Null);
    });
}
