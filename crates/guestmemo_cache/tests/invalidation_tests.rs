use std::collections::HashMap;

use guestmemo_cache::{Address, CacheKey, FunctionCache, FunctionName};
use proptest::prelude::*;

const FUNCTIONS: [&str; 3] = ["isBusy", "sameTeam", "overlap"];

fn addr(raw: u32) -> Address {
    Address::new(raw).expect("generated addresses are non-zero")
}

fn put_strategy() -> impl Strategy<Value = (usize, Vec<u32>, bool)> {
    (0..FUNCTIONS.len(), prop::collection::vec(1u32..=8, 1..=5), any::<bool>())
}

proptest! {
    #[test]
    fn invalidate_removes_exactly_the_referencing_keys(
        puts in prop::collection::vec(put_strategy(), 1..40),
        target in 1u32..=8,
    ) {
        let cache = FunctionCache::new();
        let mut model: HashMap<CacheKey, bool> = HashMap::new();

        for (function, args, value) in &puts {
            let args: Vec<Address> = args.iter().copied().map(addr).collect();
            let key = CacheKey::from_args(FunctionName::from(FUNCTIONS[*function]), &args)
                .expect("arity 1..=5");
            cache.put_bool(key.clone(), *value);
            model.insert(key, *value);
        }

        let target = addr(target);
        let expected_removed = model.keys().filter(|key| key.references(target)).count();
        prop_assert_eq!(cache.invalidate(target), expected_removed);

        for (key, value) in &model {
            if key.references(target) {
                prop_assert_eq!(cache.get_bool(key), None);
            } else {
                prop_assert_eq!(cache.get_bool(key), Some(*value));
            }
        }

        prop_assert_eq!(cache.references_to(target), 0);
        for raw in 1u32..=8 {
            let address = addr(raw);
            let live = model
                .keys()
                .filter(|key| key.references(address) && !key.references(target))
                .count();
            prop_assert_eq!(cache.references_to(address), live);
        }
    }

    #[test]
    fn put_then_get_returns_the_stored_value(
        args in prop::collection::vec(1u32..=1_000, 1..=5),
        value in any::<i32>(),
    ) {
        let cache = FunctionCache::new();
        let args: Vec<Address> = args.into_iter().map(addr).collect();
        let key = CacheKey::from_args("weight".into(), &args).expect("arity 1..=5");

        prop_assert_eq!(cache.get_int(&key), None);
        cache.put_int(key.clone(), value);
        prop_assert_eq!(cache.get_int(&key), Some(value));
    }
}

#[test]
fn version_strictly_increases_across_invalidate_and_clear() {
    let cache = FunctionCache::new();
    let mut last = cache.version();
    for raw in 1..=20u32 {
        if raw % 5 == 0 {
            cache.clear();
        } else {
            cache.invalidate(addr(raw));
        }
        let now = cache.version();
        assert!(now > last, "version went from {last} to {now}");
        last = now;
    }
}

#[test]
fn clear_drops_results_of_every_arity_and_type() {
    let cache = FunctionCache::new();
    let f = FunctionName::from("f");
    let (a, b, c, d, e) = (addr(1), addr(2), addr(3), addr(4), addr(5));

    cache.put_bool1(&f, a, true);
    cache.put_bool2(&f, a, b, true);
    cache.put_bool3(&f, a, b, c, true);
    cache.put_bool4(&f, a, b, c, d, true);
    cache.put_bool5(&f, a, b, c, d, e, true);
    cache.put_int1(&f, a, 1);
    cache.put_int5(&f, a, b, c, d, e, 5);
    cache.put_long1(&f, a, 1);
    cache.put_long4(&f, a, b, c, d, 4);
    assert_eq!(cache.stats().total_entries(), 9);

    cache.clear();

    let stats = cache.stats();
    assert_eq!(stats.bool_entries, 0);
    assert_eq!(stats.int_entries, 0);
    assert_eq!(stats.long_entries, 0);
    assert_eq!(cache.get_bool5(&f, a, b, c, d, e), None);
    assert_eq!(cache.get_long4(&f, a, b, c, d), None);
}
