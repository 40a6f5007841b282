use std::collections::HashSet;

use ahash::RandomState;
use dashmap::DashMap;

use crate::address::Address;
use crate::key::CacheKey;
use crate::options::CacheOptions;

type KeySet = HashSet<CacheKey, RandomState>;

/// Maps each address to the live keys that mention it.
///
/// A key is registered once per distinct address among its arguments, so
/// `f(x, x)` appears exactly once in the set for `x`.
pub struct ReverseIndex {
    keys_by_address: DashMap<Address, KeySet, RandomState>,
}

impl ReverseIndex {
    pub fn new(options: &CacheOptions) -> Self {
        Self {
            keys_by_address: options.build_map(),
        }
    }

    pub fn register(&self, key: &CacheKey) {
        for address in key.distinct_addresses() {
            self.keys_by_address
                .entry(address)
                .or_default()
                .insert(key.clone());
        }
    }

    /// Detaches and returns every key that mentions `address`.
    ///
    /// Each returned key is also removed from the sets of the other
    /// addresses it references, leaving no dangling registrations behind.
    pub fn take(&self, address: Address) -> Vec<CacheKey> {
        let Some((_, keys)) = self.keys_by_address.remove(&address) else {
            return Vec::new();
        };

        for key in &keys {
            for other in key.distinct_addresses() {
                if other != address {
                    self.unregister(other, key);
                }
            }
        }

        keys.into_iter().collect()
    }

    fn unregister(&self, address: Address, key: &CacheKey) {
        if let Some(mut keys) = self.keys_by_address.get_mut(&address) {
            keys.remove(key);
        }
        self.keys_by_address
            .remove_if(&address, |_, keys| keys.is_empty());
    }

    pub fn keys_for(&self, address: Address) -> usize {
        self.keys_by_address
            .get(&address)
            .map_or(0, |keys| keys.len())
    }

    pub fn contains(&self, address: Address, key: &CacheKey) -> bool {
        self.keys_by_address
            .get(&address)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Number of addresses that currently have at least one registered key.
    pub fn address_count(&self) -> usize {
        self.keys_by_address.len()
    }

    pub fn clear(&self) {
        self.keys_by_address.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: u32) -> Address {
        Address::new(raw).expect("non-zero")
    }

    #[test]
    fn repeated_arguments_register_once() {
        let index = ReverseIndex::new(&CacheOptions::default());
        let key = CacheKey::ternary("f".into(), addr(5), addr(5), addr(6));
        index.register(&key);
        index.register(&key);

        assert_eq!(index.keys_for(addr(5)), 1);
        assert_eq!(index.keys_for(addr(6)), 1);
        assert_eq!(index.address_count(), 2);
    }

    #[test]
    fn take_detaches_key_from_sibling_addresses() {
        let index = ReverseIndex::new(&CacheOptions::default());
        let shared = CacheKey::ternary("overlap".into(), addr(10), addr(20), addr(30));
        let other = CacheKey::unary("isBusy".into(), addr(30));
        index.register(&shared);
        index.register(&other);

        let taken = index.take(addr(20));
        assert_eq!(taken, vec![shared.clone()]);
        assert!(!index.contains(addr(10), &shared));
        assert!(!index.contains(addr(30), &shared));
        assert!(index.contains(addr(30), &other));
        // 10 had nothing else registered, so its empty set is dropped
        assert_eq!(index.address_count(), 1);
        assert!(index.take(addr(10)).is_empty());
    }
}
