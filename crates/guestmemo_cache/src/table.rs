use ahash::RandomState;
use dashmap::DashMap;

use crate::key::CacheKey;
use crate::options::CacheOptions;

/// Concurrent result storage for one result type, one map per arity.
///
/// `ARITIES` caps the supported key shapes: a table built with
/// `ARITIES = 4` has no quinary slot, so quinary keys are neither stored nor
/// found.
pub struct ResultTable<V, const ARITIES: usize> {
    by_arity: [DashMap<CacheKey, V, RandomState>; ARITIES],
}

impl<V: Copy, const ARITIES: usize> ResultTable<V, ARITIES> {
    pub fn new(options: &CacheOptions) -> Self {
        Self {
            by_arity: std::array::from_fn(|_| options.build_map()),
        }
    }

    fn slot(&self, key: &CacheKey) -> Option<&DashMap<CacheKey, V, RandomState>> {
        self.by_arity.get(key.arity().index())
    }

    pub fn supports(&self, key: &CacheKey) -> bool {
        key.arity().index() < ARITIES
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.slot(key)?.get(key).map(|entry| *entry.value())
    }

    /// Stores `value`, returning `false` when the key's arity has no slot.
    pub fn insert(&self, key: CacheKey, value: V) -> bool {
        match self.slot(&key) {
            Some(map) => {
                map.insert(key, value);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &CacheKey) -> Option<V> {
        self.slot(key)?.remove(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.by_arity.iter().map(DashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_arity.iter().all(DashMap::is_empty)
    }

    pub fn clear(&self) {
        for map in &self.by_arity {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn addr(raw: u32) -> Address {
        Address::new(raw).expect("non-zero")
    }

    #[test]
    fn keys_are_partitioned_by_arity() {
        let table: ResultTable<bool, 5> = ResultTable::new(&CacheOptions::default());
        let unary = CacheKey::unary("f".into(), addr(1));
        let binary = CacheKey::binary("f".into(), addr(1), addr(1));
        table.insert(unary.clone(), true);
        table.insert(binary.clone(), false);

        assert_eq!(table.get(&unary), Some(true));
        assert_eq!(table.get(&binary), Some(false));
        assert_eq!(table.len(), 2);

        assert_eq!(table.remove(&unary), Some(true));
        assert_eq!(table.get(&binary), Some(false));
    }

    #[test]
    fn narrow_tables_reject_wider_keys() {
        let table: ResultTable<i64, 4> = ResultTable::new(&CacheOptions::default());
        let quinary =
            CacheKey::quinary("sum".into(), addr(1), addr(2), addr(3), addr(4), addr(5));
        assert!(!table.supports(&quinary));
        assert!(!table.insert(quinary.clone(), 9));
        assert_eq!(table.get(&quinary), None);
        assert!(table.is_empty());
    }
}
