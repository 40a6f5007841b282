use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use tracing::{debug, trace};

use crate::address::Address;
use crate::key::{CacheKey, FunctionName};
use crate::options::CacheOptions;
use crate::reverse_index::ReverseIndex;
use crate::stats::CacheStats;
use crate::table::ResultTable;

/// Generates the positional `get_*N`/`put_*N` pair for one result type and
/// arity on top of the key-based accessors.
macro_rules! positional_accessors {
    ($get:ident, $put:ident, $get_key:ident, $put_key:ident, $ty:ty, $ctor:ident, $($arg:ident),+) => {
        pub fn $get(&self, function: &FunctionName, $($arg: Address),+) -> Option<$ty> {
            self.$get_key(&CacheKey::$ctor(function.clone(), $($arg),+))
        }

        pub fn $put(&self, function: &FunctionName, $($arg: Address),+, value: $ty) {
            self.$put_key(CacheKey::$ctor(function.clone(), $($arg),+), value);
        }
    };
}

/// Memoized guest call results, invalidated per address.
///
/// Results are stored in one concurrent map per (result type, arity); the
/// reverse index lets [`FunctionCache::invalidate`] touch only the entries
/// that mention the mutated address. 64-bit results have no quinary shape.
pub struct FunctionCache {
    bools: ResultTable<bool, 5>,
    ints: ResultTable<i32, 5>,
    longs: ResultTable<i64, 4>,
    index: ReverseIndex,
    version: CachePadded<AtomicU64>,
}

impl Default for FunctionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionCache {
    pub fn new() -> Self {
        Self::with_options(&CacheOptions::default())
    }

    pub fn with_options(options: &CacheOptions) -> Self {
        Self {
            bools: ResultTable::new(options),
            ints: ResultTable::new(options),
            longs: ResultTable::new(options),
            index: ReverseIndex::new(options),
            version: CachePadded::new(AtomicU64::new(0)),
        }
    }

    fn store<V: Copy, const N: usize>(&self, table: &ResultTable<V, N>, key: CacheKey, value: V) {
        if !table.supports(&key) {
            trace!(%key, "result type has no slot for this arity, not memoized");
            return;
        }
        // The value goes in before the key is indexed: an invalidate racing
        // with this put can then at worst leave an indexed entry behind,
        // never an unindexed one that no later invalidate could reach.
        table.insert(key.clone(), value);
        self.index.register(&key);
    }

    pub fn get_bool(&self, key: &CacheKey) -> Option<bool> {
        self.bools.get(key)
    }

    pub fn put_bool(&self, key: CacheKey, value: bool) {
        self.store(&self.bools, key, value);
    }

    pub fn get_int(&self, key: &CacheKey) -> Option<i32> {
        self.ints.get(key)
    }

    pub fn put_int(&self, key: CacheKey, value: i32) {
        self.store(&self.ints, key, value);
    }

    pub fn get_long(&self, key: &CacheKey) -> Option<i64> {
        self.longs.get(key)
    }

    /// Quinary keys are silently skipped; see the type-level docs.
    pub fn put_long(&self, key: CacheKey, value: i64) {
        self.store(&self.longs, key, value);
    }

    pub fn supports_long(&self, key: &CacheKey) -> bool {
        self.longs.supports(key)
    }

    positional_accessors!(get_bool1, put_bool1, get_bool, put_bool, bool, unary, a1);
    positional_accessors!(get_bool2, put_bool2, get_bool, put_bool, bool, binary, a1, a2);
    positional_accessors!(get_bool3, put_bool3, get_bool, put_bool, bool, ternary, a1, a2, a3);
    positional_accessors!(get_bool4, put_bool4, get_bool, put_bool, bool, quaternary, a1, a2, a3, a4);
    positional_accessors!(get_bool5, put_bool5, get_bool, put_bool, bool, quinary, a1, a2, a3, a4, a5);

    positional_accessors!(get_int1, put_int1, get_int, put_int, i32, unary, a1);
    positional_accessors!(get_int2, put_int2, get_int, put_int, i32, binary, a1, a2);
    positional_accessors!(get_int3, put_int3, get_int, put_int, i32, ternary, a1, a2, a3);
    positional_accessors!(get_int4, put_int4, get_int, put_int, i32, quaternary, a1, a2, a3, a4);
    positional_accessors!(get_int5, put_int5, get_int, put_int, i32, quinary, a1, a2, a3, a4, a5);

    positional_accessors!(get_long1, put_long1, get_long, put_long, i64, unary, a1);
    positional_accessors!(get_long2, put_long2, get_long, put_long, i64, binary, a1, a2);
    positional_accessors!(get_long3, put_long3, get_long, put_long, i64, ternary, a1, a2, a3);
    positional_accessors!(get_long4, put_long4, get_long, put_long, i64, quaternary, a1, a2, a3, a4);

    /// Drops every cached result whose key mentions `address` and bumps the
    /// version, even when nothing was cached. Returns the number of results
    /// removed.
    pub fn invalidate(&self, address: Address) -> usize {
        let keys = self.index.take(address);
        let mut removed = 0;
        for key in &keys {
            removed += usize::from(self.bools.remove(key).is_some());
            removed += usize::from(self.ints.remove(key).is_some());
            removed += usize::from(self.longs.remove(key).is_some());
        }
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(%address, removed, version, "invalidated cached results");
        removed
    }

    /// Like [`FunctionCache::invalidate`], but a null pointer is ignored
    /// entirely and does not bump the version.
    pub fn invalidate_raw(&self, pointer: u32) -> usize {
        Address::new(pointer).map_or(0, |address| self.invalidate(address))
    }

    pub fn clear(&self) {
        self.bools.clear();
        self.ints.clear();
        self.longs.clear();
        self.index.clear();
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(version, "function cache cleared");
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of keys registered for `address` in the reverse index.
    pub fn references_to(&self, address: Address) -> usize {
        self.index.keys_for(address)
    }

    pub fn is_empty(&self) -> bool {
        self.bools.is_empty() && self.ints.is_empty() && self.longs.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            bool_entries: self.bools.len(),
            int_entries: self.ints.len(),
            long_entries: self.longs.len(),
            indexed_addresses: self.index.address_count(),
            version: self.version(),
        }
    }
}
