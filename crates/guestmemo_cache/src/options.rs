use std::hash::Hash;

use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Sizing knobs for the concurrent maps backing a [`crate::FunctionCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Capacity reserved up front in every map.
    pub initial_capacity: usize,
    /// Number of lock shards per map; must be a power of two greater than
    /// one. `None` leaves the choice to dashmap.
    pub shard_amount: Option<usize>,
}

impl CacheOptions {
    pub const fn shard_amount_is_valid(shards: usize) -> bool {
        shards > 1 && shards.is_power_of_two()
    }

    pub(crate) fn build_map<K: Eq + Hash, V>(&self) -> DashMap<K, V, RandomState> {
        match self.shard_amount {
            Some(shards) if Self::shard_amount_is_valid(shards) => {
                DashMap::with_capacity_and_hasher_and_shard_amount(
                    self.initial_capacity,
                    RandomState::new(),
                    shards,
                )
            }
            _ => DashMap::with_capacity_and_hasher(self.initial_capacity, RandomState::new()),
        }
    }
}
