//! Function-result caching for guest calls keyed by export name and
//! address arguments.
//!
//! Every stored key is registered in a reverse index under each distinct
//! address it mentions, so a mutation of one entity invalidates exactly the
//! results that read it without scanning the cache.

pub mod address;
pub mod function_cache;
pub mod key;
pub mod options;
pub mod reverse_index;
pub mod stats;
pub mod table;

pub use address::{Address, addresses_from_raw};
pub use function_cache::FunctionCache;
pub use key::{Arity, CacheKey, FunctionName};
pub use options::CacheOptions;
pub use stats::CacheStats;
