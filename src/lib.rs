//! Memoized guest calls for host search engines.
//!
//! A [`CacheScope`] ties one guest instance to its function cache and its
//! partition of the identity table. Guest exports are called through
//! [`CachedCall`], entity fields are written through [`Fields`], and every
//! setter invalidates the results that read the entity it changed.

pub mod bench;
pub mod cli;
pub mod config;
pub mod guest;
pub mod invoke;
pub mod memory;
pub mod metrics;
pub mod relations;
pub mod scope;
pub mod version;

pub use config::{ConfigError, MemoConfig};
pub use guestmemo_cache::{
    Address, Arity, CacheKey, CacheOptions, CacheStats, FunctionCache, FunctionName,
};
pub use guestmemo_identity::{Handle, IdentityTable, InstanceId, Relations};
pub use invoke::{CachedCall, GuestCall, GuestInvoker, InvokeError};
pub use memory::{Fields, GuestMemory, LinearMemory, MemoryError};
pub use metrics::{MemoMetrics, MemoMetricsSnapshot};
pub use relations::GuestRelations;
pub use scope::CacheScope;
