//! Stable host handles for guest memory addresses.
//!
//! Host search engines key their bookkeeping on object identity, so every
//! address of a guest instance must map to exactly one handle until the
//! instance's scope is cleared.

pub mod handle;
pub mod table;

pub use handle::{CompareFn, EqualsFn, Handle, HashFn, Relations};
pub use table::{IdentityTable, InstanceId};
