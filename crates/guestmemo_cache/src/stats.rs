use std::fmt;

use serde::Serialize;

/// Point-in-time counts for a [`crate::FunctionCache`]. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub bool_entries: usize,
    pub int_entries: usize,
    pub long_entries: usize,
    pub indexed_addresses: usize,
    pub version: u64,
}

impl CacheStats {
    pub const fn total_entries(&self) -> usize {
        self.bool_entries + self.int_entries + self.long_entries
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FunctionCache[bool={}, int={}, long={}, version={}]",
            self.bool_entries, self.int_entries, self.long_entries, self.version
        )
    }
}
