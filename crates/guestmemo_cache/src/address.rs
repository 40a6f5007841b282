use std::fmt;
use std::num::NonZeroU32;

/// Location of an entity in the guest's linear memory.
///
/// Zero is the guest's null pointer and is never a valid `Address`; callers
/// holding a raw pointer go through [`Address::new`] and treat `None` as
/// "no entity", which bypasses every cache.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(NonZeroU32);

impl Address {
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Reinterprets a pointer returned by the guest as an `i32` result.
    pub const fn from_guest_i32(raw: i32) -> Option<Self> {
        Self::new(raw as u32)
    }

    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl From<Address> for u32 {
    fn from(address: Address) -> Self {
        address.get()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.get())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.get())
    }
}

/// Converts a raw argument list, returning `None` if any pointer is null.
pub fn addresses_from_raw(raw: &[u32]) -> Option<smallvec::SmallVec<[Address; 5]>> {
    raw.iter().map(|&pointer| Address::new(pointer)).collect()
}
