use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::address::Address;

/// Name of a guest export. Cloning is a reference-count bump, so keys can be
/// built on every lookup without copying the string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionName(Arc<str>);

impl FunctionName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FunctionName {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for FunctionName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl Borrow<str> for FunctionName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of address arguments in a memoized call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Arity {
    Unary,
    Binary,
    Ternary,
    Quaternary,
    Quinary,
}

impl Arity {
    pub const MAX: usize = 5;

    pub const fn of(len: usize) -> Option<Self> {
        match len {
            1 => Some(Self::Unary),
            2 => Some(Self::Binary),
            3 => Some(Self::Ternary),
            4 => Some(Self::Quaternary),
            5 => Some(Self::Quinary),
            _ => None,
        }
    }

    pub const fn arg_count(self) -> usize {
        self.index() + 1
    }

    /// Zero-based slot used by the per-arity result maps.
    pub const fn index(self) -> usize {
        match self {
            Self::Unary => 0,
            Self::Binary => 1,
            Self::Ternary => 2,
            Self::Quaternary => 3,
            Self::Quinary => 4,
        }
    }
}

/// Identity of one memoized guest call: the export name plus its address
/// arguments in call order.
///
/// Argument order is significant, `f(x, y)` and `f(y, x)` are different keys
/// even when the guest function is symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Unary {
        function: FunctionName,
        args: [Address; 1],
    },
    Binary {
        function: FunctionName,
        args: [Address; 2],
    },
    Ternary {
        function: FunctionName,
        args: [Address; 3],
    },
    Quaternary {
        function: FunctionName,
        args: [Address; 4],
    },
    Quinary {
        function: FunctionName,
        args: [Address; 5],
    },
}

impl CacheKey {
    pub const fn unary(function: FunctionName, a1: Address) -> Self {
        Self::Unary {
            function,
            args: [a1],
        }
    }

    pub const fn binary(function: FunctionName, a1: Address, a2: Address) -> Self {
        Self::Binary {
            function,
            args: [a1, a2],
        }
    }

    pub const fn ternary(function: FunctionName, a1: Address, a2: Address, a3: Address) -> Self {
        Self::Ternary {
            function,
            args: [a1, a2, a3],
        }
    }

    pub const fn quaternary(
        function: FunctionName,
        a1: Address,
        a2: Address,
        a3: Address,
        a4: Address,
    ) -> Self {
        Self::Quaternary {
            function,
            args: [a1, a2, a3, a4],
        }
    }

    pub const fn quinary(
        function: FunctionName,
        a1: Address,
        a2: Address,
        a3: Address,
        a4: Address,
        a5: Address,
    ) -> Self {
        Self::Quinary {
            function,
            args: [a1, a2, a3, a4, a5],
        }
    }

    /// Builds a key from an argument slice of length 1..=5.
    pub fn from_args(function: FunctionName, args: &[Address]) -> Option<Self> {
        let key = match *args {
            [a1] => Self::unary(function, a1),
            [a1, a2] => Self::binary(function, a1, a2),
            [a1, a2, a3] => Self::ternary(function, a1, a2, a3),
            [a1, a2, a3, a4] => Self::quaternary(function, a1, a2, a3, a4),
            [a1, a2, a3, a4, a5] => Self::quinary(function, a1, a2, a3, a4, a5),
            _ => return None,
        };
        Some(key)
    }

    pub const fn function(&self) -> &FunctionName {
        match self {
            Self::Unary { function, .. }
            | Self::Binary { function, .. }
            | Self::Ternary { function, .. }
            | Self::Quaternary { function, .. }
            | Self::Quinary { function, .. } => function,
        }
    }

    pub const fn arity(&self) -> Arity {
        match self {
            Self::Unary { .. } => Arity::Unary,
            Self::Binary { .. } => Arity::Binary,
            Self::Ternary { .. } => Arity::Ternary,
            Self::Quaternary { .. } => Arity::Quaternary,
            Self::Quinary { .. } => Arity::Quinary,
        }
    }

    /// Arguments in call order, duplicates included.
    pub fn addresses(&self) -> &[Address] {
        match self {
            Self::Unary { args, .. } => args.as_slice(),
            Self::Binary { args, .. } => args.as_slice(),
            Self::Ternary { args, .. } => args.as_slice(),
            Self::Quaternary { args, .. } => args.as_slice(),
            Self::Quinary { args, .. } => args.as_slice(),
        }
    }

    /// Arguments with repeats removed, first occurrence order preserved.
    pub fn distinct_addresses(&self) -> SmallVec<[Address; Arity::MAX]> {
        let mut distinct = SmallVec::new();
        for &address in self.addresses() {
            if !distinct.contains(&address) {
                distinct.push(address);
            }
        }
        distinct
    }

    pub fn references(&self, address: Address) -> bool {
        self.addresses().contains(&address)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function())?;
        for (index, address) in self.addresses().iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{address}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: u32) -> Address {
        Address::new(raw).expect("test addresses are non-zero")
    }

    #[test]
    fn argument_order_is_part_of_the_key() {
        let f = FunctionName::from("sameTeam");
        let forward = CacheKey::binary(f.clone(), addr(1), addr(2));
        let backward = CacheKey::binary(f, addr(2), addr(1));
        assert_ne!(forward, backward);
    }

    #[test]
    fn keys_of_different_functions_differ() {
        let a = CacheKey::unary("isBusy".into(), addr(7));
        let b = CacheKey::unary("isIdle".into(), addr(7));
        assert_ne!(a, b);
        assert_eq!(a, CacheKey::unary("isBusy".into(), addr(7)));
    }

    #[test]
    fn distinct_addresses_drop_repeats() {
        let key = CacheKey::quinary("f".into(), addr(3), addr(1), addr(3), addr(2), addr(1));
        assert_eq!(key.addresses().len(), 5);
        assert_eq!(key.distinct_addresses().as_slice(), &[addr(3), addr(1), addr(2)]);
    }

    #[test]
    fn from_args_matches_arity() {
        let args = [addr(10), addr(20), addr(30)];
        let key = CacheKey::from_args("overlap".into(), &args).expect("arity 3");
        assert_eq!(key.arity(), Arity::Ternary);
        assert_eq!(key.addresses(), &args);
        assert!(CacheKey::from_args("f".into(), &[]).is_none());
        assert!(CacheKey::from_args("f".into(), &[addr(1); 6]).is_none());
    }

    #[test]
    fn display_lists_arguments_in_call_order() {
        let key = CacheKey::binary("sameTeam".into(), addr(0x64), addr(0xc8));
        assert_eq!(key.to_string(), "sameTeam(0x64, 0xc8)");
    }
}
