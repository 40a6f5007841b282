use std::cmp::Ordering;
use std::sync::Arc;

use guestmemo_cache::{Address, FunctionName};
use guestmemo_identity::{CompareFn, EqualsFn, HashFn, Relations};
use tracing::warn;

use crate::invoke::GuestCall;
use crate::scope::CacheScope;

/// Names of guest exports that define entity equality, hashing and
/// ordering. Binding them to a scope yields [`Relations`] whose calls are
/// memoized in that scope's function cache.
#[derive(Debug, Clone, Default)]
pub struct GuestRelations {
    equals: Option<FunctionName>,
    hash: Option<FunctionName>,
    compare: Option<FunctionName>,
}

impl GuestRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binary predicate export. Without [`with_hash`](Self::with_hash) every
    /// handle hashes alike, so guest-equal handles still share a bucket.
    pub fn with_equals(mut self, name: impl Into<FunctionName>) -> Self {
        self.equals = Some(name.into());
        self
    }

    /// Unary i32 export.
    pub fn with_hash(mut self, name: impl Into<FunctionName>) -> Self {
        self.hash = Some(name.into());
        self
    }

    /// Binary i32 export; only the sign of the result matters.
    pub fn with_compare(mut self, name: impl Into<FunctionName>) -> Self {
        self.compare = Some(name.into());
        self
    }

    pub fn bind(&self, scope: &CacheScope) -> Relations {
        let compare = self
            .compare
            .as_ref()
            .map(|name| compare_fn(scope.guest_call(name.clone())));

        // A comparator alone orders handles; equality stays on addresses.
        if let (None, None, Some(compare)) = (&self.equals, &self.hash, &compare) {
            return Relations::from_comparator(Arc::clone(compare));
        }

        let equals = self
            .equals
            .as_ref()
            .map(|name| equals_fn(scope.guest_call(name.clone())));
        let hash = match (&self.hash, &equals) {
            (Some(name), _) => Some(hash_fn(scope.guest_call(name.clone()))),
            // the address hash would split guest-equal handles across buckets
            (None, Some(_)) => Some(constant_hash()),
            (None, None) => None,
        };
        Relations::new(equals, hash, compare)
    }
}

fn equals_fn(call: GuestCall) -> EqualsFn {
    Arc::new(move |a: Address, b: Address| {
        if a == b {
            return true;
        }
        call.test(&[a.get(), b.get()]).unwrap_or_else(|error| {
            warn!(function = %call.name(), %error, "guest equality failed, comparing addresses");
            false
        })
    })
}

fn hash_fn(call: GuestCall) -> HashFn {
    Arc::new(move |address: Address| {
        call.apply_int(&[address.get()]).unwrap_or_else(|error| {
            warn!(function = %call.name(), %error, "guest hash failed, hashing the address");
            #[allow(clippy::cast_possible_wrap)]
            let fallback = address.get() as i32;
            fallback
        })
    })
}

fn constant_hash() -> HashFn {
    Arc::new(|_: Address| 0)
}

fn compare_fn(call: GuestCall) -> CompareFn {
    Arc::new(move |a: Address, b: Address| {
        if a == b {
            return Ordering::Equal;
        }
        call.apply_int(&[a.get(), b.get()])
            .map(|sign| sign.cmp(&0))
            .unwrap_or_else(|error| {
                warn!(function = %call.name(), %error, "guest comparison failed, ordering by address");
                a.cmp(&b)
            })
    })
}
