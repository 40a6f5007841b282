use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use guestmemo_cache::{Address, FunctionCache};

use crate::table::InstanceId;

pub type EqualsFn = Arc<dyn Fn(Address, Address) -> bool + Send + Sync>;
pub type HashFn = Arc<dyn Fn(Address) -> i32 + Send + Sync>;
pub type CompareFn = Arc<dyn Fn(Address, Address) -> Ordering + Send + Sync>;

/// Equality, hashing and ordering used when a handle is placed in host
/// collections. Each relation defaults to plain address semantics.
#[derive(Clone, Default)]
pub struct Relations {
    equals: Option<EqualsFn>,
    hash: Option<HashFn>,
    compare: Option<CompareFn>,
}

impl Relations {
    pub fn new(equals: Option<EqualsFn>, hash: Option<HashFn>, compare: Option<CompareFn>) -> Self {
        Self {
            equals,
            hash,
            compare,
        }
    }

    /// Relations driven by a comparator alone. Ordering follows the
    /// comparator, equality stays on addresses, and every handle hashes alike.
    ///
    /// Two handles at different addresses may therefore compare `Equal`
    /// while staying unequal; ordered collections dedupe them, hash
    /// collections keep both.
    pub fn from_comparator(compare: CompareFn) -> Self {
        Self {
            equals: None,
            hash: Some(Arc::new(|_: Address| 0)),
            compare: Some(compare),
        }
    }

    pub fn with_equals(mut self, equals: EqualsFn) -> Self {
        self.equals = Some(equals);
        self
    }

    pub fn with_hash(mut self, hash: HashFn) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn with_compare(mut self, compare: CompareFn) -> Self {
        self.compare = Some(compare);
        self
    }

    pub const fn is_default(&self) -> bool {
        self.equals.is_none() && self.hash.is_none() && self.compare.is_none()
    }

    pub fn equals(&self, a: Address, b: Address) -> bool {
        self.equals.as_ref().map_or(a == b, |equals| equals(a, b))
    }

    pub fn hash_of(&self, address: Address) -> i32 {
        // Bit-for-bit reinterpretation, the same value an i32 field would hold.
        #[allow(clippy::cast_possible_wrap)]
        let raw = address.get() as i32;
        self.hash.as_ref().map_or(raw, |hash| hash(address))
    }

    pub fn compare(&self, a: Address, b: Address) -> Ordering {
        self.compare
            .as_ref()
            .map_or_else(|| a.cmp(&b), |compare| compare(a, b))
    }
}

impl fmt::Debug for Relations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relations")
            .field("equals", &self.equals.is_some())
            .field("hash", &self.hash.is_some())
            .field("compare", &self.compare.is_some())
            .finish()
    }
}

/// Host-side stand-in for one guest entity.
///
/// Holds the function cache of its scope explicitly, so a setter that
/// rewrites the entity can invalidate the memoized results that read it.
pub struct Handle {
    instance: InstanceId,
    address: Address,
    relations: Relations,
    functions: Arc<FunctionCache>,
}

impl Handle {
    pub fn new(instance: InstanceId, address: Address, functions: Arc<FunctionCache>) -> Self {
        Self::with_relations(instance, address, functions, Relations::default())
    }

    pub fn with_relations(
        instance: InstanceId,
        address: Address,
        functions: Arc<FunctionCache>,
        relations: Relations,
    ) -> Self {
        Self {
            instance,
            address,
            relations,
            functions,
        }
    }

    pub const fn instance(&self) -> InstanceId {
        self.instance
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub const fn pointer(&self) -> u32 {
        self.address.get()
    }

    pub const fn relations(&self) -> &Relations {
        &self.relations
    }

    pub fn functions(&self) -> &Arc<FunctionCache> {
        &self.functions
    }

    /// Mutation hook: must be called right after a field of this entity is
    /// written and before control returns to the search, so no later read
    /// can see a result computed from the old state.
    pub fn invalidate_self(&self) -> usize {
        self.functions.invalidate(self.address)
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.relations.equals(self.address, other.address)
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<S: Hasher>(&self, state: &mut S) {
        state.write_i32(self.relations.hash_of(self.address));
    }
}

impl PartialOrd for Handle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Handle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.relations.compare(self.address, other.address)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("instance", &self.instance)
            .field("address", &self.address)
            .field("relations", &self.relations)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(pointer={:x})", self.address.get())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use guestmemo_cache::FunctionName;

    use super::*;

    fn addr(raw: u32) -> Address {
        Address::new(raw).expect("non-zero")
    }

    fn handle(raw: u32, relations: Relations) -> Handle {
        Handle::with_relations(
            InstanceId::next(),
            addr(raw),
            Arc::new(FunctionCache::new()),
            relations,
        )
    }

    #[test]
    fn default_relations_follow_addresses() {
        let a = handle(8, Relations::default());
        let b = handle(8, Relations::default());
        let c = handle(12, Relations::default());

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
        assert!(a.relations().is_default());
    }

    #[test]
    fn custom_equality_and_hash_merge_set_members() {
        // entities at 8 and 16 model the same domain object
        let relations = Relations::default()
            .with_equals(Arc::new(|a: Address, b: Address| a.get() % 8 == b.get() % 8))
            .with_hash(Arc::new(|address: Address| (address.get() % 8) as i32));

        let mut set = HashSet::new();
        set.insert(handle(8, relations.clone()));
        set.insert(handle(16, relations.clone()));
        set.insert(handle(20, relations));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn comparator_relations_drive_ordering_only() {
        let by_descending: CompareFn = Arc::new(|a: Address, b: Address| b.cmp(&a));
        let relations = Relations::from_comparator(by_descending);

        let ordered: BTreeSet<Handle> = [4, 12, 8]
            .into_iter()
            .map(|raw| handle(raw, relations.clone()))
            .collect();
        let pointers: Vec<u32> = ordered.iter().map(Handle::pointer).collect();
        assert_eq!(pointers, vec![12, 8, 4]);

        assert_eq!(handle(4, relations.clone()), handle(4, relations.clone()));
        assert_ne!(handle(4, relations.clone()), handle(8, relations));
    }

    #[test]
    fn comparator_ties_keep_distinct_addresses_apart() {
        let all_equal: CompareFn = Arc::new(|_: Address, _: Address| Ordering::Equal);
        let relations = Relations::from_comparator(all_equal);
        let a = handle(8, relations.clone());
        let b = handle(16, relations.clone());

        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_ne!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(handle(8, relations));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn invalidate_self_drops_results_for_its_address() {
        let functions = Arc::new(FunctionCache::new());
        let entity = Handle::new(InstanceId::next(), addr(24), Arc::clone(&functions));
        let other = addr(28);
        let f = FunctionName::from("isBusy");
        functions.put_bool1(&f, entity.address(), true);
        functions.put_bool1(&f, other, true);

        assert_eq!(entity.invalidate_self(), 1);
        assert_eq!(functions.get_bool1(&f, entity.address()), None);
        assert_eq!(functions.get_bool1(&f, other), Some(true));
    }

    #[test]
    fn display_uses_hex_pointer() {
        assert_eq!(handle(255, Relations::default()).to_string(), "Handle(pointer=ff)");
    }
}
