use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use dashmap::DashMap;
use guestmemo_cache::Address;
use tracing::debug;

/// Identifies one guest instance (one solve). Handles never cross instances.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Allocates an id that has not been handed out before in this process.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

type Entries<H> = DashMap<Address, Arc<H>, RandomState>;

/// One handle per (instance, address).
///
/// Lookups never hold a map lock while a factory runs: a miss builds the
/// handle unlocked and then publishes it with an insert-if-absent. If another
/// thread (or a nested lookup made by the factory itself) published first,
/// the late handle is dropped and the published one is returned, so callers
/// always observe a single handle per address.
pub struct IdentityTable<H> {
    scopes: DashMap<InstanceId, Arc<Entries<H>>, RandomState>,
}

impl<H> Default for IdentityTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> IdentityTable<H> {
    pub fn new() -> Self {
        Self {
            scopes: DashMap::with_hasher(RandomState::new()),
        }
    }

    fn entries(&self, scope: InstanceId) -> Arc<Entries<H>> {
        if let Some(entries) = self.scopes.get(&scope) {
            return Arc::clone(entries.value());
        }
        let entries = self
            .scopes
            .entry(scope)
            .or_insert_with(|| Arc::new(DashMap::with_hasher(RandomState::new())));
        Arc::clone(entries.value())
    }

    /// Returns the published handle for `pointer`, if any. A null pointer
    /// never has a handle.
    pub fn get(&self, scope: InstanceId, pointer: u32) -> Option<Arc<H>> {
        let address = Address::new(pointer)?;
        let entries = self.scopes.get(&scope)?;
        entries
            .get(&address)
            .map(|handle| Arc::clone(handle.value()))
    }

    pub fn get_or_create<F>(&self, scope: InstanceId, pointer: u32, factory: F) -> Option<Arc<H>>
    where
        F: FnOnce(Address) -> H,
    {
        let address = Address::new(pointer)?;
        let entries = self.entries(scope);

        let existing = entries
            .get(&address)
            .map(|handle| Arc::clone(handle.value()));
        if let Some(handle) = existing {
            return Some(handle);
        }

        let created = Arc::new(factory(address));
        let published = entries.entry(address).or_insert(created);
        Some(Arc::clone(published.value()))
    }

    /// Returns the published handle, or publishes `default` when none exists.
    pub fn get_or_default(&self, scope: InstanceId, pointer: u32, default: H) -> Option<Arc<H>> {
        let address = Address::new(pointer)?;
        let entries = self.entries(scope);
        let published = entries
            .entry(address)
            .or_insert_with(|| Arc::new(default));
        Some(Arc::clone(published.value()))
    }

    /// Forgets every handle of `scope`. Handles already given out stay valid;
    /// later lookups build fresh ones.
    pub fn clear_scope(&self, scope: InstanceId) -> usize {
        let Some(entries) = self
            .scopes
            .get(&scope)
            .map(|entries| Arc::clone(entries.value()))
        else {
            return 0;
        };
        let dropped = entries.len();
        entries.clear();
        debug!(%scope, dropped, "identity scope cleared");
        dropped
    }

    /// Removes the partition of a torn-down instance.
    pub fn release_scope(&self, scope: InstanceId) -> usize {
        let dropped = self
            .scopes
            .remove(&scope)
            .map_or(0, |(_, entries)| entries.len());
        debug!(%scope, dropped, "identity scope released");
        dropped
    }

    pub fn len(&self, scope: InstanceId) -> usize {
        self.scopes.get(&scope).map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self, scope: InstanceId) -> bool {
        self.len(scope) == 0
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Debug)]
    struct Probe {
        address: Address,
    }

    #[test]
    fn same_address_yields_same_handle() {
        let table = IdentityTable::new();
        let scope = InstanceId::next();
        let first = table
            .get_or_create(scope, 64, |address| Probe { address })
            .expect("non-null");
        let second = table
            .get_or_create(scope, 64, |_| panic!("factory must not run on a hit"))
            .expect("non-null");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.address.get(), 64);
    }

    #[test]
    fn null_pointer_has_no_handle() {
        let table: IdentityTable<Probe> = IdentityTable::new();
        let scope = InstanceId::next();
        assert!(table.get_or_create(scope, 0, |address| Probe { address }).is_none());
        assert!(
            table
                .get_or_default(scope, 0, Probe { address: Address::new(1).expect("non-zero") })
                .is_none()
        );
        assert!(table.is_empty(scope));
    }

    #[test]
    fn scopes_do_not_share_handles() {
        let table = IdentityTable::new();
        let (left, right) = (InstanceId::next(), InstanceId::next());
        let a = table.get_or_create(left, 8, |address| Probe { address });
        let b = table.get_or_create(right, 8, |address| Probe { address });
        assert!(!Arc::ptr_eq(&a.expect("handle"), &b.expect("handle")));
    }

    #[test]
    fn default_is_published_only_on_miss() {
        let table = IdentityTable::new();
        let scope = InstanceId::next();
        let address = Address::new(16).expect("non-zero");
        let first = table
            .get_or_default(scope, 16, Probe { address })
            .expect("handle");
        let second = table
            .get_or_default(scope, 16, Probe { address })
            .expect("handle");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(scope), 1);
    }

    #[test]
    fn nested_lookup_for_same_address_resolves_to_one_handle() {
        let table = IdentityTable::new();
        let scope = InstanceId::next();
        let builds = AtomicUsize::new(0);

        let outer = table
            .get_or_create(scope, 32, |address| {
                builds.fetch_add(1, Ordering::SeqCst);
                let inner = table
                    .get_or_create(scope, 32, |address| {
                        builds.fetch_add(1, Ordering::SeqCst);
                        Probe { address }
                    })
                    .expect("handle");
                assert_eq!(inner.address, address);
                Probe { address }
            })
            .expect("handle");

        let again = table.get(scope, 32).expect("published");
        assert!(Arc::ptr_eq(&outer, &again));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(table.len(scope), 1);
    }

    #[test]
    fn cleared_scope_builds_fresh_handles() {
        let table = IdentityTable::new();
        let scope = InstanceId::next();
        let before = table
            .get_or_create(scope, 40, |address| Probe { address })
            .expect("handle");

        assert_eq!(table.clear_scope(scope), 1);
        assert!(table.get(scope, 40).is_none());

        let after = table
            .get_or_create(scope, 40, |address| Probe { address })
            .expect("handle");
        assert!(!Arc::ptr_eq(&before, &after));
        // the old handle is still a usable object
        assert_eq!(before.address.get(), 40);
    }

    #[test]
    fn released_scope_disappears() {
        let table = IdentityTable::new();
        let scope = InstanceId::next();
        table.get_or_create(scope, 4, |address| Probe { address });
        assert_eq!(table.scope_count(), 1);
        assert_eq!(table.release_scope(scope), 1);
        assert_eq!(table.scope_count(), 0);
    }
}
