use std::fmt;
use std::sync::Arc;

use guestmemo_cache::{Address, CacheStats, FunctionCache, FunctionName};
use guestmemo_identity::{Handle, IdentityTable, InstanceId, Relations};
use parking_lot::RwLock;
use tracing::debug;

use crate::config::MemoConfig;
use crate::invoke::{CachedCall, GuestCall, GuestInvoker};
use crate::metrics::{MemoMetrics, MemoMetricsSnapshot};

/// Caching state of one guest instance.
///
/// Owns the instance's function cache and its partition of the identity
/// table. Everything is passed explicitly: callers hold the scope (or an
/// [`Arc`] of its parts) instead of reaching for thread-local state.
/// Dropping the scope releases the identity partition.
pub struct CacheScope {
    instance: InstanceId,
    identity: Arc<IdentityTable<Handle>>,
    functions: Arc<FunctionCache>,
    invoker: Arc<dyn GuestInvoker>,
    metrics: Arc<MemoMetrics>,
    config: MemoConfig,
    relations: RwLock<Relations>,
}

impl CacheScope {
    pub fn new(invoker: Arc<dyn GuestInvoker>, config: MemoConfig) -> Self {
        Self::with_identity(invoker, config, Arc::new(IdentityTable::new()))
    }

    /// Builds a scope whose handles live in a table shared with other
    /// instances. Each scope still gets its own partition.
    pub fn with_identity(
        invoker: Arc<dyn GuestInvoker>,
        config: MemoConfig,
        identity: Arc<IdentityTable<Handle>>,
    ) -> Self {
        let instance = InstanceId::next();
        debug!(%instance, memoize = config.memoize, "cache scope created");
        Self {
            instance,
            identity,
            functions: Arc::new(FunctionCache::with_options(&config.cache)),
            invoker,
            metrics: Arc::new(MemoMetrics::default()),
            config,
            relations: RwLock::new(Relations::default()),
        }
    }

    pub const fn instance(&self) -> InstanceId {
        self.instance
    }

    pub const fn config(&self) -> &MemoConfig {
        &self.config
    }

    pub const fn functions(&self) -> &Arc<FunctionCache> {
        &self.functions
    }

    pub const fn identity(&self) -> &Arc<IdentityTable<Handle>> {
        &self.identity
    }

    pub const fn invoker(&self) -> &Arc<dyn GuestInvoker> {
        &self.invoker
    }

    pub fn metrics(&self) -> MemoMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn stats(&self) -> CacheStats {
        self.functions.stats()
    }

    /// Relations given to handles created by [`CacheScope::handle`] from now
    /// on. Handles already published keep theirs.
    pub fn set_relations(&self, relations: Relations) {
        *self.relations.write() = relations;
    }

    fn new_handle(&self, address: Address, relations: Relations) -> Handle {
        Handle::with_relations(
            self.instance,
            address,
            Arc::clone(&self.functions),
            relations,
        )
    }

    /// The handle for `raw`, publishing one with the scope's relations on
    /// first sight. Null maps to `None`.
    pub fn handle(&self, raw: u32) -> Option<Arc<Handle>> {
        if let Some(existing) = self.identity.get(self.instance, raw) {
            return Some(existing);
        }
        let relations = self.relations.read().clone();
        self.handle_with(raw, relations)
    }

    pub fn handle_with(&self, raw: u32, relations: Relations) -> Option<Arc<Handle>> {
        let address = Address::new(raw)?;
        self.identity
            .get_or_default(self.instance, raw, self.new_handle(address, relations))
    }

    /// The handle for `raw`, running `factory` only when none is published.
    /// The factory may itself look up handles of this scope.
    pub fn handle_or_create<F>(&self, raw: u32, factory: F) -> Option<Arc<Handle>>
    where
        F: FnOnce(Address) -> Handle,
    {
        self.identity.get_or_create(self.instance, raw, factory)
    }

    /// Binds the guest export `name` to this scope.
    pub fn function(&self, name: impl Into<FunctionName>) -> CachedCall<'_> {
        CachedCall::new(self, self.guest_call(name.into()))
    }

    pub(crate) fn guest_call(&self, name: FunctionName) -> GuestCall {
        GuestCall::new(
            name,
            Arc::clone(&self.invoker),
            Arc::clone(&self.functions),
            Arc::clone(&self.metrics),
            self.config.memoize,
        )
    }

    /// Drops every handle and cached result of this instance. Called when the
    /// host clones a solution, after which guest addresses may be reused.
    pub fn reset_for_clone(&self) {
        let handles = self.identity.clear_scope(self.instance);
        self.functions.clear();
        debug!(instance = %self.instance, handles, "cache scope reset for clone");
    }
}

impl Drop for CacheScope {
    fn drop(&mut self) {
        self.identity.release_scope(self.instance);
    }
}

impl fmt::Debug for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheScope")
            .field("instance", &self.instance)
            .field("config", &self.config)
            .field("stats", &self.functions.stats())
            .finish_non_exhaustive()
    }
}
