use std::fmt;
use std::sync::Arc;

use guestmemo_cache::{CacheKey, FunctionCache, FunctionName, addresses_from_raw};
use guestmemo_identity::Handle;
use guestmemo_utils::suggest::closest_name;
use thiserror::Error;
use tracing::trace;

use crate::metrics::MemoMetrics;
use crate::scope::CacheScope;

/// Calls exported guest functions. Every argument is a guest pointer and
/// the result is the raw value the export returned.
pub trait GuestInvoker: Send + Sync {
    fn invoke(&self, name: &str, args: &[u32]) -> Result<i64, InvokeError>;
}

impl<T: GuestInvoker + ?Sized> GuestInvoker for Arc<T> {
    fn invoke(&self, name: &str, args: &[u32]) -> Result<i64, InvokeError> {
        (**self).invoke(name, args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("guest module has no export named `{name}`{}", did_you_mean(.suggestion))]
    MissingExport {
        name: String,
        suggestion: Option<String>,
    },
    #[error("export `{name}` takes {expected} argument(s), got {actual}")]
    ArgumentCount {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("guest trapped in `{name}`: {message}")]
    Trap { name: String, message: String },
}

impl InvokeError {
    /// Builds a missing-export error, suggesting the closest known export.
    pub fn missing_export<'a>(name: &str, exports: impl IntoIterator<Item = &'a str>) -> Self {
        Self::MissingExport {
            name: name.to_string(),
            suggestion: closest_name(name, exports).map(str::to_string),
        }
    }
}

#[allow(clippy::ref_option)]
fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|name| format!(", did you mean `{name}`?"))
        .unwrap_or_default()
}

/// One guest export bound to a function cache.
///
/// Owns everything it touches, so it can be captured by relation closures
/// that outlive the borrow of a scope.
#[derive(Clone)]
pub struct GuestCall {
    name: FunctionName,
    invoker: Arc<dyn GuestInvoker>,
    functions: Arc<FunctionCache>,
    metrics: Arc<MemoMetrics>,
    memoize: bool,
}

impl GuestCall {
    pub(crate) fn new(
        name: FunctionName,
        invoker: Arc<dyn GuestInvoker>,
        functions: Arc<FunctionCache>,
        metrics: Arc<MemoMetrics>,
        memoize: bool,
    ) -> Self {
        Self {
            name,
            invoker,
            functions,
            metrics,
            memoize,
        }
    }

    pub const fn name(&self) -> &FunctionName {
        &self.name
    }

    /// Predicate: any non-zero guest result is `true`.
    pub fn test(&self, args: &[u32]) -> Result<bool, InvokeError> {
        self.memoized(
            args,
            |_| true,
            FunctionCache::get_bool,
            FunctionCache::put_bool,
            |raw| raw != 0,
        )
    }

    pub fn apply_int(&self, args: &[u32]) -> Result<i32, InvokeError> {
        self.memoized(
            args,
            |_| true,
            FunctionCache::get_int,
            FunctionCache::put_int,
            low_word,
        )
    }

    /// 64-bit results are memoized for up to four arguments; five-argument
    /// calls always reach the guest.
    pub fn apply_long(&self, args: &[u32]) -> Result<i64, InvokeError> {
        self.memoized(
            args,
            |key| self.functions.supports_long(key),
            FunctionCache::get_long,
            FunctionCache::put_long,
            |raw| raw,
        )
    }

    /// Calls the guest without consulting or filling the cache.
    pub fn call(&self, args: &[u32]) -> Result<i64, InvokeError> {
        self.invoker.invoke(self.name.as_str(), args)
    }

    fn key_for(&self, args: &[u32]) -> Option<CacheKey> {
        if !self.memoize {
            return None;
        }
        let addresses = addresses_from_raw(args)?;
        CacheKey::from_args(self.name.clone(), &addresses)
    }

    fn memoized<V, S, G, P, C>(
        &self,
        args: &[u32],
        supported: S,
        get: G,
        put: P,
        convert: C,
    ) -> Result<V, InvokeError>
    where
        V: Copy,
        S: Fn(&CacheKey) -> bool,
        G: Fn(&FunctionCache, &CacheKey) -> Option<V>,
        P: Fn(&FunctionCache, CacheKey, V),
        C: Fn(i64) -> V,
    {
        let Some(key) = self.key_for(args).filter(|key| supported(key)) else {
            self.metrics.record_bypass();
            return self.call(args).map(convert);
        };

        if let Some(value) = get(&self.functions, &key) {
            self.metrics.record_hit();
            return Ok(value);
        }
        self.metrics.record_miss();

        let version = self.functions.version();
        let value = convert(self.call(args)?);
        // A mutation that landed while the guest ran may have invalidated
        // state this result was computed from.
        if self.functions.version() == version {
            put(&self.functions, key, value);
        } else {
            trace!(%key, "cache version moved during call, result not stored");
        }
        Ok(value)
    }
}

impl fmt::Debug for GuestCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestCall")
            .field("name", &self.name)
            .field("memoize", &self.memoize)
            .finish_non_exhaustive()
    }
}

// Guest i32 results arrive sign-extended; keep the low word.
#[allow(clippy::cast_possible_truncation)]
const fn low_word(raw: i64) -> i32 {
    raw as i32
}

/// A guest export bound to a [`CacheScope`].
#[derive(Debug)]
pub struct CachedCall<'s> {
    scope: &'s CacheScope,
    call: GuestCall,
}

impl<'s> CachedCall<'s> {
    pub(crate) const fn new(scope: &'s CacheScope, call: GuestCall) -> Self {
        Self { scope, call }
    }

    pub const fn name(&self) -> &FunctionName {
        self.call.name()
    }

    pub fn test(&self, args: &[u32]) -> Result<bool, InvokeError> {
        self.call.test(args)
    }

    pub fn apply_int(&self, args: &[u32]) -> Result<i32, InvokeError> {
        self.call.apply_int(args)
    }

    pub fn apply_long(&self, args: &[u32]) -> Result<i64, InvokeError> {
        self.call.apply_long(args)
    }

    /// Mapper: the guest returns a pointer, turned into this scope's handle
    /// for it. A null result maps to `None`.
    pub fn map(&self, args: &[u32]) -> Result<Option<Arc<Handle>>, InvokeError> {
        let pointer = self.call.apply_int(args)?;
        #[allow(clippy::cast_sign_loss)]
        let raw = pointer as u32;
        Ok(self.scope.handle(raw))
    }

    pub const fn guest_call(&self) -> &GuestCall {
        &self.call
    }
}
