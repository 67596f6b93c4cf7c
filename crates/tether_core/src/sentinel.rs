//! Process-scoped binding of one foreign runtime to one root registry
//!
//! A [`Sentinel`] is created once the runtime collaborator has finished
//! startup, installs its registry as the runtime's GC hooks and hands out
//! pins and proxies. The process-wide instance is managed explicitly through
//! [`install`], [`current`] and [`shutdown`]; nothing creates it lazily.

use crate::error::ProxyError;
use crate::foreign_value::ForeignValue;
use crate::gc_pause::GcPause;
use crate::proxy::Proxy;
use crate::registry::RootRegistry;
use crate::runtime::{ForeignRuntime, GcHooks, RawValue, WorldGuard};
use crate::value::ToForeign;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Label used for proxies over values that have no name of their own.
pub const UNNAMED: &str = "_";

/// Label of the root module proxy.
pub const MAIN: &str = "Main";

static INSTALLED: Lazy<RwLock<Option<Arc<Sentinel>>>> = Lazy::new(|| RwLock::new(None));

/// Install the process-wide sentinel for `runtime`.
///
/// Replaces a previously installed instance bound to another runtime. A
/// runtime takes one registry at a time, so this fails with
/// [`ProxyError::RuntimeAlreadyBound`] while an earlier sentinel on the same
/// runtime is still alive (installed, or kept by proxies that outlived
/// [`shutdown`]).
pub fn install(runtime: Arc<dyn ForeignRuntime>) -> Result<Arc<Sentinel>, ProxyError> {
    let sentinel = Sentinel::new(runtime)?;
    *INSTALLED.write() = Some(Arc::clone(&sentinel));
    tracing::info!("root registry installed");
    Ok(sentinel)
}

/// The installed sentinel.
pub fn current() -> Result<Arc<Sentinel>, ProxyError> {
    INSTALLED
        .read()
        .clone()
        .ok_or(ProxyError::ForeignRuntimeNotInitialized)
}

/// Tear down the process-wide sentinel, returning it if one was installed.
pub fn shutdown() -> Option<Arc<Sentinel>> {
    let previous = INSTALLED.write().take();
    if let Some(sentinel) = &previous {
        tracing::info!(
            still_pinned = sentinel.registry().len(),
            "root registry torn down"
        );
    }
    previous
}

/// Holds the world lock with the collector paused.
///
/// Raw locations read inside a safepoint cannot be moved or freed until it
/// ends. Pausing happens after locking and resumes before unlocking, so a
/// collection that became due runs while the world is still held.
pub struct Safepoint<'a> {
    // Field order is drop order.
    _pause: GcPause<'a>,
    _world: WorldGuard<'a>,
}

impl fmt::Debug for Safepoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Safepoint")
    }
}

/// One foreign runtime plus the registry pinning values on its behalf.
pub struct Sentinel {
    runtime: Arc<dyn ForeignRuntime>,
    registry: Arc<RootRegistry>,
}

impl Sentinel {
    /// Bind to `runtime`, which must have completed startup and must not be
    /// bound to another live sentinel. The binding ends when the sentinel and
    /// every value pinned through it are dropped.
    pub fn new(runtime: Arc<dyn ForeignRuntime>) -> Result<Arc<Self>, ProxyError> {
        if !runtime.is_initialized() {
            return Err(ProxyError::ForeignRuntimeNotInitialized);
        }
        let registry = Arc::new(RootRegistry::new());
        runtime
            .install_gc_hooks(Arc::clone(&registry) as Arc<dyn GcHooks>)
            .map_err(ProxyError::from_foreign)?;
        Ok(Arc::new(Self { runtime, registry }))
    }

    pub fn runtime(&self) -> &dyn ForeignRuntime {
        self.runtime.as_ref()
    }

    pub fn registry(&self) -> &RootRegistry {
        &self.registry
    }

    /// Enter a safepoint. Fails fast once the runtime has shut down.
    pub fn enter(&self) -> Result<Safepoint<'_>, ProxyError> {
        let world = self.runtime.enter();
        if !self.runtime.is_initialized() {
            return Err(ProxyError::ForeignRuntimeNotInitialized);
        }
        let pause = GcPause::new(self.runtime.as_ref());
        Ok(Safepoint {
            _pause: pause,
            _world: world,
        })
    }

    /// Pin `raw`.
    pub fn root(self: &Arc<Self>, raw: RawValue) -> Result<ForeignValue, ProxyError> {
        let _safepoint = self.enter()?;
        self.pin(raw)
    }

    /// Root proxy over `raw`.
    pub fn proxy(self: &Arc<Self>, raw: RawValue) -> Result<Proxy, ProxyError> {
        Ok(Proxy::rooted(self.root(raw)?, UNNAMED))
    }

    /// Box `value` and pin the result in one step.
    pub fn new_value<T: ToForeign + ?Sized>(self: &Arc<Self>, value: &T) -> Result<Proxy, ProxyError> {
        let _safepoint = self.enter()?;
        let raw = self
            .runtime
            .to_foreign(&value.to_value())
            .map_err(ProxyError::from_foreign)?;
        Ok(Proxy::rooted(self.pin(raw)?, UNNAMED))
    }

    /// Root proxy over the runtime's main module; its children are global bindings.
    pub fn main(self: &Arc<Self>) -> Result<Proxy, ProxyError> {
        let _safepoint = self.enter()?;
        let raw = self.runtime.main_module().map_err(ProxyError::from_foreign)?;
        Ok(Proxy::rooted(self.pin(raw)?, MAIN))
    }

    /// Ask the runtime for a full collection. Deferred while any pause is active.
    pub fn collect_garbage(&self) {
        let _world = self.runtime.enter();
        self.runtime.collect_garbage();
    }

    /// Register `raw`. The caller must hold a safepoint.
    pub(crate) fn pin(self: &Arc<Self>, raw: RawValue) -> Result<ForeignValue, ProxyError> {
        if raw.is_null() {
            return Err(ProxyError::InvalidForeignValue);
        }
        let id = self.runtime.identity(raw).map_err(ProxyError::from_foreign)?;
        let handle = self.registry.register(raw, id)?;
        Ok(ForeignValue::from_parts(Arc::clone(self), handle))
    }
}

impl Drop for Sentinel {
    fn drop(&mut self) {
        let hooks = Arc::clone(&self.registry) as Arc<dyn GcHooks>;
        self.runtime.remove_gc_hooks(&hooks);
        tracing::debug!("root registry unbound from the foreign runtime");
    }
}

impl fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sentinel")
            .field("initialized", &self.runtime.is_initialized())
            .field("registry", &self.registry)
            .finish()
    }
}
