use crate::error::ProxyError;
use crate::heap_ref::RootHandle;
use crate::proxy::Proxy;
use crate::registry::gc_desync;
use crate::runtime::{ObjectId, RawValue};
use crate::sentinel::{Sentinel, UNNAMED};
use crate::value::FromForeign;
use std::fmt;
use std::sync::Arc;

/// An owned pin on one foreign value.
///
/// Cloning takes another registration of the same entry; dropping releases
/// exactly the registration this instance owns.
pub struct ForeignValue {
    sentinel: Arc<Sentinel>,
    handle: RootHandle,
}

impl ForeignValue {
    pub(crate) fn from_parts(sentinel: Arc<Sentinel>, handle: RootHandle) -> Self {
        Self { sentinel, handle }
    }

    pub fn id(&self) -> ObjectId {
        self.handle.id()
    }

    pub fn handle(&self) -> &RootHandle {
        &self.handle
    }

    pub fn sentinel(&self) -> &Arc<Sentinel> {
        &self.sentinel
    }

    /// Current location. Only stable while the caller holds a safepoint.
    pub fn raw(&self) -> Result<RawValue, ProxyError> {
        self.sentinel.registry().current_location(&self.handle)
    }

    pub fn type_name(&self) -> Result<String, ProxyError> {
        let _safepoint = self.sentinel.enter()?;
        self.sentinel
            .runtime()
            .type_name(self.raw()?)
            .map_err(ProxyError::from_foreign)
    }

    pub fn is_mutable(&self) -> Result<bool, ProxyError> {
        let _safepoint = self.sentinel.enter()?;
        self.sentinel
            .runtime()
            .is_mutable(self.raw()?)
            .map_err(ProxyError::from_foreign)
    }

    /// Compare with the foreign equality primitive.
    /// Fails with [`ProxyError::DifferentRuntime`] when `other` was pinned
    /// through another sentinel.
    pub fn equals(&self, other: &ForeignValue) -> Result<bool, ProxyError> {
        if !Arc::ptr_eq(&self.sentinel, &other.sentinel) {
            return Err(ProxyError::DifferentRuntime);
        }
        let _safepoint = self.sentinel.enter()?;
        self.sentinel
            .runtime()
            .equals(self.raw()?, other.raw()?)
            .map_err(ProxyError::from_foreign)
    }

    pub fn unbox<T: FromForeign>(&self) -> Result<T, ProxyError> {
        let _safepoint = self.sentinel.enter()?;
        let value = self
            .sentinel
            .runtime()
            .from_foreign(self.raw()?)
            .map_err(ProxyError::from_foreign)?;
        Ok(T::from_value(value)?)
    }

    /// Root proxy sharing this pin.
    pub fn to_proxy(&self) -> Proxy {
        Proxy::rooted(self.clone(), UNNAMED)
    }
}

impl Clone for ForeignValue {
    fn clone(&self) -> Self {
        let _world = self.sentinel.runtime().enter();
        let handle = self
            .sentinel
            .registry()
            .retain(&self.handle)
            .unwrap_or_else(|| {
                gc_desync(format_args!(
                    "live pin on {} vanished from the registry",
                    self.handle.id()
                ))
            });
        Self {
            sentinel: Arc::clone(&self.sentinel),
            handle,
        }
    }
}

impl Drop for ForeignValue {
    fn drop(&mut self) {
        let _world = self.sentinel.runtime().enter();
        self.sentinel.registry().unregister(&self.handle);
    }
}

impl fmt::Debug for ForeignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignValue")
            .field("id", &self.handle.id())
            .field("token", &self.handle.token())
            .finish()
    }
}
