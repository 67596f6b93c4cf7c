//! Contracts consumed from the foreign runtime
//!
//! The core never talks to a concrete runtime. Everything it needs (lifecycle,
//! the world lock, GC control, structural lookups and writes, boxing) goes
//! through [`ForeignRuntime`], and the only way control flows back into the
//! core is the [`GcHooks`] surface installed at startup.

use crate::path::PathSegment;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Raw location of a foreign value.
///
/// Only meaningful while the value is pinned and the world lock is held; a
/// collection may move the value and hand out a different location.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawValue(u64);

impl RawValue {
    /// The foreign runtime's null sentinel.
    pub const NULL: RawValue = RawValue(0);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Stable logical identity of a foreign heap object. Survives relocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failures reported by the foreign runtime's primitives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForeignError {
    #[error("foreign runtime is not initialized")]
    NotInitialized,

    #[error("no live object at {0}")]
    DanglingHandle(RawValue),

    #[error("type {type_name} has no field '{field}'")]
    NoSuchField { type_name: String, field: String },

    #[error("'{name}' is not defined in module {module}")]
    UndefinedBinding { module: String, name: String },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("value of type {type_name} cannot be addressed by {segment}")]
    NotAddressable { type_name: String, segment: String },

    #[error("value of type {type_name} is immutable")]
    Immutable { type_name: String },

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("value nests deeper than {limit} levels")]
    RecursionLimit { limit: usize },

    #[error("GC hooks are already installed")]
    HooksInstalled,
}

/// Callbacks the foreign collector invokes during a cycle.
///
/// A cycle is always `on_gc_begin`, one `on_gc_root_enumeration`, zero or
/// more `on_gc_relocate`, then `on_gc_end`, all on the collecting thread while
/// it holds the world lock.
pub trait GcHooks: Send + Sync {
    fn on_gc_begin(&self);

    /// Present every host-pinned location to `visit`.
    fn on_gc_root_enumeration(&self, visit: &mut dyn FnMut(RawValue));

    /// A location presented during enumeration moved to `new`.
    fn on_gc_relocate(&self, old: RawValue, new: RawValue);

    fn on_gc_end(&self);
}

/// Anything held for the duration of a world-lock scope.
pub trait WorldToken {}

impl<T> WorldToken for T {}

/// Proof that the caller holds the runtime's (re-entrant) world lock.
///
/// While a guard is alive no other thread can run the collector or touch the
/// foreign heap.
pub struct WorldGuard<'a> {
    _token: Box<dyn WorldToken + 'a>,
}

impl<'a> WorldGuard<'a> {
    pub fn new(token: impl WorldToken + 'a) -> Self {
        Self {
            _token: Box::new(token),
        }
    }
}

impl fmt::Debug for WorldGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorldGuard")
    }
}

/// Boxing/unboxing collaborator. The core never encodes conversions itself.
pub trait Boxing {
    /// Allocate a foreign representation of `value`.
    fn to_foreign(&self, value: &Value) -> Result<RawValue, ForeignError>;

    /// Read a foreign value back into the host model.
    fn from_foreign(&self, raw: RawValue) -> Result<Value, ForeignError>;
}

/// Everything the core needs from an embedded managed-heap runtime.
pub trait ForeignRuntime: Boxing + Send + Sync {
    /// True once startup has completed and until shutdown begins.
    fn is_initialized(&self) -> bool;

    /// Take the world lock. Re-entrant on the owning thread.
    fn enter(&self) -> WorldGuard<'_>;

    /// Register the callbacks the collector drives. A runtime carries one
    /// hook set; installing a second fails with [`ForeignError::HooksInstalled`].
    fn install_gc_hooks(&self, hooks: Arc<dyn GcHooks>) -> Result<(), ForeignError>;

    /// Remove `hooks` if they are the installed set. Anything else is left alone.
    fn remove_gc_hooks(&self, hooks: &Arc<dyn GcHooks>);

    fn gc_enabled(&self) -> bool;

    /// Enable or disable collection, returning the previous state.
    fn set_gc_enabled(&self, enabled: bool) -> bool;

    /// Run a full collection now (deferred while collection is disabled).
    fn collect_garbage(&self);

    fn identity(&self, raw: RawValue) -> Result<ObjectId, ForeignError>;

    fn type_name(&self, raw: RawValue) -> Result<String, ForeignError>;

    fn is_mutable(&self, raw: RawValue) -> Result<bool, ForeignError>;

    /// Field names of a record, binding names of a module, empty otherwise.
    fn field_names(&self, raw: RawValue) -> Result<Vec<String>, ForeignError>;

    /// Attribute/index lookup primitive.
    fn lookup(&self, raw: RawValue, segment: &PathSegment) -> Result<RawValue, ForeignError>;

    /// Write `value` into `parent` at `segment`.
    fn assign(
        &self,
        parent: RawValue,
        segment: &PathSegment,
        value: RawValue,
    ) -> Result<(), ForeignError>;

    /// Overwrite the content of a mutable `target` with that of `source`, in place.
    fn replace_contents(&self, target: RawValue, source: RawValue) -> Result<(), ForeignError>;

    /// The runtime's equality primitive.
    fn equals(&self, a: RawValue, b: RawValue) -> Result<bool, ForeignError>;

    /// The root module that owns global bindings.
    fn main_module(&self) -> Result<RawValue, ForeignError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sentinel_is_zero() {
        assert!(RawValue::NULL.is_null());
        assert!(!RawValue::from_bits(0x10).is_null());
        assert_eq!(RawValue::from_bits(0x10).to_string(), "0x10");
    }

    #[test]
    fn world_guard_releases_token_on_drop() {
        let flag = Arc::new(());
        {
            let _guard = WorldGuard::new(Arc::clone(&flag));
            assert_eq!(Arc::strong_count(&flag), 2);
        }
        assert_eq!(Arc::strong_count(&flag), 1);
    }
}
