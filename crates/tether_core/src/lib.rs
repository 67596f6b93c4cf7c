//! Tether Core
//!
//! Keeps host-side handles to values that live in a foreign, relocating
//! garbage-collected heap:
//! - Root registry (pins values against collection, tracks relocation)
//! - GC pauses and safepoints
//! - Owned pins ([`ForeignValue`]) and path-addressed [`Proxy`] handles
//! - The contracts a foreign runtime has to provide ([`ForeignRuntime`])

pub mod error;
pub mod foreign_value;
pub mod gc_pause;
pub mod heap_ref;
pub mod path;
pub mod proxy;
pub mod registry;
pub mod runtime;
pub mod sentinel;
pub mod value;

pub use error::ProxyError;
pub use foreign_value::ForeignValue;
pub use gc_pause::GcPause;
pub use heap_ref::{HeapReference, RootHandle};
pub use path::{AccessPath, PathSegment};
pub use proxy::Proxy;
pub use registry::{RegistryStats, RootRegistry};
pub use runtime::{
    Boxing, ForeignError, ForeignRuntime, GcHooks, ObjectId, RawValue, WorldGuard, WorldToken,
};
pub use sentinel::{Safepoint, Sentinel};
pub use value::{ConversionError, FromForeign, Record, ToForeign, Value};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
