//! Tether Heap
//!
//! A small managed runtime with a relocating, semi-space collector. It
//! implements [`tether_core::ForeignRuntime`] so the root registry and the
//! proxy layer can be driven against a heap whose objects really do move.

pub mod heap;
pub mod object;
pub mod runtime;
pub mod settings;

pub use heap::{GcStats, Heap};
pub use object::{Body, HeapObject};
pub use runtime::ManagedRuntime;
pub use settings::HeapSettings;
