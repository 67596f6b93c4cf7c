//! Scoped suspension of the foreign collector

use crate::runtime::ForeignRuntime;

/// Disables foreign collection for its lifetime and restores the previous
/// state on drop, so pauses nest.
///
/// Raw locations obtained while a pause is alive stay valid until it ends
/// (provided the world lock is also held, see [`crate::Safepoint`]).
///
/// Example:
/// ```ignore
/// let _pause = GcPause::new(runtime.as_ref());
/// let raw = runtime.to_foreign(&Value::Int(5))?;
/// // no collection can move or free `raw` here
/// ```
pub struct GcPause<'a> {
    runtime: &'a dyn ForeignRuntime,
    was_enabled: bool,
}

impl<'a> GcPause<'a> {
    pub fn new(runtime: &'a dyn ForeignRuntime) -> Self {
        let was_enabled = runtime.set_gc_enabled(false);
        Self {
            runtime,
            was_enabled,
        }
    }

    /// Whether collection was enabled when this pause began.
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }
}

impl Drop for GcPause<'_> {
    fn drop(&mut self) {
        self.runtime.set_gc_enabled(self.was_enabled);
    }
}
