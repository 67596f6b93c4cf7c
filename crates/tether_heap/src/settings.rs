//! Heap settings

use serde::{Deserialize, Serialize};

/// Tuning knobs for [`crate::ManagedRuntime`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapSettings {
    /// Allocations between automatic collections. Zero disables them.
    pub collect_threshold: usize,
    /// Deepest nesting boxed or unboxed in one call.
    pub max_unbox_depth: usize,
    /// Slots reserved up front in the object space.
    pub initial_capacity: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            collect_threshold: 1024,
            max_unbox_depth: 64,
            initial_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let settings: HeapSettings = serde_json::from_str(r#"{ "collect_threshold": 8 }"#).unwrap();
        assert_eq!(settings.collect_threshold, 8);
        assert_eq!(settings.max_unbox_depth, HeapSettings::default().max_unbox_depth);
    }
}
