//! Runtime settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tether_heap::HeapSettings;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings for the `tether` binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub heap: HeapSettings,
    pub demo: DemoSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Proxies aliasing one value across the relocation demo.
    pub alias_count: usize,
    /// Collections forced during the relocation demo.
    pub collections: usize,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            alias_count: 1000,
            collections: 3,
        }
    }
}

impl RuntimeSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: RuntimeSettings =
            serde_json::from_str(r#"{ "demo": { "alias_count": 10 } }"#).unwrap();
        assert_eq!(settings.demo.alias_count, 10);
        assert_eq!(settings.demo.collections, DemoSettings::default().collections);
        assert_eq!(settings.heap, HeapSettings::default());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = RuntimeSettings::load(Path::new("/nonexistent/tether.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }
}
