//! Cache configuration.
//!
//! Controls the normalized store via the `[cache]` table of `gqlstore.toml`.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_MEMORY_MAX_RECORDS: usize = 10_000;
const DEFAULT_MEMORY_MAX_BYTES: usize = 16 * 1024 * 1024;

/// Normalized cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Normalize and store responses; when off the no-op cache is used.
    pub enabled: bool,
    /// Maximum records held in memory (0 = unbounded).
    pub memory_max_records: usize,
    /// Maximum weighed bytes held in memory (0 = unbounded).
    pub memory_max_bytes: usize,
    /// Directory backing the disk store, layered under the memory store.
    pub disk_directory: Option<PathBuf>,
    /// Key objects carrying `__typename` and `id` by their id.
    pub resolve_ids: bool,
    /// Prefix id keys with the typename (`Droid:2001`).
    pub typename_prefix: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_max_records: DEFAULT_MEMORY_MAX_RECORDS,
            memory_max_bytes: DEFAULT_MEMORY_MAX_BYTES,
            disk_directory: None,
            resolve_ids: true,
            typename_prefix: false,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            memory_max_records: settings.memory_max_records,
            memory_max_bytes: settings.memory_max_bytes,
            disk_directory: settings.disk_directory.clone(),
            resolve_ids: settings.resolve_ids,
            typename_prefix: settings.typename_prefix,
        }
    }
}

impl CacheConfig {
    /// Record limit for the memory store, `None` when unbounded.
    pub fn memory_record_limit(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.memory_max_records)
    }

    /// Byte limit for the memory store, `None` when unbounded.
    pub fn memory_byte_limit(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.memory_max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.memory_max_records, 10_000);
        assert_eq!(config.memory_max_bytes, 16 * 1024 * 1024);
        assert!(config.disk_directory.is_none());
        assert!(config.resolve_ids);
        assert!(!config.typename_prefix);
    }

    #[test]
    fn zero_limits_mean_unbounded() {
        let config = CacheConfig {
            memory_max_records: 0,
            memory_max_bytes: 0,
            ..Default::default()
        };
        assert!(config.memory_record_limit().is_none());
        assert!(config.memory_byte_limit().is_none());
    }

    #[test]
    fn deserializes_partial_table() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"memory_max_records": 5, "resolve_ids": false}"#)
                .expect("partial config");
        assert_eq!(config.memory_max_records, 5);
        assert!(!config.resolve_ids);
        assert!(config.enabled);
    }
}
