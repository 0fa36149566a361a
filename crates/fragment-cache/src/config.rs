//! Fragment cache configuration.
//!
//! Loaded from TOML, either at top level or under a `[fragment_cache]`
//! table:
//!
//! ```toml
//! [fragment_cache]
//! namespace = "storefront"
//! store_timeout_ms = 50
//! api_write_policy = "always"
//!
//! [fragment_cache.logging]
//! level = "debug"
//! format = "json"
//! ```

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

const DEFAULT_NAMESPACE: &str = "fragment-cache";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 100;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_MEMORY_CAPACITY: usize = 1024;
const CONFIG_TABLE: &str = "fragment_cache";

/// When the API response hook writes to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiWritePolicy {
    /// Store every finalized response for a registered route.
    #[default]
    Always,
    /// Store only when the unqualified key is already present in the store.
    OnlyIfPrimed,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines for log aggregation.
    Json,
    /// Compact human-readable lines.
    #[default]
    Compact,
}

/// Tracing setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Fragment cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentCacheConfig {
    /// Master switch; when off, nothing is looked up or stored.
    pub enabled: bool,
    /// Base store namespace. Block and API entries get their own suffix.
    pub namespace: String,
    /// Upper bound for a single store get/set.
    pub store_timeout_ms: u64,
    /// Emit diagnostic headers on API responses.
    pub emit_markers: bool,
    /// When the API response hook stores.
    pub api_write_policy: ApiWritePolicy,
    /// Also store non-2xx API responses.
    pub store_error_responses: bool,
    /// Largest response body the HTTP adapter will buffer for storage.
    pub max_body_bytes: usize,
    /// Entry capacity of the bundled in-memory store.
    pub memory_capacity: usize,
    /// Tracing setup.
    pub logging: LoggingConfig,
}

impl Default for FragmentCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            emit_markers: true,
            api_write_policy: ApiWritePolicy::default(),
            store_error_responses: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

impl FragmentCacheConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(content: &str) -> CacheResult<Self> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| CacheError::Config(format!("invalid TOML: {}", e)))?;

        let config = match table.get(CONFIG_TABLE) {
            Some(section) => section.clone().try_into::<Self>(),
            None => toml::Value::Table(table).try_into::<Self>(),
        }
        .map_err(|e| CacheError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> CacheResult<()> {
        if self.namespace.is_empty() || self.namespace.chars().any(char::is_whitespace) {
            return Err(CacheError::Config(format!(
                "namespace must be non-empty without whitespace, got {:?}",
                self.namespace
            )));
        }
        if self.store_timeout_ms == 0 {
            return Err(CacheError::Config("store_timeout_ms must be positive".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(CacheError::Config("max_body_bytes must be positive".into()));
        }
        Ok(())
    }

    /// Store timeout as a duration.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Memory store capacity, clamped to at least one entry.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
