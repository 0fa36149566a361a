//! Diagnostic markers attached to API responses.

use fragment_core::CacheKey;
use serde::{Deserialize, Serialize};

/// Header names for cache diagnostics.
pub mod header_names {
    /// Set to `HIT` when the response came from the store.
    pub const X_FRAGMENT_CACHE: &str = "X-Fragment-Cache";
    /// Carries the derived key when the store had nothing.
    pub const X_FRAGMENT_CACHE_MISS: &str = "X-Fragment-Cache-Miss";
    /// Carries the key the finalized response was stored under.
    pub const X_FRAGMENT_CACHE_SET: &str = "X-Fragment-Cache-Set";
}

/// One diagnostic marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "marker", content = "key", rename_all = "lowercase")]
pub enum CacheMarker {
    /// Served from the store.
    Hit,
    /// Store miss for this key.
    Miss(CacheKey),
    /// Response stored under this key.
    Set(CacheKey),
}

impl CacheMarker {
    /// Header name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hit => header_names::X_FRAGMENT_CACHE,
            Self::Miss(_) => header_names::X_FRAGMENT_CACHE_MISS,
            Self::Set(_) => header_names::X_FRAGMENT_CACHE_SET,
        }
    }

    /// Header value.
    pub fn value(&self) -> &str {
        match self {
            Self::Hit => "HIT",
            Self::Miss(key) | Self::Set(key) => key.as_str(),
        }
    }

    /// As a `(name, value)` header pair.
    pub fn to_header(&self) -> (String, String) {
        (self.name().to_string(), self.value().to_string())
    }
}

/// Convert markers to header pairs.
pub fn to_headers(markers: &[CacheMarker]) -> Vec<(String, String)> {
    markers.iter().map(CacheMarker::to_header).collect()
}
