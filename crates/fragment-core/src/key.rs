//! Cache key composition.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::context::DeriveContext;

/// Maximum key length in bytes, matching common memcached-style stores.
pub const MAX_KEY_LEN: usize = 250;

/// Separator between fingerprinted parts.
const PART_SEPARATOR: u8 = 0x1f;

/// Reasons a derived key is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The deriver returned an empty string.
    #[error("cache key is empty")]
    Empty,

    /// The key exceeds [`MAX_KEY_LEN`].
    #[error("cache key is {0} bytes, longer than the {MAX_KEY_LEN} byte limit")]
    TooLong(usize),

    /// The key contains whitespace or control characters.
    #[error("cache key contains a control or whitespace character at byte {0}")]
    InvalidChar(usize),
}

/// An opaque, validated cache key.
///
/// No structure is imposed beyond validation, but a key must embed every
/// input that affects the cached output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a cache key, validating it.
    pub fn new(key: impl Into<String>) -> Result<Self, KeyError> {
        let key = key.into();
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(KeyError::TooLong(key.len()));
        }
        if let Some((idx, _)) = key
            .char_indices()
            .find(|(_, c)| c.is_control() || c.is_whitespace())
        {
            return Err(KeyError::InvalidChar(idx));
        }
        Ok(Self(key))
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

// ============================================================================
// Fingerprints
// ============================================================================

/// Stable hex fingerprint (128 bits of SHA-256) of the given parts.
///
/// Stable across processes and builds, so keys stay valid in a shared store.
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
        hasher.update([PART_SEPARATOR]);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Fingerprint of query parameters, sorted by name, with empty values dropped.
pub fn fingerprint_params(params: &BTreeMap<String, String>) -> String {
    fingerprint(
        params
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{}={}", k, v)),
    )
}

// ============================================================================
// Builder
// ============================================================================

/// Component of a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyComponent {
    /// The fragment name (route path or block name).
    Fragment,
    /// Specific query parameters.
    QueryParams(Vec<String>),
    /// All non-empty query parameters.
    AllQueryParams,
    /// A request header.
    Header(String),
    /// The session id from the request scope.
    Session,
    /// A resolved fact from the request scope.
    Fact(String),
    /// Block attributes (and parent block name, if any).
    BlockAttrs,
    /// Custom static value.
    Custom(String),
}

/// Builder composing `<prefix>-<fingerprint>` keys from a derive context.
///
/// Missing inputs are still fingerprinted (as `-`) so that "absent" and
/// "present" never share a key.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    prefix: String,
    components: Vec<KeyComponent>,
}

impl CacheKeyBuilder {
    /// Create a builder with a readable key prefix, e.g. `all-products`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            components: Vec::new(),
        }
    }

    /// Include the fragment name.
    pub fn fragment(mut self) -> Self {
        self.components.push(KeyComponent::Fragment);
        self
    }

    /// Include specific query parameters.
    pub fn query_params(mut self, params: &[&str]) -> Self {
        self.components.push(KeyComponent::QueryParams(
            params.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Include all non-empty query parameters.
    pub fn all_query_params(mut self) -> Self {
        self.components.push(KeyComponent::AllQueryParams);
        self
    }

    /// Include a header value.
    pub fn header(mut self, name: impl Into<String>) -> Self {
        self.components.push(KeyComponent::Header(name.into()));
        self
    }

    /// Include the session id.
    pub fn session(mut self) -> Self {
        self.components.push(KeyComponent::Session);
        self
    }

    /// Include a resolved scope fact.
    pub fn fact(mut self, name: impl Into<String>) -> Self {
        self.components.push(KeyComponent::Fact(name.into()));
        self
    }

    /// Include block attributes.
    pub fn block_attrs(mut self) -> Self {
        self.components.push(KeyComponent::BlockAttrs);
        self
    }

    /// Include a custom static value.
    pub fn custom(mut self, value: impl Into<String>) -> Self {
        self.components.push(KeyComponent::Custom(value.into()));
        self
    }

    /// Build the cache key from context.
    pub fn build(&self, ctx: &DeriveContext<'_>) -> Result<CacheKey, KeyError> {
        let mut parts: Vec<String> = Vec::with_capacity(self.components.len());

        for component in &self.components {
            match component {
                KeyComponent::Fragment => {
                    parts.push(format!("f:{}", ctx.fragment_name()));
                }
                KeyComponent::QueryParams(names) => {
                    let query = ctx.query();
                    for name in names {
                        let value = query
                            .and_then(|q| q.get(name))
                            .filter(|v| !v.is_empty())
                            .map(String::as_str)
                            .unwrap_or("-");
                        parts.push(format!("q:{}={}", name, value));
                    }
                }
                KeyComponent::AllQueryParams => {
                    let hash = ctx
                        .query()
                        .map(fingerprint_params)
                        .unwrap_or_else(|| "-".to_string());
                    parts.push(format!("q:*={}", hash));
                }
                KeyComponent::Header(name) => {
                    let value = ctx
                        .as_api()
                        .and_then(|req| req.header(name))
                        .unwrap_or("-");
                    parts.push(format!("h:{}={}", name.to_ascii_lowercase(), value));
                }
                KeyComponent::Session => {
                    let session = ctx.scope().session_id().unwrap_or("-");
                    parts.push(format!("s:{}", session));
                }
                KeyComponent::Fact(name) => {
                    let value = ctx.scope().fact(name).unwrap_or("-");
                    parts.push(format!("v:{}={}", name, value));
                }
                KeyComponent::BlockAttrs => {
                    let attrs = ctx
                        .as_block()
                        .map(|b| {
                            let parent = b.parent.map(|p| p.name.as_str()).unwrap_or("-");
                            format!("{}|{}", b.block.attrs, parent)
                        })
                        .unwrap_or_else(|| "-".to_string());
                    parts.push(format!("b:{}", attrs));
                }
                KeyComponent::Custom(value) => {
                    parts.push(format!("c:{}", value));
                }
            }
        }

        CacheKey::new(format!("{}-{}", self.prefix, fingerprint(&parts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ApiRequest, RequestScope};

    // === Validation Tests ===

    #[test]
    fn test_cache_key_accepts_sentinels() {
        assert_eq!(CacheKey::new("cart-empty").unwrap().as_str(), "cart-empty");
    }

    #[test]
    fn test_cache_key_rejects_empty() {
        assert_eq!(CacheKey::new(""), Err(KeyError::Empty));
    }

    #[test]
    fn test_cache_key_rejects_too_long() {
        let long = "k".repeat(MAX_KEY_LEN + 1);
        assert_eq!(CacheKey::new(long), Err(KeyError::TooLong(MAX_KEY_LEN + 1)));
        assert!(CacheKey::new("k".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn test_cache_key_rejects_whitespace() {
        assert_eq!(CacheKey::new("cart 1"), Err(KeyError::InvalidChar(4)));
        assert_eq!(CacheKey::new("cart\n"), Err(KeyError::InvalidChar(4)));
    }

    #[test]
    fn test_cache_key_serde_validates() {
        let ok: CacheKey = serde_json::from_str("\"items-1\"").unwrap();
        assert_eq!(ok.as_str(), "items-1");
        assert!(serde_json::from_str::<CacheKey>("\"\"").is_err());
    }

    // === Fingerprint Tests ===

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(["a", "b"]), fingerprint(["a", "b"]));
        assert_eq!(fingerprint(["a", "b"]).len(), 32);
        assert_ne!(fingerprint(["ab"]), fingerprint(["a", "b"]));
    }

    #[test]
    fn test_fingerprint_params_ignores_order_and_empty_values() {
        let mut a = BTreeMap::new();
        a.insert("sort".to_string(), "price".to_string());
        a.insert("page".to_string(), "2".to_string());

        let mut b = BTreeMap::new();
        b.insert("page".to_string(), "2".to_string());
        b.insert("sort".to_string(), "price".to_string());
        b.insert("filter".to_string(), String::new());

        assert_eq!(fingerprint_params(&a), fingerprint_params(&b));

        b.insert("sort".to_string(), "name".to_string());
        assert_ne!(fingerprint_params(&a), fingerprint_params(&b));
    }

    // === Builder Tests ===

    #[test]
    fn test_builder_prefix_and_query() {
        let builder = CacheKeyBuilder::new("items").all_query_params();
        let req = ApiRequest::get("/items").with_query("sort", "price");
        let key = builder.build(&DeriveContext::Api(&req)).unwrap();
        assert!(key.as_str().starts_with("items-"));

        let same = ApiRequest::get("/items").with_query("sort", "price");
        assert_eq!(key, builder.build(&DeriveContext::Api(&same)).unwrap());

        let other = ApiRequest::get("/items").with_query("sort", "name");
        assert_ne!(key, builder.build(&DeriveContext::Api(&other)).unwrap());
    }

    #[test]
    fn test_builder_missing_session_differs_from_present() {
        let builder = CacheKeyBuilder::new("cart").session();
        let anon = ApiRequest::get("/cart");
        let known = ApiRequest::get("/cart").with_scope(RequestScope::for_session("abc"));

        let k1 = builder.build(&DeriveContext::Api(&anon)).unwrap();
        let k2 = builder.build(&DeriveContext::Api(&known)).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_builder_fact_changes_key() {
        let builder = CacheKeyBuilder::new("all-products").fact("catalog_version");
        let v1 = ApiRequest::get("/p").with_scope(RequestScope::new().with_fact("catalog_version", "1"));
        let v2 = ApiRequest::get("/p").with_scope(RequestScope::new().with_fact("catalog_version", "2"));

        assert_ne!(
            builder.build(&DeriveContext::Api(&v1)).unwrap(),
            builder.build(&DeriveContext::Api(&v2)).unwrap()
        );
    }

    #[test]
    fn test_builder_prefix_with_space_is_rejected() {
        let builder = CacheKeyBuilder::new("bad prefix");
        let req = ApiRequest::get("/x");
        assert!(matches!(
            builder.build(&DeriveContext::Api(&req)),
            Err(KeyError::InvalidChar(_))
        ));
    }
}
