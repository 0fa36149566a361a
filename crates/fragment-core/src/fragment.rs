//! Fragment identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The family a cacheable fragment belongs to.
///
/// Each family has its own registry table and its own store namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentType {
    /// A structural content block, keyed by block type name.
    Block,
    /// An API response, keyed by route path.
    Api,
}

impl FragmentType {
    /// Lowercase label used in logs, config and namespaces.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Api => "api",
        }
    }

    /// Store namespace for this family under `base`.
    pub fn namespace(&self, base: &str) -> String {
        format!("{}:{}", base, self.as_str())
    }
}

impl fmt::Display for FragmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown fragment type string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown fragment type: {0:?} (expected \"block\" or \"api\")")]
pub struct FragmentTypeError(pub String);

impl FromStr for FragmentType {
    type Err = FragmentTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Self::Block),
            "api" => Ok(Self::Api),
            other => Err(FragmentTypeError(other.to_string())),
        }
    }
}

/// Fragment name: a block type name (`core/latest-posts`) or a route
/// path (`/store/products`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentName(String);

impl FragmentName {
    /// Create a fragment name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FragmentName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FragmentName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for FragmentName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_type_parse() {
        assert_eq!("block".parse::<FragmentType>(), Ok(FragmentType::Block));
        assert_eq!("api".parse::<FragmentType>(), Ok(FragmentType::Api));
        assert!("blocks".parse::<FragmentType>().is_err());
        assert!("API".parse::<FragmentType>().is_err());
    }

    #[test]
    fn test_fragment_type_namespaces_differ() {
        let block = FragmentType::Block.namespace("fragment-cache");
        let api = FragmentType::Api.namespace("fragment-cache");
        assert_eq!(block, "fragment-cache:block");
        assert_eq!(api, "fragment-cache:api");
        assert_ne!(block, api);
    }

    #[test]
    fn test_fragment_name_display() {
        let name = FragmentName::new("/store/products");
        assert_eq!(name.to_string(), "/store/products");
        assert_eq!(name.as_str(), "/store/products");
    }
}
