//! Fragment caching for content blocks and API responses.
//!
//! This crate provides:
//! - `KeyStore` - The external byte store seam, plus the in-process `MemoryStore`
//! - `FragmentCache` - Timeout-bounded store client that absorbs failures
//! - `BlockInterceptor` - Pre/post-render hooks for content blocks
//! - `ApiInterceptor` - Pre-dispatch and response hooks for API routes
//! - `api_cache_layer` - axum middleware driving the API hooks
//! - `FragmentCacheConfig` - TOML configuration
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fragment_cache::{ApiInterceptor, FragmentCache, FragmentCacheConfig, MemoryStore};
//! use fragment_core::{deriver_fn, fingerprint_params, CacheKey, FragmentType, Registry};
//!
//! let mut builder = Registry::builder();
//! builder.register(FragmentType::Api, "/items", deriver_fn(|ctx| {
//!     let params = ctx.query().cloned().unwrap_or_default();
//!     Ok(CacheKey::new(format!("items-{}", fingerprint_params(&params)))?)
//! }));
//!
//! let config = FragmentCacheConfig::default();
//! let store = Arc::new(MemoryStore::new(config.memory_capacity_non_zero()));
//! let cache = FragmentCache::new(store, &config);
//! let api = ApiInterceptor::new(Arc::new(builder.build()), cache, &config);
//! ```

mod api;
mod block;
mod config;
mod derive;
mod error;
mod fragment;
mod headers;
mod layer;
mod stats;
mod store;
pub mod telemetry;

pub use api::*;
pub use block::*;
pub use config::*;
pub use error::*;
pub use fragment::*;
pub use headers::*;
pub use layer::*;
pub use stats::*;
pub use store::*;
