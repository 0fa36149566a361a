//! Core abstractions for fragment caching.
//!
//! This crate provides the fundamental types and traits:
//! - `FragmentType` / `FragmentName` - What is being cached
//! - `CacheKey` - Validated, opaque cache key
//! - `KeyDeriver` trait - Per-fragment key derivation
//! - `BlockContext` / `ApiRequest` / `RequestScope` - Inputs a deriver may read
//! - `Registry` - Immutable (type, name) -> deriver table built at startup

mod context;
mod deriver;
mod fragment;
mod key;
mod registry;

pub use context::*;
pub use deriver::*;
pub use fragment::*;
pub use key::*;
pub use registry::*;
