//! Key derivation contract.

use crate::context::DeriveContext;
use crate::key::{CacheKey, CacheKeyBuilder};

/// Computes the cache key for one fragment from the request context.
///
/// Implementations must be deterministic for equal contexts and must not
/// touch the cache. Every input that changes the produced output has to end
/// up in the key; anything left out is served across contexts.
///
/// Returning an error means "bypass the cache for this request"; it never
/// fails the request. Sentinel keys such as `cart-empty` are ordinary keys.
pub trait KeyDeriver: Send + Sync {
    /// Derive the cache key.
    fn derive(&self, ctx: &DeriveContext<'_>) -> anyhow::Result<CacheKey>;
}

impl<F> KeyDeriver for F
where
    F: Fn(&DeriveContext<'_>) -> anyhow::Result<CacheKey> + Send + Sync,
{
    fn derive(&self, ctx: &DeriveContext<'_>) -> anyhow::Result<CacheKey> {
        self(ctx)
    }
}

impl KeyDeriver for CacheKeyBuilder {
    fn derive(&self, ctx: &DeriveContext<'_>) -> anyhow::Result<CacheKey> {
        Ok(self.build(ctx)?)
    }
}

/// Pin a closure's signature so it can be registered without annotations.
///
/// ```rust,ignore
/// builder.register(FragmentType::Api, "/items", deriver_fn(|ctx| {
///     let query = ctx.query().context("items is an API route")?;
///     Ok(CacheKey::new(format!("items-{}", fingerprint_params(query)))?)
/// }));
/// ```
pub fn deriver_fn<F>(f: F) -> F
where
    F: Fn(&DeriveContext<'_>) -> anyhow::Result<CacheKey> + Send + Sync,
{
    f
}
