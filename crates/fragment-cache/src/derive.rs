//! Registry lookup and key derivation shared by both interceptors.
//!
//! Bypasses are counted by the caller, once per request: the block
//! pre-render step and API phase 1 record them, API phase 2 does not.

use fragment_core::{CacheKey, DeriveContext, Registry};
use tracing::{trace, warn};

/// Result of consulting the registry for one fragment.
pub(crate) enum Derivation {
    /// Not registered; take the normal path without touching the store.
    Unregistered,
    /// Deriver failed; take the normal path without touching the store.
    Bypass,
    /// Registered, with the key for this request.
    Key(CacheKey),
}

pub(crate) fn derive_key(registry: &Registry, ctx: &DeriveContext<'_>) -> Derivation {
    let fragment_type = ctx.fragment_type();
    let name = ctx.fragment_name();

    let Some(deriver) = registry.lookup(fragment_type, name.as_str()) else {
        trace!(fragment = %fragment_type, name = %name, "fragment not cacheable");
        return Derivation::Unregistered;
    };

    match deriver.derive(ctx) {
        Ok(key) => Derivation::Key(key),
        Err(err) => {
            warn!(
                fragment = %fragment_type,
                name = %name,
                error = %err,
                "key derivation failed, bypassing cache"
            );
            Derivation::Bypass
        }
    }
}
