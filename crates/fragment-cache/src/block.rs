//! Block render interception.
//!
//! The host rendering engine calls [`BlockInterceptor::pre_render`] before
//! producing a block. A hit hands back the stored HTML and the block's
//! producer must not run. A miss hands back a [`PendingBlockWrite`] that the
//! host passes to [`BlockInterceptor::post_render`] with the produced output.
//! [`BlockInterceptor::render`] wraps both steps around a producer.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use fragment_core::{BlockContext, CacheKey, DeriveContext, FragmentName, FragmentType, Registry};
use tracing::{debug, instrument, warn};

use crate::config::FragmentCacheConfig;
use crate::derive::{derive_key, Derivation};
use crate::fragment::{CacheStatus, FragmentCache};

/// Pre-render decision.
#[derive(Debug)]
pub enum PreRender {
    /// Substitute this output; skip production entirely.
    Cached(String),
    /// Produce normally. On a miss the token must be handed to
    /// [`BlockInterceptor::post_render`] once output exists.
    Proceed(Option<PendingBlockWrite>),
}

impl PreRender {
    /// Status for logs and diagnostics.
    pub fn status(&self) -> CacheStatus {
        match self {
            Self::Cached(_) => CacheStatus::Hit,
            Self::Proceed(Some(_)) => CacheStatus::Miss,
            Self::Proceed(None) => CacheStatus::Bypass,
        }
    }
}

/// One-shot store intent for a single block invocation.
///
/// Carries the key computed before rendering so the write uses exactly that
/// key. Dropping it without calling `post_render` stores nothing.
#[derive(Debug)]
#[must_use = "pass to BlockInterceptor::post_render or the output is not cached"]
pub struct PendingBlockWrite {
    key: CacheKey,
    block: FragmentName,
}

impl PendingBlockWrite {
    /// Key the output will be stored under.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Name of the block being rendered.
    pub fn block(&self) -> &FragmentName {
        &self.block
    }
}

/// Serves registered blocks from the store and fills it on miss.
#[derive(Clone)]
pub struct BlockInterceptor {
    registry: Arc<Registry>,
    cache: FragmentCache,
    namespace: String,
    enabled: bool,
}

impl BlockInterceptor {
    /// Create an interceptor over a frozen registry.
    pub fn new(registry: Arc<Registry>, cache: FragmentCache, config: &FragmentCacheConfig) -> Self {
        Self {
            registry,
            cache,
            namespace: FragmentType::Block.namespace(&config.namespace),
            enabled: config.enabled,
        }
    }

    /// Store namespace for block entries.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Store client (and its counters).
    pub fn cache(&self) -> &FragmentCache {
        &self.cache
    }

    /// Check the store before a block renders.
    #[instrument(skip_all, fields(block = %ctx.block.name))]
    pub async fn pre_render(&self, ctx: BlockContext<'_>) -> PreRender {
        if !self.enabled {
            return PreRender::Proceed(None);
        }

        let key = match derive_key(&self.registry, &DeriveContext::Block(ctx)) {
            Derivation::Key(key) => key,
            Derivation::Unregistered => return PreRender::Proceed(None),
            Derivation::Bypass => {
                self.cache.stats().record_bypass();
                return PreRender::Proceed(None);
            }
        };

        if let Some(bytes) = self.cache.get(&key, &self.namespace).await {
            match String::from_utf8(bytes.to_vec()) {
                Ok(html) => {
                    self.cache.stats().record_hit();
                    debug!(fragment = "block", key = %key, outcome = "hit", "serving cached block");
                    return PreRender::Cached(html);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "cached block is not valid UTF-8, re-rendering");
                }
            }
        }

        self.cache.stats().record_miss();
        debug!(fragment = "block", key = %key, outcome = "miss", "rendering block");
        PreRender::Proceed(Some(PendingBlockWrite {
            key,
            block: ctx.block.name.clone(),
        }))
    }

    /// Store the output produced after a miss. Returns whether it was stored.
    #[instrument(skip_all, fields(block = %pending.block, key = %pending.key))]
    pub async fn post_render(&self, pending: PendingBlockWrite, output: &str) -> bool {
        self.cache
            .set(&pending.key, Bytes::copy_from_slice(output.as_bytes()), &self.namespace)
            .await
    }

    /// Render through the cache: serve a hit, or run `producer` and store
    /// its output.
    pub async fn render<F, Fut>(&self, ctx: BlockContext<'_>, producer: F) -> String
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = String>,
    {
        match self.pre_render(ctx).await {
            PreRender::Cached(html) => html,
            PreRender::Proceed(pending) => {
                let output = producer().await;
                if let Some(pending) = pending {
                    self.post_render(pending, &output).await;
                }
                output
            }
        }
    }

    /// Like [`render`](Self::render) for fallible producers. Errors are
    /// returned unchanged and nothing is stored.
    pub async fn try_render<F, Fut, E>(&self, ctx: BlockContext<'_>, producer: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        match self.pre_render(ctx).await {
            PreRender::Cached(html) => Ok(html),
            PreRender::Proceed(pending) => {
                let output = producer().await?;
                if let Some(pending) = pending {
                    self.post_render(pending, &output).await;
                }
                Ok(output)
            }
        }
    }
}
