//! Two-phase API response interception.
//!
//! Phase 1 ([`ApiInterceptor::pre_dispatch`]) runs before the route handler
//! and may short-circuit it with a stored body. Phase 2
//! ([`ApiInterceptor::on_response`]) runs on the finalized response and
//! stores it.

use std::sync::Arc;

use bytes::Bytes;
use fragment_core::{ApiRequest, DeriveContext, FragmentType, Registry};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::{ApiWritePolicy, FragmentCacheConfig};
use crate::derive::{derive_key, Derivation};
use crate::fragment::{CacheStatus, FragmentCache};
use crate::headers::CacheMarker;

/// A finalized (or cached) API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Extra response headers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: serde_json::Value,
}

impl ApiResponse {
    /// Response with an explicit status.
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// `200 OK` response.
    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(200, body)
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Stored form of an API response: status and JSON body.
#[derive(Debug, Serialize, Deserialize)]
struct StoredResponse<B = serde_json::Value> {
    status: u16,
    body: B,
}

/// Phase 1 decision.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchDecision {
    /// An earlier hook already produced a response; it is returned unchanged.
    Upstream(ApiResponse),
    /// Served from the store; the route handler must not run.
    Cached(ApiResponse),
    /// Run the route handler. Markers go on the eventual response.
    Dispatch {
        /// `Miss` for a registered route not in the store, `Bypass` otherwise.
        status: CacheStatus,
        /// Diagnostic markers (the miss marker, when enabled).
        markers: Vec<CacheMarker>,
    },
}

impl DispatchDecision {
    fn bypass() -> Self {
        Self::Dispatch {
            status: CacheStatus::Bypass,
            markers: Vec::new(),
        }
    }

    /// The short-circuit response, if any.
    pub fn into_response(self) -> Option<ApiResponse> {
        match self {
            Self::Upstream(response) | Self::Cached(response) => Some(response),
            Self::Dispatch { .. } => None,
        }
    }

    /// Cache status of this decision. Upstream results count as bypass.
    pub fn status(&self) -> CacheStatus {
        match self {
            Self::Cached(_) => CacheStatus::Hit,
            Self::Dispatch { status, .. } => *status,
            Self::Upstream(_) => CacheStatus::Bypass,
        }
    }
}

/// Serves registered API routes from the store and fills it after dispatch.
#[derive(Clone)]
pub struct ApiInterceptor {
    registry: Arc<Registry>,
    cache: FragmentCache,
    namespace: String,
    config: Arc<FragmentCacheConfig>,
}

impl ApiInterceptor {
    /// Create an interceptor over a frozen registry.
    pub fn new(registry: Arc<Registry>, cache: FragmentCache, config: &FragmentCacheConfig) -> Self {
        Self {
            registry,
            cache,
            namespace: FragmentType::Api.namespace(&config.namespace),
            config: Arc::new(config.clone()),
        }
    }

    /// Store namespace for API entries.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Store client (and its counters).
    pub fn cache(&self) -> &FragmentCache {
        &self.cache
    }

    /// Configuration in effect.
    pub fn config(&self) -> &FragmentCacheConfig {
        &self.config
    }

    fn derive(&self, request: &ApiRequest) -> Derivation {
        if !self.config.enabled {
            return Derivation::Unregistered;
        }
        derive_key(&self.registry, &DeriveContext::Api(request))
    }

    /// Phase 1: runs before the route handler.
    #[instrument(skip_all, fields(route = %request.route, method = %request.method))]
    pub async fn pre_dispatch(&self, upstream: Option<ApiResponse>, request: &ApiRequest) -> DispatchDecision {
        if let Some(response) = upstream {
            return DispatchDecision::Upstream(response);
        }

        let key = match self.derive(request) {
            Derivation::Key(key) => key,
            Derivation::Unregistered => return DispatchDecision::bypass(),
            Derivation::Bypass => {
                self.cache.stats().record_bypass();
                return DispatchDecision::bypass();
            }
        };

        if let Some(bytes) = self.cache.get(&key, &self.namespace).await {
            match serde_json::from_slice::<StoredResponse>(&bytes) {
                Ok(stored) => {
                    self.cache.stats().record_hit();
                    debug!(
                        fragment = "api",
                        key = %key,
                        status = stored.status,
                        outcome = "hit",
                        "serving cached response"
                    );
                    let mut response = ApiResponse::new(stored.status, stored.body);
                    if self.config.emit_markers {
                        let (name, value) = CacheMarker::Hit.to_header();
                        response = response.with_header(name, value);
                    }
                    return DispatchDecision::Cached(response);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "cached response cannot be decoded, dispatching");
                }
            }
        }

        self.cache.stats().record_miss();
        debug!(fragment = "api", key = %key, outcome = "miss", "dispatching to handler");
        let markers = if self.config.emit_markers {
            vec![CacheMarker::Miss(key)]
        } else {
            Vec::new()
        };
        DispatchDecision::Dispatch {
            status: CacheStatus::Miss,
            markers,
        }
    }

    /// Phase 2: runs on the finalized response. Re-derives the key from the
    /// request and stores the status and body. Returns the set marker when a
    /// write happened and markers are enabled.
    ///
    /// A deriver failure here was already counted as a bypass in phase 1.
    #[instrument(skip_all, fields(route = %request.route, status = response.status))]
    pub async fn on_response(&self, response: &ApiResponse, request: &ApiRequest) -> Option<CacheMarker> {
        let Derivation::Key(key) = self.derive(request) else {
            return None;
        };

        if !response.is_success() && !self.config.store_error_responses {
            debug!(key = %key, status = response.status, "not storing error response");
            return None;
        }

        if self.config.api_write_policy == ApiWritePolicy::OnlyIfPrimed && !self.cache.exists(&key, "").await {
            debug!(key = %key, "key not primed, skipping store");
            return None;
        }

        let stored = StoredResponse {
            status: response.status,
            body: &response.body,
        };
        let payload = match serde_json::to_vec(&stored) {
            Ok(payload) => Bytes::from(payload),
            Err(err) => {
                warn!(key = %key, error = %err, "failed to serialize response body");
                return None;
            }
        };

        let stored = self.cache.set(&key, payload, &self.namespace).await;
        (stored && self.config.emit_markers).then(|| CacheMarker::Set(key))
    }
}
