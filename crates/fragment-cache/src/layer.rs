//! axum middleware running the API interceptor around route handlers.
//!
//! ```rust,ignore
//! let state = ApiCacheState::new(interceptor);
//! let app = Router::new()
//!     .route("/items", get(list_items))
//!     .layer(axum::middleware::from_fn_with_state(state, api_cache_layer));
//! ```
//!
//! Only GET requests are intercepted. A [`RequestScope`] placed in the
//! request extensions by an earlier layer is handed to key derivers.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use fragment_core::{ApiRequest, RequestScope};
use futures::{future, stream};
use http::{header, response::Parts, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use tracing::{debug, instrument, warn};

use crate::api::{ApiInterceptor, ApiResponse, DispatchDecision};
use crate::headers::CacheMarker;

/// Shared state for [`api_cache_layer`].
#[derive(Clone)]
pub struct ApiCacheState {
    interceptor: Arc<ApiInterceptor>,
}

impl ApiCacheState {
    /// Wrap an interceptor.
    pub fn new(interceptor: ApiInterceptor) -> Self {
        Self {
            interceptor: Arc::new(interceptor),
        }
    }

    /// The wrapped interceptor.
    pub fn interceptor(&self) -> &ApiInterceptor {
        &self.interceptor
    }
}

/// Serve registered GET routes from the store and store their JSON bodies.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn api_cache_layer(
    State(state): State<ApiCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let api_request = to_api_request(&request);
    let markers = match state.interceptor.pre_dispatch(None, &api_request).await {
        DispatchDecision::Cached(cached) | DispatchDecision::Upstream(cached) => {
            return build_response(cached);
        }
        DispatchDecision::Dispatch { markers, .. } => markers,
    };

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();

    let max = state.interceptor.config().max_body_bytes;
    let fits = body.size_hint().upper().is_some_and(|upper| upper <= max as u64);
    if !is_json(&parts.headers) || !fits {
        debug!(status = parts.status.as_u16(), "response not storable, passing through");
        apply_markers(&mut parts.headers, &markers);
        return Response::from_parts(parts, body);
    }

    let bytes = match axum::body::to_bytes(body, max).await {
        Ok(bytes) => bytes,
        Err(err) => return body_failed(parts, &markers, err),
    };

    let mut markers = markers;
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&bytes) {
        let finalized = ApiResponse::new(parts.status.as_u16(), json);
        if let Some(marker) = state.interceptor.on_response(&finalized, &api_request).await {
            markers.push(marker);
        }
    }

    apply_markers(&mut parts.headers, &markers);
    Response::from_parts(parts, Body::from(bytes))
}

/// Nothing is stored; the client sees the handler's status and the body error.
fn body_failed(mut parts: Parts, markers: &[CacheMarker], err: axum::Error) -> Response {
    warn!(status = parts.status.as_u16(), error = %err, "response body failed, not storing");
    apply_markers(&mut parts.headers, markers);
    parts.headers.remove(header::CONTENT_LENGTH);
    let body = Body::from_stream(stream::once(future::ready(Err::<Bytes, _>(err))));
    Response::from_parts(parts, body)
}

fn to_api_request(request: &Request<Body>) -> ApiRequest {
    let mut api_request = ApiRequest::get(request.uri().path());

    if let Some(query) = request.uri().query() {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            api_request = api_request.with_query(name, value);
        }
    }

    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            api_request = api_request.with_header(name.as_str(), value);
        }
    }

    if let Some(scope) = request.extensions().get::<RequestScope>() {
        api_request = api_request.with_scope(scope.clone());
    }

    api_request
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

fn apply_markers(headers: &mut HeaderMap, markers: &[CacheMarker]) {
    for marker in markers {
        let (name, value) = marker.to_header();
        insert_header(headers, &name, &value);
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
        headers.insert(name, value);
    }
}

fn build_response(cached: ApiResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = (status, Json(cached.body)).into_response();
    for (name, value) in &cached.headers {
        insert_header(response.headers_mut(), name, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_api_request_parses_query_and_headers() {
        let request = Request::builder()
            .uri("/items?sort=price&tag=a%20b")
            .header("X-Currency", "EUR")
            .body(Body::empty())
            .unwrap();

        let api_request = to_api_request(&request);
        assert_eq!(api_request.route.as_str(), "/items");
        assert_eq!(api_request.query_param("sort"), Some("price"));
        assert_eq!(api_request.query_param("tag"), Some("a b"));
        assert_eq!(api_request.header("x-currency"), Some("EUR"));
        assert_eq!(api_request.scope, RequestScope::default());
    }

    #[test]
    fn test_to_api_request_takes_scope_from_extensions() {
        let mut request = Request::builder().uri("/store/cart").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(RequestScope::for_session("s-1").with_fact("cart_hash", "abc"));

        let api_request = to_api_request(&request);
        assert_eq!(api_request.scope.session_id(), Some("s-1"));
        assert_eq!(api_request.scope.fact("cart_hash"), Some("abc"));
    }

    #[test]
    fn test_is_json() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(is_json(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert!(!is_json(&headers));
    }

    #[tokio::test]
    async fn test_body_failure_keeps_status_and_markers() {
        let (parts, _) = http::Response::builder()
            .status(StatusCode::CREATED)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, "12")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let key = fragment_core::CacheKey::new("items-1").unwrap();

        let response = body_failed(parts, &[CacheMarker::Miss(key)], axum::Error::new("connection reset"));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-fragment-cache-miss"], "items-1");
        assert!(!response.headers().contains_key(header::CONTENT_LENGTH));
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX).await.is_err());
    }

    #[test]
    fn test_build_response_keeps_marker() {
        let response = build_response(
            ApiResponse::ok(serde_json::json!({"items": []})).with_header("X-Fragment-Cache", "HIT"),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-fragment-cache"], "HIT");
        assert!(is_json(response.headers()));
    }
}
