//! Storefront demo application.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fragment_cache::{
    api_cache_layer, ApiCacheState, ApiInterceptor, BlockInterceptor, FragmentCache, FragmentCacheConfig, KeyStore,
    StatsSnapshot,
};
use fragment_commerce::{Cart, Catalog, Product, SortOrder, CART_ROUTE, CATALOG_VERSION_FACT, MINI_CART_BLOCK, PRODUCTS_ROUTE};
use fragment_core::{BlockContext, BlockDescriptor, CacheKeyBuilder, FragmentType, Registry, RequestScope};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::info;

/// Header carrying the storefront session.
pub const SESSION_HEADER: &str = "x-session-id";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    catalog: Arc<RwLock<Catalog>>,
    carts: Arc<RwLock<HashMap<String, Cart>>>,
    blocks: BlockInterceptor,
    cache: FragmentCache,
}

impl AppState {
    async fn scope_for(&self, session: Option<&str>) -> RequestScope {
        let version = self.catalog.read().await.version().to_string();
        let scope = match session {
            Some(session) => match self.carts.read().await.get(session) {
                Some(cart) => cart.scope(),
                None => RequestScope::for_session(session),
            },
            None => RequestScope::new(),
        };
        scope.with_fact(CATALOG_VERSION_FACT, version)
    }
}

/// Registry for the demo: `/items` plus the storefront policies.
pub fn registry() -> Registry {
    let mut builder = Registry::builder();
    builder.register(FragmentType::Api, "/items", CacheKeyBuilder::new("items").all_query_params());
    fragment_commerce::register(&mut builder);
    builder.build()
}

/// Seed catalog.
pub fn sample_catalog() -> Catalog {
    Catalog::new(vec![
        Product::new("ANV-1", "Anvil", "tools", 4999),
        Product::new("HAM-1", "Hammer", "tools", 1999),
        Product::new("BLT-8", "Bolt (8 pack)", "hardware", 250),
        Product::new("NUT-8", "Nut (8 pack)", "hardware", 150),
    ])
}

/// Build the router over `store`.
pub fn build(config: &FragmentCacheConfig, store: Arc<dyn KeyStore>) -> Router {
    let registry = Arc::new(registry());
    let cache = FragmentCache::new(store, config);
    let api = ApiInterceptor::new(Arc::clone(&registry), cache.clone(), config);
    let blocks = BlockInterceptor::new(registry, cache.clone(), config);

    let state = AppState {
        catalog: Arc::new(RwLock::new(sample_catalog())),
        carts: Arc::new(RwLock::new(HashMap::new())),
        blocks,
        cache,
    };

    Router::new()
        .route("/items", get(list_items))
        .route(PRODUCTS_ROUTE, get(list_products).post(upsert_product))
        .route(CART_ROUTE, get(show_cart).post(add_to_cart))
        .route("/store/mini-cart", get(mini_cart))
        .route("/cache/stats", get(cache_stats))
        .layer(middleware::from_fn_with_state(ApiCacheState::new(api), api_cache_layer))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_scope))
        .with_state(state)
}

fn session_of(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Resolve session, cart hash and catalog version before the cache runs.
async fn resolve_scope(State(state): State<AppState>, mut request: Request<Body>, next: Next) -> Response {
    let session = session_of(request.headers()).map(str::to_string);
    let scope = state.scope_for(session.as_deref()).await;
    request.extensions_mut().insert(scope);
    next.run(request).await
}

async fn list_items(Query(query): Query<BTreeMap<String, String>>) -> Json<Value> {
    info!(?query, "listing items");
    let mut items = vec![json!({"id": 1, "price": 9}), json!({"id": 2, "price": 5})];
    if query.get("sort").map(String::as_str) == Some("price") {
        items.sort_by_key(|i| i["price"].as_i64());
    }
    Json(json!({ "items": items }))
}

#[derive(Debug, Deserialize)]
struct ProductQuery {
    category: Option<String>,
    orderby: Option<String>,
}

async fn list_products(State(state): State<AppState>, Query(query): Query<ProductQuery>) -> Json<Value> {
    let catalog = state.catalog.read().await;
    let category = query.category.as_deref().filter(|c| !c.is_empty());
    let products = catalog.list(category, SortOrder::from_query(query.orderby.as_deref()));
    info!(count = products.len(), version = catalog.version(), "listing products");
    Json(json!({ "version": catalog.version(), "products": products }))
}

async fn upsert_product(State(state): State<AppState>, Json(product): Json<Product>) -> impl IntoResponse {
    let mut catalog = state.catalog.write().await;
    catalog.upsert(product);
    (StatusCode::CREATED, Json(json!({ "version": catalog.version() })))
}

/// Empty carts share one cache entry, so their body carries nothing per-session.
async fn show_cart(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let carts = state.carts.read().await;
    let cart = session_of(&headers).and_then(|s| carts.get(s));
    Json(match cart {
        Some(cart) if !cart.is_empty() => json!({
            "session": cart.session_id,
            "items": cart.items,
            "total_cents": cart.total_cents(),
        }),
        _ => json!({ "items": [], "total_cents": 0 }),
    })
}

#[derive(Debug, Deserialize)]
struct AddToCart {
    sku: String,
    quantity: u32,
}

async fn add_to_cart(State(state): State<AppState>, headers: HeaderMap, Json(add): Json<AddToCart>) -> Response {
    let Some(session) = session_of(&headers) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing session" }))).into_response();
    };
    if add.quantity == 0 {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "quantity must be positive" }))).into_response();
    }

    let price = {
        let catalog = state.catalog.read().await;
        catalog
            .list(None, SortOrder::Name)
            .into_iter()
            .find(|p| p.sku == add.sku)
            .map(|p| p.price_cents)
    };
    let Some(price) = price else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown sku" }))).into_response();
    };

    let mut carts = state.carts.write().await;
    let cart = carts.entry(session.to_string()).or_insert_with(|| Cart::new(session));
    cart.add_item(add.sku, add.quantity, price);
    Json(json!({ "items": cart.items.len(), "total_cents": cart.total_cents() })).into_response()
}

async fn mini_cart(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let session = session_of(&headers).map(str::to_string);
    let scope = state.scope_for(session.as_deref()).await;
    let block = BlockDescriptor::new(MINI_CART_BLOCK);
    let carts = &state.carts;
    let session = session.as_deref();

    let html = state
        .blocks
        .render(BlockContext::new(&block, None, &scope), move || async move {
            let carts = carts.read().await;
            match session.and_then(|s| carts.get(s)) {
                Some(cart) if !cart.is_empty() => format!(
                    "<div class=\"mini-cart\">{} items, {} cents</div>",
                    cart.items.len(),
                    cart.total_cents()
                ),
                _ => "<div class=\"mini-cart\">Your cart is empty</div>".to_string(),
            }
        })
        .await;
    Html(html)
}

async fn cache_stats(State(state): State<AppState>) -> Response {
    let snapshot: StatsSnapshot = state.cache.stats().snapshot();
    let mut response = Json(json!({
        "stats": snapshot,
        "hit_ratio": snapshot.hit_ratio(),
    }))
    .into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use fragment_cache::MemoryStore;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    fn router() -> Router {
        let config = FragmentCacheConfig::default();
        build(&config, Arc::new(MemoryStore::new(config.memory_capacity_non_zero())))
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = router.clone().oneshot(request).await.expect("router should respond");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.expect("body should collect").to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn get(uri: &str, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, session: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    // === Products ===

    #[tokio::test]
    async fn test_products_hit_until_catalog_changes() {
        let router = router();

        let (_, first, _) = call(&router, get("/store/products?orderby=price", None)).await;
        assert!(first.contains_key("x-fragment-cache-miss"));

        let (_, second, _) = call(&router, get("/store/products?orderby=price", None)).await;
        assert_eq!(second["x-fragment-cache"], "HIT");

        let product = json!({"sku": "SAW-1", "name": "Saw", "category": "tools", "price_cents": 2999});
        let (status, _, _) = call(&router, post_json(PRODUCTS_ROUTE, None, product)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, third, body) = call(&router, get("/store/products?orderby=price", None)).await;
        assert!(third.contains_key("x-fragment-cache-miss"));
        assert_eq!(body["products"].as_array().map(Vec::len), Some(5));
    }

    // === Cart ===

    #[tokio::test]
    async fn test_cart_is_per_session() {
        let router = router();
        let add = json!({"sku": "HAM-1", "quantity": 2});

        call(&router, post_json(CART_ROUTE, Some("alice"), add.clone())).await;
        call(&router, post_json(CART_ROUTE, Some("bob"), add)).await;

        let (_, _, alice) = call(&router, get(CART_ROUTE, Some("alice"))).await;
        let (_, headers, bob) = call(&router, get(CART_ROUTE, Some("bob"))).await;

        assert_eq!(alice["session"], "alice");
        assert_eq!(bob["session"], "bob");
        assert!(headers.contains_key("x-fragment-cache-miss"));
    }

    #[tokio::test]
    async fn test_add_to_cart_requires_session() {
        let router = router();
        let (status, _, _) = call(&router, post_json(CART_ROUTE, None, json!({"sku": "HAM-1", "quantity": 1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_cart_body_is_shared_safely() {
        let router = router();

        let (status, _, _) = call(&router, post_json(CART_ROUTE, Some("dave"), json!({"sku": "HAM-1", "quantity": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, _, dave) = call(&router, get(CART_ROUTE, Some("dave"))).await;
        let (_, headers, erin) = call(&router, get(CART_ROUTE, Some("erin"))).await;

        assert_eq!(headers["x-fragment-cache"], "HIT");
        assert_eq!(erin, json!({"items": [], "total_cents": 0}));
        assert_eq!(dave, erin);
    }

    // === Blocks and stats ===

    #[tokio::test]
    async fn test_mini_cart_block_and_stats() {
        let router = router();

        for _ in 0..2 {
            let response = router.clone().oneshot(get("/store/mini-cart", Some("carol"))).await.unwrap();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&bytes[..], b"<div class=\"mini-cart\">Your cart is empty</div>");
        }

        let (_, _, stats) = call(&router, get("/cache/stats", None)).await;
        assert_eq!(stats["stats"]["hits"], 1);
        assert_eq!(stats["stats"]["misses"], 1);
        assert_eq!(stats["stats"]["writes"], 1);
    }
}
