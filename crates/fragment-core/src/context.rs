//! Inputs a key deriver is allowed to read.
//!
//! Derivers never reach into ambient state. Everything that can influence a
//! key (session, catalog version, cart hash, ...) is resolved by the host
//! before interception and handed over through [`RequestScope`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fragment::{FragmentName, FragmentType};

/// Facts about the current request resolved before any cache lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestScope {
    /// Session identifier, if the request has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Named facts (e.g. `catalog_version`, `cart_hash`).
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
}

impl RequestScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope bound to a session.
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            facts: BTreeMap::new(),
        }
    }

    /// Add a resolved fact.
    pub fn with_fact(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.facts.insert(name.into(), value.into());
        self
    }

    /// Get the session id.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Get a fact by name.
    pub fn fact(&self, name: &str) -> Option<&str> {
        self.facts.get(name).map(String::as_str)
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// A parsed structural content block as seen by the rendering pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Block type name, e.g. `store/product-grid`.
    pub name: FragmentName,
    /// Block attributes.
    #[serde(default)]
    pub attrs: serde_json::Value,
}

impl BlockDescriptor {
    /// Create a block descriptor without attributes.
    pub fn new(name: impl Into<FragmentName>) -> Self {
        Self {
            name: name.into(),
            attrs: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the block attributes.
    pub fn with_attrs(mut self, attrs: serde_json::Value) -> Self {
        self.attrs = attrs;
        self
    }

    /// Get a single attribute.
    pub fn attr(&self, name: &str) -> Option<&serde_json::Value> {
        self.attrs.get(name)
    }
}

/// Render-time context for one block invocation.
#[derive(Debug, Clone, Copy)]
pub struct BlockContext<'a> {
    /// The block being rendered.
    pub block: &'a BlockDescriptor,
    /// The enclosing block, if any.
    pub parent: Option<&'a BlockDescriptor>,
    /// Request facts.
    pub scope: &'a RequestScope,
}

impl<'a> BlockContext<'a> {
    /// Create a block context.
    pub fn new(
        block: &'a BlockDescriptor,
        parent: Option<&'a BlockDescriptor>,
        scope: &'a RequestScope,
    ) -> Self {
        Self {
            block,
            parent,
            scope,
        }
    }
}

// ============================================================================
// API requests
// ============================================================================

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    /// Parse an HTTP method name (case-insensitive).
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        };
        f.write_str(s)
    }
}

/// A parsed API request handed to the dispatch hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Route path; the registry lookup key for API fragments.
    pub route: FragmentName,
    /// Query string parameters.
    pub query: BTreeMap<String, String>,
    /// Request headers, names lowercased.
    pub headers: BTreeMap<String, String>,
    /// Request facts.
    pub scope: RequestScope,
}

impl ApiRequest {
    /// Create a request.
    pub fn new(method: Method, route: impl Into<FragmentName>) -> Self {
        Self {
            method,
            route: route.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            scope: RequestScope::default(),
        }
    }

    /// Create a GET request.
    pub fn get(route: impl Into<FragmentName>) -> Self {
        Self::new(Method::Get, route)
    }

    /// Add a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set the request scope.
    pub fn with_scope(mut self, scope: RequestScope) -> Self {
        self.scope = scope;
        self
    }

    /// Get a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

// ============================================================================
// Derive context
// ============================================================================

/// What a [`KeyDeriver`](crate::KeyDeriver) receives.
#[derive(Debug, Clone, Copy)]
pub enum DeriveContext<'a> {
    /// A block about to be rendered.
    Block(BlockContext<'a>),
    /// An API request about to be dispatched (or just dispatched).
    Api(&'a ApiRequest),
}

impl<'a> DeriveContext<'a> {
    /// Family of the fragment being keyed.
    pub fn fragment_type(&self) -> FragmentType {
        match *self {
            Self::Block(_) => FragmentType::Block,
            Self::Api(_) => FragmentType::Api,
        }
    }

    /// Name of the fragment being keyed.
    pub fn fragment_name(&self) -> &'a FragmentName {
        match *self {
            Self::Block(ctx) => &ctx.block.name,
            Self::Api(req) => &req.route,
        }
    }

    /// Request facts.
    pub fn scope(&self) -> &'a RequestScope {
        match *self {
            Self::Block(ctx) => ctx.scope,
            Self::Api(req) => &req.scope,
        }
    }

    /// Query parameters (API requests only).
    pub fn query(&self) -> Option<&'a BTreeMap<String, String>> {
        self.as_api().map(|req| &req.query)
    }

    /// The block context, if this is a block.
    pub fn as_block(&self) -> Option<BlockContext<'a>> {
        match *self {
            Self::Block(ctx) => Some(ctx),
            Self::Api(_) => None,
        }
    }

    /// The API request, if this is an API fragment.
    pub fn as_api(&self) -> Option<&'a ApiRequest> {
        match *self {
            Self::Block(_) => None,
            Self::Api(req) => Some(req),
        }
    }
}
