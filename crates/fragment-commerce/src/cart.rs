//! Shopping cart and the session-scoped cart key policy.

use fragment_core::{fingerprint, CacheKey, DeriveContext, KeyDeriver, RequestScope};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Fact holding the cart content hash. Absent when the cart is empty.
pub const CART_HASH_FACT: &str = "cart_hash";

/// Key used for every empty cart.
pub const EMPTY_CART_KEY: &str = "cart-empty";

/// A line in the cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    /// Product SKU.
    pub sku: String,
    /// Quantity, always positive.
    pub quantity: u32,
    /// Unit price in minor units.
    pub unit_price_cents: i64,
}

/// A session's shopping cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cart {
    /// Owning session.
    pub session_id: String,
    /// Items in the cart.
    pub items: Vec<LineItem>,
}

impl Cart {
    /// Create an empty cart for a session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            items: Vec::new(),
        }
    }

    /// Add `quantity` of `sku`, merging with an existing line.
    pub fn add_item(&mut self, sku: impl Into<String>, quantity: u32, unit_price_cents: i64) {
        let sku = sku.into();
        if quantity == 0 {
            return;
        }
        match self.items.iter_mut().find(|i| i.sku == sku) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => self.items.push(LineItem {
                sku,
                quantity,
                unit_price_cents,
            }),
        }
    }

    /// Whether the cart has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total in minor units.
    pub fn total_cents(&self) -> i64 {
        self.items
            .iter()
            .map(|i| i.unit_price_cents * i64::from(i.quantity))
            .sum()
    }

    /// Hash of the cart contents, independent of line order.
    /// `None` for an empty cart.
    pub fn content_hash(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut lines: Vec<String> = self
            .items
            .iter()
            .map(|i| format!("{}:{}:{}", i.sku, i.quantity, i.unit_price_cents))
            .collect();
        lines.sort();
        Some(fingerprint(lines))
    }

    /// Request scope carrying this cart's session and content hash.
    pub fn scope(&self) -> RequestScope {
        let scope = RequestScope::for_session(&self.session_id);
        match self.content_hash() {
            Some(hash) => scope.with_fact(CART_HASH_FACT, hash),
            None => scope,
        }
    }
}

/// Keys cart fragments by session and cart contents.
///
/// An empty cart maps to the shared `cart-empty` sentinel, which is an
/// ordinary key. A non-empty cart maps to `cart-<fingerprint>` over the
/// session id and the content hash, so two sessions never share an entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CartDeriver;

impl KeyDeriver for CartDeriver {
    fn derive(&self, ctx: &DeriveContext<'_>) -> anyhow::Result<CacheKey> {
        let scope = ctx.scope();
        let Some(hash) = scope.fact(CART_HASH_FACT) else {
            return Ok(CacheKey::new(EMPTY_CART_KEY)?);
        };
        let session = scope.session_id().ok_or(PolicyError::MissingSession)?;
        Ok(CacheKey::new(format!("cart-{}", fingerprint([session, hash])))?)
    }
}
