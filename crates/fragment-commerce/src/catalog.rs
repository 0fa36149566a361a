//! Product catalog and the product-listing key policy.

use std::collections::BTreeMap;

use fragment_core::{fingerprint, CacheKey, DeriveContext, KeyDeriver};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Fact holding the catalog version stamp. Bumped on every catalog change.
pub const CATALOG_VERSION_FACT: &str = "catalog_version";

/// Key prefix for product listings.
pub const PRODUCTS_KEY_PREFIX: &str = "all-products";

/// A product as listed by the storefront API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    /// Stock keeping unit.
    pub sku: String,
    /// Display name.
    pub name: String,
    /// Category slug.
    pub category: String,
    /// Price in minor units.
    pub price_cents: i64,
}

impl Product {
    /// Create a product.
    pub fn new(
        sku: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        price_cents: i64,
    ) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            category: category.into(),
            price_cents,
        }
    }
}

/// Listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Name,
    Price,
    PriceDesc,
}

impl SortOrder {
    /// Parse the `orderby` query value. Unknown values fall back to name.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("price") => Self::Price,
            Some("price-desc") => Self::PriceDesc,
            _ => Self::Name,
        }
    }
}

/// Versioned product catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    version: u64,
    products: Vec<Product>,
}

impl Catalog {
    /// Create a catalog at version 1.
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            version: 1,
            products,
        }
    }

    /// Current version stamp.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Add or replace a product by SKU and bump the version.
    pub fn upsert(&mut self, product: Product) {
        match self.products.iter_mut().find(|p| p.sku == product.sku) {
            Some(existing) => *existing = product,
            None => self.products.push(product),
        }
        self.version += 1;
    }

    /// Products matching `category` (all when `None`), in the given order.
    pub fn list(&self, category: Option<&str>, order: SortOrder) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .cloned()
            .collect();

        match order {
            SortOrder::Name => products.sort_by(|a, b| a.name.cmp(&b.name)),
            SortOrder::Price => products.sort_by_key(|p| p.price_cents),
            SortOrder::PriceDesc => products.sort_by_key(|p| std::cmp::Reverse(p.price_cents)),
        }
        products
    }
}

/// Keys product listings by query string and catalog version.
///
/// Produces `all-products-<fingerprint>`, where the fingerprint covers every
/// non-empty query parameter plus the catalog version stamp, so a catalog
/// change moves every listing to a fresh key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductListDeriver;

impl ProductListDeriver {
    fn key_for(&self, query: &BTreeMap<String, String>, version: &str) -> anyhow::Result<CacheKey> {
        let parts = query
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{k}={v}"))
            .chain(std::iter::once(format!("{CATALOG_VERSION_FACT}={version}")));
        Ok(CacheKey::new(format!("{PRODUCTS_KEY_PREFIX}-{}", fingerprint(parts)))?)
    }
}

impl KeyDeriver for ProductListDeriver {
    fn derive(&self, ctx: &DeriveContext<'_>) -> anyhow::Result<CacheKey> {
        let query = ctx.query().ok_or(PolicyError::WrongContext("product listing is an API fragment"))?;
        let version = ctx
            .scope()
            .fact(CATALOG_VERSION_FACT)
            .ok_or(PolicyError::MissingFact(CATALOG_VERSION_FACT))?;
        self.key_for(query, version)
    }
}

#[cfg(test)]
mod tests {
    use fragment_core::{ApiRequest, BlockContext, BlockDescriptor, RequestScope};

    use super::*;

    fn request(version: &str) -> ApiRequest {
        ApiRequest::get("/store/products").with_scope(RequestScope::new().with_fact(CATALOG_VERSION_FACT, version))
    }

    fn derive(req: &ApiRequest) -> anyhow::Result<CacheKey> {
        ProductListDeriver.derive(&DeriveContext::Api(req))
    }

    // === Deriver ===

    #[test]
    fn test_key_has_prefix_and_is_deterministic() {
        let req = request("3").with_query("orderby", "price");
        let a = derive(&req).unwrap();
        let b = derive(&req.clone()).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("all-products-"));
    }

    #[test]
    fn test_empty_params_ignored() {
        let plain = derive(&request("3").with_query("orderby", "price")).unwrap();
        let with_empty = derive(&request("3").with_query("orderby", "price").with_query("category", "")).unwrap();
        assert_eq!(plain, with_empty);
    }

    #[test]
    fn test_catalog_version_changes_key() {
        let v3 = derive(&request("3")).unwrap();
        let v4 = derive(&request("4")).unwrap();
        assert_ne!(v3, v4);
    }

    #[test]
    fn test_query_changes_key() {
        let by_name = derive(&request("3")).unwrap();
        let by_price = derive(&request("3").with_query("orderby", "price")).unwrap();
        assert_ne!(by_name, by_price);
    }

    #[test]
    fn test_missing_version_is_an_error() {
        let err = derive(&ApiRequest::get("/store/products")).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PolicyError>(),
            Some(&PolicyError::MissingFact(CATALOG_VERSION_FACT))
        );
    }

    #[test]
    fn test_block_context_is_an_error() {
        let block = BlockDescriptor::new("store/products");
        let scope = RequestScope::new().with_fact(CATALOG_VERSION_FACT, "1");
        let ctx = DeriveContext::Block(BlockContext::new(&block, None, &scope));
        assert!(ProductListDeriver.derive(&ctx).is_err());
    }

    // === Catalog ===

    #[test]
    fn test_upsert_bumps_version() {
        let mut catalog = Catalog::new(vec![Product::new("A-1", "Anvil", "tools", 4999)]);
        assert_eq!(catalog.version(), 1);

        catalog.upsert(Product::new("A-1", "Anvil", "tools", 3999));
        catalog.upsert(Product::new("B-1", "Bolt", "hardware", 25));
        assert_eq!(catalog.version(), 3);
        assert_eq!(catalog.list(None, SortOrder::Name).len(), 2);
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let catalog = Catalog::new(vec![
            Product::new("A-1", "Anvil", "tools", 4999),
            Product::new("H-1", "Hammer", "tools", 1999),
            Product::new("B-1", "Bolt", "hardware", 25),
        ]);

        let tools: Vec<_> = catalog
            .list(Some("tools"), SortOrder::Price)
            .into_iter()
            .map(|p| p.sku)
            .collect();
        assert_eq!(tools, vec!["H-1", "A-1"]);

        let all: Vec<_> = catalog
            .list(None, SortOrder::from_query(Some("price-desc")))
            .into_iter()
            .map(|p| p.sku)
            .collect();
        assert_eq!(all, vec!["A-1", "H-1", "B-1"]);
    }
}
