//! Storefront key policies for the fragment cache.
//!
//! - **Catalog**: product listings keyed by query string and catalog version
//! - **Cart**: cart fragments keyed by session and cart contents
//!
//! # Example
//!
//! ```rust,ignore
//! use fragment_core::Registry;
//!
//! let mut builder = Registry::builder();
//! fragment_commerce::register(&mut builder);
//! let registry = builder.build();
//! ```

pub mod cart;
pub mod catalog;
pub mod error;

use fragment_core::{FragmentType, RegistryBuilder};

pub use cart::{Cart, CartDeriver, LineItem, CART_HASH_FACT, EMPTY_CART_KEY};
pub use catalog::{Catalog, Product, ProductListDeriver, SortOrder, CATALOG_VERSION_FACT};
pub use error::PolicyError;

/// Product listing route.
pub const PRODUCTS_ROUTE: &str = "/store/products";
/// Cart route.
pub const CART_ROUTE: &str = "/store/cart";
/// Mini-cart block.
pub const MINI_CART_BLOCK: &str = "store/mini-cart";

/// Register the storefront policies: product listings and the cart route,
/// plus the mini-cart block.
pub fn register(builder: &mut RegistryBuilder) -> &mut RegistryBuilder {
    builder
        .register(FragmentType::Api, PRODUCTS_ROUTE, ProductListDeriver)
        .register(FragmentType::Api, CART_ROUTE, CartDeriver)
        .register(FragmentType::Block, MINI_CART_BLOCK, CartDeriver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragment_core::Registry;

    #[test]
    fn test_register() {
        let mut builder = Registry::builder();
        register(&mut builder);
        let registry = builder.build();

        assert_eq!(registry.len(), 3);
        assert!(registry.contains(FragmentType::Api, PRODUCTS_ROUTE));
        assert!(registry.contains(FragmentType::Api, CART_ROUTE));
        assert!(registry.contains(FragmentType::Block, MINI_CART_BLOCK));
    }
}
