//! SeaORM entities for the storefront order flow.
//!
//! Catalog tables (`stores`, `products`, `product_variants`, `affiliates`)
//! are read-only from this service's point of view.

pub mod affiliate;
pub mod commission;
pub mod order;
pub mod order_item;
pub mod order_note;
pub mod product;
pub mod product_variant;
pub mod store;
pub mod webhook_event;
