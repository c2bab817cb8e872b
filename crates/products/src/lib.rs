//! Products domain module (event-sourced).
//!
//! Purchasable products, their units of measure and cost price changes.
//! Pure domain logic (no IO, no storage).

pub mod product;
pub mod uom;

pub use product::{
    ArchiveProduct, ChangeCostPrice, CostPriceChanged, CreateProduct, Product, ProductArchived,
    ProductCommand, ProductCreated, ProductEvent, ProductId, ProductKind, ProductStatus,
    ProductSummary,
};
pub use uom::{Uom, compute_qty};
