//! Read model builders.
//!
//! Projections consume committed envelopes, tolerate redelivery through
//! per-stream cursors, keep tenants apart and can be rebuilt from the event
//! store at any time.

pub mod cursor_store;
pub mod product_cost_history;
pub mod purchases;

pub use cursor_store::{InMemoryCursorStore, ProjectionCursorStore, SequenceGap, StreamCursors};
pub use product_cost_history::{
    CostHistoryProjectionError, CostPriceRecord, PRODUCT_AGGREGATE_TYPE,
    ProductCostHistoryProjection,
};
pub use purchases::{
    OpenSupplier, PURCHASE_AGGREGATE_TYPE, PurchaseProjectionError, PurchaseReadModel,
    PurchasesProjection,
};
