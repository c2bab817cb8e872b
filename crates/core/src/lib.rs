//! `procurerp-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the procurement
//! modules (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod model;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId};
pub use model::{Entity, ValueObject};
pub use money::Currency;
