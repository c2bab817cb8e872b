//! Infrastructure layer: event store, command dispatch, projections and the
//! purchase service wiring them together.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod sequence;
pub mod service;


pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, PublishingEventStore};
pub use service::{HeaderChanges, NewPurchase, ProcessOutcome, PurchaseService, ServiceError};
