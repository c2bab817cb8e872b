//! Domain events, envelopes and the pub/sub bus used to distribute them.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::{Event, stream_type_of};
pub use handler::{execute, replay};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
