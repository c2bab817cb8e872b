//! Append-only event store.
//!
//! Tenant-scoped streams of serialized events, one stream per aggregate
//! instance, behind a storage-agnostic trait.

pub mod in_memory;
pub mod r#trait;

use serde_json::Value as JsonValue;

use procurerp_core::{AggregateId, ExpectedVersion, TenantId};
use procurerp_events::{EventBus, EventEnvelope};

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Store decorator publishing every committed event on a bus.
///
/// Publication happens only once the append succeeded.
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let committed = self.store.append(events, expected_version)?;
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|err| EventStoreError::Publish(format!("{err:?}")))?;
        }
        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.load_stream(tenant_id, aggregate_id)
    }
}
