//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! command
//!   -> load the stream (tenant scoped) and check it
//!   -> rehydrate the aggregate from its history
//!   -> handle (pure decision, no mutation)
//!   -> append with an exact expected version
//!   -> publish the committed events
//! ```
//!
//! No IO here beyond the injected store and bus.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use procurerp_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use procurerp_events::{Event, EventBus, EventEnvelope, replay};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The stream moved on between load and append.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("{0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// The record already exists (or otherwise clashes with stored state).
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found")]
    NotFound,
    /// A stored payload no longer matches the aggregate's event type.
    #[error("cannot deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Append succeeded but publication did not; a retry may publish twice.
    #[error("publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                DispatchError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound => DispatchError::NotFound,
        }
    }
}

/// Runs commands against any aggregate stored in `S`, publishing on `B`.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Handle `command` on the current state of the aggregate and commit the
    /// resulting events.
    ///
    /// An accepted command that decides nothing commits nothing and returns
    /// an empty list. A concurrent append to the same stream fails with
    /// [`DispatchError::Concurrency`]; the caller may reload and retry.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let (aggregate, version) = self.rehydrate(tenant_id, aggregate_id, make_aggregate)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = aggregate_type.into();
        if let Some(stray) = decided.iter().find(|e| e.stream_type() != aggregate_type) {
            return Err(DispatchError::InvariantViolation(format!(
                "{} cannot be appended to a {aggregate_type} stream",
                stray.event_type()
            )));
        }
        let uncommitted = decided
            .iter()
            .map(|event| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    event,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, ExpectedVersion::Exact(version))?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Current state of an aggregate, without handling anything.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.rehydrate(tenant_id, aggregate_id, make_aggregate)
            .map(|(aggregate, _)| aggregate)
    }

    fn rehydrate<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<(A, u64), DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let mut history = self.store.load_stream(tenant_id, aggregate_id)?;
        check_stream(tenant_id, aggregate_id, &history)?;
        history.sort_by_key(|e| e.sequence_number);
        let version = history.last().map(|e| e.sequence_number).unwrap_or(0);

        let events = history
            .into_iter()
            .map(|stored| {
                serde_json::from_value::<A::Event>(stored.payload)
                    .map_err(|e| DispatchError::Deserialize(format!("{}: {e}", stored.event_type)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        replay(&mut aggregate, &events);
        Ok((aggregate, version))
    }
}

/// A loaded stream must belong to the requested tenant and aggregate and be
/// strictly increasing from 1, whatever the backend returned.
fn check_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "stored event {idx} belongs to another tenant"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "stored event {idx} belongs to another aggregate"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "sequence number {} after {last} in loaded stream",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use procurerp_events::InMemoryEventBus;
    use procurerp_parties::{Party, PartyCommand, PartyId, RegisterParty, SuspendParty};

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn register(tenant_id: TenantId, party_id: PartyId) -> PartyCommand {
        PartyCommand::RegisterParty(RegisterParty {
            tenant_id,
            party_id,
            name: "Wood & Co".to_string(),
            lang: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn commits_and_rehydrates() {
        let dispatcher = dispatcher();
        let tenant_id = TenantId::new();
        let party_id = PartyId::new(AggregateId::new());

        let committed = dispatcher
            .dispatch(tenant_id, party_id.0, "parties.party", register(tenant_id, party_id), |_, id| {
                Party::empty(PartyId::new(id))
            })
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].event_type, "parties.party.registered");

        let party: Party = dispatcher
            .load(tenant_id, party_id.0, |_, id| Party::empty(PartyId::new(id)))
            .unwrap();
        assert_eq!(party.name(), "Wood & Co");
    }

    #[test]
    fn domain_errors_are_mapped() {
        let dispatcher = dispatcher();
        let tenant_id = TenantId::new();
        let party_id = PartyId::new(AggregateId::new());
        let make = |_: TenantId, id: AggregateId| Party::empty(PartyId::new(id));

        let suspend = PartyCommand::SuspendParty(SuspendParty {
            tenant_id,
            party_id,
            reason: None,
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            dispatcher.dispatch(tenant_id, party_id.0, "parties.party", suspend, make),
            Err(DispatchError::NotFound)
        ));

        dispatcher
            .dispatch(tenant_id, party_id.0, "parties.party", register(tenant_id, party_id), make)
            .unwrap();
        assert!(matches!(
            dispatcher.dispatch(tenant_id, party_id.0, "parties.party", register(tenant_id, party_id), make),
            Err(DispatchError::Conflict(_))
        ));
    }

    #[test]
    fn events_must_match_the_stream_type() {
        let dispatcher = dispatcher();
        let tenant_id = TenantId::new();
        let party_id = PartyId::new(AggregateId::new());

        let result = dispatcher.dispatch(
            tenant_id,
            party_id.0,
            "products.product",
            register(tenant_id, party_id),
            |_, id| Party::empty(PartyId::new(id)),
        );
        assert!(matches!(result, Err(DispatchError::InvariantViolation(_))));
        assert!(dispatcher.store().load_stream(tenant_id, party_id.0).unwrap().is_empty());
    }
}
