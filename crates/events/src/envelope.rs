use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use procurerp_core::{AggregateId, TenantId};

/// A committed event as seen by subscribers.
///
/// `sequence_number` is the 1-based position in the `(tenant, aggregate)`
/// stream. Projections keep the last one they applied per stream to drop
/// redelivered envelopes and detect gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    aggregate_type: String,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Whether the envelope comes from a stream of `aggregate_type`.
    pub fn is_from(&self, aggregate_type: &str) -> bool {
        self.aggregate_type == aggregate_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Same stream position, other payload.
    pub fn map<T>(self, f: impl FnOnce(E) -> T) -> EventEnvelope<T> {
        EventEnvelope {
            event_id: self.event_id,
            tenant_id: self.tenant_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number,
            payload: f(self.payload),
        }
    }
}

impl EventEnvelope<JsonValue> {
    /// Deserialize the JSON payload into a typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Posted {
        amount: u32,
    }

    fn envelope(payload: JsonValue) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            TenantId::new(),
            AggregateId::new(),
            "invoicing.invoice",
            3,
            payload,
        )
    }

    #[test]
    fn decodes_typed_payloads() {
        let env = envelope(serde_json::json!({ "amount": 12 }));
        assert!(env.is_from("invoicing.invoice"));
        assert!(!env.is_from("invoicing"));
        assert_eq!(env.decode::<Posted>().unwrap(), Posted { amount: 12 });
        assert!(envelope(serde_json::json!("x")).decode::<Posted>().is_err());
    }

    #[test]
    fn map_keeps_the_stream_position() {
        let env = envelope(serde_json::json!({ "amount": 1 }));
        let (tenant_id, aggregate_id) = (env.tenant_id(), env.aggregate_id());
        let mapped = env.map(|_| "typed");
        assert_eq!(mapped.sequence_number(), 3);
        assert_eq!(mapped.tenant_id(), tenant_id);
        assert_eq!(mapped.aggregate_id(), aggregate_id);
        assert_eq!(*mapped.payload(), "typed");
    }
}
