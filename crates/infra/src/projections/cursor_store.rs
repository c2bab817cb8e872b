//! Projection checkpoints.
//!
//! A cursor is the last applied `sequence_number` of one stream, per
//! projection. Envelopes at or below the cursor are duplicates and are
//! skipped; clearing the cursors of a tenant allows a replay from scratch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use procurerp_core::{AggregateId, TenantId};
use procurerp_events::EventEnvelope;

pub trait ProjectionCursorStore: Send + Sync {
    fn get_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64>;

    fn update_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    );

    fn clear_cursors(&self, tenant_id: TenantId, projection_name: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    projection_name: String,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionCursorStore for InMemoryCursorStore {
    fn get_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64> {
        let cursors = self.cursors.read().ok()?;
        cursors
            .get(&CursorKey {
                projection_name: projection_name.to_string(),
                tenant_id,
                aggregate_id,
            })
            .copied()
    }

    fn update_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    ) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    projection_name: projection_name.to_string(),
                    tenant_id,
                    aggregate_id,
                },
                sequence_number,
            );
        }
    }

    fn clear_cursors(&self, tenant_id: TenantId, projection_name: &str) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| !(k.tenant_id == tenant_id && k.projection_name == projection_name));
        }
    }
}

/// An envelope that does not follow the stream's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    pub last: u64,
    pub found: u64,
}

/// The cursors of one named projection.
#[derive(Debug)]
pub struct StreamCursors<C = InMemoryCursorStore> {
    store: Arc<C>,
    projection_name: String,
}

impl StreamCursors<InMemoryCursorStore> {
    pub fn in_memory(projection_name: impl Into<String>) -> Self {
        Self::new(Arc::new(InMemoryCursorStore::new()), projection_name)
    }
}

impl<C: ProjectionCursorStore> StreamCursors<C> {
    pub fn new(store: Arc<C>, projection_name: impl Into<String>) -> Self {
        Self {
            store,
            projection_name: projection_name.into(),
        }
    }

    pub fn projection_name(&self) -> &str {
        &self.projection_name
    }

    /// Whether `envelope` is new for its stream.
    ///
    /// A stream seen for the first time may start anywhere; after that each
    /// envelope must be exactly the next one.
    pub fn is_new<E>(&self, envelope: &EventEnvelope<E>) -> Result<bool, SequenceGap> {
        let last = self
            .store
            .get_cursor(envelope.tenant_id(), envelope.aggregate_id(), &self.projection_name)
            .unwrap_or(0);
        let found = envelope.sequence_number();
        if found == 0 {
            return Err(SequenceGap { last, found });
        }
        if found <= last {
            return Ok(false);
        }
        if last != 0 && found != last + 1 {
            return Err(SequenceGap { last, found });
        }
        Ok(true)
    }

    pub fn advance<E>(&self, envelope: &EventEnvelope<E>) {
        self.store.update_cursor(
            envelope.tenant_id(),
            envelope.aggregate_id(),
            &self.projection_name,
            envelope.sequence_number(),
        );
    }

    pub fn clear(&self, tenant_id: TenantId) {
        self.store.clear_cursors(tenant_id, &self.projection_name);
    }
}

/// Order envelopes for a replay and list the tenants they touch.
pub fn replay_order<E>(envelopes: impl IntoIterator<Item = EventEnvelope<E>>) -> (Vec<TenantId>, Vec<EventEnvelope<E>>) {
    let mut envelopes: Vec<_> = envelopes.into_iter().collect();
    envelopes.sort_by_key(|e| {
        (
            *e.tenant_id().as_uuid().as_bytes(),
            *e.aggregate_id().as_uuid().as_bytes(),
            e.sequence_number(),
        )
    });
    let mut tenants: Vec<TenantId> = envelopes.iter().map(|e| e.tenant_id()).collect();
    tenants.dedup();
    (tenants, envelopes)
}
