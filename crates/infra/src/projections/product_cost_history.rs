//! Product cost history.
//!
//! Every cost price a product had, with the moment it took effect. The
//! initial price counts as the first change.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use procurerp_core::TenantId;
use procurerp_events::EventEnvelope;
use procurerp_products::{ProductEvent, ProductId};

use crate::projections::cursor_store::{
    InMemoryCursorStore, ProjectionCursorStore, SequenceGap, StreamCursors, replay_order,
};
use crate::read_model::TenantStore;

pub const PRODUCT_AGGREGATE_TYPE: &str = "products.product";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostPriceRecord {
    pub product_id: ProductId,
    pub changed_at: DateTime<Utc>,
    pub cost_price: Decimal,
    /// Position in the product stream; orders changes with equal timestamps.
    pub sequence_number: u64,
}

#[derive(Debug, Error)]
pub enum CostHistoryProjectionError {
    #[error("failed to deserialize product event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

impl From<SequenceGap> for CostHistoryProjectionError {
    fn from(gap: SequenceGap) -> Self {
        Self::NonMonotonicSequence {
            last: gap.last,
            found: gap.found,
        }
    }
}

#[derive(Debug)]
pub struct ProductCostHistoryProjection<S, C = InMemoryCursorStore>
where
    S: TenantStore<ProductId, Vec<CostPriceRecord>>,
{
    store: S,
    cursors: StreamCursors<C>,
}

impl<S> ProductCostHistoryProjection<S>
where
    S: TenantStore<ProductId, Vec<CostPriceRecord>>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::in_memory("products.cost_history"),
        }
    }
}

impl<S, C> ProductCostHistoryProjection<S, C>
where
    S: TenantStore<ProductId, Vec<CostPriceRecord>>,
    C: ProjectionCursorStore,
{
    pub fn with_cursor_store(store: S, cursor_store: Arc<C>) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(cursor_store, "products.cost_history"),
        }
    }

    /// History of one product, most recent first.
    pub fn history(&self, tenant_id: TenantId, product_id: &ProductId) -> Vec<CostPriceRecord> {
        let mut records = self.store.get(tenant_id, product_id).unwrap_or_default();
        records.sort_by(|a, b| {
            b.changed_at
                .cmp(&a.changed_at)
                .then(b.sequence_number.cmp(&a.sequence_number))
        });
        records
    }

    /// Cost price in force at the end of `date`.
    pub fn cost_price_at(
        &self,
        tenant_id: TenantId,
        product_id: &ProductId,
        date: NaiveDate,
    ) -> Option<Decimal> {
        self.history(tenant_id, product_id)
            .into_iter()
            .find(|r| r.changed_at.date_naive() <= date)
            .map(|r| r.cost_price)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CostHistoryProjectionError> {
        if !envelope.is_from(PRODUCT_AGGREGATE_TYPE) {
            return Ok(());
        }
        if !self.cursors.is_new(envelope)? {
            return Ok(());
        }

        let event: ProductEvent = envelope
            .decode()
            .map_err(|e| CostHistoryProjectionError::Deserialize(e.to_string()))?;
        let (event_tenant, product_id, change) = match &event {
            ProductEvent::ProductCreated(e) => {
                (e.tenant_id, e.product_id, Some((e.occurred_at, e.cost_price)))
            }
            ProductEvent::CostPriceChanged(e) => {
                (e.tenant_id, e.product_id, Some((e.occurred_at, e.cost_price)))
            }
            ProductEvent::ProductArchived(e) => (e.tenant_id, e.product_id, None),
        };
        let tenant_id = envelope.tenant_id();
        if event_tenant != tenant_id || product_id.0 != envelope.aggregate_id() {
            return Err(CostHistoryProjectionError::TenantIsolation(
                "product event does not match its envelope".to_string(),
            ));
        }

        if let Some((occurred_at, cost_price)) = change {
            let mut records = self.store.get(tenant_id, &product_id).unwrap_or_default();
            records.push(CostPriceRecord {
                product_id,
                changed_at: occurred_at,
                cost_price,
                sequence_number: envelope.sequence_number(),
            });
            self.store.upsert(tenant_id, product_id, records);
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), CostHistoryProjectionError> {
        let (tenants, envelopes) = replay_order(envelopes);
        for tenant_id in tenants {
            self.store.clear_tenant(tenant_id);
            self.cursors.clear(tenant_id);
        }
        for envelope in &envelopes {
            self.apply_envelope(envelope)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use procurerp_core::AggregateId;
    use procurerp_products::{CostPriceChanged, ProductCreated, ProductKind, Uom};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::read_model::InMemoryTenantStore;

    fn at(day: u32) -> DateTime<Utc> {
        at_hour(day, 9)
    }

    fn at_hour(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn envelopes(tenant_id: TenantId, product_id: ProductId) -> Vec<EventEnvelope<JsonValue>> {
        let mut events = vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id,
            product_id,
            sku: "BOLT-8".to_string(),
            name: "Bolt M8".to_string(),
            kind: ProductKind::Goods,
            purchase_uom: Uom::unit(),
            cost_price: dec!(1.10),
            account_expense: None,
            supplier_taxes: vec![],
            occurred_at: at(1),
        })];
        let mut previous = dec!(1.10);
        for (changed_at, price) in [
            (at_hour(5, 9), dec!(1.20)),
            (at_hour(5, 15), dec!(1.25)),
            (at(9), dec!(1.05)),
        ] {
            events.push(ProductEvent::CostPriceChanged(CostPriceChanged {
                tenant_id,
                product_id,
                previous_cost_price: previous,
                cost_price: price,
                occurred_at: changed_at,
            }));
            previous = price;
        }
        events
            .into_iter()
            .zip(1u64..)
            .map(|(event, seq)| {
                EventEnvelope::new(
                    Uuid::now_v7(),
                    tenant_id,
                    product_id.0,
                    PRODUCT_AGGREGATE_TYPE,
                    seq,
                    serde_json::to_value(event).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn history_is_most_recent_first() {
        let projection = ProductCostHistoryProjection::new(InMemoryTenantStore::new());
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());
        for envelope in envelopes(tenant_id, product_id) {
            projection.apply_envelope(&envelope).unwrap();
        }

        let prices: Vec<_> = projection
            .history(tenant_id, &product_id)
            .into_iter()
            .map(|r| r.cost_price)
            .collect();
        assert_eq!(prices, vec![dec!(1.05), dec!(1.25), dec!(1.20), dec!(1.10)]);

        assert_eq!(
            projection.cost_price_at(tenant_id, &product_id, at(6).date_naive()),
            Some(dec!(1.25))
        );
        assert_eq!(
            projection.cost_price_at(tenant_id, &product_id, at(1).date_naive().pred_opt().unwrap()),
            None
        );
    }

    #[test]
    fn same_day_changes_keep_their_time() {
        let projection = ProductCostHistoryProjection::new(InMemoryTenantStore::new());
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());
        for envelope in envelopes(tenant_id, product_id) {
            projection.apply_envelope(&envelope).unwrap();
        }

        let same_day: Vec<_> = projection
            .history(tenant_id, &product_id)
            .into_iter()
            .filter(|r| r.changed_at.date_naive() == at(5).date_naive())
            .map(|r| (r.changed_at, r.cost_price))
            .collect();
        assert_eq!(
            same_day,
            vec![(at_hour(5, 15), dec!(1.25)), (at_hour(5, 9), dec!(1.20))]
        );
    }

    #[test]
    fn replay_gives_the_same_history() {
        let projection = ProductCostHistoryProjection::new(InMemoryTenantStore::new());
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());
        let envelopes = envelopes(tenant_id, product_id);

        for envelope in &envelopes {
            projection.apply_envelope(envelope).unwrap();
        }
        let live = projection.history(tenant_id, &product_id);

        projection.rebuild_from_scratch(envelopes.into_iter().rev()).unwrap();
        assert_eq!(projection.history(tenant_id, &product_id), live);
        assert!(projection.history(TenantId::new(), &product_id).is_empty());
    }
}
