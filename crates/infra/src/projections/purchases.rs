//! Purchase list read model, open suppliers and rec-name search.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use procurerp_core::{Currency, TenantId};
use procurerp_events::EventEnvelope;
use procurerp_parties::PartyId;
use procurerp_purchasing::{
    InvoiceMethod, InvoiceState, PurchaseAmounts, PurchaseEvent, PurchaseId, PurchaseState,
    ShipmentState, rec_name_matches,
};

use crate::projections::cursor_store::{
    InMemoryCursorStore, ProjectionCursorStore, SequenceGap, StreamCursors, replay_order,
};
use crate::read_model::TenantStore;

pub const PURCHASE_AGGREGATE_TYPE: &str = "purchasing.purchase";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReadModel {
    pub purchase_id: PurchaseId,
    pub reference: Option<String>,
    pub supplier_reference: Option<String>,
    pub description: Option<String>,
    pub party_id: PartyId,
    pub party_name: String,
    pub currency: Currency,
    pub invoice_method: InvoiceMethod,
    pub purchase_date: Option<NaiveDate>,
    pub state: PurchaseState,
    pub invoice_state: InvoiceState,
    pub shipment_state: ShipmentState,
    pub line_count: usize,
    pub created_at: DateTime<Utc>,
    /// Frozen totals; set while confirmed, done or cancelled.
    pub amounts: Option<PurchaseAmounts>,
}

impl PurchaseReadModel {
    pub fn rec_name(&self) -> String {
        let reference = self
            .reference
            .clone()
            .unwrap_or_else(|| self.purchase_id.to_string());
        format!("{reference} - {}", self.party_name)
    }

    pub fn matches_rec_name(&self, query: &str) -> bool {
        rec_name_matches(
            self.reference.as_deref(),
            self.supplier_reference.as_deref(),
            &self.party_name,
            query,
        )
    }
}

/// A party the tenant purchases from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSupplier {
    pub party_id: PartyId,
    pub name: String,
    pub purchase_count: usize,
}

#[derive(Debug, Error)]
pub enum PurchaseProjectionError {
    #[error("failed to deserialize purchase event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
    /// An event arrived for a purchase whose creation was never seen.
    #[error("purchase {0} is unknown to the read model")]
    UnknownPurchase(PurchaseId),
}

impl From<SequenceGap> for PurchaseProjectionError {
    fn from(gap: SequenceGap) -> Self {
        Self::NonMonotonicSequence {
            last: gap.last,
            found: gap.found,
        }
    }
}

#[derive(Debug)]
pub struct PurchasesProjection<S, C = InMemoryCursorStore>
where
    S: TenantStore<PurchaseId, PurchaseReadModel>,
{
    store: S,
    cursors: StreamCursors<C>,
}

impl<S> PurchasesProjection<S>
where
    S: TenantStore<PurchaseId, PurchaseReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::in_memory("purchasing.purchases"),
        }
    }
}

impl<S, C> PurchasesProjection<S, C>
where
    S: TenantStore<PurchaseId, PurchaseReadModel>,
    C: ProjectionCursorStore,
{
    pub fn with_cursor_store(store: S, cursor_store: Arc<C>) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(cursor_store, "purchasing.purchases"),
        }
    }

    pub fn get(&self, tenant_id: TenantId, purchase_id: &PurchaseId) -> Option<PurchaseReadModel> {
        self.store.get(tenant_id, purchase_id)
    }

    /// Every purchase of the tenant, by rec name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<PurchaseReadModel> {
        let mut purchases = self.store.list(tenant_id);
        purchases.sort_by_cached_key(|p| p.rec_name());
        purchases
    }

    pub fn list_in_state(&self, tenant_id: TenantId, state: PurchaseState) -> Vec<PurchaseReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|p| p.state == state)
            .collect()
    }

    pub fn search_rec_name(&self, tenant_id: TenantId, query: &str) -> Vec<PurchaseReadModel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|p| p.matches_rec_name(query))
            .collect()
    }

    /// Distinct suppliers having at least one purchase, by name.
    pub fn open_suppliers(&self, tenant_id: TenantId) -> Vec<OpenSupplier> {
        let mut suppliers: BTreeMap<PartyId, OpenSupplier> = BTreeMap::new();
        for purchase in self.store.list(tenant_id) {
            suppliers
                .entry(purchase.party_id)
                .or_insert_with(|| OpenSupplier {
                    party_id: purchase.party_id,
                    name: purchase.party_name.clone(),
                    purchase_count: 0,
                })
                .purchase_count += 1;
        }
        let mut suppliers: Vec<_> = suppliers.into_values().collect();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name).then(a.party_id.cmp(&b.party_id)));
        suppliers
    }

    /// Most frequent currency among the first ten purchases from `party_id`,
    /// the earliest one winning a tie.
    pub fn usual_currency(&self, tenant_id: TenantId, party_id: PartyId) -> Option<Currency> {
        let mut purchases: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|p| p.party_id == party_id)
            .collect();
        purchases.sort_by_key(|p| (p.created_at, p.purchase_id));

        let mut counts: Vec<(Currency, usize)> = Vec::new();
        for purchase in purchases.into_iter().take(10) {
            match counts.iter_mut().find(|(c, _)| *c == purchase.currency) {
                Some((_, n)) => *n += 1,
                None => counts.push((purchase.currency, 1)),
            }
        }
        counts
            .into_iter()
            .rev()
            .max_by_key(|(_, n)| *n)
            .map(|(currency, _)| currency)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), PurchaseProjectionError> {
        if !envelope.is_from(PURCHASE_AGGREGATE_TYPE) {
            return Ok(());
        }
        if !self.cursors.is_new(envelope)? {
            return Ok(());
        }

        let event: PurchaseEvent = envelope
            .decode()
            .map_err(|e| PurchaseProjectionError::Deserialize(e.to_string()))?;
        let (event_tenant, purchase_id) = stream_of(&event);
        let tenant_id = envelope.tenant_id();
        if event_tenant != tenant_id {
            return Err(PurchaseProjectionError::TenantIsolation(
                "event tenant_id does not match the envelope".to_string(),
            ));
        }
        if purchase_id.0 != envelope.aggregate_id() {
            return Err(PurchaseProjectionError::TenantIsolation(
                "event purchase_id does not match the envelope".to_string(),
            ));
        }

        match event {
            PurchaseEvent::PurchaseCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.purchase_id,
                    PurchaseReadModel {
                        purchase_id: e.purchase_id,
                        reference: None,
                        supplier_reference: e.supplier_reference,
                        description: e.description,
                        party_id: e.party_id,
                        party_name: e.party_name,
                        currency: e.currency,
                        invoice_method: e.invoice_method,
                        purchase_date: e.purchase_date,
                        state: PurchaseState::Draft,
                        invoice_state: InvoiceState::None,
                        shipment_state: ShipmentState::None,
                        line_count: 0,
                        created_at: e.occurred_at,
                        amounts: None,
                    },
                );
            }
            PurchaseEvent::PurchaseDeleted(e) => self.store.remove(tenant_id, &e.purchase_id),
            other => {
                let mut rm = self
                    .store
                    .get(tenant_id, &purchase_id)
                    .ok_or(PurchaseProjectionError::UnknownPurchase(purchase_id))?;
                update(&mut rm, other);
                self.store.upsert(tenant_id, purchase_id, rm);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), PurchaseProjectionError> {
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

fn update(rm: &mut PurchaseReadModel, event: PurchaseEvent) {
    match event {
        PurchaseEvent::HeaderUpdated(e) => {
            if e.supplier_reference.is_some() {
                rm.supplier_reference = e.supplier_reference;
            }
            if e.description.is_some() {
                rm.description = e.description;
            }
            if let Some(currency) = e.currency {
                rm.currency = currency;
            }
            if let Some(method) = e.invoice_method {
                rm.invoice_method = method;
            }
            if e.purchase_date.is_some() {
                rm.purchase_date = e.purchase_date;
            }
        }
        PurchaseEvent::LineAdded(_) => rm.line_count += 1,
        PurchaseEvent::LineRemoved(_) => rm.line_count = rm.line_count.saturating_sub(1),
        PurchaseEvent::PurchaseQuoted(e) => {
            rm.reference = Some(e.reference);
            rm.state = PurchaseState::Quotation;
        }
        PurchaseEvent::PurchaseConfirmed(e) => {
            rm.purchase_date = Some(e.purchase_date);
            rm.amounts = Some(e.amounts);
            rm.state = PurchaseState::Confirmed;
        }
        PurchaseEvent::PurchaseCancelled(e) => {
            rm.amounts = Some(e.amounts);
            rm.state = PurchaseState::Cancel;
        }
        PurchaseEvent::PurchaseResetToDraft(_) => {
            rm.amounts = None;
            rm.state = PurchaseState::Draft;
        }
        PurchaseEvent::InvoiceStateChanged(e) => rm.invoice_state = e.invoice_state,
        PurchaseEvent::ShipmentStateChanged(e) => rm.shipment_state = e.shipment_state,
        PurchaseEvent::PurchaseDone(_) => rm.state = PurchaseState::Done,
        PurchaseEvent::PurchaseCreated(_)
        | PurchaseEvent::PurchaseDeleted(_)
        | PurchaseEvent::InvoiceLinked(_)
        | PurchaseEvent::MovesLinked(_)
        | PurchaseEvent::ReturnShipmentLinked(_)
        | PurchaseEvent::InvoiceExceptionHandled(_)
        | PurchaseEvent::ShipmentExceptionHandled(_) => {}
    }
}

fn stream_of(event: &PurchaseEvent) -> (TenantId, PurchaseId) {
    match event {
        PurchaseEvent::PurchaseCreated(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::HeaderUpdated(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::LineAdded(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::LineRemoved(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::PurchaseQuoted(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::PurchaseConfirmed(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::PurchaseCancelled(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::PurchaseResetToDraft(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::PurchaseDeleted(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::InvoiceLinked(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::MovesLinked(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::ReturnShipmentLinked(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::InvoiceStateChanged(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::ShipmentStateChanged(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::InvoiceExceptionHandled(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::ShipmentExceptionHandled(e) => (e.tenant_id, e.purchase_id),
        PurchaseEvent::PurchaseDone(e) => (e.tenant_id, e.purchase_id),
    }
}
