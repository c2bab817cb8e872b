use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procurerp_accounting::PaymentTerm;
use procurerp_core::{Aggregate, AggregateId, AggregateRoot, Currency, DomainError, TenantId};
use procurerp_events::Event;
use procurerp_inventory::{ReturnShipmentId, StockMoveId, Warehouse};
use procurerp_invoicing::InvoiceId;
use procurerp_parties::{AddressId, PartyId};

use crate::amounts::{PurchaseAmounts, compute_amounts, line_amounts};
use crate::line::{PurchaseLine, PurchaseLineId, sort_lines};
use crate::links::{Classification, LinkedSet};
use crate::reconcile::is_done;
use crate::state::{InvoiceMethod, InvoiceState, PurchaseState, ShipmentState};

/// Purchase identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseId(pub AggregateId);

impl PurchaseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Purchase (one supplier order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    id: PurchaseId,
    tenant_id: Option<TenantId>,
    reference: Option<String>,
    supplier_reference: Option<String>,
    description: Option<String>,
    comment: Option<String>,
    party_id: Option<PartyId>,
    party_name: String,
    invoice_address: Option<AddressId>,
    payment_term: Option<PaymentTerm>,
    warehouse: Option<Warehouse>,
    currency: Currency,
    invoice_method: InvoiceMethod,
    purchase_date: Option<NaiveDate>,
    lines: Vec<PurchaseLine>,
    state: PurchaseState,
    invoice_state: InvoiceState,
    shipment_state: ShipmentState,
    invoices: LinkedSet<InvoiceId>,
    /// Totals frozen at confirmation or cancellation.
    amount_cache: Option<PurchaseAmounts>,
    return_shipments: Vec<ReturnShipmentId>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Purchase {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseId) -> Self {
        Self {
            id,
            tenant_id: None,
            reference: None,
            supplier_reference: None,
            description: None,
            comment: None,
            party_id: None,
            party_name: String::new(),
            invoice_address: None,
            payment_term: None,
            warehouse: None,
            currency: Currency::default(),
            invoice_method: InvoiceMethod::Order,
            purchase_date: None,
            lines: Vec::new(),
            state: PurchaseState::Draft,
            invoice_state: InvoiceState::None,
            shipment_state: ShipmentState::None,
            invoices: LinkedSet::new(),
            amount_cache: None,
            return_shipments: Vec::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn supplier_reference(&self) -> Option<&str> {
        self.supplier_reference.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn party_id(&self) -> Option<PartyId> {
        self.party_id
    }

    pub fn party_name(&self) -> &str {
        &self.party_name
    }

    pub fn invoice_address(&self) -> Option<AddressId> {
        self.invoice_address
    }

    pub fn payment_term(&self) -> Option<&PaymentTerm> {
        self.payment_term.as_ref()
    }

    pub fn warehouse(&self) -> Option<&Warehouse> {
        self.warehouse.as_ref()
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn invoice_method(&self) -> InvoiceMethod {
        self.invoice_method
    }

    pub fn purchase_date(&self) -> Option<NaiveDate> {
        self.purchase_date
    }

    pub fn lines(&self) -> &[PurchaseLine] {
        &self.lines
    }

    pub fn line(&self, line_id: PurchaseLineId) -> Option<&PurchaseLine> {
        self.lines.iter().find(|l| l.line_id == line_id)
    }

    pub fn state(&self) -> PurchaseState {
        self.state
    }

    pub fn invoice_state(&self) -> InvoiceState {
        self.invoice_state
    }

    pub fn shipment_state(&self) -> ShipmentState {
        self.shipment_state
    }

    pub fn invoices(&self) -> &LinkedSet<InvoiceId> {
        &self.invoices
    }

    pub fn return_shipments(&self) -> &[ReturnShipmentId] {
        &self.return_shipments
    }

    /// Every move linked to any line.
    pub fn moves(&self) -> impl Iterator<Item = StockMoveId> + '_ {
        self.lines
            .iter()
            .flat_map(|l| l.moves.linked().iter().copied())
    }

    /// Stored snapshot once confirmed, done or cancelled; live otherwise.
    pub fn amounts(&self) -> PurchaseAmounts {
        match self.amount_cache {
            Some(cached) if self.state.uses_amount_cache() => cached,
            _ => compute_amounts(&self.lines, &self.currency),
        }
    }

    /// Amount of each line (subtotals included), in line order.
    pub fn line_amounts(&self) -> Vec<Decimal> {
        line_amounts(&self.lines, &self.currency)
    }

    /// Display name: `"<reference> - <party>"`, the id standing in for a
    /// missing reference.
    pub fn rec_name(&self) -> String {
        let reference = self
            .reference
            .clone()
            .unwrap_or_else(|| self.id.to_string());
        format!("{reference} - {}", self.party_name)
    }

    /// Search by rec name: `"<reference>"` matches the reference or the
    /// supplier reference, `"<reference> - <party>"` also filters on the party.
    pub fn matches_rec_name(&self, query: &str) -> bool {
        rec_name_matches(
            self.reference.as_deref(),
            self.supplier_reference.as_deref(),
            &self.party_name,
            query,
        )
    }

    /// Commands creating a new draft copy of this purchase under `purchase_id`.
    ///
    /// Reference, purchase date, states and every invoice or move link are
    /// left behind.
    pub fn duplicate(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<PurchaseCommand>, DomainError> {
        self.ensure_existing(tenant_id, self.id)?;
        let party_id = self
            .party_id
            .ok_or_else(|| DomainError::invariant("purchase has no party"))?;

        let mut commands = vec![PurchaseCommand::CreatePurchase(CreatePurchase {
            tenant_id,
            purchase_id,
            party_id,
            party_name: self.party_name.clone(),
            invoice_address: self.invoice_address,
            payment_term: self.payment_term.clone(),
            warehouse: self.warehouse.clone(),
            currency: self.currency.clone(),
            invoice_method: self.invoice_method,
            supplier_reference: self.supplier_reference.clone(),
            description: self.description.clone(),
            comment: self.comment.clone(),
            purchase_date: None,
            occurred_at,
        })];
        commands.extend(self.lines.iter().map(|line| {
            PurchaseCommand::AddLine(AddLine {
                tenant_id,
                purchase_id,
                line: line.duplicate(PurchaseLineId::new(AggregateId::new())),
                occurred_at,
            })
        }));
        Ok(commands)
    }
}

/// Rec-name matching shared by the aggregate and the purchase read model.
pub fn rec_name_matches(
    reference: Option<&str>,
    supplier_reference: Option<&str>,
    party_name: &str,
    query: &str,
) -> bool {
    let contains = |value: &str, needle: &str| value.to_lowercase().contains(&needle.to_lowercase());
    let (code, party) = match query.split_once(" - ") {
        Some((code, party)) => (code, Some(party)),
        None => (query, None),
    };
    let code_matches = reference.is_some_and(|r| contains(r, code))
        || supplier_reference.is_some_and(|r| contains(r, code));
    let party_matches = party
        .filter(|p| !p.is_empty())
        .is_none_or(|p| contains(party_name, p));
    code_matches && party_matches
}

impl AggregateRoot for Purchase {
    type Id = PurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchase {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub party_id: PartyId,
    pub party_name: String,
    pub invoice_address: Option<AddressId>,
    pub payment_term: Option<PaymentTerm>,
    pub warehouse: Option<Warehouse>,
    pub currency: Currency,
    pub invoice_method: InvoiceMethod,
    pub supplier_reference: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateHeader (draft only). `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateHeader {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub supplier_reference: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub invoice_address: Option<AddressId>,
    pub payment_term: Option<PaymentTerm>,
    pub warehouse: Option<Warehouse>,
    pub currency: Option<Currency>,
    pub invoice_method: Option<InvoiceMethod>,
    pub purchase_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line: PurchaseLine,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line_id: PurchaseLineId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: QuotePurchase.
///
/// `reference` is the next number from the purchase sequence; it is only used
/// when the purchase has none yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePurchase {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmPurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPurchase {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    /// Purchase date used when none was entered.
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelPurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPurchase {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResetToDraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetToDraft {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeletePurchase (cancelled purchases only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePurchase {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInvoice {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkMoves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMoves {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line_id: PurchaseLineId,
    pub moves: Vec<StockMoveId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkReturnShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReturnShipment {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetInvoiceState.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInvoiceState {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub invoice_state: InvoiceState,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetShipmentState.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetShipmentState {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub shipment_state: ShipmentState,
    pub occurred_at: DateTime<Utc>,
}

/// Command: HandleInvoiceException.
///
/// `domain` holds the exceptioned invoices offered to the operator, `recreate`
/// the ones they picked; the rest of `domain` gets ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleInvoiceException {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub domain: Vec<InvoiceId>,
    pub recreate: Vec<InvoiceId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: HandleShipmentException (same shape, over cancelled moves).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleShipmentException {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub domain: Vec<StockMoveId>,
    pub recreate: Vec<StockMoveId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkDone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDone {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseCommand {
    CreatePurchase(CreatePurchase),
    UpdateHeader(UpdateHeader),
    AddLine(AddLine),
    RemoveLine(RemoveLine),
    QuotePurchase(QuotePurchase),
    ConfirmPurchase(ConfirmPurchase),
    CancelPurchase(CancelPurchase),
    ResetToDraft(ResetToDraft),
    DeletePurchase(DeletePurchase),
    LinkInvoice(LinkInvoice),
    LinkMoves(LinkMoves),
    LinkReturnShipment(LinkReturnShipment),
    SetInvoiceState(SetInvoiceState),
    SetShipmentState(SetShipmentState),
    HandleInvoiceException(HandleInvoiceException),
    HandleShipmentException(HandleShipmentException),
    MarkDone(MarkDone),
}

/// Event: PurchaseCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCreated {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub party_id: PartyId,
    pub party_name: String,
    pub invoice_address: Option<AddressId>,
    pub payment_term: Option<PaymentTerm>,
    pub warehouse: Option<Warehouse>,
    pub currency: Currency,
    pub invoice_method: InvoiceMethod,
    pub supplier_reference: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: HeaderUpdated. Only the `Some` fields changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderUpdated {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub supplier_reference: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub invoice_address: Option<AddressId>,
    pub payment_term: Option<PaymentTerm>,
    pub warehouse: Option<Warehouse>,
    pub currency: Option<Currency>,
    pub invoice_method: Option<InvoiceMethod>,
    pub purchase_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line: PurchaseLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line_id: PurchaseLineId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseQuoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseQuoted {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseConfirmed. Carries the totals snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseConfirmed {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub purchase_date: NaiveDate,
    pub amounts: PurchaseAmounts,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseCancelled. Carries the totals snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCancelled {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub amounts: PurchaseAmounts,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseResetToDraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResetToDraft {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseDeleted {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceLinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLinked {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovesLinked. Only newly linked moves are listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovesLinked {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub line_id: PurchaseLineId,
    pub moves: Vec<StockMoveId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnShipmentLinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnShipmentLinked {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceStateChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStateChanged {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub invoice_state: InvoiceState,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentStateChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentStateChanged {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub shipment_state: ShipmentState,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceExceptionHandled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceExceptionHandled {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub classification: Classification<InvoiceId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentExceptionHandled, one classification per affected line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentExceptionHandled {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub lines: Vec<(PurchaseLineId, Classification<StockMoveId>)>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseDone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseDone {
    pub tenant_id: TenantId,
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseEvent {
    PurchaseCreated(PurchaseCreated),
    HeaderUpdated(HeaderUpdated),
    LineAdded(LineAdded),
    LineRemoved(LineRemoved),
    PurchaseQuoted(PurchaseQuoted),
    PurchaseConfirmed(PurchaseConfirmed),
    PurchaseCancelled(PurchaseCancelled),
    PurchaseResetToDraft(PurchaseResetToDraft),
    PurchaseDeleted(PurchaseDeleted),
    InvoiceLinked(InvoiceLinked),
    MovesLinked(MovesLinked),
    ReturnShipmentLinked(ReturnShipmentLinked),
    InvoiceStateChanged(InvoiceStateChanged),
    ShipmentStateChanged(ShipmentStateChanged),
    InvoiceExceptionHandled(InvoiceExceptionHandled),
    ShipmentExceptionHandled(ShipmentExceptionHandled),
    PurchaseDone(PurchaseDone),
}

impl Event for PurchaseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseEvent::PurchaseCreated(_) => "purchasing.purchase.created",
            PurchaseEvent::HeaderUpdated(_) => "purchasing.purchase.header_updated",
            PurchaseEvent::LineAdded(_) => "purchasing.purchase.line_added",
            PurchaseEvent::LineRemoved(_) => "purchasing.purchase.line_removed",
            PurchaseEvent::PurchaseQuoted(_) => "purchasing.purchase.quoted",
            PurchaseEvent::PurchaseConfirmed(_) => "purchasing.purchase.confirmed",
            PurchaseEvent::PurchaseCancelled(_) => "purchasing.purchase.cancelled",
            PurchaseEvent::PurchaseResetToDraft(_) => "purchasing.purchase.reset_to_draft",
            PurchaseEvent::PurchaseDeleted(_) => "purchasing.purchase.deleted",
            PurchaseEvent::InvoiceLinked(_) => "purchasing.purchase.invoice_linked",
            PurchaseEvent::MovesLinked(_) => "purchasing.purchase.moves_linked",
            PurchaseEvent::ReturnShipmentLinked(_) => "purchasing.purchase.return_shipment_linked",
            PurchaseEvent::InvoiceStateChanged(_) => "purchasing.purchase.invoice_state_changed",
            PurchaseEvent::ShipmentStateChanged(_) => "purchasing.purchase.shipment_state_changed",
            PurchaseEvent::InvoiceExceptionHandled(_) => "purchasing.purchase.invoice_exception_handled",
            PurchaseEvent::ShipmentExceptionHandled(_) => {
                "purchasing.purchase.shipment_exception_handled"
            }
            PurchaseEvent::PurchaseDone(_) => "purchasing.purchase.done",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseEvent::PurchaseCreated(e) => e.occurred_at,
            PurchaseEvent::HeaderUpdated(e) => e.occurred_at,
            PurchaseEvent::LineAdded(e) => e.occurred_at,
            PurchaseEvent::LineRemoved(e) => e.occurred_at,
            PurchaseEvent::PurchaseQuoted(e) => e.occurred_at,
            PurchaseEvent::PurchaseConfirmed(e) => e.occurred_at,
            PurchaseEvent::PurchaseCancelled(e) => e.occurred_at,
            PurchaseEvent::PurchaseResetToDraft(e) => e.occurred_at,
            PurchaseEvent::PurchaseDeleted(e) => e.occurred_at,
            PurchaseEvent::InvoiceLinked(e) => e.occurred_at,
            PurchaseEvent::MovesLinked(e) => e.occurred_at,
            PurchaseEvent::ReturnShipmentLinked(e) => e.occurred_at,
            PurchaseEvent::InvoiceStateChanged(e) => e.occurred_at,
            PurchaseEvent::ShipmentStateChanged(e) => e.occurred_at,
            PurchaseEvent::InvoiceExceptionHandled(e) => e.occurred_at,
            PurchaseEvent::ShipmentExceptionHandled(e) => e.occurred_at,
            PurchaseEvent::PurchaseDone(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Purchase {
    type Command = PurchaseCommand;
    type Event = PurchaseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseEvent::PurchaseCreated(e) => {
                self.id = e.purchase_id;
                self.tenant_id = Some(e.tenant_id);
                self.party_id = Some(e.party_id);
                self.party_name = e.party_name.clone();
                self.invoice_address = e.invoice_address;
                self.payment_term = e.payment_term.clone();
                self.warehouse = e.warehouse.clone();
                self.currency = e.currency.clone();
                self.invoice_method = e.invoice_method;
                self.supplier_reference = e.supplier_reference.clone();
                self.description = e.description.clone();
                self.comment = e.comment.clone();
                self.purchase_date = e.purchase_date;
                self.state = PurchaseState::Draft;
                self.created = true;
            }
            PurchaseEvent::HeaderUpdated(e) => {
                if let Some(v) = &e.supplier_reference {
                    self.supplier_reference = Some(v.clone());
                }
                if let Some(v) = &e.description {
                    self.description = Some(v.clone());
                }
                if let Some(v) = &e.comment {
                    self.comment = Some(v.clone());
                }
                if let Some(v) = e.invoice_address {
                    self.invoice_address = Some(v);
                }
                if let Some(v) = &e.payment_term {
                    self.payment_term = Some(v.clone());
                }
                if let Some(v) = &e.warehouse {
                    self.warehouse = Some(v.clone());
                }
                if let Some(v) = &e.currency {
                    self.currency = v.clone();
                }
                if let Some(v) = e.invoice_method {
                    self.invoice_method = v;
                }
                if let Some(v) = e.purchase_date {
                    self.purchase_date = Some(v);
                }
            }
            PurchaseEvent::LineAdded(e) => {
                self.lines.push(e.line.clone());
                sort_lines(&mut self.lines);
            }
            PurchaseEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_id != e.line_id);
            }
            PurchaseEvent::PurchaseQuoted(e) => {
                self.reference = Some(e.reference.clone());
                self.state = PurchaseState::Quotation;
            }
            PurchaseEvent::PurchaseConfirmed(e) => {
                self.purchase_date = Some(e.purchase_date);
                self.amount_cache = Some(e.amounts);
                self.state = PurchaseState::Confirmed;
            }
            PurchaseEvent::PurchaseCancelled(e) => {
                self.amount_cache = Some(e.amounts);
                self.state = PurchaseState::Cancel;
            }
            PurchaseEvent::PurchaseResetToDraft(_) => {
                self.amount_cache = None;
                self.state = PurchaseState::Draft;
            }
            PurchaseEvent::PurchaseDeleted(_) => {
                self.deleted = true;
            }
            PurchaseEvent::InvoiceLinked(e) => {
                self.invoices.link(e.invoice_id);
            }
            PurchaseEvent::MovesLinked(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                    for move_id in &e.moves {
                        line.moves.link(*move_id);
                    }
                }
            }
            PurchaseEvent::ReturnShipmentLinked(e) => {
                if !self.return_shipments.contains(&e.shipment_id) {
                    self.return_shipments.push(e.shipment_id);
                }
            }
            PurchaseEvent::InvoiceStateChanged(e) => {
                self.invoice_state = e.invoice_state;
            }
            PurchaseEvent::ShipmentStateChanged(e) => {
                self.shipment_state = e.shipment_state;
            }
            PurchaseEvent::InvoiceExceptionHandled(e) => {
                self.invoices.absorb(&e.classification);
            }
            PurchaseEvent::ShipmentExceptionHandled(e) => {
                for (line_id, classification) in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == *line_id) {
                        line.moves.absorb(classification);
                    }
                }
            }
            PurchaseEvent::PurchaseDone(_) => {
                self.state = PurchaseState::Done;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseCommand::CreatePurchase(cmd) => self.handle_create(cmd),
            PurchaseCommand::UpdateHeader(cmd) => self.handle_update_header(cmd),
            PurchaseCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            PurchaseCommand::QuotePurchase(cmd) => self.handle_quote(cmd),
            PurchaseCommand::ConfirmPurchase(cmd) => self.handle_confirm(cmd),
            PurchaseCommand::CancelPurchase(cmd) => self.handle_cancel(cmd),
            PurchaseCommand::ResetToDraft(cmd) => self.handle_reset_to_draft(cmd),
            PurchaseCommand::DeletePurchase(cmd) => self.handle_delete(cmd),
            PurchaseCommand::LinkInvoice(cmd) => self.handle_link_invoice(cmd),
            PurchaseCommand::LinkMoves(cmd) => self.handle_link_moves(cmd),
            PurchaseCommand::LinkReturnShipment(cmd) => self.handle_link_return_shipment(cmd),
            PurchaseCommand::SetInvoiceState(cmd) => self.handle_set_invoice_state(cmd),
            PurchaseCommand::SetShipmentState(cmd) => self.handle_set_shipment_state(cmd),
            PurchaseCommand::HandleInvoiceException(cmd) => self.handle_invoice_exception(cmd),
            PurchaseCommand::HandleShipmentException(cmd) => self.handle_shipment_exception(cmd),
            PurchaseCommand::MarkDone(cmd) => self.handle_mark_done(cmd),
        }
    }
}

impl Purchase {
    fn ensure_existing(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != purchase_id {
            return Err(DomainError::invariant("purchase_id mismatch"));
        }
        Ok(())
    }

    fn ensure_state(&self, allowed: &[PurchaseState], action: &str) -> Result<(), DomainError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(DomainError::invariant(format!(
            "cannot {action} purchase {} in state {}",
            self.id, self.state
        )))
    }

    fn handle_create(&self, cmd: &CreatePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase already exists"));
        }
        if cmd.party_name.trim().is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }

        Ok(vec![PurchaseEvent::PurchaseCreated(PurchaseCreated {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            party_id: cmd.party_id,
            party_name: cmd.party_name.clone(),
            invoice_address: cmd.invoice_address,
            payment_term: cmd.payment_term.clone(),
            warehouse: cmd.warehouse.clone(),
            currency: cmd.currency.clone(),
            invoice_method: cmd.invoice_method,
            supplier_reference: cmd.supplier_reference.clone(),
            description: cmd.description.clone(),
            comment: cmd.comment.clone(),
            purchase_date: cmd.purchase_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_header(&self, cmd: &UpdateHeader) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Draft], "modify")?;

        Ok(vec![PurchaseEvent::HeaderUpdated(HeaderUpdated {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            supplier_reference: cmd.supplier_reference.clone(),
            description: cmd.description.clone(),
            comment: cmd.comment.clone(),
            invoice_address: cmd.invoice_address,
            payment_term: cmd.payment_term.clone(),
            warehouse: cmd.warehouse.clone(),
            currency: cmd.currency.clone(),
            invoice_method: cmd.invoice_method,
            purchase_date: cmd.purchase_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Draft], "modify")?;

        cmd.line.validate()?;
        if self.line(cmd.line.line_id).is_some() {
            return Err(DomainError::conflict(format!(
                "line {} already exists",
                cmd.line.line_id
            )));
        }
        if !cmd.line.moves.is_empty() {
            return Err(DomainError::validation("a new line cannot carry stock moves"));
        }

        Ok(vec![PurchaseEvent::LineAdded(LineAdded {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            line: cmd.line.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Draft], "modify")?;

        if self.line(cmd.line_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![PurchaseEvent::LineRemoved(LineRemoved {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            line_id: cmd.line_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_quote(&self, cmd: &QuotePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Draft], "quote")?;

        if self.invoice_address.is_none() {
            return Err(DomainError::validation(format!(
                "invoice address required before quotation of purchase \"{}\"",
                self.rec_name()
            )));
        }
        if self.warehouse.is_none() && self.lines.iter().any(|l| l.is_stockable()) {
            return Err(DomainError::validation(format!(
                "warehouse required for purchase \"{}\"",
                self.rec_name()
            )));
        }
        let reference = self
            .reference
            .clone()
            .or_else(|| cmd.reference.clone())
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| DomainError::validation("purchase reference required for quotation"))?;

        Ok(vec![PurchaseEvent::PurchaseQuoted(PurchaseQuoted {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            reference,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmPurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Quotation, PurchaseState::Confirmed], "confirm")?;

        // Confirming again only re-runs processing, which happens outside.
        if self.state == PurchaseState::Confirmed {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseEvent::PurchaseConfirmed(PurchaseConfirmed {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            purchase_date: self.purchase_date.unwrap_or(cmd.today),
            amounts: compute_amounts(&self.lines, &self.currency),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelPurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Draft, PurchaseState::Quotation], "cancel")?;

        Ok(vec![PurchaseEvent::PurchaseCancelled(PurchaseCancelled {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            amounts: compute_amounts(&self.lines, &self.currency),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reset_to_draft(&self, cmd: &ResetToDraft) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Quotation, PurchaseState::Cancel], "reset")?;

        Ok(vec![PurchaseEvent::PurchaseResetToDraft(PurchaseResetToDraft {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeletePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;

        if self.state != PurchaseState::Cancel {
            return Err(DomainError::validation(format!(
                "purchase \"{}\" must be cancelled before deletion",
                self.rec_name()
            )));
        }

        Ok(vec![PurchaseEvent::PurchaseDeleted(PurchaseDeleted {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link_invoice(&self, cmd: &LinkInvoice) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Confirmed], "invoice")?;

        if self.invoices.contains(cmd.invoice_id) {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseEvent::InvoiceLinked(InvoiceLinked {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link_moves(&self, cmd: &LinkMoves) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Confirmed], "ship")?;

        let line = self.line(cmd.line_id).ok_or_else(DomainError::not_found)?;
        if !line.is_stockable() {
            return Err(DomainError::validation(format!(
                "line \"{}\" does not move goods",
                line.description
            )));
        }

        let mut moves: Vec<StockMoveId> = Vec::new();
        for move_id in &cmd.moves {
            if !line.moves.contains(*move_id) && !moves.contains(move_id) {
                moves.push(*move_id);
            }
        }
        if moves.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseEvent::MovesLinked(MovesLinked {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            line_id: cmd.line_id,
            moves,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link_return_shipment(
        &self,
        cmd: &LinkReturnShipment,
    ) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Confirmed], "ship")?;

        if self.return_shipments.contains(&cmd.shipment_id) {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseEvent::ReturnShipmentLinked(ReturnShipmentLinked {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            shipment_id: cmd.shipment_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_invoice_state(&self, cmd: &SetInvoiceState) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Confirmed, PurchaseState::Done], "update")?;

        if self.invoice_state == cmd.invoice_state {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseEvent::InvoiceStateChanged(InvoiceStateChanged {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            invoice_state: cmd.invoice_state,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_shipment_state(
        &self,
        cmd: &SetShipmentState,
    ) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Confirmed, PurchaseState::Done], "update")?;

        if self.shipment_state == cmd.shipment_state {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseEvent::ShipmentStateChanged(ShipmentStateChanged {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            shipment_state: cmd.shipment_state,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_invoice_exception(
        &self,
        cmd: &HandleInvoiceException,
    ) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Confirmed, PurchaseState::Done], "handle exceptions of")?;

        let classification = self.invoices.classify(&cmd.domain, &cmd.recreate);
        if classification.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseEvent::InvoiceExceptionHandled(InvoiceExceptionHandled {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            classification,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_shipment_exception(
        &self,
        cmd: &HandleShipmentException,
    ) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Confirmed, PurchaseState::Done], "handle exceptions of")?;

        let lines: Vec<_> = self
            .lines
            .iter()
            .map(|l| (l.line_id, l.moves.classify(&cmd.domain, &cmd.recreate)))
            .filter(|(_, c)| !c.is_empty())
            .collect();
        if lines.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseEvent::ShipmentExceptionHandled(ShipmentExceptionHandled {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_done(&self, cmd: &MarkDone) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.purchase_id)?;
        self.ensure_state(&[PurchaseState::Confirmed], "complete")?;

        if !is_done(self.invoice_state, self.invoice_method, self.shipment_state) {
            return Err(DomainError::invariant(format!(
                "purchase \"{}\" is not paid and received yet",
                self.rec_name()
            )));
        }

        Ok(vec![PurchaseEvent::PurchaseDone(PurchaseDone {
            tenant_id: cmd.tenant_id,
            purchase_id: cmd.purchase_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LineKind;
    use procurerp_events::execute;
    use procurerp_inventory::{LocationId, WarehouseId};
    use procurerp_products::{ProductId, ProductKind, ProductSummary, Uom};
    use rust_decimal_macros::dec;

    struct Fixture {
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        purchase: Purchase,
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn warehouse() -> Warehouse {
        Warehouse::new(
            WarehouseId::new(AggregateId::new()),
            "Main",
            LocationId::new(AggregateId::new()),
            LocationId::new(AggregateId::new()),
        )
    }

    fn goods() -> ProductSummary {
        ProductSummary {
            product_id: ProductId::new(AggregateId::new()),
            name: "Steel beam".to_string(),
            kind: ProductKind::Goods,
            purchase_uom: Uom::unit(),
            account_expense: None,
            supplier_taxes: vec![],
        }
    }

    fn new_line() -> PurchaseLineId {
        PurchaseLineId::new(AggregateId::new())
    }

    fn draft(invoice_address: Option<AddressId>, warehouse: Option<Warehouse>) -> Fixture {
        let tenant_id = TenantId::new();
        let purchase_id = PurchaseId::new(AggregateId::new());
        let mut purchase = Purchase::empty(purchase_id);
        execute(
            &mut purchase,
            &PurchaseCommand::CreatePurchase(CreatePurchase {
                tenant_id,
                purchase_id,
                party_id: PartyId::new(AggregateId::new()),
                party_name: "Acme Supplies".to_string(),
                invoice_address,
                payment_term: None,
                warehouse,
                currency: Currency::new("EUR", 2),
                invoice_method: InvoiceMethod::Order,
                supplier_reference: Some("SUP-77".to_string()),
                description: None,
                comment: None,
                purchase_date: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        Fixture {
            tenant_id,
            purchase_id,
            purchase,
        }
    }

    fn ready() -> Fixture {
        draft(Some(AddressId::new(AggregateId::new())), Some(warehouse()))
    }

    impl Fixture {
        fn run(&mut self, command: PurchaseCommand) -> Result<Vec<PurchaseEvent>, DomainError> {
            execute(&mut self.purchase, &command)
        }

        fn add(&mut self, line: PurchaseLine) {
            self.run(PurchaseCommand::AddLine(AddLine {
                tenant_id: self.tenant_id,
                purchase_id: self.purchase_id,
                line,
                occurred_at: test_time(),
            }))
            .unwrap();
        }

        fn quote(&mut self) -> Result<Vec<PurchaseEvent>, DomainError> {
            self.run(PurchaseCommand::QuotePurchase(QuotePurchase {
                tenant_id: self.tenant_id,
                purchase_id: self.purchase_id,
                reference: Some("P0001".to_string()),
                occurred_at: test_time(),
            }))
        }

        fn confirm(&mut self) -> Result<Vec<PurchaseEvent>, DomainError> {
            self.run(PurchaseCommand::ConfirmPurchase(ConfirmPurchase {
                tenant_id: self.tenant_id,
                purchase_id: self.purchase_id,
                today: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                occurred_at: test_time(),
            }))
        }

        fn cancel(&mut self) -> Result<Vec<PurchaseEvent>, DomainError> {
            self.run(PurchaseCommand::CancelPurchase(CancelPurchase {
                tenant_id: self.tenant_id,
                purchase_id: self.purchase_id,
                occurred_at: test_time(),
            }))
        }

        fn delete(&mut self) -> Result<Vec<PurchaseEvent>, DomainError> {
            self.run(PurchaseCommand::DeletePurchase(DeletePurchase {
                tenant_id: self.tenant_id,
                purchase_id: self.purchase_id,
                occurred_at: test_time(),
            }))
        }
    }

    #[test]
    fn quotation_requires_invoice_address() {
        let mut f = draft(None, Some(warehouse()));
        let err = f.quote().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("invoice address")));
        assert_eq!(f.purchase.state(), PurchaseState::Draft);
    }

    #[test]
    fn quotation_requires_warehouse_only_for_goods() {
        let mut f = draft(Some(AddressId::new(AggregateId::new())), None);
        f.add(PurchaseLine::without_product(new_line(), "Audit", dec!(1), dec!(900)));
        f.quote().unwrap();

        let mut f = draft(Some(AddressId::new(AggregateId::new())), None);
        f.add(PurchaseLine::for_product(new_line(), goods(), dec!(3), dec!(10)));
        let err = f.quote().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("warehouse required")));
    }

    #[test]
    fn reference_is_assigned_on_quotation_and_kept_afterwards() {
        let mut f = ready();
        assert_eq!(f.purchase.reference(), None);
        f.quote().unwrap();
        assert_eq!(f.purchase.reference(), Some("P0001"));
        assert_eq!(f.purchase.rec_name(), "P0001 - Acme Supplies");

        f.run(PurchaseCommand::ResetToDraft(ResetToDraft {
            tenant_id: f.tenant_id,
            purchase_id: f.purchase_id,
            occurred_at: test_time(),
        }))
        .unwrap();
        f.run(PurchaseCommand::QuotePurchase(QuotePurchase {
            tenant_id: f.tenant_id,
            purchase_id: f.purchase_id,
            reference: Some("P0002".to_string()),
            occurred_at: test_time(),
        }))
        .unwrap();
        assert_eq!(f.purchase.reference(), Some("P0001"));
    }

    #[test]
    fn confirmation_freezes_totals_and_sets_date() {
        let mut f = ready();
        f.add(PurchaseLine::for_product(new_line(), goods(), dec!(3), dec!(10.005)));
        f.quote().unwrap();
        f.confirm().unwrap();

        assert_eq!(f.purchase.state(), PurchaseState::Confirmed);
        assert_eq!(f.purchase.purchase_date(), NaiveDate::from_ymd_opt(2024, 3, 1));
        let amounts = f.purchase.amounts();
        assert_eq!(amounts.untaxed_amount, dec!(30.02));
        assert_eq!(amounts.total_amount, amounts.untaxed_amount + amounts.tax_amount);

        // Confirming again is accepted and changes nothing.
        assert!(f.confirm().unwrap().is_empty());
    }

    #[test]
    fn lines_are_frozen_outside_draft() {
        let mut f = ready();
        f.quote().unwrap();
        let err = f
            .run(PurchaseCommand::AddLine(AddLine {
                tenant_id: f.tenant_id,
                purchase_id: f.purchase_id,
                line: PurchaseLine::layout(new_line(), LineKind::Comment, "late"),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn deleting_before_cancelling_fails() {
        let mut f = ready();
        let err = f.delete().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("must be cancelled")));
        assert!(f.purchase.is_created());
    }

    #[test]
    fn cancel_then_delete_succeeds() {
        let mut f = ready();
        f.add(PurchaseLine::without_product(new_line(), "Freight", dec!(1), dec!(45)));
        f.cancel().unwrap();
        assert_eq!(f.purchase.amounts().untaxed_amount, dec!(45));

        f.delete().unwrap();
        assert!(f.purchase.is_deleted());
        assert!(matches!(f.cancel().unwrap_err(), DomainError::NotFound));
    }

    #[test]
    fn confirmed_purchase_cannot_be_cancelled_or_deleted() {
        let mut f = ready();
        f.quote().unwrap();
        f.confirm().unwrap();
        assert!(f.cancel().is_err());
        assert!(f.delete().is_err());
    }

    #[test]
    fn state_write_back_only_on_change() {
        let mut f = ready();
        f.quote().unwrap();
        f.confirm().unwrap();
        let (tenant_id, purchase_id) = (f.tenant_id, f.purchase_id);
        let set = move |state| {
            PurchaseCommand::SetInvoiceState(SetInvoiceState {
                tenant_id,
                purchase_id,
                invoice_state: state,
                occurred_at: test_time(),
            })
        };
        let unchanged = set(InvoiceState::None);
        let changed = set(InvoiceState::Waiting);
        assert!(f.run(unchanged).unwrap().is_empty());
        assert_eq!(f.run(changed.clone()).unwrap().len(), 1);
        assert!(f.run(changed).unwrap().is_empty());
    }

    #[test]
    fn empty_recreate_selection_ignores_every_exception() {
        let mut f = ready();
        f.quote().unwrap();
        f.confirm().unwrap();
        let invoices: Vec<_> = (0..2).map(|_| InvoiceId::new(AggregateId::new())).collect();
        for invoice_id in &invoices {
            f.run(PurchaseCommand::LinkInvoice(LinkInvoice {
                tenant_id: f.tenant_id,
                purchase_id: f.purchase_id,
                invoice_id: *invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        }

        let handle = PurchaseCommand::HandleInvoiceException(HandleInvoiceException {
            tenant_id: f.tenant_id,
            purchase_id: f.purchase_id,
            domain: invoices.clone(),
            recreate: vec![],
            occurred_at: test_time(),
        });
        f.run(handle.clone()).unwrap();
        assert_eq!(f.purchase.invoices().ignored().len(), 2);
        assert!(f.purchase.invoices().recreated().is_empty());

        // Handling again finds nothing left to classify.
        assert!(f.run(handle).unwrap().is_empty());
    }

    #[test]
    fn mark_done_requires_paid_and_received() {
        let mut f = ready();
        f.quote().unwrap();
        f.confirm().unwrap();
        let mark_done = PurchaseCommand::MarkDone(MarkDone {
            tenant_id: f.tenant_id,
            purchase_id: f.purchase_id,
            occurred_at: test_time(),
        });
        assert!(f.run(mark_done.clone()).is_err());

        f.run(PurchaseCommand::SetShipmentState(SetShipmentState {
            tenant_id: f.tenant_id,
            purchase_id: f.purchase_id,
            shipment_state: ShipmentState::Received,
            occurred_at: test_time(),
        }))
        .unwrap();
        assert!(f.run(mark_done.clone()).is_err());

        f.run(PurchaseCommand::SetInvoiceState(SetInvoiceState {
            tenant_id: f.tenant_id,
            purchase_id: f.purchase_id,
            invoice_state: InvoiceState::Paid,
            occurred_at: test_time(),
        }))
        .unwrap();
        f.run(mark_done).unwrap();
        assert_eq!(f.purchase.state(), PurchaseState::Done);
    }

    #[test]
    fn duplicate_starts_a_fresh_draft() {
        let mut f = ready();
        f.add(PurchaseLine::for_product(new_line(), goods(), dec!(2), dec!(5)).with_sequence(1));
        f.quote().unwrap();
        f.confirm().unwrap();

        let copy_id = PurchaseId::new(AggregateId::new());
        let commands = f.purchase.duplicate(f.tenant_id, copy_id, test_time()).unwrap();
        let mut copy = Purchase::empty(copy_id);
        for command in &commands {
            execute(&mut copy, command).unwrap();
        }
        assert_eq!(copy.state(), PurchaseState::Draft);
        assert_eq!(copy.reference(), None);
        assert_eq!(copy.purchase_date(), None);
        assert_eq!(copy.lines().len(), 1);
        assert_ne!(copy.lines()[0].line_id, f.purchase.lines()[0].line_id);
        assert_eq!(copy.supplier_reference(), Some("SUP-77"));
    }

    #[test]
    fn rec_name_search() {
        assert!(rec_name_matches(Some("P0042"), None, "Acme", "p004"));
        assert!(rec_name_matches(None, Some("SUP-77"), "Acme", "sup-77"));
        assert!(rec_name_matches(Some("P0042"), None, "Acme Supplies", "P0042 - acme"));
        assert!(!rec_name_matches(Some("P0042"), None, "Acme Supplies", "P0042 - Globex"));
        assert!(!rec_name_matches(None, None, "Acme", "P0042"));
    }
}
