//! Purchase orchestration.
//!
//! Runs purchase commands through the dispatcher and carries out what the
//! processing planner decides: supplier invoices, stock moves and return
//! shipments are created as their own aggregates and linked back to the
//! purchase. An inline purchase read model backs listings, rec-name search
//! and the supplier currency default.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};

use procurerp_accounting::PaymentTerm;
use procurerp_core::{Aggregate, AggregateId, Currency, DomainError, TenantId};
use procurerp_events::{Event, EventBus, EventEnvelope};
use procurerp_inventory::{
    AssignMoveToShipment, CancelMove, CancelReturnShipment, DoMove, DoReturnShipment, MoveState,
    ReturnShipment, ReturnShipmentCommand, ReturnShipmentId, StockMove, StockMoveCommand,
    StockMoveId, WaitReturnShipment, Warehouse,
};
use procurerp_invoicing::{
    CancelInvoice, Invoice, InvoiceCommand, InvoiceId, PostInvoice, RegisterPayment,
};
use procurerp_parties::{AddressId, Party, PartyCommand, PartyId};
use procurerp_products::{Product, ProductCommand, ProductId};
use procurerp_purchasing::{
    AddLine, CancelPurchase, ConfirmPurchase, CreatePurchase, DeletePurchase, ExceptionWizard,
    HandleInvoiceException, HandleShipmentException, InvoiceMethod, InvoiceState, LinkInvoice,
    LinkMoves, LinkReturnShipment, MarkDone, ProcessingContext, Purchase, PurchaseAmounts,
    PurchaseCommand, PurchaseConfiguration, PurchaseId, PurchaseLine, PurchaseLineId,
    PurchaseState, QuotePurchase, RemoveLine, ResetToDraft, SetInvoiceState, SetShipmentState,
    ShipmentState, UpdateHeader, WizardOutcome, plan_process,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::{
    OpenSupplier, PRODUCT_AGGREGATE_TYPE, PURCHASE_AGGREGATE_TYPE, PurchaseProjectionError,
    PurchaseReadModel, PurchasesProjection,
};
use crate::read_model::InMemoryTenantStore;
use crate::sequence::{SequenceError, SequenceGenerator};

pub const PARTY_AGGREGATE_TYPE: &str = "parties.party";
pub const INVOICE_AGGREGATE_TYPE: &str = "invoicing.invoice";
pub const MOVE_AGGREGATE_TYPE: &str = "inventory.move";
pub const RETURN_SHIPMENT_AGGREGATE_TYPE: &str = "inventory.return_shipment";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    Projection(#[from] PurchaseProjectionError),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

impl ServiceError {
    /// The user-facing message of a validation failure.
    pub fn validation_message(&self) -> Option<&str> {
        match self {
            ServiceError::Dispatch(DispatchError::Validation(msg)) => Some(msg),
            ServiceError::Domain(err) => err.user_message(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound { .. }
                | ServiceError::Dispatch(DispatchError::NotFound)
                | ServiceError::Domain(DomainError::NotFound)
        )
    }
}

/// Header of a new purchase. Invoice address and payment term always come
/// from the supplier; unset values below come from the supplier's history
/// or the configuration.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub party_id: PartyId,
    pub warehouse: Option<Warehouse>,
    pub currency: Option<Currency>,
    pub invoice_method: Option<InvoiceMethod>,
    pub supplier_reference: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub purchase_date: Option<NaiveDate>,
}

impl NewPurchase {
    pub fn from_supplier(party_id: PartyId) -> Self {
        Self {
            party_id,
            warehouse: None,
            currency: None,
            invoice_method: None,
            supplier_reference: None,
            description: None,
            comment: None,
            purchase_date: None,
        }
    }

    pub fn with_warehouse(mut self, warehouse: Warehouse) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn with_invoice_method(mut self, method: InvoiceMethod) -> Self {
        self.invoice_method = Some(method);
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn with_supplier_reference(mut self, reference: impl Into<String>) -> Self {
        self.supplier_reference = Some(reference.into());
        self
    }
}

/// Header changes of a draft purchase; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct HeaderChanges {
    pub supplier_reference: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub invoice_address: Option<AddressId>,
    pub payment_term: Option<PaymentTerm>,
    pub warehouse: Option<Warehouse>,
    pub currency: Option<Currency>,
    pub invoice_method: Option<InvoiceMethod>,
    pub purchase_date: Option<NaiveDate>,
}

/// Documents created by one processing run and the states it settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub invoices: Vec<InvoiceId>,
    pub moves: Vec<StockMoveId>,
    pub return_shipment: Option<ReturnShipmentId>,
    pub invoice_state: InvoiceState,
    pub shipment_state: ShipmentState,
    pub done: bool,
}

impl ProcessOutcome {
    fn unchanged(purchase: &Purchase) -> Self {
        Self {
            invoices: Vec::new(),
            moves: Vec::new(),
            return_shipment: None,
            invoice_state: purchase.invoice_state(),
            shipment_state: purchase.shipment_state(),
            done: purchase.state() == PurchaseState::Done,
        }
    }

    pub fn created_nothing(&self) -> bool {
        self.invoices.is_empty() && self.moves.is_empty() && self.return_shipment.is_none()
    }
}

type PurchaseReadStore = InMemoryTenantStore<PurchaseId, PurchaseReadModel>;

pub struct PurchaseService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    purchases: PurchasesProjection<PurchaseReadStore>,
    sequence: SequenceGenerator,
    config: PurchaseConfiguration,
}

impl<S, B> PurchaseService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, config: PurchaseConfiguration) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            purchases: PurchasesProjection::new(InMemoryTenantStore::new()),
            sequence: SequenceGenerator::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &PurchaseConfiguration {
        &self.config
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    /// Replace the purchase read model with a replay of `envelopes`.
    pub fn rebuild_read_model(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ServiceError> {
        Ok(self.purchases.rebuild_from_scratch(envelopes)?)
    }

    // Master data and documents.

    pub fn execute_party(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        command: PartyCommand,
    ) -> Result<(), ServiceError> {
        self.execute(tenant_id, party_id.0, PARTY_AGGREGATE_TYPE, command, |id| {
            Party::empty(PartyId::new(id))
        })?;
        Ok(())
    }

    pub fn execute_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        command: ProductCommand,
    ) -> Result<(), ServiceError> {
        self.execute(tenant_id, product_id.0, PRODUCT_AGGREGATE_TYPE, command, |id| {
            Product::empty(ProductId::new(id))
        })?;
        Ok(())
    }

    pub fn party(&self, tenant_id: TenantId, party_id: PartyId) -> Result<Party, ServiceError> {
        let party = self.load(tenant_id, party_id.0, |id| Party::empty(PartyId::new(id)))?;
        existing(party, Party::is_created, "party", party_id)
    }

    pub fn product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Product, ServiceError> {
        let product = self.load(tenant_id, product_id.0, |id| Product::empty(ProductId::new(id)))?;
        existing(product, Product::is_created, "product", product_id)
    }

    pub fn invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<Invoice, ServiceError> {
        let invoice = self.load(tenant_id, invoice_id.0, |id| Invoice::empty(InvoiceId::new(id)))?;
        existing(invoice, Invoice::is_created, "invoice", invoice_id)
    }

    pub fn stock_move(&self, tenant_id: TenantId, move_id: StockMoveId) -> Result<StockMove, ServiceError> {
        let mv = self.load(tenant_id, move_id.0, |id| StockMove::empty(StockMoveId::new(id)))?;
        existing(mv, StockMove::is_created, "move", move_id)
    }

    pub fn return_shipment(
        &self,
        tenant_id: TenantId,
        shipment_id: ReturnShipmentId,
    ) -> Result<ReturnShipment, ServiceError> {
        let shipment = self.load(tenant_id, shipment_id.0, |id| {
            ReturnShipment::empty(ReturnShipmentId::new(id))
        })?;
        existing(shipment, ReturnShipment::is_created, "return shipment", shipment_id)
    }

    pub fn post_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), ServiceError> {
        let command = InvoiceCommand::PostInvoice(PostInvoice {
            tenant_id,
            invoice_id,
            occurred_at: Utc::now(),
        });
        self.execute_invoice(tenant_id, invoice_id, command)
    }

    /// Register a payment; `None` pays whatever is still outstanding.
    pub fn pay_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        amount: Option<Decimal>,
    ) -> Result<(), ServiceError> {
        let amount = match amount {
            Some(amount) => amount,
            None => self.invoice(tenant_id, invoice_id)?.outstanding_amount(),
        };
        let command = InvoiceCommand::RegisterPayment(RegisterPayment {
            tenant_id,
            invoice_id,
            amount,
            occurred_at: Utc::now(),
        });
        self.execute_invoice(tenant_id, invoice_id, command)
    }

    pub fn cancel_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        reason: Option<String>,
    ) -> Result<(), ServiceError> {
        let command = InvoiceCommand::CancelInvoice(CancelInvoice {
            tenant_id,
            invoice_id,
            reason,
            occurred_at: Utc::now(),
        });
        self.execute_invoice(tenant_id, invoice_id, command)
    }

    pub fn do_move(&self, tenant_id: TenantId, move_id: StockMoveId) -> Result<(), ServiceError> {
        let command = StockMoveCommand::DoMove(DoMove {
            tenant_id,
            move_id,
            occurred_at: Utc::now(),
        });
        self.execute_move(tenant_id, move_id, command)
    }

    pub fn cancel_move(&self, tenant_id: TenantId, move_id: StockMoveId) -> Result<(), ServiceError> {
        let command = StockMoveCommand::CancelMove(CancelMove {
            tenant_id,
            move_id,
            occurred_at: Utc::now(),
        });
        self.execute_move(tenant_id, move_id, command)
    }

    /// Ship a waiting return shipment back to the supplier, with its moves.
    pub fn do_return_shipment(
        &self,
        tenant_id: TenantId,
        shipment_id: ReturnShipmentId,
    ) -> Result<(), ServiceError> {
        let shipment = self.return_shipment(tenant_id, shipment_id)?;
        for move_id in shipment.moves().iter().copied() {
            if self.stock_move(tenant_id, move_id)?.state() == MoveState::Draft {
                self.do_move(tenant_id, move_id)?;
            }
        }
        let command = ReturnShipmentCommand::DoReturnShipment(DoReturnShipment {
            tenant_id,
            shipment_id,
            occurred_at: Utc::now(),
        });
        self.execute_return_shipment(tenant_id, shipment_id, command)
    }

    /// Cancel a return shipment and its moves still pending.
    pub fn cancel_return_shipment(
        &self,
        tenant_id: TenantId,
        shipment_id: ReturnShipmentId,
    ) -> Result<(), ServiceError> {
        let shipment = self.return_shipment(tenant_id, shipment_id)?;
        let command = ReturnShipmentCommand::CancelReturnShipment(CancelReturnShipment {
            tenant_id,
            shipment_id,
            occurred_at: Utc::now(),
        });
        self.execute_return_shipment(tenant_id, shipment_id, command)?;
        for move_id in shipment.moves().iter().copied() {
            if self.stock_move(tenant_id, move_id)?.state() == MoveState::Draft {
                self.cancel_move(tenant_id, move_id)?;
            }
        }
        Ok(())
    }

    // Purchases.

    /// Current state of a purchase; deleted purchases are not found.
    pub fn purchase(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<Purchase, ServiceError> {
        let purchase = self.load(tenant_id, purchase_id.0, |id| Purchase::empty(PurchaseId::new(id)))?;
        existing(
            purchase,
            |p| p.is_created() && !p.is_deleted(),
            "purchase",
            purchase_id,
        )
    }

    pub fn create(&self, tenant_id: TenantId, new: NewPurchase) -> Result<PurchaseId, ServiceError> {
        let party = self.party(tenant_id, new.party_id)?;
        if !party.can_transact() {
            return Err(DomainError::validation(format!(
                "supplier \"{}\" is suspended",
                party.name()
            ))
            .into());
        }
        let supplier = party.supplier_summary();
        let currency = new
            .currency
            .or_else(|| self.purchases.usual_currency(tenant_id, new.party_id))
            .unwrap_or_else(|| self.config.default_currency.clone());

        let purchase_id = PurchaseId::new(AggregateId::new());
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::CreatePurchase(CreatePurchase {
                tenant_id,
                purchase_id,
                party_id: new.party_id,
                party_name: supplier.name,
                invoice_address: supplier.invoice_address.map(|a| a.address_id),
                payment_term: supplier.payment_term,
                warehouse: new.warehouse,
                currency,
                invoice_method: new.invoice_method.unwrap_or(self.config.default_invoice_method),
                supplier_reference: new.supplier_reference,
                description: new.description,
                comment: new.comment,
                purchase_date: new.purchase_date,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(tenant = %tenant_id, purchase = %purchase_id, party = %new.party_id, "purchase created");
        Ok(purchase_id)
    }

    pub fn update_header(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        changes: HeaderChanges,
    ) -> Result<(), ServiceError> {
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::UpdateHeader(UpdateHeader {
                tenant_id,
                purchase_id,
                supplier_reference: changes.supplier_reference,
                description: changes.description,
                comment: changes.comment,
                invoice_address: changes.invoice_address,
                payment_term: changes.payment_term,
                warehouse: changes.warehouse,
                currency: changes.currency,
                invoice_method: changes.invoice_method,
                purchase_date: changes.purchase_date,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn add_line(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        line: PurchaseLine,
    ) -> Result<PurchaseLineId, ServiceError> {
        let line_id = line.line_id;
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::AddLine(AddLine {
                tenant_id,
                purchase_id,
                line,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(line_id)
    }

    /// Add a line for `product_id` in its purchase unit, with its supplier
    /// taxes.
    pub fn add_product_line(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        product_id: ProductId,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Result<PurchaseLineId, ServiceError> {
        let product = self.product(tenant_id, product_id)?;
        if !product.is_purchasable() {
            return Err(DomainError::validation(format!(
                "product \"{}\" cannot be purchased",
                product.name()
            ))
            .into());
        }
        let line = PurchaseLine::for_product(
            PurchaseLineId::new(AggregateId::new()),
            product.summary(),
            quantity,
            unit_price,
        );
        self.add_line(tenant_id, purchase_id, line)
    }

    pub fn remove_line(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        line_id: PurchaseLineId,
    ) -> Result<(), ServiceError> {
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::RemoveLine(RemoveLine {
                tenant_id,
                purchase_id,
                line_id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Move a draft to quotation, numbering it on its first quotation.
    /// Returns the reference.
    pub fn quote(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<String, ServiceError> {
        let purchase = self.purchase(tenant_id, purchase_id)?;
        let quote = |reference: String| {
            PurchaseCommand::QuotePurchase(QuotePurchase {
                tenant_id,
                purchase_id,
                reference: Some(reference),
                occurred_at: Utc::now(),
            })
        };

        let reference = match purchase.reference() {
            Some(reference) => reference.to_string(),
            None => {
                // A rejected quotation must not use up a number.
                purchase.handle(&quote(String::from("?")))?;
                self.sequence.next(tenant_id)?
            }
        };
        self.run(tenant_id, purchase_id, quote(reference.clone()))?;
        info!(tenant = %tenant_id, purchase = %purchase_id, reference = %reference, "purchase quoted");
        Ok(reference)
    }

    /// Confirm a quotation, then process it.
    pub fn confirm(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
    ) -> Result<ProcessOutcome, ServiceError> {
        let now = Utc::now();
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::ConfirmPurchase(ConfirmPurchase {
                tenant_id,
                purchase_id,
                today: now.date_naive(),
                occurred_at: now,
            }),
        )?;
        info!(tenant = %tenant_id, purchase = %purchase_id, "purchase confirmed");
        self.process(tenant_id, purchase_id)
    }

    pub fn cancel(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<(), ServiceError> {
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::CancelPurchase(CancelPurchase {
                tenant_id,
                purchase_id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(tenant = %tenant_id, purchase = %purchase_id, "purchase cancelled");
        Ok(())
    }

    pub fn reset_to_draft(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<(), ServiceError> {
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::ResetToDraft(ResetToDraft {
                tenant_id,
                purchase_id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Delete a cancelled purchase.
    pub fn delete(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<(), ServiceError> {
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::DeletePurchase(DeletePurchase {
                tenant_id,
                purchase_id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(tenant = %tenant_id, purchase = %purchase_id, "purchase deleted");
        Ok(())
    }

    /// New draft with the header and lines of `purchase_id`.
    pub fn copy(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<PurchaseId, ServiceError> {
        let purchase = self.purchase(tenant_id, purchase_id)?;
        let copy_id = PurchaseId::new(AggregateId::new());
        for command in purchase.duplicate(tenant_id, copy_id, Utc::now())? {
            self.run(tenant_id, copy_id, command)?;
        }
        info!(tenant = %tenant_id, purchase = %purchase_id, copy = %copy_id, "purchase copied");
        Ok(copy_id)
    }

    pub fn amounts(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<PurchaseAmounts, ServiceError> {
        Ok(self.purchase(tenant_id, purchase_id)?.amounts())
    }

    pub fn line_amounts(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<Vec<Decimal>, ServiceError> {
        Ok(self.purchase(tenant_id, purchase_id)?.line_amounts())
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<PurchaseReadModel> {
        self.purchases.list(tenant_id)
    }

    pub fn search(&self, tenant_id: TenantId, query: &str) -> Vec<PurchaseReadModel> {
        self.purchases.search_rec_name(tenant_id, query)
    }

    pub fn open_suppliers(&self, tenant_id: TenantId) -> Vec<OpenSupplier> {
        self.purchases.open_suppliers(tenant_id)
    }

    /// Create whatever the purchase still lacks and settle its states.
    ///
    /// Everything is planned before the first write, so a validation error
    /// leaves the purchase and its documents untouched. Running it again
    /// right away creates nothing.
    pub fn process(&self, tenant_id: TenantId, purchase_id: PurchaseId) -> Result<ProcessOutcome, ServiceError> {
        let purchase = self.purchase(tenant_id, purchase_id)?;
        if purchase.state() != PurchaseState::Confirmed {
            debug!(tenant = %tenant_id, purchase = %purchase_id, state = %purchase.state(), "nothing to process");
            return Ok(ProcessOutcome::unchanged(&purchase));
        }
        let ctx = self.context(tenant_id, &purchase)?;
        let plan = plan_process(&purchase, &ctx)?;
        let moves_by_line = plan.moves_by_line();
        let now = Utc::now();

        let mut outcome = ProcessOutcome {
            invoices: Vec::new(),
            moves: Vec::new(),
            return_shipment: None,
            invoice_state: plan.invoice_state,
            shipment_state: plan.shipment_state,
            done: plan.done,
        };

        for invoice in plan.invoices {
            let invoice_id = invoice.invoice_id;
            self.execute_invoice(
                tenant_id,
                invoice_id,
                InvoiceCommand::CreateInvoice(invoice.into_command(tenant_id, now)),
            )?;
            self.run(
                tenant_id,
                purchase_id,
                PurchaseCommand::LinkInvoice(LinkInvoice {
                    tenant_id,
                    purchase_id,
                    invoice_id,
                    occurred_at: now,
                }),
            )?;
            outcome.invoices.push(invoice_id);
        }

        for mv in plan.incoming_moves.into_iter().chain(plan.return_moves) {
            let move_id = mv.move_id;
            self.execute_move(
                tenant_id,
                move_id,
                StockMoveCommand::CreateMove(mv.into_command(tenant_id, now)),
            )?;
            outcome.moves.push(move_id);
        }
        for (line_id, moves) in moves_by_line {
            self.run(
                tenant_id,
                purchase_id,
                PurchaseCommand::LinkMoves(LinkMoves {
                    tenant_id,
                    purchase_id,
                    line_id,
                    moves,
                    occurred_at: now,
                }),
            )?;
        }

        if let Some(shipment) = plan.return_shipment {
            let shipment_id = shipment.shipment_id;
            let moves = shipment.moves.clone();
            self.execute_return_shipment(
                tenant_id,
                shipment_id,
                ReturnShipmentCommand::CreateReturnShipment(shipment.into_command(tenant_id, now)),
            )?;
            for move_id in moves {
                self.execute_move(
                    tenant_id,
                    move_id,
                    StockMoveCommand::AssignMoveToShipment(AssignMoveToShipment {
                        tenant_id,
                        move_id,
                        shipment_id,
                        occurred_at: now,
                    }),
                )?;
            }
            self.execute_return_shipment(
                tenant_id,
                shipment_id,
                ReturnShipmentCommand::WaitReturnShipment(WaitReturnShipment {
                    tenant_id,
                    shipment_id,
                    occurred_at: now,
                }),
            )?;
            self.run(
                tenant_id,
                purchase_id,
                PurchaseCommand::LinkReturnShipment(LinkReturnShipment {
                    tenant_id,
                    purchase_id,
                    shipment_id,
                    occurred_at: now,
                }),
            )?;
            outcome.return_shipment = Some(shipment_id);
        }

        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::SetInvoiceState(SetInvoiceState {
                tenant_id,
                purchase_id,
                invoice_state: outcome.invoice_state,
                occurred_at: now,
            }),
        )?;
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::SetShipmentState(SetShipmentState {
                tenant_id,
                purchase_id,
                shipment_state: outcome.shipment_state,
                occurred_at: now,
            }),
        )?;
        if outcome.done {
            self.run(
                tenant_id,
                purchase_id,
                PurchaseCommand::MarkDone(MarkDone {
                    tenant_id,
                    purchase_id,
                    occurred_at: now,
                }),
            )?;
        }

        info!(
            tenant = %tenant_id,
            purchase = %purchase_id,
            invoices = outcome.invoices.len(),
            moves = outcome.moves.len(),
            return_shipment = outcome.return_shipment.is_some(),
            invoice_state = ?outcome.invoice_state,
            shipment_state = ?outcome.shipment_state,
            done = outcome.done,
            "purchase processed"
        );
        Ok(outcome)
    }

    /// Cancelled invoices waiting for a decision, all preselected.
    pub fn invoice_exception_wizard(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
    ) -> Result<ExceptionWizard<InvoiceId>, ServiceError> {
        let purchase = self.purchase(tenant_id, purchase_id)?;
        let ctx = self.context(tenant_id, &purchase)?;
        Ok(ExceptionWizard::for_invoices(&purchase, &ctx)?)
    }

    /// Record the operator's choice and process again. A cancelled wizard
    /// changes nothing and returns `None`.
    pub fn handle_invoice_exception(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        outcome: WizardOutcome<InvoiceId>,
    ) -> Result<Option<ProcessOutcome>, ServiceError> {
        let WizardOutcome::Handle { domain, recreate } = outcome else {
            return Ok(None);
        };
        let (domain, recreate) = self
            .invoice_exception_wizard(tenant_id, purchase_id)?
            .validate(domain, recreate)?;
        info!(
            tenant = %tenant_id,
            purchase = %purchase_id,
            recreated = recreate.len(),
            ignored = domain.len().saturating_sub(recreate.len()),
            "invoice exception handled"
        );
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::HandleInvoiceException(HandleInvoiceException {
                tenant_id,
                purchase_id,
                domain,
                recreate,
                occurred_at: Utc::now(),
            }),
        )?;
        self.process(tenant_id, purchase_id).map(Some)
    }

    /// Cancelled moves waiting for a decision, all preselected.
    pub fn shipment_exception_wizard(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
    ) -> Result<ExceptionWizard<StockMoveId>, ServiceError> {
        let purchase = self.purchase(tenant_id, purchase_id)?;
        let ctx = self.context(tenant_id, &purchase)?;
        Ok(ExceptionWizard::for_moves(&purchase, &ctx)?)
    }

    pub fn handle_shipment_exception(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        outcome: WizardOutcome<StockMoveId>,
    ) -> Result<Option<ProcessOutcome>, ServiceError> {
        let WizardOutcome::Handle { domain, recreate } = outcome else {
            return Ok(None);
        };
        let (domain, recreate) = self
            .shipment_exception_wizard(tenant_id, purchase_id)?
            .validate(domain, recreate)?;
        info!(
            tenant = %tenant_id,
            purchase = %purchase_id,
            recreated = recreate.len(),
            ignored = domain.len().saturating_sub(recreate.len()),
            "shipment exception handled"
        );
        self.run(
            tenant_id,
            purchase_id,
            PurchaseCommand::HandleShipmentException(HandleShipmentException {
                tenant_id,
                purchase_id,
                domain,
                recreate,
                occurred_at: Utc::now(),
            }),
        )?;
        self.process(tenant_id, purchase_id).map(Some)
    }

    fn context(&self, tenant_id: TenantId, purchase: &Purchase) -> Result<ProcessingContext, ServiceError> {
        let party_id = purchase
            .party_id()
            .ok_or_else(|| DomainError::invariant("purchase has no party"))?;
        let supplier = self.party(tenant_id, party_id)?.supplier_summary();
        let mut ctx = ProcessingContext::new(supplier)
            .with_default_account_expense(self.config.default_account_expense.clone());

        for invoice_id in purchase.invoices().linked().iter().copied() {
            ctx.insert_invoice(self.invoice(tenant_id, invoice_id)?.summary());
        }
        for move_id in purchase.moves() {
            if let Some(summary) = self.stock_move(tenant_id, move_id)?.summary() {
                ctx.insert_move(summary);
            }
        }
        Ok(ctx)
    }

    fn run(
        &self,
        tenant_id: TenantId,
        purchase_id: PurchaseId,
        command: PurchaseCommand,
    ) -> Result<Vec<StoredEvent>, ServiceError> {
        let committed = self.execute(tenant_id, purchase_id.0, PURCHASE_AGGREGATE_TYPE, command, |id| {
            Purchase::empty(PurchaseId::new(id))
        })?;
        for stored in &committed {
            self.purchases.apply_envelope(&stored.to_envelope())?;
        }
        Ok(committed)
    }

    fn execute_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        command: InvoiceCommand,
    ) -> Result<(), ServiceError> {
        self.execute(tenant_id, invoice_id.0, INVOICE_AGGREGATE_TYPE, command, |id| {
            Invoice::empty(InvoiceId::new(id))
        })?;
        Ok(())
    }

    fn execute_move(
        &self,
        tenant_id: TenantId,
        move_id: StockMoveId,
        command: StockMoveCommand,
    ) -> Result<(), ServiceError> {
        self.execute(tenant_id, move_id.0, MOVE_AGGREGATE_TYPE, command, |id| {
            StockMove::empty(StockMoveId::new(id))
        })?;
        Ok(())
    }

    fn execute_return_shipment(
        &self,
        tenant_id: TenantId,
        shipment_id: ReturnShipmentId,
        command: ReturnShipmentCommand,
    ) -> Result<(), ServiceError> {
        self.execute(tenant_id, shipment_id.0, RETURN_SHIPMENT_AGGREGATE_TYPE, command, |id| {
            ReturnShipment::empty(ReturnShipmentId::new(id))
        })?;
        Ok(())
    }

    fn execute<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        empty: fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, ServiceError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        Ok(self
            .dispatcher
            .dispatch(tenant_id, aggregate_id, aggregate_type, command, |_, id| empty(id))?)
    }

    fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        empty: fn(AggregateId) -> A,
    ) -> Result<A, ServiceError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        Ok(self.dispatcher.load(tenant_id, aggregate_id, |_, id| empty(id))?)
    }
}

fn existing<T, I: core::fmt::Display>(
    aggregate: T,
    is_created: impl FnOnce(&T) -> bool,
    kind: &'static str,
    id: I,
) -> Result<T, ServiceError> {
    if is_created(&aggregate) {
        Ok(aggregate)
    } else {
        Err(ServiceError::NotFound {
            kind,
            id: id.to_string(),
        })
    }
}
