//! Processing planner.
//!
//! Decides, from a confirmed purchase and a snapshot of what it links to,
//! which supplier invoices, stock moves and return shipment must be created,
//! and what the invoice and shipment states will be once they exist. Nothing
//! here writes anything; the plan is carried out by the infrastructure layer.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procurerp_accounting::{Account, PaymentTerm, TaxAccumulator};
use procurerp_core::{AggregateId, Currency, DomainError, DomainResult, TenantId};
use procurerp_inventory::{
    CreateMove, CreateReturnShipment, LocationId, MoveState, MoveSummary, ReturnShipmentId,
    StockMoveId,
};
use procurerp_invoicing::{
    CreateInvoice, InvoiceId, InvoiceLine, InvoiceLineId, InvoiceLineKind, InvoiceStatus,
    InvoiceSummary, InvoiceType,
};
use procurerp_parties::{AddressId, PartyId};
use procurerp_products::{ProductId, Uom, compute_qty};

use crate::context::ProcessingContext;
use crate::line::{PurchaseLine, PurchaseLineId};
use crate::purchase::Purchase;
use crate::reconcile::{invoice_state, is_done, shipment_state};
use crate::state::{InvoiceMethod, InvoiceState, PurchaseState, ShipmentState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    /// Supplier to warehouse input.
    Incoming,
    /// Warehouse storage back to the supplier.
    Return,
}

/// A supplier invoice (or credit note) to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePlan {
    pub invoice_id: InvoiceId,
    pub invoice_type: InvoiceType,
    pub party_id: PartyId,
    pub invoice_address: Option<AddressId>,
    pub currency: Currency,
    pub account: Account,
    pub payment_term: Option<PaymentTerm>,
    pub origin: Option<String>,
    pub lines: Vec<InvoiceLine>,
}

impl InvoicePlan {
    pub fn into_command(self, tenant_id: TenantId, occurred_at: DateTime<Utc>) -> CreateInvoice {
        CreateInvoice {
            tenant_id,
            invoice_id: self.invoice_id,
            invoice_type: self.invoice_type,
            party_id: self.party_id,
            invoice_address: self.invoice_address,
            currency: self.currency,
            account: self.account,
            payment_term: self.payment_term,
            origin: self.origin,
            lines: self.lines,
            occurred_at,
        }
    }

    /// How the invoice will look right after creation.
    pub fn draft_summary(&self) -> InvoiceSummary {
        let mut untaxed = Decimal::ZERO;
        let mut taxes = TaxAccumulator::new();
        for line in self.lines.iter().filter(|l| l.is_line()) {
            untaxed += line.amount(&self.currency);
            taxes.add(&line.taxes, line.unit_price, line.quantity);
        }
        InvoiceSummary {
            invoice_id: self.invoice_id,
            invoice_type: self.invoice_type,
            status: InvoiceStatus::Draft,
            lines: self.lines.clone(),
            total_amount: untaxed + taxes.total(&self.currency),
        }
    }
}

/// A stock move to create for a purchase line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePlan {
    pub move_id: StockMoveId,
    pub line_id: PurchaseLineId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub uom: Uom,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub unit_price: Decimal,
    pub currency: Currency,
    pub planned_date: Option<NaiveDate>,
}

impl MovePlan {
    pub fn into_command(self, tenant_id: TenantId, occurred_at: DateTime<Utc>) -> CreateMove {
        CreateMove {
            tenant_id,
            move_id: self.move_id,
            product_id: self.product_id,
            quantity: self.quantity,
            uom: self.uom,
            from_location: self.from_location,
            to_location: self.to_location,
            unit_price: self.unit_price,
            currency: self.currency,
            planned_date: self.planned_date,
            origin: Some(self.line_id.0),
            occurred_at,
        }
    }

    pub fn draft_summary(&self) -> MoveSummary {
        MoveSummary {
            move_id: self.move_id,
            product_id: self.product_id,
            state: MoveState::Draft,
            quantity: self.quantity,
            uom: self.uom.clone(),
            from_location: self.from_location,
            to_location: self.to_location,
            shipment: None,
        }
    }
}

/// Return shipment grouping the return moves of one processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnShipmentPlan {
    pub shipment_id: ReturnShipmentId,
    pub supplier: PartyId,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub moves: Vec<StockMoveId>,
}

impl ReturnShipmentPlan {
    pub fn into_command(self, tenant_id: TenantId, occurred_at: DateTime<Utc>) -> CreateReturnShipment {
        CreateReturnShipment {
            tenant_id,
            shipment_id: self.shipment_id,
            supplier: self.supplier.0,
            from_location: self.from_location,
            to_location: self.to_location,
            moves: self.moves,
            occurred_at,
        }
    }
}

/// Everything one `process` run has to do for a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessPlan {
    pub invoices: Vec<InvoicePlan>,
    pub incoming_moves: Vec<MovePlan>,
    pub return_moves: Vec<MovePlan>,
    pub return_shipment: Option<ReturnShipmentPlan>,
    /// Invoice state once the planned invoices exist.
    pub invoice_state: InvoiceState,
    /// Shipment state once the planned moves exist.
    pub shipment_state: ShipmentState,
    /// Whether the purchase can be marked done afterwards.
    pub done: bool,
}

impl ProcessPlan {
    fn idle(purchase: &Purchase) -> Self {
        Self {
            invoices: Vec::new(),
            incoming_moves: Vec::new(),
            return_moves: Vec::new(),
            return_shipment: None,
            invoice_state: purchase.invoice_state(),
            shipment_state: purchase.shipment_state(),
            done: false,
        }
    }

    /// No document to create.
    pub fn creates_nothing(&self) -> bool {
        self.invoices.is_empty() && self.incoming_moves.is_empty() && self.return_moves.is_empty()
    }

    /// Moves to link, grouped per purchase line.
    pub fn moves_by_line(&self) -> Vec<(PurchaseLineId, Vec<StockMoveId>)> {
        let mut out: Vec<(PurchaseLineId, Vec<StockMoveId>)> = Vec::new();
        for plan in self.incoming_moves.iter().chain(&self.return_moves) {
            match out.iter_mut().find(|(line_id, _)| *line_id == plan.line_id) {
                Some((_, moves)) => moves.push(plan.move_id),
                None => out.push((plan.line_id, vec![plan.move_id])),
            }
        }
        out
    }
}

/// Plan the invoice of `invoice_type` for `purchase`, if there is anything
/// left to bill in that direction.
pub fn plan_invoice(
    purchase: &Purchase,
    ctx: &ProcessingContext,
    invoice_type: InvoiceType,
) -> DomainResult<Option<InvoicePlan>> {
    if purchase.invoice_method() == InvoiceMethod::Manual {
        return Ok(None);
    }
    let account = ctx.supplier.account_payable.clone().ok_or_else(|| {
        DomainError::validation(format!(
            "missing payable account on supplier \"{}\"",
            ctx.supplier.name
        ))
    })?;
    let party_id = purchase
        .party_id()
        .ok_or_else(|| DomainError::invariant("purchase has no party"))?;

    let mut lines = Vec::new();
    for line in purchase.lines() {
        if let Some(invoice_line) = invoice_line(purchase, line, ctx, invoice_type)? {
            lines.push(invoice_line);
        }
    }
    if !lines.iter().any(|l| l.is_line()) {
        return Ok(None);
    }

    Ok(Some(InvoicePlan {
        invoice_id: InvoiceId::new(AggregateId::new()),
        invoice_type,
        party_id,
        invoice_address: purchase.invoice_address(),
        currency: purchase.currency().clone(),
        account,
        payment_term: purchase.payment_term().cloned(),
        origin: purchase.reference().map(str::to_owned),
        lines,
    }))
}

fn invoice_line(
    purchase: &Purchase,
    line: &PurchaseLine,
    ctx: &ProcessingContext,
    invoice_type: InvoiceType,
) -> DomainResult<Option<InvoiceLine>> {
    let credit_note = invoice_type == InvoiceType::InCreditNote;
    let new_id = || InvoiceLineId::new(AggregateId::new());

    if !line.is_line() {
        // Layout lines are copied once, and only onto a one-directional
        // invoice of the whole order.
        if purchase.invoice_method() != InvoiceMethod::Order
            || ctx.invoice_lines_of(line.line_id).next().is_some()
        {
            return Ok(None);
        }
        let one_direction = purchase
            .lines()
            .iter()
            .filter(|l| l.is_line())
            .all(|l| if credit_note { l.quantity <= Decimal::ZERO } else { l.quantity >= Decimal::ZERO });
        if !one_direction {
            return Ok(None);
        }
        let mut layout = InvoiceLine::layout(new_id(), line.kind.into(), Some(line.line_id.0), line.description.clone());
        layout.note = line.note.clone();
        return Ok(Some(layout));
    }

    if credit_note != line.is_return() {
        return Ok(None);
    }

    let unit = line.unit_or_default();
    let mut quantity = if purchase.invoice_method() == InvoiceMethod::Order || !line.is_stockable() {
        line.quantity.abs()
    } else {
        let mut received = Decimal::ZERO;
        for move_id in line.moves.linked().iter().copied() {
            let mv = ctx.stock_move(move_id)?;
            if mv.state == MoveState::Done {
                received += compute_qty(&mv.uom, mv.quantity, &unit)?;
            }
        }
        received
    };
    for (invoice_id, invoiced) in ctx.invoice_lines_of(line.line_id) {
        if invoiced.kind != InvoiceLineKind::Line || purchase.invoices().is_recreated(invoice_id) {
            continue;
        }
        let invoiced_unit = invoiced.unit.clone().unwrap_or_else(|| unit.clone());
        quantity -= compute_qty(&invoiced_unit, invoiced.quantity, &unit)?;
    }
    if quantity <= Decimal::ZERO {
        return Ok(None);
    }

    let account = match &line.product {
        Some(product) => product.account_expense.clone().ok_or_else(|| {
            DomainError::validation(format!("missing expense account on product \"{}\"", product.name))
        })?,
        None => ctx
            .default_account_expense
            .clone()
            .ok_or_else(|| DomainError::validation("missing default expense account"))?,
    };

    Ok(Some(InvoiceLine {
        line_id: new_id(),
        kind: InvoiceLineKind::Line,
        origin: Some(line.line_id.0),
        description: line.description.clone(),
        note: line.note.clone(),
        product_id: line.product.as_ref().map(|p| p.product_id),
        quantity,
        unit: line.unit.clone(),
        unit_price: line.unit_price,
        taxes: line.taxes.clone(),
        account: Some(account),
    }))
}

/// Plan the moves still missing for the lines going in `direction`.
///
/// Moves replaced by a recreation no longer count toward the ordered
/// quantity; every other move does, cancelled or not.
pub fn plan_moves(
    purchase: &Purchase,
    ctx: &ProcessingContext,
    direction: MoveDirection,
) -> DomainResult<Vec<MovePlan>> {
    let mut plans = Vec::new();
    for line in purchase.lines() {
        if !line.is_stockable() || line.is_return() != (direction == MoveDirection::Return) {
            continue;
        }
        let Some(product) = &line.product else {
            continue;
        };
        let unit = line.unit_or_default();
        let mut remaining = line.quantity.abs();
        for move_id in line.moves.not_recreated() {
            let mv = ctx.stock_move(move_id)?;
            remaining -= compute_qty(&mv.uom, mv.quantity, &unit)?;
        }
        if remaining <= Decimal::ZERO {
            continue;
        }

        let supplier_location = ctx.supplier.supplier_location;
        if supplier_location.is_none() {
            return Err(DomainError::validation(format!(
                "supplier location required for line \"{}\" of purchase \"{}\"",
                line.description,
                purchase.rec_name()
            )));
        }
        let warehouse_required = || {
            DomainError::validation(format!("warehouse required for purchase \"{}\"", purchase.rec_name()))
        };
        let from_location = line
            .from_location(supplier_location, purchase.warehouse())
            .ok_or_else(warehouse_required)?;
        let to_location = line
            .to_location(supplier_location, purchase.warehouse())
            .ok_or_else(warehouse_required)?;

        plans.push(MovePlan {
            move_id: StockMoveId::new(AggregateId::new()),
            line_id: line.line_id,
            product_id: product.product_id,
            quantity: remaining,
            uom: unit,
            from_location,
            to_location,
            unit_price: line.unit_price,
            currency: purchase.currency().clone(),
            planned_date: line.delivery_date,
        });
    }
    Ok(plans)
}

/// Plan one processing run.
///
/// Only confirmed purchases are processed; for anything else the plan is
/// empty and keeps the stored states.
pub fn plan_process(purchase: &Purchase, ctx: &ProcessingContext) -> DomainResult<ProcessPlan> {
    if purchase.state() != PurchaseState::Confirmed {
        return Ok(ProcessPlan::idle(purchase));
    }
    let mut ctx = ctx.clone();

    let mut invoices = Vec::new();
    let mut invoice_links = purchase.invoices().clone();
    for invoice_type in [InvoiceType::InInvoice, InvoiceType::InCreditNote] {
        if let Some(plan) = plan_invoice(purchase, &ctx, invoice_type)? {
            ctx.insert_invoice(plan.draft_summary());
            invoice_links.link(plan.invoice_id);
            invoices.push(plan);
        }
    }
    let invoice_state = invoice_state(&invoice_links, &ctx)?;

    let incoming_moves = plan_moves(purchase, &ctx, MoveDirection::Incoming)?;
    let return_moves = plan_moves(purchase, &ctx, MoveDirection::Return)?;
    let mut lines = purchase.lines().to_vec();
    for plan in incoming_moves.iter().chain(&return_moves) {
        ctx.insert_move(plan.draft_summary());
        if let Some(line) = lines.iter_mut().find(|l| l.line_id == plan.line_id) {
            line.moves.link(plan.move_id);
        }
    }
    let shipment_state = shipment_state(&lines, &ctx)?;

    let return_shipment = match return_moves.first() {
        Some(first) => Some(ReturnShipmentPlan {
            shipment_id: ReturnShipmentId::new(AggregateId::new()),
            supplier: ctx.supplier.party_id,
            from_location: first.from_location,
            to_location: first.to_location,
            moves: return_moves.iter().map(|m| m.move_id).collect(),
        }),
        None => None,
    };

    Ok(ProcessPlan {
        invoices,
        incoming_moves,
        return_moves,
        return_shipment,
        invoice_state,
        shipment_state,
        done: is_done(invoice_state, purchase.invoice_method(), shipment_state),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LineKind;
    use crate::purchase::{
        AddLine, ConfirmPurchase, CreatePurchase, LinkInvoice, LinkMoves, PurchaseCommand, PurchaseId,
        QuotePurchase,
    };
    use procurerp_events::execute;
    use procurerp_inventory::{Warehouse, WarehouseId};
    use procurerp_parties::SupplierSummary;
    use procurerp_products::{ProductKind, ProductSummary};
    use rust_decimal_macros::dec;

    struct Setup {
        tenant_id: TenantId,
        purchase: Purchase,
        ctx: ProcessingContext,
        warehouse: Warehouse,
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn product(kind: ProductKind) -> ProductSummary {
        ProductSummary {
            product_id: ProductId::new(AggregateId::new()),
            name: "Copper wire".to_string(),
            kind,
            purchase_uom: Uom::unit(),
            account_expense: Some(Account::expense("6000", "Purchases")),
            supplier_taxes: vec![],
        }
    }

    fn line_id() -> PurchaseLineId {
        PurchaseLineId::new(AggregateId::new())
    }

    fn confirmed(method: InvoiceMethod, lines: Vec<PurchaseLine>) -> Setup {
        let tenant_id = TenantId::new();
        let purchase_id = PurchaseId::new(AggregateId::new());
        let party_id = PartyId::new(AggregateId::new());
        let warehouse = Warehouse::new(
            WarehouseId::new(AggregateId::new()),
            "Main",
            LocationId::new(AggregateId::new()),
            LocationId::new(AggregateId::new()),
        );
        let mut purchase = Purchase::empty(purchase_id);
        let mut commands = vec![PurchaseCommand::CreatePurchase(CreatePurchase {
            tenant_id,
            purchase_id,
            party_id,
            party_name: "Globex".to_string(),
            invoice_address: Some(AddressId::new(AggregateId::new())),
            payment_term: None,
            warehouse: Some(warehouse.clone()),
            currency: Currency::new("USD", 2),
            invoice_method: method,
            supplier_reference: None,
            description: None,
            comment: None,
            purchase_date: None,
            occurred_at: now(),
        })];
        commands.extend(lines.into_iter().map(|line| {
            PurchaseCommand::AddLine(AddLine {
                tenant_id,
                purchase_id,
                line,
                occurred_at: now(),
            })
        }));
        commands.push(PurchaseCommand::QuotePurchase(QuotePurchase {
            tenant_id,
            purchase_id,
            reference: Some("P0007".to_string()),
            occurred_at: now(),
        }));
        commands.push(PurchaseCommand::ConfirmPurchase(ConfirmPurchase {
            tenant_id,
            purchase_id,
            today: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            occurred_at: now(),
        }));
        for command in &commands {
            execute(&mut purchase, command).unwrap();
        }

        let ctx = ProcessingContext::new(SupplierSummary {
            party_id,
            name: "Globex".to_string(),
            lang: None,
            invoice_address: None,
            payment_term: None,
            account_payable: Some(Account::payable("4000", "Suppliers")),
            supplier_location: Some(LocationId::new(AggregateId::new())),
        })
        .with_default_account_expense(Some(Account::expense("6090", "Other purchases")));

        Setup {
            tenant_id,
            purchase,
            ctx,
            warehouse,
        }
    }

    impl Setup {
        /// Carry out a plan the way the service does, minus the other aggregates.
        fn apply(&mut self, plan: &ProcessPlan) {
            let purchase_id = self.purchase.id_typed();
            for invoice in &plan.invoices {
                self.ctx.insert_invoice(invoice.draft_summary());
                execute(
                    &mut self.purchase,
                    &PurchaseCommand::LinkInvoice(LinkInvoice {
                        tenant_id: self.tenant_id,
                        purchase_id,
                        invoice_id: invoice.invoice_id,
                        occurred_at: now(),
                    }),
                )
                .unwrap();
            }
            for plan in plan.incoming_moves.iter().chain(&plan.return_moves) {
                self.ctx.insert_move(plan.draft_summary());
            }
            for (line_id, moves) in plan.moves_by_line() {
                execute(
                    &mut self.purchase,
                    &PurchaseCommand::LinkMoves(LinkMoves {
                        tenant_id: self.tenant_id,
                        purchase_id,
                        line_id,
                        moves,
                        occurred_at: now(),
                    }),
                )
                .unwrap();
            }
        }
    }

    #[test]
    fn order_method_bills_everything_and_ships_goods() {
        let lines = vec![
            PurchaseLine::layout(line_id(), LineKind::Title, "Raw materials").with_sequence(1),
            PurchaseLine::for_product(line_id(), product(ProductKind::Goods), dec!(10), dec!(2.5)).with_sequence(2),
            PurchaseLine::for_product(line_id(), product(ProductKind::Service), dec!(1), dec!(40)).with_sequence(3),
        ];
        let mut s = confirmed(InvoiceMethod::Order, lines);
        let plan = plan_process(&s.purchase, &s.ctx).unwrap();

        assert_eq!(plan.invoices.len(), 1);
        let invoice = &plan.invoices[0];
        assert_eq!(invoice.invoice_type, InvoiceType::InInvoice);
        assert_eq!(invoice.origin.as_deref(), Some("P0007"));
        assert_eq!(invoice.lines.len(), 3);
        assert_eq!(invoice.lines[0].kind, InvoiceLineKind::Title);

        assert_eq!(plan.incoming_moves.len(), 1);
        let mv = &plan.incoming_moves[0];
        assert_eq!(mv.quantity, dec!(10));
        assert_eq!(mv.from_location, s.ctx.supplier.supplier_location.unwrap());
        assert_eq!(mv.to_location, s.warehouse.input_location);
        assert!(plan.return_moves.is_empty());
        assert!(plan.return_shipment.is_none());

        assert_eq!(plan.invoice_state, InvoiceState::Waiting);
        assert_eq!(plan.shipment_state, ShipmentState::Waiting);
        assert!(!plan.done);

        s.apply(&plan);
        let again = plan_process(&s.purchase, &s.ctx).unwrap();
        assert!(again.creates_nothing());
    }

    #[test]
    fn shipment_method_bills_only_received_quantities() {
        let goods = PurchaseLine::for_product(line_id(), product(ProductKind::Goods), dec!(10), dec!(1));
        let mut s = confirmed(InvoiceMethod::Shipment, vec![goods]);
        let plan = plan_process(&s.purchase, &s.ctx).unwrap();
        assert!(plan.invoices.is_empty());
        s.apply(&plan);

        // Receive 4 of the 10.
        let move_id = plan.incoming_moves[0].move_id;
        let mut received = s.ctx.stock_move(move_id).unwrap().clone();
        received.state = MoveState::Done;
        received.quantity = dec!(4);
        s.ctx.insert_move(received);

        let plan = plan_process(&s.purchase, &s.ctx).unwrap();
        assert_eq!(plan.invoices.len(), 1);
        assert_eq!(plan.invoices[0].lines[0].quantity, dec!(4));
        // The done move still counts toward the ordered 10: 6 remain.
        assert_eq!(plan.incoming_moves[0].quantity, dec!(6));
    }

    #[test]
    fn returns_get_a_credit_note_and_a_return_shipment() {
        let ret = PurchaseLine::for_product(line_id(), product(ProductKind::Goods), dec!(-2), dec!(8));
        let s = confirmed(InvoiceMethod::Order, vec![ret]);
        let plan = plan_process(&s.purchase, &s.ctx).unwrap();

        assert_eq!(plan.invoices.len(), 1);
        assert_eq!(plan.invoices[0].invoice_type, InvoiceType::InCreditNote);
        assert_eq!(plan.invoices[0].lines[0].quantity, dec!(2));

        assert_eq!(plan.return_moves.len(), 1);
        let shipment = plan.return_shipment.as_ref().unwrap();
        assert_eq!(shipment.from_location, s.warehouse.storage_location);
        assert_eq!(Some(shipment.to_location), s.ctx.supplier.supplier_location);
        assert_eq!(shipment.moves, vec![plan.return_moves[0].move_id]);
    }

    #[test]
    fn manual_method_never_invoices() {
        let service = PurchaseLine::for_product(line_id(), product(ProductKind::Service), dec!(1), dec!(100));
        let s = confirmed(InvoiceMethod::Manual, vec![service]);
        let plan = plan_process(&s.purchase, &s.ctx).unwrap();
        assert!(plan.creates_nothing());
        // Services are never received, so the purchase stays confirmed.
        assert_eq!(plan.shipment_state, ShipmentState::None);
        assert!(!plan.done);
    }

    #[test]
    fn missing_accounts_abort_planning() {
        let freight = PurchaseLine::without_product(line_id(), "Freight", dec!(1), dec!(30));
        let mut s = confirmed(InvoiceMethod::Order, vec![freight]);
        s.ctx.default_account_expense = None;
        let err = plan_process(&s.purchase, &s.ctx).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("default expense account")));

        s.ctx.supplier.account_payable = None;
        let err = plan_process(&s.purchase, &s.ctx).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("payable account")));
    }

    #[test]
    fn missing_supplier_location_aborts_move_planning() {
        let goods = PurchaseLine::for_product(line_id(), product(ProductKind::Goods), dec!(1), dec!(3));
        let mut s = confirmed(InvoiceMethod::Manual, vec![goods]);
        s.ctx.supplier.supplier_location = None;
        let err = plan_process(&s.purchase, &s.ctx).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("supplier location required")));
    }

    #[test]
    fn recreated_invoice_is_billed_again() {
        let consulting = PurchaseLine::without_product(line_id(), "Consulting", dec!(5), dec!(120));
        let mut s = confirmed(InvoiceMethod::Order, vec![consulting]);
        let plan = plan_process(&s.purchase, &s.ctx).unwrap();
        s.apply(&plan);

        let invoice_id = plan.invoices[0].invoice_id;
        let mut cancelled = s.ctx.invoice(invoice_id).unwrap().clone();
        cancelled.status = InvoiceStatus::Cancel;
        s.ctx.insert_invoice(cancelled);
        assert_eq!(plan_process(&s.purchase, &s.ctx).unwrap().invoice_state, InvoiceState::Exception);

        let purchase_id = s.purchase.id_typed();
        execute(
            &mut s.purchase,
            &PurchaseCommand::HandleInvoiceException(crate::purchase::HandleInvoiceException {
                tenant_id: s.tenant_id,
                purchase_id,
                domain: vec![invoice_id],
                recreate: vec![invoice_id],
                occurred_at: now(),
            }),
        )
        .unwrap();
        let plan = plan_process(&s.purchase, &s.ctx).unwrap();
        assert_eq!(plan.invoices.len(), 1);
        assert_eq!(plan.invoices[0].lines[0].quantity, dec!(5));
        assert_eq!(plan.invoice_state, InvoiceState::Waiting);
    }
}
