//! Invoice and shipment state derivation.

use rust_decimal::Decimal;

use procurerp_core::DomainResult;
use procurerp_inventory::MoveState;
use procurerp_invoicing::{InvoiceId, InvoiceStatus};
use procurerp_products::compute_qty;

use crate::context::ProcessingContext;
use crate::line::PurchaseLine;
use crate::links::LinkedSet;
use crate::state::{InvoiceMethod, InvoiceState, ShipmentState};

/// Invoice state from the statuses of the active invoices.
pub fn invoice_state_from<I>(statuses: I) -> InvoiceState
where
    I: IntoIterator<Item = InvoiceStatus>,
{
    let statuses: Vec<_> = statuses.into_iter().collect();
    if statuses.is_empty() {
        InvoiceState::None
    } else if statuses.contains(&InvoiceStatus::Cancel) {
        InvoiceState::Exception
    } else if statuses.iter().all(|s| *s == InvoiceStatus::Paid) {
        InvoiceState::Paid
    } else {
        InvoiceState::Waiting
    }
}

/// Invoice state of a purchase; ignored and recreated invoices do not count.
pub fn invoice_state(
    invoices: &LinkedSet<InvoiceId>,
    ctx: &ProcessingContext,
) -> DomainResult<InvoiceState> {
    let statuses = invoices
        .active()
        .map(|id| ctx.invoice(id).map(|i| i.status))
        .collect::<DomainResult<Vec<_>>>()?;
    Ok(invoice_state_from(statuses))
}

/// Whether the goods of a line are fully received (or returned).
///
/// Lines that move nothing are always done. Otherwise every move must be
/// done unless it was classified, and the moved quantity must cover the
/// ordered one.
pub fn move_done(line: &PurchaseLine, ctx: &ProcessingContext) -> DomainResult<bool> {
    if !line.is_stockable() {
        return Ok(true);
    }
    let unit = line.unit_or_default();
    let mut remaining = line.quantity.abs();
    for id in line.moves.linked().iter().copied() {
        let mv = ctx.stock_move(id)?;
        if mv.state != MoveState::Done && !line.moves.is_skipped(id) {
            return Ok(false);
        }
        remaining -= compute_qty(&mv.uom, mv.quantity, &unit)?;
    }
    Ok(remaining <= Decimal::ZERO)
}

/// Whether a line has a cancelled move nobody dealt with yet.
pub fn move_exception(line: &PurchaseLine, ctx: &ProcessingContext) -> DomainResult<bool> {
    for id in line.moves.active() {
        if ctx.stock_move(id)?.state == MoveState::Cancel {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn shipment_state(lines: &[PurchaseLine], ctx: &ProcessingContext) -> DomainResult<ShipmentState> {
    if lines.iter().all(|l| l.moves.is_empty()) {
        return Ok(ShipmentState::None);
    }
    for line in lines {
        if move_exception(line, ctx)? {
            return Ok(ShipmentState::Exception);
        }
    }
    for line in lines {
        if !move_done(line, ctx)? {
            return Ok(ShipmentState::Waiting);
        }
    }
    Ok(ShipmentState::Received)
}

/// A purchase is done once paid (or invoiced manually) and received.
pub fn is_done(
    invoice_state: InvoiceState,
    invoice_method: InvoiceMethod,
    shipment_state: ShipmentState,
) -> bool {
    (invoice_state == InvoiceState::Paid || invoice_method == InvoiceMethod::Manual)
        && shipment_state == ShipmentState::Received
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::PurchaseLineId;
    use procurerp_core::AggregateId;
    use procurerp_inventory::{LocationId, MoveSummary, StockMoveId};
    use procurerp_parties::{PartyId, SupplierSummary};
    use procurerp_products::{ProductId, ProductKind, ProductSummary, Uom};
    use rust_decimal_macros::dec;

    use InvoiceStatus::*;

    fn ctx() -> ProcessingContext {
        ProcessingContext::new(SupplierSummary {
            party_id: PartyId::new(AggregateId::new()),
            name: "Acme".to_string(),
            lang: None,
            invoice_address: None,
            payment_term: None,
            account_payable: None,
            supplier_location: None,
        })
    }

    fn goods_line(quantity: Decimal, kind: ProductKind) -> PurchaseLine {
        PurchaseLine::for_product(
            PurchaseLineId::new(AggregateId::new()),
            ProductSummary {
                product_id: ProductId::new(AggregateId::new()),
                name: "Crate".to_string(),
                kind,
                purchase_uom: Uom::unit(),
                account_expense: None,
                supplier_taxes: vec![],
            },
            quantity,
            dec!(4),
        )
    }

    fn add_move(ctx: &mut ProcessingContext, line: &mut PurchaseLine, quantity: Decimal, state: MoveState) -> StockMoveId {
        let move_id = StockMoveId::new(AggregateId::new());
        ctx.insert_move(MoveSummary {
            move_id,
            product_id: line.product.as_ref().map(|p| p.product_id).unwrap(),
            state,
            quantity,
            uom: Uom::unit(),
            from_location: LocationId::new(AggregateId::new()),
            to_location: LocationId::new(AggregateId::new()),
            shipment: None,
        });
        line.moves.link(move_id);
        move_id
    }

    #[test]
    fn invoice_state_table() {
        assert_eq!(invoice_state_from([]), InvoiceState::None);
        assert_eq!(invoice_state_from([Draft, Cancel, Paid]), InvoiceState::Exception);
        assert_eq!(invoice_state_from([Paid, Paid]), InvoiceState::Paid);
        assert_eq!(invoice_state_from([Paid, Posted]), InvoiceState::Waiting);
        assert_eq!(invoice_state_from([Draft]), InvoiceState::Waiting);
    }

    #[test]
    fn classified_invoices_do_not_count() {
        use procurerp_invoicing::{InvoiceSummary, InvoiceType};
        let mut ctx = ctx();
        let mut invoices = LinkedSet::new();
        for status in [Cancel, Paid] {
            let invoice_id = InvoiceId::new(AggregateId::new());
            ctx.insert_invoice(InvoiceSummary {
                invoice_id,
                invoice_type: InvoiceType::InInvoice,
                status,
                lines: vec![],
                total_amount: dec!(10),
            });
            invoices.link(invoice_id);
        }
        assert_eq!(invoice_state(&invoices, &ctx).unwrap(), InvoiceState::Exception);

        let cancelled = invoices.linked()[0];
        invoices.absorb(&invoices.classify(&[cancelled], &[]));
        assert_eq!(invoice_state(&invoices, &ctx).unwrap(), InvoiceState::Paid);
    }

    #[test]
    fn services_and_layout_lines_are_always_received() {
        let ctx = ctx();
        assert!(move_done(&goods_line(dec!(5), ProductKind::Service), &ctx).unwrap());
        assert!(!move_done(&goods_line(dec!(5), ProductKind::Goods), &ctx).unwrap());
    }

    #[test]
    fn partial_receipt_is_waiting() {
        let mut ctx = ctx();
        let mut line = goods_line(dec!(10), ProductKind::Goods);
        add_move(&mut ctx, &mut line, dec!(4), MoveState::Done);
        let lines = vec![line];
        assert_eq!(shipment_state(&lines, &ctx).unwrap(), ShipmentState::Waiting);
    }

    #[test]
    fn cancelled_move_is_an_exception_until_ignored() {
        let mut ctx = ctx();
        let mut line = goods_line(dec!(10), ProductKind::Goods);
        add_move(&mut ctx, &mut line, dec!(6), MoveState::Done);
        let cancelled = add_move(&mut ctx, &mut line, dec!(4), MoveState::Cancel);
        assert!(move_exception(&line, &ctx).unwrap());
        assert_eq!(shipment_state(&[line.clone()], &ctx).unwrap(), ShipmentState::Exception);

        line.moves.absorb(&line.moves.classify(&[cancelled], &[]));
        assert!(!move_exception(&line, &ctx).unwrap());
        // The ignored quantity counts as handled.
        assert_eq!(shipment_state(&[line], &ctx).unwrap(), ShipmentState::Received);
    }

    #[test]
    fn no_moves_means_no_shipment_state() {
        let ctx = ctx();
        let lines = vec![goods_line(dec!(3), ProductKind::Goods)];
        assert_eq!(shipment_state(&lines, &ctx).unwrap(), ShipmentState::None);
    }

    #[test]
    fn done_requires_payment_unless_manual() {
        assert!(is_done(InvoiceState::Paid, InvoiceMethod::Order, ShipmentState::Received));
        assert!(is_done(InvoiceState::None, InvoiceMethod::Manual, ShipmentState::Received));
        assert!(!is_done(InvoiceState::Waiting, InvoiceMethod::Shipment, ShipmentState::Received));
        assert!(!is_done(InvoiceState::Paid, InvoiceMethod::Order, ShipmentState::Waiting));
    }
}
