//! Line amounts and purchase totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procurerp_accounting::TaxAccumulator;
use procurerp_core::Currency;

use crate::line::{LineKind, PurchaseLine};

/// Untaxed, tax and total amounts of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PurchaseAmounts {
    pub untaxed_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Amount of the line at `index`.
///
/// `Line`: rounded `quantity * unit_price`. `Subtotal`: sum of the `Line`
/// amounts since the previous subtotal. Anything else: zero.
pub fn line_amount(lines: &[PurchaseLine], index: usize, currency: &Currency) -> Decimal {
    let Some(line) = lines.get(index) else {
        return Decimal::ZERO;
    };
    match line.kind {
        LineKind::Line => currency.round(line.quantity * line.unit_price),
        LineKind::Subtotal => {
            let mut amount = Decimal::ZERO;
            for previous in &lines[..index] {
                match previous.kind {
                    LineKind::Line => {
                        amount += currency.round(previous.quantity * previous.unit_price)
                    }
                    LineKind::Subtotal => amount = Decimal::ZERO,
                    LineKind::Title | LineKind::Comment => {}
                }
            }
            amount
        }
        LineKind::Title | LineKind::Comment => Decimal::ZERO,
    }
}

/// Amount of every line, in order.
pub fn line_amounts(lines: &[PurchaseLine], currency: &Currency) -> Vec<Decimal> {
    let mut out = Vec::with_capacity(lines.len());
    let mut running = Decimal::ZERO;
    for line in lines {
        let amount = match line.kind {
            LineKind::Line => {
                let amount = currency.round(line.quantity * line.unit_price);
                running += amount;
                amount
            }
            LineKind::Subtotal => core::mem::take(&mut running),
            LineKind::Title | LineKind::Comment => Decimal::ZERO,
        };
        out.push(amount);
    }
    out
}

/// Live totals: untaxed is the sum of `Line` amounts, taxes are grouped per
/// tax and rounded once per group, total is their sum.
pub fn compute_amounts(lines: &[PurchaseLine], currency: &Currency) -> PurchaseAmounts {
    let mut untaxed_amount = Decimal::ZERO;
    let mut taxes = TaxAccumulator::new();
    for line in lines.iter().filter(|l| l.is_line()) {
        untaxed_amount += currency.round(line.quantity * line.unit_price);
        taxes.add(&line.taxes, line.unit_price, line.quantity);
    }
    let tax_amount = taxes.total(currency);
    PurchaseAmounts {
        untaxed_amount,
        tax_amount,
        total_amount: untaxed_amount + tax_amount,
    }
}
