//! Tax definitions and computation.
//!
//! Taxes are computed per line without rounding, grouped per tax, and each
//! group is rounded once to the currency precision. Rounding per line would
//! drift from the invoice totals.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procurerp_core::{Currency, ValueObject};

use crate::account::Account;

/// How a tax amount is derived from a line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TaxKind {
    /// Rate applied to `unit_price * quantity` (0.21 for 21%).
    Percentage(Decimal),
    /// Fixed amount per unit.
    Fixed(Decimal),
}

/// A supplier tax that can be attached to purchase and invoice lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tax {
    pub code: String,
    pub name: String,
    pub kind: TaxKind,
    /// Account the tax amount is booked on in supplier invoices.
    pub account: Option<Account>,
}

impl ValueObject for Tax {}

impl Tax {
    pub fn percentage(code: impl Into<String>, name: impl Into<String>, rate: Decimal) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind: TaxKind::Percentage(rate),
            account: None,
        }
    }

    pub fn fixed(code: impl Into<String>, name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind: TaxKind::Fixed(amount),
            account: None,
        }
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }
}

/// Unrounded tax computed for one line and one tax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    pub tax: Tax,
    pub base: Decimal,
    pub amount: Decimal,
}

/// Compute the taxes of one line (`unit_price * quantity`), unrounded.
pub fn compute_taxes(taxes: &[Tax], unit_price: Decimal, quantity: Decimal) -> Vec<TaxLine> {
    let base = unit_price * quantity;
    taxes
        .iter()
        .map(|tax| {
            let amount = match &tax.kind {
                TaxKind::Percentage(rate) => base * rate,
                TaxKind::Fixed(per_unit) => per_unit * quantity,
            };
            TaxLine {
                tax: tax.clone(),
                base,
                amount,
            }
        })
        .collect()
}

/// Groups tax lines per tax code, summing unrounded bases and amounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxAccumulator {
    groups: BTreeMap<String, TaxLine>,
}

impl TaxAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, taxes: &[Tax], unit_price: Decimal, quantity: Decimal) {
        for line in compute_taxes(taxes, unit_price, quantity) {
            self.groups
                .entry(line.tax.code.clone())
                .and_modify(|group| {
                    group.base += line.base;
                    group.amount += line.amount;
                })
                .or_insert(line);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// One rounded line per tax code, ordered by code.
    pub fn rounded_lines(&self, currency: &Currency) -> Vec<TaxLine> {
        self.groups
            .values()
            .map(|group| TaxLine {
                tax: group.tax.clone(),
                base: currency.round(group.base),
                amount: currency.round(group.amount),
            })
            .collect()
    }

    /// Sum of the per-group rounded amounts.
    pub fn total(&self, currency: &Currency) -> Decimal {
        self.groups
            .values()
            .map(|group| currency.round(group.amount))
            .sum()
    }
}
