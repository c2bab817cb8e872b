use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procurerp_accounting::{Account, Tax};
use procurerp_core::{AggregateId, Currency, Entity};
use procurerp_products::{ProductId, Uom};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceLineId(pub AggregateId);

impl InvoiceLineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceLineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Only `Line` carries quantity, price and taxes; the others lay out the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceLineKind {
    Line,
    Subtotal,
    Title,
    Comment,
}

/// Invoice line, optionally originating from a purchase line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_id: InvoiceLineId,
    pub kind: InvoiceLineKind,
    /// Purchase line this line bills.
    pub origin: Option<AggregateId>,
    pub description: String,
    pub note: Option<String>,
    pub product_id: Option<ProductId>,
    pub quantity: Decimal,
    pub unit: Option<Uom>,
    pub unit_price: Decimal,
    pub taxes: Vec<Tax>,
    pub account: Option<Account>,
}

impl Entity for InvoiceLine {
    type Id = InvoiceLineId;

    fn id(&self) -> &Self::Id {
        &self.line_id
    }
}

impl InvoiceLine {
    /// A layout line (subtotal, title, comment) copied from its origin.
    pub fn layout(
        line_id: InvoiceLineId,
        kind: InvoiceLineKind,
        origin: Option<AggregateId>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            line_id,
            kind,
            origin,
            description: description.into(),
            note: None,
            product_id: None,
            quantity: Decimal::ZERO,
            unit: None,
            unit_price: Decimal::ZERO,
            taxes: Vec::new(),
            account: None,
        }
    }

    pub fn is_line(&self) -> bool {
        self.kind == InvoiceLineKind::Line
    }

    /// Rounded `quantity * unit_price` for `Line`, zero otherwise.
    pub fn amount(&self, currency: &Currency) -> Decimal {
        match self.kind {
            InvoiceLineKind::Line => currency.round(self.quantity * self.unit_price),
            _ => Decimal::ZERO,
        }
    }
}
