use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procurerp_accounting::Tax;
use procurerp_core::{AggregateId, DomainError, DomainResult, Entity};
use procurerp_inventory::{LocationId, StockMoveId, Warehouse};
use procurerp_invoicing::InvoiceLineKind;
use procurerp_products::{ProductSummary, Uom};

use crate::links::LinkedSet;

/// Purchase line identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseLineId(pub AggregateId);

impl PurchaseLineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseLineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Only `Line` carries quantity, price and taxes and produces moves and
/// invoice lines; the other kinds lay out the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Line,
    Subtotal,
    Title,
    Comment,
}

impl From<LineKind> for InvoiceLineKind {
    fn from(kind: LineKind) -> Self {
        match kind {
            LineKind::Line => InvoiceLineKind::Line,
            LineKind::Subtotal => InvoiceLineKind::Subtotal,
            LineKind::Title => InvoiceLineKind::Title,
            LineKind::Comment => InvoiceLineKind::Comment,
        }
    }
}

/// Purchase line item.
///
/// A negative quantity is a return to the supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub line_id: PurchaseLineId,
    pub kind: LineKind,
    /// Ordering key; lines without one sort last.
    pub sequence: Option<u32>,
    pub description: String,
    pub note: Option<String>,
    pub product: Option<ProductSummary>,
    pub quantity: Decimal,
    pub unit: Option<Uom>,
    pub unit_price: Decimal,
    pub taxes: Vec<Tax>,
    pub delivery_date: Option<NaiveDate>,
    pub moves: LinkedSet<StockMoveId>,
}

impl Entity for PurchaseLine {
    type Id = PurchaseLineId;

    fn id(&self) -> &Self::Id {
        &self.line_id
    }
}

impl PurchaseLine {
    /// A `Line` for `product`, in the product's purchase unit.
    pub fn for_product(
        line_id: PurchaseLineId,
        product: ProductSummary,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            line_id,
            kind: LineKind::Line,
            sequence: None,
            description: product.name.clone(),
            note: None,
            unit: Some(product.purchase_uom.clone()),
            taxes: product.supplier_taxes.clone(),
            product: Some(product),
            quantity,
            unit_price,
            delivery_date: None,
            moves: LinkedSet::new(),
        }
    }

    /// A `Line` without product (billed with the default expense account).
    pub fn without_product(
        line_id: PurchaseLineId,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            line_id,
            kind: LineKind::Line,
            sequence: None,
            description: description.into(),
            note: None,
            product: None,
            quantity,
            unit: None,
            unit_price,
            taxes: Vec::new(),
            delivery_date: None,
            moves: LinkedSet::new(),
        }
    }

    /// A subtotal, title or comment line.
    pub fn layout(line_id: PurchaseLineId, kind: LineKind, description: impl Into<String>) -> Self {
        Self {
            line_id,
            kind,
            sequence: None,
            description: description.into(),
            note: None,
            product: None,
            quantity: Decimal::ZERO,
            unit: None,
            unit_price: Decimal::ZERO,
            taxes: Vec::new(),
            delivery_date: None,
            moves: LinkedSet::new(),
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_taxes(mut self, taxes: Vec<Tax>) -> Self {
        self.taxes = taxes;
        self
    }

    pub fn with_delivery_date(mut self, date: NaiveDate) -> Self {
        self.delivery_date = Some(date);
        self
    }

    pub fn is_line(&self) -> bool {
        self.kind == LineKind::Line
    }

    /// Goods or assets line: fulfilled through stock moves.
    pub fn is_stockable(&self) -> bool {
        self.is_line() && self.product.as_ref().is_some_and(|p| p.is_stockable())
    }

    pub fn is_return(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// Unit used for quantity conversions; products always have one.
    pub fn unit_or_default(&self) -> Uom {
        self.unit.clone().unwrap_or_else(Uom::unit)
    }

    /// Where goods come from: the supplier for purchases, the warehouse
    /// storage for returns.
    pub fn from_location(
        &self,
        supplier_location: Option<LocationId>,
        warehouse: Option<&Warehouse>,
    ) -> Option<LocationId> {
        if self.is_return() {
            warehouse.map(|w| w.storage_location)
        } else {
            supplier_location
        }
    }

    /// Where goods go: the warehouse input for purchases, the supplier for
    /// returns.
    pub fn to_location(
        &self,
        supplier_location: Option<LocationId>,
        warehouse: Option<&Warehouse>,
    ) -> Option<LocationId> {
        if self.is_return() {
            supplier_location
        } else {
            warehouse.map(|w| w.input_location)
        }
    }

    /// Same line under a new id, without any linked moves.
    pub fn duplicate(&self, line_id: PurchaseLineId) -> Self {
        Self {
            line_id,
            moves: LinkedSet::new(),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::validation("line description cannot be empty"));
        }
        if !self.is_line() {
            return Ok(());
        }
        if self.product.is_some() && self.unit.is_none() {
            return Err(DomainError::validation(format!(
                "line \"{}\" needs a unit",
                self.description
            )));
        }
        if let (Some(product), Some(unit)) = (&self.product, &self.unit) {
            if product.purchase_uom.category != unit.category {
                return Err(DomainError::validation(format!(
                    "unit \"{}\" of line \"{}\" is not in the category of \"{}\"",
                    unit.symbol, self.description, product.purchase_uom.symbol
                )));
            }
        }
        Ok(())
    }
}

/// Sort lines by sequence, lines without sequence last, keeping insertion
/// order among equals.
pub(crate) fn sort_lines(lines: &mut [PurchaseLine]) {
    lines.sort_by_key(|l| (l.sequence.is_none(), l.sequence));
}
