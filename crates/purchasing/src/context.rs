//! Snapshot of everything a purchase links to, loaded before processing.

use std::collections::BTreeMap;

use procurerp_accounting::Account;
use procurerp_core::{DomainError, DomainResult};
use procurerp_inventory::{MoveSummary, StockMoveId};
use procurerp_invoicing::{InvoiceId, InvoiceLine, InvoiceSummary};
use procurerp_parties::SupplierSummary;

use crate::line::PurchaseLineId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingContext {
    pub supplier: SupplierSummary,
    pub invoices: BTreeMap<InvoiceId, InvoiceSummary>,
    pub moves: BTreeMap<StockMoveId, MoveSummary>,
    /// Expense account for lines without product.
    pub default_account_expense: Option<Account>,
}

impl ProcessingContext {
    pub fn new(supplier: SupplierSummary) -> Self {
        Self {
            supplier,
            invoices: BTreeMap::new(),
            moves: BTreeMap::new(),
            default_account_expense: None,
        }
    }

    pub fn with_default_account_expense(mut self, account: Option<Account>) -> Self {
        self.default_account_expense = account;
        self
    }

    pub fn insert_invoice(&mut self, invoice: InvoiceSummary) {
        self.invoices.insert(invoice.invoice_id, invoice);
    }

    pub fn insert_move(&mut self, summary: MoveSummary) {
        self.moves.insert(summary.move_id, summary);
    }

    pub fn invoice(&self, id: InvoiceId) -> DomainResult<&InvoiceSummary> {
        self.invoices
            .get(&id)
            .ok_or_else(|| DomainError::invariant(format!("invoice {id} is not loaded")))
    }

    pub fn stock_move(&self, id: StockMoveId) -> DomainResult<&MoveSummary> {
        self.moves
            .get(&id)
            .ok_or_else(|| DomainError::invariant(format!("move {id} is not loaded")))
    }

    /// Invoice lines billing `line_id`, with the invoice they belong to.
    pub fn invoice_lines_of(
        &self,
        line_id: PurchaseLineId,
    ) -> impl Iterator<Item = (InvoiceId, &InvoiceLine)> + '_ {
        self.invoices.values().flat_map(move |invoice| {
            invoice
                .lines
                .iter()
                .filter(move |l| l.origin == Some(line_id.0))
                .map(move |l| (invoice.invoice_id, l))
        })
    }
}
