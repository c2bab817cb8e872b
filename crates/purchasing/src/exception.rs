//! Exception handling wizards (invoices and shipments).
//!
//! `ask` offers the cancelled documents nobody classified yet, all of them
//! preselected for recreation. The operator narrows the selection, then
//! `handle` hands back the domain and the selection for the purchase to
//! record (selected: recreated, the rest: ignored). `cancel` does nothing.

use procurerp_core::{DomainError, DomainResult};
use procurerp_inventory::{MoveState, StockMoveId};
use procurerp_invoicing::{InvoiceId, InvoiceStatus};

use crate::context::ProcessingContext;
use crate::purchase::Purchase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome<T> {
    Handle { domain: Vec<T>, recreate: Vec<T> },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionWizard<T> {
    domain: Vec<T>,
    recreate: Vec<T>,
}

impl<T: Copy + PartialEq + core::fmt::Display> ExceptionWizard<T> {
    /// Start with every exceptioned document selected for recreation.
    pub fn ask(domain: Vec<T>) -> Self {
        Self {
            recreate: domain.clone(),
            domain,
        }
    }

    pub fn domain(&self) -> &[T] {
        &self.domain
    }

    pub fn recreate(&self) -> &[T] {
        &self.recreate
    }

    /// Nothing to handle.
    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
    }

    /// Replace the selection; it must stay within the offered documents.
    pub fn select(&mut self, recreate: Vec<T>) -> DomainResult<()> {
        self.recreate = within(&self.domain, recreate)?;
        Ok(())
    }

    /// Check a handled outcome against the documents currently in exception.
    /// Both lists lose their duplicates; anything outside this wizard's
    /// domain, or a recreation outside the handled domain, is rejected.
    pub fn validate(&self, domain: Vec<T>, recreate: Vec<T>) -> DomainResult<(Vec<T>, Vec<T>)> {
        let domain = within(&self.domain, domain)?;
        let recreate = within(&domain, recreate)?;
        Ok((domain, recreate))
    }

    pub fn handle(self) -> WizardOutcome<T> {
        WizardOutcome::Handle {
            domain: self.domain,
            recreate: self.recreate,
        }
    }

    pub fn cancel(self) -> WizardOutcome<T> {
        WizardOutcome::Cancelled
    }
}

fn within<T: Copy + PartialEq + core::fmt::Display>(allowed: &[T], ids: Vec<T>) -> DomainResult<Vec<T>> {
    let mut out: Vec<T> = Vec::with_capacity(ids.len());
    for id in ids {
        if !allowed.contains(&id) {
            return Err(DomainError::validation(format!(
                "{id} is not an exception of this purchase"
            )));
        }
        if !out.contains(&id) {
            out.push(id);
        }
    }
    Ok(out)
}

impl ExceptionWizard<InvoiceId> {
    /// Cancelled invoices of `purchase` still waiting for a decision.
    pub fn for_invoices(purchase: &Purchase, ctx: &ProcessingContext) -> DomainResult<Self> {
        let domain = purchase
            .invoices()
            .exceptions(|id| Ok(ctx.invoice(id)?.status == InvoiceStatus::Cancel))?;
        Ok(Self::ask(domain))
    }
}

impl ExceptionWizard<StockMoveId> {
    /// Cancelled moves of any line of `purchase` still waiting for a decision.
    pub fn for_moves(purchase: &Purchase, ctx: &ProcessingContext) -> DomainResult<Self> {
        let mut domain = Vec::new();
        for line in purchase.lines() {
            domain.extend(
                line.moves
                    .exceptions(|id| Ok(ctx.stock_move(id)?.state == MoveState::Cancel))?,
            );
        }
        Ok(Self::ask(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_is_preselected() {
        let wizard = ExceptionWizard::ask(vec![1u32, 2, 3]);
        assert_eq!(wizard.recreate(), &[1, 2, 3]);
    }

    #[test]
    fn selection_must_stay_in_domain() {
        let mut wizard = ExceptionWizard::ask(vec![1u32, 2]);
        assert!(wizard.select(vec![3]).is_err());
        assert_eq!(wizard.recreate(), &[1, 2]);

        wizard.select(vec![]).unwrap();
        assert_eq!(
            wizard.handle(),
            WizardOutcome::Handle {
                domain: vec![1, 2],
                recreate: vec![],
            }
        );
    }

    #[test]
    fn duplicate_selections_collapse() {
        let mut wizard = ExceptionWizard::ask(vec![1u32, 2]);
        wizard.select(vec![2, 2, 2]).unwrap();
        assert_eq!(wizard.recreate(), &[2]);
    }

    #[test]
    fn validate_keeps_outcomes_within_the_exceptions() {
        let wizard = ExceptionWizard::ask(vec![1u32, 2]);
        assert_eq!(
            wizard.validate(vec![1, 1, 2], vec![2, 2]).unwrap(),
            (vec![1, 2], vec![2])
        );
        assert!(wizard.validate(vec![1, 7], vec![]).is_err());
        assert!(wizard.validate(vec![1], vec![2]).is_err());
    }

    #[test]
    fn cancel_drops_the_selection() {
        let wizard = ExceptionWizard::ask(vec![4u32]);
        assert_eq!(wizard.cancel(), WizardOutcome::Cancelled);
    }
}
