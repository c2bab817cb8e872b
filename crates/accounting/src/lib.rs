//! Accounting reference data used by purchasing and invoicing.
//!
//! Accounts, payment terms and taxes are value objects here; posting journal
//! entries is outside this workspace.

pub mod account;
pub mod payment_term;
pub mod tax;

pub use account::{Account, AccountKind};
pub use payment_term::PaymentTerm;
pub use tax::{Tax, TaxAccumulator, TaxKind, TaxLine, compute_taxes};
