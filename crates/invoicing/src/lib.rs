//! Invoicing domain module (event-sourced).
//!
//! Supplier invoices and credit notes with their lines and grouped taxes,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod invoice;
pub mod line;

pub use invoice::{
    CancelInvoice, CreateInvoice, Invoice, InvoiceCancelled, InvoiceCommand, InvoiceCreated,
    InvoiceEvent, InvoiceId, InvoiceStatus, InvoiceSummary, InvoiceType, PaymentRegistered,
    PostInvoice, InvoicePosted, RegisterPayment,
};
pub use line::{InvoiceLine, InvoiceLineId, InvoiceLineKind};
