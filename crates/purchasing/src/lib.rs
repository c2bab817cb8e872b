//! Purchasing domain module (event-sourced).
//!
//! The purchase aggregate and everything derived from it: line amounts and
//! totals, invoice and shipment state reconciliation, the processing planner
//! that decides which supplier invoices and stock moves to create, and the
//! exception handling wizards. Pure domain logic (no IO, no storage).

pub mod amounts;
pub mod config;
pub mod context;
pub mod exception;
pub mod line;
pub mod links;
pub mod process;
pub mod purchase;
pub mod reconcile;
pub mod state;

pub use amounts::{PurchaseAmounts, compute_amounts, line_amount, line_amounts};
pub use config::PurchaseConfiguration;
pub use context::ProcessingContext;
pub use exception::{ExceptionWizard, WizardOutcome};
pub use line::{LineKind, PurchaseLine, PurchaseLineId};
pub use links::{Classification, LinkedSet};
pub use process::{
    InvoicePlan, MoveDirection, MovePlan, ProcessPlan, ReturnShipmentPlan, plan_invoice, plan_moves,
    plan_process,
};
pub use purchase::{
    AddLine, CancelPurchase, ConfirmPurchase, CreatePurchase, DeletePurchase,
    HandleInvoiceException, HandleShipmentException, HeaderUpdated, InvoiceExceptionHandled,
    InvoiceLinked, InvoiceStateChanged, LineAdded, LineRemoved, LinkInvoice, LinkMoves,
    LinkReturnShipment, MarkDone, MovesLinked, Purchase, PurchaseCancelled, PurchaseCommand,
    PurchaseConfirmed, PurchaseCreated, PurchaseDeleted, PurchaseDone, PurchaseEvent, PurchaseId,
    PurchaseQuoted, PurchaseResetToDraft, QuotePurchase, RemoveLine, ResetToDraft,
    ReturnShipmentLinked, SetInvoiceState, SetShipmentState, ShipmentExceptionHandled,
    ShipmentStateChanged, UpdateHeader, rec_name_matches,
};
pub use reconcile::{invoice_state, invoice_state_from, is_done, move_done, move_exception, shipment_state};
pub use state::{InvoiceMethod, InvoiceState, PurchaseState, ShipmentState};
