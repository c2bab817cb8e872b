//! Enumerated purchase states.

use serde::{Deserialize, Serialize};

/// Purchase workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseState {
    Draft,
    Quotation,
    Confirmed,
    Done,
    Cancel,
}

impl PurchaseState {
    /// States in which the amounts are read from the stored snapshot.
    pub fn uses_amount_cache(self) -> bool {
        matches!(
            self,
            PurchaseState::Confirmed | PurchaseState::Done | PurchaseState::Cancel
        )
    }

    /// Allowed workflow transitions.
    pub fn can_transition_to(self, to: PurchaseState) -> bool {
        use PurchaseState::*;
        matches!(
            (self, to),
            (Draft, Quotation)
                | (Quotation, Confirmed)
                | (Confirmed, Confirmed)
                | (Draft, Cancel)
                | (Quotation, Cancel)
                | (Quotation, Draft)
                | (Cancel, Draft)
                | (Confirmed, Done)
        )
    }
}

impl core::fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PurchaseState::Draft => "draft",
            PurchaseState::Quotation => "quotation",
            PurchaseState::Confirmed => "confirmed",
            PurchaseState::Done => "done",
            PurchaseState::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// How supplier invoices are produced for a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceMethod {
    /// Never created automatically.
    Manual,
    /// From the ordered quantities, on confirmation.
    Order,
    /// From the received quantities.
    Shipment,
}

impl core::str::FromStr for InvoiceMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(InvoiceMethod::Manual),
            "order" => Ok(InvoiceMethod::Order),
            "shipment" => Ok(InvoiceMethod::Shipment),
            other => Err(format!("unknown invoice method \"{other}\"")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    None,
    Waiting,
    Paid,
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipmentState {
    None,
    Waiting,
    Received,
    Exception,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_transitions() {
        use PurchaseState::*;
        assert!(Draft.can_transition_to(Quotation));
        assert!(Cancel.can_transition_to(Draft));
        assert!(Confirmed.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Cancel));
        assert!(!Draft.can_transition_to(Confirmed));
        assert!(!Done.can_transition_to(Draft));
    }

    #[test]
    fn invoice_method_parses_case_insensitively() {
        assert_eq!("Shipment".parse::<InvoiceMethod>(), Ok(InvoiceMethod::Shipment));
        assert!("weekly".parse::<InvoiceMethod>().is_err());
    }
}
