use serde::{Deserialize, Serialize};

use procurerp_core::ValueObject;

/// Payment term reference (e.g. "30 days end of month").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentTerm {
    pub code: String,
    pub name: String,
}

impl ValueObject for PaymentTerm {}

impl PaymentTerm {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}
