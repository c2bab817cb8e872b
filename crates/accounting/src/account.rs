use serde::{Deserialize, Serialize};

use procurerp_core::ValueObject;

/// High-level account kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Payable,
    Expense,
    Receivable,
    Revenue,
    Other,
}

/// Account code + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "4010"
    pub name: String, // e.g. "Suppliers"
    pub kind: AccountKind,
}

impl ValueObject for Account {}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn payable(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(code, name, AccountKind::Payable)
    }

    pub fn expense(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(code, name, AccountKind::Expense)
    }
}

impl core::fmt::Display for Account {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} - {}", self.code, self.name)
    }
}
