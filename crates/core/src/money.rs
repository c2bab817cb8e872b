//! Currency value object and monetary rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::model::ValueObject;

/// A currency and the precision amounts are rounded to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    /// ISO 4217 code (e.g. "EUR", "USD").
    pub code: String,
    /// Number of decimal digits kept when rounding.
    pub digits: u32,
}

impl ValueObject for Currency {}

impl Currency {
    pub fn new(code: impl Into<String>, digits: u32) -> Self {
        Self {
            code: code.into(),
            digits,
        }
    }

    /// Round an amount to the currency precision (half away from zero).
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.digits, RoundingStrategy::MidpointAwayFromZero)
    }

    pub fn is_zero(&self, amount: Decimal) -> bool {
        self.round(amount).is_zero()
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::new("USD", 2)
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.code)
    }
}
