//! Units of measure and quantity conversion.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use procurerp_core::{DomainError, DomainResult, ValueObject};

/// A unit of measure within a category (e.g. "g" and "kg" in "weight").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uom {
    pub symbol: String,
    pub category: String,
    /// Size of one unit expressed in the category reference unit.
    pub factor: Decimal,
    /// Quantities converted into this unit are rounded to a multiple of this.
    pub rounding: Decimal,
}

impl ValueObject for Uom {}

impl Uom {
    pub fn new(
        symbol: impl Into<String>,
        category: impl Into<String>,
        factor: Decimal,
        rounding: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            category: category.into(),
            factor,
            rounding,
        }
    }

    /// The reference "unit" of the "units" category.
    pub fn unit() -> Self {
        Self::new("u", "units", Decimal::ONE, Decimal::ONE)
    }

    /// Round a quantity to this unit's rounding step.
    pub fn round(&self, quantity: Decimal) -> Decimal {
        if self.rounding.is_zero() {
            return quantity;
        }
        (quantity / self.rounding).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            * self.rounding
    }
}

/// Convert `quantity` expressed in `from` into `to`.
///
/// Both units must share a category.
pub fn compute_qty(from: &Uom, quantity: Decimal, to: &Uom) -> DomainResult<Decimal> {
    if from == to {
        return Ok(quantity);
    }
    if from.category != to.category {
        return Err(DomainError::validation(format!(
            "cannot convert quantity from \"{}\" ({}) to \"{}\" ({})",
            from.symbol, from.category, to.symbol, to.category
        )));
    }
    if to.factor.is_zero() {
        return Err(DomainError::invariant(format!(
            "unit \"{}\" has a zero factor",
            to.symbol
        )));
    }
    Ok(to.round(quantity * from.factor / to.factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn gram() -> Uom {
        Uom::new("g", "weight", dec!(0.001), dec!(1))
    }

    fn kilogram() -> Uom {
        Uom::new("kg", "weight", dec!(1), dec!(0.001))
    }

    #[test]
    fn converts_within_a_category() {
        assert_eq!(compute_qty(&kilogram(), dec!(2.5), &gram()).unwrap(), dec!(2500));
        assert_eq!(compute_qty(&gram(), dec!(1250), &kilogram()).unwrap(), dec!(1.25));
    }

    #[test]
    fn rounds_to_the_target_unit() {
        assert_eq!(compute_qty(&kilogram(), dec!(0.0004), &gram()).unwrap(), dec!(0));
        assert_eq!(compute_qty(&kilogram(), dec!(0.0015), &gram()).unwrap(), dec!(2));
    }

    #[test]
    fn rejects_cross_category_conversion() {
        let err = compute_qty(&Uom::unit(), dec!(1), &gram()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #[test]
        fn converted_quantities_land_on_the_rounding_step(
            mantissa in -10_000_000i64..10_000_000,
            scale in 0u32..5,
        ) {
            let quantity = Decimal::new(mantissa, scale);
            let grams = compute_qty(&kilogram(), quantity, &gram()).unwrap();
            prop_assert!((grams % dec!(1)).is_zero());

            let kilograms = compute_qty(&gram(), quantity, &kilogram()).unwrap();
            prop_assert!((kilograms % dec!(0.001)).is_zero());
            prop_assert_eq!(compute_qty(&gram(), quantity, &gram()).unwrap(), quantity);
        }
    }
}
