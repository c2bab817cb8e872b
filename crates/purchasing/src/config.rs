//! Purchasing configuration.

use procurerp_accounting::Account;
use procurerp_core::{Currency, DomainError, DomainResult};

use crate::state::InvoiceMethod;

const INVOICE_METHOD: &str = "PROCURERP_INVOICE_METHOD";
const SEQUENCE_PREFIX: &str = "PROCURERP_PURCHASE_SEQUENCE_PREFIX";
const SEQUENCE_PADDING: &str = "PROCURERP_PURCHASE_SEQUENCE_PADDING";
const DEFAULT_ACCOUNT_EXPENSE: &str = "PROCURERP_DEFAULT_ACCOUNT_EXPENSE";
const DEFAULT_CURRENCY: &str = "PROCURERP_DEFAULT_CURRENCY";

/// Purchasing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseConfiguration {
    /// Invoice method of new purchases.
    pub default_invoice_method: InvoiceMethod,
    /// Prefix of purchase references.
    pub sequence_prefix: String,
    /// Minimum number of digits of the reference counter.
    pub sequence_padding: usize,
    /// Expense account for lines without product.
    pub default_account_expense: Option<Account>,
    /// Currency of purchases with a supplier never purchased from.
    pub default_currency: Currency,
}

impl Default for PurchaseConfiguration {
    fn default() -> Self {
        Self {
            default_invoice_method: InvoiceMethod::Order,
            sequence_prefix: "P".to_string(),
            sequence_padding: 4,
            default_account_expense: None,
            default_currency: Currency::default(),
        }
    }
}

impl PurchaseConfiguration {
    pub fn with_invoice_method(mut self, method: InvoiceMethod) -> Self {
        self.default_invoice_method = method;
        self
    }

    pub fn with_sequence(mut self, prefix: impl Into<String>, padding: usize) -> Self {
        self.sequence_prefix = prefix.into();
        self.sequence_padding = padding;
        self
    }

    pub fn with_default_account_expense(mut self, account: Account) -> Self {
        self.default_account_expense = Some(account);
        self
    }

    pub fn with_default_currency(mut self, currency: Currency) -> Self {
        self.default_currency = currency;
        self
    }

    /// Read the configuration from `PROCURERP_*` environment variables; unset
    /// variables keep their default.
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`PurchaseConfiguration::from_env`], with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get(INVOICE_METHOD) {
            config.default_invoice_method = value
                .parse()
                .map_err(|e: String| DomainError::validation(format!("{INVOICE_METHOD}: {e}")))?;
        }
        if let Some(value) = get(SEQUENCE_PREFIX) {
            config.sequence_prefix = value.trim().to_string();
        }
        if let Some(value) = get(SEQUENCE_PADDING) {
            config.sequence_padding = value.trim().parse().map_err(|_| {
                DomainError::validation(format!("{SEQUENCE_PADDING}: \"{value}\" is not a number"))
            })?;
        }
        if let Some(value) = get(DEFAULT_ACCOUNT_EXPENSE) {
            let (code, name) = value
                .split_once(':')
                .map(|(c, n)| (c.trim(), n.trim()))
                .filter(|(c, n)| !c.is_empty() && !n.is_empty())
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "{DEFAULT_ACCOUNT_EXPENSE}: expected \"code:name\", got \"{value}\""
                    ))
                })?;
            config.default_account_expense = Some(Account::expense(code, name));
        }
        if let Some(value) = get(DEFAULT_CURRENCY) {
            config.default_currency = parse_currency(&value)?;
        }
        Ok(config)
    }
}

/// `"EUR"` (two digits) or `"JPY:0"`.
fn parse_currency(value: &str) -> DomainResult<Currency> {
    let malformed = || {
        DomainError::validation(format!(
            "{DEFAULT_CURRENCY}: expected \"CODE\" or \"CODE:digits\", got \"{value}\""
        ))
    };
    let (code, digits) = match value.split_once(':') {
        Some((code, digits)) => (code.trim(), digits.trim().parse().map_err(|_| malformed())?),
        None => (value.trim(), 2),
    };
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(malformed());
    }
    Ok(Currency::new(code.to_ascii_uppercase(), digits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = PurchaseConfiguration::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PurchaseConfiguration::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = PurchaseConfiguration::from_lookup(lookup(&[
            (INVOICE_METHOD, "shipment"),
            (SEQUENCE_PREFIX, "PO-"),
            (SEQUENCE_PADDING, "6"),
            (DEFAULT_ACCOUNT_EXPENSE, "6000:General purchases"),
            (DEFAULT_CURRENCY, "jpy:0"),
        ]))
        .unwrap();
        assert_eq!(config.default_invoice_method, InvoiceMethod::Shipment);
        assert_eq!(config.sequence_prefix, "PO-");
        assert_eq!(config.sequence_padding, 6);
        assert_eq!(
            config.default_account_expense,
            Some(Account::expense("6000", "General purchases"))
        );
        assert_eq!(config.default_currency, Currency::new("JPY", 0));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for vars in [
            [(INVOICE_METHOD, "weekly")],
            [(SEQUENCE_PADDING, "four")],
            [(DEFAULT_ACCOUNT_EXPENSE, "6000")],
            [(DEFAULT_CURRENCY, "EUR:two")],
        ] {
            let err = PurchaseConfiguration::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }
}
