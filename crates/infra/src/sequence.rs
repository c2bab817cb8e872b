//! Purchase reference numbering.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use procurerp_core::TenantId;
use procurerp_purchasing::PurchaseConfiguration;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("sequence counter lock poisoned")]
    Poisoned,
}

/// Per-tenant counter rendered as `prefix` + zero padded number
/// (`P0001`, `P0002`, ...). Numbers are never handed out twice.
#[derive(Debug)]
pub struct SequenceGenerator {
    prefix: String,
    padding: usize,
    counters: Mutex<HashMap<TenantId, u64>>,
}

impl SequenceGenerator {
    pub fn new(prefix: impl Into<String>, padding: usize) -> Self {
        Self {
            prefix: prefix.into(),
            padding,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &PurchaseConfiguration) -> Self {
        Self::new(config.sequence_prefix.clone(), config.sequence_padding)
    }

    pub fn next(&self, tenant_id: TenantId) -> Result<String, SequenceError> {
        let mut counters = self.counters.lock().map_err(|_| SequenceError::Poisoned)?;
        let counter = counters.entry(tenant_id).or_insert(0);
        *counter += 1;
        Ok(format!("{}{:0width$}", self.prefix, counter, width = self.padding))
    }
}
