use serde::{Deserialize, Serialize};

use procurerp_core::{AggregateId, ValueObject};

/// Stock location identifier (supplier, warehouse input, storage, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub AggregateId);

impl LocationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(pub AggregateId);

impl WarehouseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A warehouse as seen by purchasing: goods are received on the input
/// location and returned from the storage location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub input_location: LocationId,
    pub storage_location: LocationId,
}

impl ValueObject for Warehouse {}

impl Warehouse {
    pub fn new(
        id: WarehouseId,
        name: impl Into<String>,
        input_location: LocationId,
        storage_location: LocationId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            input_location,
            storage_location,
        }
    }
}
