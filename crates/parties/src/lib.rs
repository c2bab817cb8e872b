//! Parties domain module (suppliers, event-sourced).
//!
//! Suppliers with their addresses and purchasing defaults (payment term,
//! payable account, supplier stock location), implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod address;
pub mod party;

pub use address::{Address, AddressId};
pub use party::{
    AddAddress, AddressAdded, Party, PartyCommand, PartyEvent, PartyId, PartyRegistered,
    PartyStatus, PartySuspended, PartyUpdated, PurchasingDefaultsSet, RegisterParty,
    SetPurchasingDefaults, SupplierSummary, SuspendParty, UpdateDetails,
};
