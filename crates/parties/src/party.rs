use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procurerp_accounting::{Account, AccountKind, PaymentTerm};
use procurerp_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use procurerp_events::Event;
use procurerp_inventory::LocationId;

use crate::address::{Address, AddressId};

/// Party identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub AggregateId);

impl PartyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Party status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Active,
    Suspended,
}

/// What purchasing needs to know about a supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierSummary {
    pub party_id: PartyId,
    pub name: String,
    pub lang: Option<String>,
    pub invoice_address: Option<Address>,
    pub payment_term: Option<PaymentTerm>,
    pub account_payable: Option<Account>,
    pub supplier_location: Option<LocationId>,
}

/// Aggregate root: Party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    id: PartyId,
    tenant_id: Option<TenantId>,
    name: String,
    lang: Option<String>,
    addresses: Vec<Address>,
    supplier_payment_term: Option<PaymentTerm>,
    account_payable: Option<Account>,
    supplier_location: Option<LocationId>,
    status: PartyStatus,
    version: u64,
    created: bool,
}

impl Party {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PartyId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            lang: None,
            addresses: Vec::new(),
            supplier_payment_term: None,
            account_payable: None,
            supplier_location: None,
            status: PartyStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn status(&self) -> PartyStatus {
        self.status
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Suspended parties cannot be purchased from.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == PartyStatus::Active
    }

    /// First address flagged for invoicing, falling back to the first address.
    pub fn invoice_address(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.invoice)
            .or_else(|| self.addresses.first())
    }

    pub fn address(&self, address_id: AddressId) -> Option<&Address> {
        self.addresses.iter().find(|a| a.address_id == address_id)
    }

    pub fn supplier_summary(&self) -> SupplierSummary {
        SupplierSummary {
            party_id: self.id,
            name: self.name.clone(),
            lang: self.lang.clone(),
            invoice_address: self.invoice_address().cloned(),
            payment_term: self.supplier_payment_term.clone(),
            account_payable: self.account_payable.clone(),
            supplier_location: self.supplier_location,
        }
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: String,
    pub lang: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new language (if None, keep existing).
    pub lang: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddAddress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAddress {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub address: Address,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPurchasingDefaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPurchasingDefaults {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub payment_term: Option<PaymentTerm>,
    pub account_payable: Option<Account>,
    pub supplier_location: Option<LocationId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyCommand {
    RegisterParty(RegisterParty),
    UpdateDetails(UpdateDetails),
    AddAddress(AddAddress),
    SetPurchasingDefaults(SetPurchasingDefaults),
    SuspendParty(SuspendParty),
}

/// Event: PartyRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRegistered {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: String,
    pub lang: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartyUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyUpdated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: String,
    pub lang: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AddressAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAdded {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub address: Address,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchasingDefaultsSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasingDefaultsSet {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub payment_term: Option<PaymentTerm>,
    pub account_payable: Option<Account>,
    pub supplier_location: Option<LocationId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartySuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySuspended {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyEvent {
    PartyRegistered(PartyRegistered),
    PartyUpdated(PartyUpdated),
    AddressAdded(AddressAdded),
    PurchasingDefaultsSet(PurchasingDefaultsSet),
    PartySuspended(PartySuspended),
}

impl Event for PartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartyEvent::PartyRegistered(_) => "parties.party.registered",
            PartyEvent::PartyUpdated(_) => "parties.party.updated",
            PartyEvent::AddressAdded(_) => "parties.party.address_added",
            PartyEvent::PurchasingDefaultsSet(_) => "parties.party.purchasing_defaults_set",
            PartyEvent::PartySuspended(_) => "parties.party.suspended",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartyEvent::PartyRegistered(e) => e.occurred_at,
            PartyEvent::PartyUpdated(e) => e.occurred_at,
            PartyEvent::AddressAdded(e) => e.occurred_at,
            PartyEvent::PurchasingDefaultsSet(e) => e.occurred_at,
            PartyEvent::PartySuspended(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Party {
    type Command = PartyCommand;
    type Event = PartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartyEvent::PartyRegistered(e) => {
                self.id = e.party_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.lang = e.lang.clone();
                self.status = PartyStatus::Active;
                self.created = true;
            }
            PartyEvent::PartyUpdated(e) => {
                self.name = e.name.clone();
                self.lang = e.lang.clone();
            }
            PartyEvent::AddressAdded(e) => {
                self.addresses.push(e.address.clone());
            }
            PartyEvent::PurchasingDefaultsSet(e) => {
                self.supplier_payment_term = e.payment_term.clone();
                self.account_payable = e.account_payable.clone();
                self.supplier_location = e.supplier_location;
            }
            PartyEvent::PartySuspended(_) => {
                self.status = PartyStatus::Suspended;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartyCommand::RegisterParty(cmd) => self.handle_register(cmd),
            PartyCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            PartyCommand::AddAddress(cmd) => self.handle_add_address(cmd),
            PartyCommand::SetPurchasingDefaults(cmd) => self.handle_purchasing_defaults(cmd),
            PartyCommand::SuspendParty(cmd) => self.handle_suspend(cmd),
        }
    }
}

impl Party {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, party_id: PartyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        if self.id != party_id {
            return Err(DomainError::invariant("party_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterParty) -> Result<Vec<PartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("party already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![PartyEvent::PartyRegistered(PartyRegistered {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            name: cmd.name.clone(),
            lang: cmd.lang.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![PartyEvent::PartyUpdated(PartyUpdated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            name: new_name,
            lang: cmd.lang.clone().or_else(|| self.lang.clone()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_address(&self, cmd: &AddAddress) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;

        if self.address(cmd.address.address_id).is_some() {
            return Err(DomainError::conflict("address already exists"));
        }

        Ok(vec![PartyEvent::AddressAdded(AddressAdded {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            address: cmd.address.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_purchasing_defaults(
        &self,
        cmd: &SetPurchasingDefaults,
    ) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;

        if let Some(account) = &cmd.account_payable {
            if account.kind != AccountKind::Payable {
                return Err(DomainError::validation(format!(
                    "account \"{account}\" is not a payable account"
                )));
            }
        }

        Ok(vec![PartyEvent::PurchasingDefaultsSet(PurchasingDefaultsSet {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            payment_term: cmd.payment_term.clone(),
            account_payable: cmd.account_payable.clone(),
            supplier_location: cmd.supplier_location,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendParty) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;

        if self.status == PartyStatus::Suspended {
            return Err(DomainError::conflict("party is already suspended"));
        }

        Ok(vec![PartyEvent::PartySuspended(PartySuspended {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procurerp_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(tenant_id: TenantId, party_id: PartyId) -> Party {
        let mut party = Party::empty(party_id);
        execute(
            &mut party,
            &PartyCommand::RegisterParty(RegisterParty {
                tenant_id,
                party_id,
                name: "Acme Supplies".to_string(),
                lang: Some("fr".to_string()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        party
    }

    fn add_address(party: &mut Party, tenant_id: TenantId, invoice: bool, city: &str) -> AddressId {
        let address_id = AddressId::new(AggregateId::new());
        let address = Address {
            city: Some(city.to_string()),
            invoice,
            ..Address::new(address_id)
        };
        let party_id = party.id_typed();
        execute(
            party,
            &PartyCommand::AddAddress(AddAddress {
                tenant_id,
                party_id,
                address,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        address_id
    }

    #[test]
    fn register_party_rejects_empty_name() {
        let party_id = PartyId::new(AggregateId::new());
        let err = Party::empty(party_id)
            .handle(&PartyCommand::RegisterParty(RegisterParty {
                tenant_id: TenantId::new(),
                party_id,
                name: "   ".to_string(),
                lang: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn invoice_address_prefers_flagged_address() {
        let tenant_id = TenantId::new();
        let mut party = registered(tenant_id, PartyId::new(AggregateId::new()));
        assert!(party.invoice_address().is_none());

        let first = add_address(&mut party, tenant_id, false, "Liège");
        assert_eq!(party.invoice_address().unwrap().address_id, first);

        let invoicing = add_address(&mut party, tenant_id, true, "Namur");
        assert_eq!(party.invoice_address().unwrap().address_id, invoicing);
        assert_eq!(party.supplier_summary().invoice_address.unwrap().address_id, invoicing);
    }

    #[test]
    fn purchasing_defaults_require_a_payable_account() {
        let tenant_id = TenantId::new();
        let party_id = PartyId::new(AggregateId::new());
        let mut party = registered(tenant_id, party_id);

        let err = party
            .handle(&PartyCommand::SetPurchasingDefaults(SetPurchasingDefaults {
                tenant_id,
                party_id,
                payment_term: None,
                account_payable: Some(Account::expense("6000", "Purchases")),
                supplier_location: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let location = LocationId::new(AggregateId::new());
        execute(
            &mut party,
            &PartyCommand::SetPurchasingDefaults(SetPurchasingDefaults {
                tenant_id,
                party_id,
                payment_term: Some(PaymentTerm::new("30D", "30 days")),
                account_payable: Some(Account::payable("4400", "Suppliers")),
                supplier_location: Some(location),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let summary = party.supplier_summary();
        assert_eq!(summary.supplier_location, Some(location));
        assert_eq!(summary.payment_term.unwrap().code, "30D");
        assert_eq!(summary.lang.as_deref(), Some("fr"));
    }

    #[test]
    fn update_keeps_language_when_omitted() {
        let tenant_id = TenantId::new();
        let party_id = PartyId::new(AggregateId::new());
        let mut party = registered(tenant_id, party_id);

        execute(
            &mut party,
            &PartyCommand::UpdateDetails(UpdateDetails {
                tenant_id,
                party_id,
                name: Some("Acme Industrial".to_string()),
                lang: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(party.name(), "Acme Industrial");
        assert_eq!(party.lang(), Some("fr"));
    }

    #[test]
    fn suspended_parties_cannot_transact() {
        let tenant_id = TenantId::new();
        let party_id = PartyId::new(AggregateId::new());
        let mut party = registered(tenant_id, party_id);
        assert!(party.can_transact());

        let suspend = PartyCommand::SuspendParty(SuspendParty {
            tenant_id,
            party_id,
            reason: Some("Quality issues".to_string()),
            occurred_at: test_time(),
        });
        execute(&mut party, &suspend).unwrap();
        assert!(!party.can_transact());
        assert!(matches!(
            party.handle(&suspend).unwrap_err(),
            DomainError::Conflict(_)
        ));
    }
}
