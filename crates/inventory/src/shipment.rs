//! Supplier return shipments.
//!
//! A return shipment groups the moves sending goods back from a warehouse
//! storage location to the supplier location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procurerp_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use procurerp_events::Event;

use crate::location::LocationId;
use crate::stock_move::StockMoveId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnShipmentId(pub AggregateId);

impl ReturnShipmentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReturnShipmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnShipmentState {
    Draft,
    Waiting,
    Done,
    Cancel,
}

/// Aggregate root: ReturnShipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnShipment {
    id: ReturnShipmentId,
    tenant_id: Option<TenantId>,
    supplier: Option<AggregateId>,
    from_location: Option<LocationId>,
    to_location: Option<LocationId>,
    moves: Vec<StockMoveId>,
    state: ReturnShipmentState,
    version: u64,
    created: bool,
}

impl ReturnShipment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ReturnShipmentId) -> Self {
        Self {
            id,
            tenant_id: None,
            supplier: None,
            from_location: None,
            to_location: None,
            moves: Vec::new(),
            state: ReturnShipmentState::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReturnShipmentId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn supplier(&self) -> Option<AggregateId> {
        self.supplier
    }

    pub fn from_location(&self) -> Option<LocationId> {
        self.from_location
    }

    pub fn to_location(&self) -> Option<LocationId> {
        self.to_location
    }

    pub fn moves(&self) -> &[StockMoveId] {
        &self.moves
    }

    pub fn state(&self) -> ReturnShipmentState {
        self.state
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for ReturnShipment {
    type Id = ReturnShipmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateReturnShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReturnShipment {
    pub tenant_id: TenantId,
    pub shipment_id: ReturnShipmentId,
    pub supplier: AggregateId,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub moves: Vec<StockMoveId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WaitReturnShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitReturnShipment {
    pub tenant_id: TenantId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DoReturnShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoReturnShipment {
    pub tenant_id: TenantId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelReturnShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReturnShipment {
    pub tenant_id: TenantId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnShipmentCommand {
    CreateReturnShipment(CreateReturnShipment),
    WaitReturnShipment(WaitReturnShipment),
    DoReturnShipment(DoReturnShipment),
    CancelReturnShipment(CancelReturnShipment),
}

/// Event: ReturnShipmentCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnShipmentCreated {
    pub tenant_id: TenantId,
    pub shipment_id: ReturnShipmentId,
    pub supplier: AggregateId,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub moves: Vec<StockMoveId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnShipmentWaiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnShipmentWaiting {
    pub tenant_id: TenantId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnShipmentDone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnShipmentDone {
    pub tenant_id: TenantId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnShipmentCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnShipmentCancelled {
    pub tenant_id: TenantId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnShipmentEvent {
    ReturnShipmentCreated(ReturnShipmentCreated),
    ReturnShipmentWaiting(ReturnShipmentWaiting),
    ReturnShipmentDone(ReturnShipmentDone),
    ReturnShipmentCancelled(ReturnShipmentCancelled),
}

impl Event for ReturnShipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReturnShipmentEvent::ReturnShipmentCreated(_) => "inventory.return_shipment.created",
            ReturnShipmentEvent::ReturnShipmentWaiting(_) => "inventory.return_shipment.waiting",
            ReturnShipmentEvent::ReturnShipmentDone(_) => "inventory.return_shipment.done",
            ReturnShipmentEvent::ReturnShipmentCancelled(_) => {
                "inventory.return_shipment.cancelled"
            }
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReturnShipmentEvent::ReturnShipmentCreated(e) => e.occurred_at,
            ReturnShipmentEvent::ReturnShipmentWaiting(e) => e.occurred_at,
            ReturnShipmentEvent::ReturnShipmentDone(e) => e.occurred_at,
            ReturnShipmentEvent::ReturnShipmentCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReturnShipment {
    type Command = ReturnShipmentCommand;
    type Event = ReturnShipmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReturnShipmentEvent::ReturnShipmentCreated(e) => {
                self.id = e.shipment_id;
                self.tenant_id = Some(e.tenant_id);
                self.supplier = Some(e.supplier);
                self.from_location = Some(e.from_location);
                self.to_location = Some(e.to_location);
                self.moves = e.moves.clone();
                self.state = ReturnShipmentState::Draft;
                self.created = true;
            }
            ReturnShipmentEvent::ReturnShipmentWaiting(_) => {
                self.state = ReturnShipmentState::Waiting;
            }
            ReturnShipmentEvent::ReturnShipmentDone(_) => {
                self.state = ReturnShipmentState::Done;
            }
            ReturnShipmentEvent::ReturnShipmentCancelled(_) => {
                self.state = ReturnShipmentState::Cancel;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReturnShipmentCommand::CreateReturnShipment(cmd) => self.handle_create(cmd),
            ReturnShipmentCommand::WaitReturnShipment(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.shipment_id)?;
                self.transition(
                    ReturnShipmentState::Draft,
                    ReturnShipmentEvent::ReturnShipmentWaiting(ReturnShipmentWaiting {
                        tenant_id: cmd.tenant_id,
                        shipment_id: cmd.shipment_id,
                        occurred_at: cmd.occurred_at,
                    }),
                )
            }
            ReturnShipmentCommand::DoReturnShipment(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.shipment_id)?;
                self.transition(
                    ReturnShipmentState::Waiting,
                    ReturnShipmentEvent::ReturnShipmentDone(ReturnShipmentDone {
                        tenant_id: cmd.tenant_id,
                        shipment_id: cmd.shipment_id,
                        occurred_at: cmd.occurred_at,
                    }),
                )
            }
            ReturnShipmentCommand::CancelReturnShipment(cmd) => {
                self.ensure_existing(cmd.tenant_id, cmd.shipment_id)?;
                if matches!(
                    self.state,
                    ReturnShipmentState::Done | ReturnShipmentState::Cancel
                ) {
                    return Err(DomainError::invariant(format!(
                        "cannot cancel a return shipment in state {:?}",
                        self.state
                    )));
                }
                Ok(vec![ReturnShipmentEvent::ReturnShipmentCancelled(
                    ReturnShipmentCancelled {
                        tenant_id: cmd.tenant_id,
                        shipment_id: cmd.shipment_id,
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
        }
    }
}

impl ReturnShipment {
    fn ensure_existing(
        &self,
        tenant_id: TenantId,
        shipment_id: ReturnShipmentId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != shipment_id {
            return Err(DomainError::invariant("shipment_id mismatch"));
        }
        Ok(())
    }

    fn transition(
        &self,
        from: ReturnShipmentState,
        event: ReturnShipmentEvent,
    ) -> Result<Vec<ReturnShipmentEvent>, DomainError> {
        if self.state != from {
            return Err(DomainError::invariant(format!(
                "return shipment must be {from:?}, is {:?}",
                self.state
            )));
        }
        Ok(vec![event])
    }

    fn handle_create(
        &self,
        cmd: &CreateReturnShipment,
    ) -> Result<Vec<ReturnShipmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("return shipment already exists"));
        }
        if cmd.moves.is_empty() {
            return Err(DomainError::validation(
                "a return shipment needs at least one move",
            ));
        }

        Ok(vec![ReturnShipmentEvent::ReturnShipmentCreated(
            ReturnShipmentCreated {
                tenant_id: cmd.tenant_id,
                shipment_id: cmd.shipment_id,
                supplier: cmd.supplier,
                from_location: cmd.from_location,
                to_location: cmd.to_location,
                moves: cmd.moves.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
