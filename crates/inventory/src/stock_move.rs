use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procurerp_core::{Aggregate, AggregateId, AggregateRoot, Currency, DomainError, TenantId};
use procurerp_events::Event;
use procurerp_products::{ProductId, Uom};

use crate::location::LocationId;
use crate::shipment::ReturnShipmentId;

/// Stock move identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockMoveId(pub AggregateId);

impl StockMoveId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockMoveId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveState {
    Draft,
    Done,
    Cancel,
}

/// Read-only view of a move used when reconciling purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSummary {
    pub move_id: StockMoveId,
    pub product_id: ProductId,
    pub state: MoveState,
    pub quantity: Decimal,
    pub uom: Uom,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub shipment: Option<ReturnShipmentId>,
}

/// Aggregate root: StockMove.
///
/// Quantities are always positive; direction is given by the locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMove {
    id: StockMoveId,
    tenant_id: Option<TenantId>,
    product_id: Option<ProductId>,
    quantity: Decimal,
    uom: Uom,
    from_location: Option<LocationId>,
    to_location: Option<LocationId>,
    unit_price: Decimal,
    currency: Currency,
    planned_date: Option<NaiveDate>,
    origin: Option<AggregateId>,
    shipment: Option<ReturnShipmentId>,
    state: MoveState,
    version: u64,
    created: bool,
}

impl StockMove {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockMoveId) -> Self {
        Self {
            id,
            tenant_id: None,
            product_id: None,
            quantity: Decimal::ZERO,
            uom: Uom::unit(),
            from_location: None,
            to_location: None,
            unit_price: Decimal::ZERO,
            currency: Currency::default(),
            planned_date: None,
            origin: None,
            shipment: None,
            state: MoveState::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockMoveId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn uom(&self) -> &Uom {
        &self.uom
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn planned_date(&self) -> Option<NaiveDate> {
        self.planned_date
    }

    /// The document line that produced this move (a purchase line).
    pub fn origin(&self) -> Option<AggregateId> {
        self.origin
    }

    pub fn shipment(&self) -> Option<ReturnShipmentId> {
        self.shipment
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// `None` until the move is created.
    pub fn summary(&self) -> Option<MoveSummary> {
        Some(MoveSummary {
            move_id: self.id,
            product_id: self.product_id?,
            state: self.state,
            quantity: self.quantity,
            uom: self.uom.clone(),
            from_location: self.from_location?,
            to_location: self.to_location?,
            shipment: self.shipment,
        })
    }
}

impl AggregateRoot for StockMove {
    type Id = StockMoveId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateMove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMove {
    pub tenant_id: TenantId,
    pub move_id: StockMoveId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub uom: Uom,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub unit_price: Decimal,
    pub currency: Currency,
    pub planned_date: Option<NaiveDate>,
    pub origin: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DoMove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoMove {
    pub tenant_id: TenantId,
    pub move_id: StockMoveId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelMove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelMove {
    pub tenant_id: TenantId,
    pub move_id: StockMoveId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignMoveToShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignMoveToShipment {
    pub tenant_id: TenantId,
    pub move_id: StockMoveId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockMoveCommand {
    CreateMove(CreateMove),
    DoMove(DoMove),
    CancelMove(CancelMove),
    AssignMoveToShipment(AssignMoveToShipment),
}

/// Event: MoveCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCreated {
    pub tenant_id: TenantId,
    pub move_id: StockMoveId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub uom: Uom,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub unit_price: Decimal,
    pub currency: Currency,
    pub planned_date: Option<NaiveDate>,
    pub origin: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MoveDone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveDone {
    pub tenant_id: TenantId,
    pub move_id: StockMoveId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MoveCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCancelled {
    pub tenant_id: TenantId,
    pub move_id: StockMoveId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MoveAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveAssigned {
    pub tenant_id: TenantId,
    pub move_id: StockMoveId,
    pub shipment_id: ReturnShipmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockMoveEvent {
    MoveCreated(MoveCreated),
    MoveDone(MoveDone),
    MoveCancelled(MoveCancelled),
    MoveAssigned(MoveAssigned),
}

impl Event for StockMoveEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockMoveEvent::MoveCreated(_) => "inventory.move.created",
            StockMoveEvent::MoveDone(_) => "inventory.move.done",
            StockMoveEvent::MoveCancelled(_) => "inventory.move.cancelled",
            StockMoveEvent::MoveAssigned(_) => "inventory.move.assigned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockMoveEvent::MoveCreated(e) => e.occurred_at,
            StockMoveEvent::MoveDone(e) => e.occurred_at,
            StockMoveEvent::MoveCancelled(e) => e.occurred_at,
            StockMoveEvent::MoveAssigned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockMove {
    type Command = StockMoveCommand;
    type Event = StockMoveEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockMoveEvent::MoveCreated(e) => {
                self.id = e.move_id;
                self.tenant_id = Some(e.tenant_id);
                self.product_id = Some(e.product_id);
                self.quantity = e.quantity;
                self.uom = e.uom.clone();
                self.from_location = Some(e.from_location);
                self.to_location = Some(e.to_location);
                self.unit_price = e.unit_price;
                self.currency = e.currency.clone();
                self.planned_date = e.planned_date;
                self.origin = e.origin;
                self.state = MoveState::Draft;
                self.created = true;
            }
            StockMoveEvent::MoveDone(_) => {
                self.state = MoveState::Done;
            }
            StockMoveEvent::MoveCancelled(_) => {
                self.state = MoveState::Cancel;
            }
            StockMoveEvent::MoveAssigned(e) => {
                self.shipment = Some(e.shipment_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockMoveCommand::CreateMove(cmd) => self.handle_create(cmd),
            StockMoveCommand::DoMove(cmd) => self.handle_do(cmd),
            StockMoveCommand::CancelMove(cmd) => self.handle_cancel(cmd),
            StockMoveCommand::AssignMoveToShipment(cmd) => self.handle_assign(cmd),
        }
    }
}

impl StockMove {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, move_id: StockMoveId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        if self.id != move_id {
            return Err(DomainError::invariant("move_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateMove) -> Result<Vec<StockMoveEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("move already exists"));
        }
        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("move quantity must be positive"));
        }
        if cmd.from_location == cmd.to_location {
            return Err(DomainError::validation(
                "source and destination locations must differ",
            ));
        }

        Ok(vec![StockMoveEvent::MoveCreated(MoveCreated {
            tenant_id: cmd.tenant_id,
            move_id: cmd.move_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            uom: cmd.uom.clone(),
            from_location: cmd.from_location,
            to_location: cmd.to_location,
            unit_price: cmd.unit_price,
            currency: cmd.currency.clone(),
            planned_date: cmd.planned_date,
            origin: cmd.origin,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_do(&self, cmd: &DoMove) -> Result<Vec<StockMoveEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.move_id)?;
        match self.state {
            MoveState::Draft => Ok(vec![StockMoveEvent::MoveDone(MoveDone {
                tenant_id: cmd.tenant_id,
                move_id: cmd.move_id,
                occurred_at: cmd.occurred_at,
            })]),
            MoveState::Done => Err(DomainError::conflict("move is already done")),
            MoveState::Cancel => Err(DomainError::invariant("a cancelled move cannot be done")),
        }
    }

    fn handle_cancel(&self, cmd: &CancelMove) -> Result<Vec<StockMoveEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.move_id)?;
        match self.state {
            MoveState::Draft => Ok(vec![StockMoveEvent::MoveCancelled(MoveCancelled {
                tenant_id: cmd.tenant_id,
                move_id: cmd.move_id,
                occurred_at: cmd.occurred_at,
            })]),
            MoveState::Cancel => Err(DomainError::conflict("move is already cancelled")),
            MoveState::Done => Err(DomainError::invariant("a done move cannot be cancelled")),
        }
    }

    fn handle_assign(&self, cmd: &AssignMoveToShipment) -> Result<Vec<StockMoveEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.move_id)?;
        if self.state != MoveState::Draft {
            return Err(DomainError::invariant(
                "only draft moves can be assigned to a shipment",
            ));
        }
        if self.shipment == Some(cmd.shipment_id) {
            return Ok(vec![]);
        }
        if self.shipment.is_some() {
            return Err(DomainError::conflict("move already belongs to a shipment"));
        }

        Ok(vec![StockMoveEvent::MoveAssigned(MoveAssigned {
            tenant_id: cmd.tenant_id,
            move_id: cmd.move_id,
            shipment_id: cmd.shipment_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
