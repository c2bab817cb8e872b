//! Inventory domain module (event-sourced).
//!
//! Stock moves between locations and return shipments to suppliers,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod location;
pub mod shipment;
pub mod stock_move;

pub use location::{LocationId, Warehouse, WarehouseId};
pub use shipment::{
    CancelReturnShipment, CreateReturnShipment, DoReturnShipment, ReturnShipment,
    ReturnShipmentCancelled, ReturnShipmentCommand, ReturnShipmentCreated, ReturnShipmentDone,
    ReturnShipmentEvent, ReturnShipmentId, ReturnShipmentState, ReturnShipmentWaiting,
    WaitReturnShipment,
};
pub use stock_move::{
    AssignMoveToShipment, CancelMove, CreateMove, DoMove, MoveAssigned, MoveCancelled,
    MoveCreated, MoveDone, MoveState, MoveSummary, StockMove, StockMoveCommand, StockMoveEvent,
    StockMoveId,
};
