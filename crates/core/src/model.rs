//! Marker traits for the building blocks aggregates are made of.

/// A record owned by an aggregate that keeps its identity while the
/// aggregate evolves: purchase lines, invoice lines, party addresses.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}

/// An immutable value compared by its attributes: `Currency`, `Tax`, `Uom`,
/// `Warehouse`. Changing one means building another.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
