//! Entity trait: identity + continuity across state changes.
//!
//! Organizational units and members are entities: two units with the same name
//! in the same district are still different units if their ids differ.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Whether `other` denotes the same entity (identity, not value, equality).
    fn same_identity_as(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
