//! Organizational hierarchy: provinces, districts and the units members belong to.
//!
//! Containment is Province → District → Unit and is acyclic. A unit may name a
//! province without a district. This crate holds only the data and the read-side
//! lookup contract ([`UnitDirectory`]); it performs no IO.

pub mod directory;
pub mod unit;

pub use directory::{HierarchyError, UnitDirectory, UnitGraph};
pub use unit::{District, OrgUnit, Province, UnitKind};
