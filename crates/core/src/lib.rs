//! `memberhub-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers for the organizational hierarchy and members,
//! the shared domain error, and the aggregate/entity/value-object traits.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DistrictId, MemberId, ProvinceId, UnitId, UserId};
pub use value_object::ValueObject;
