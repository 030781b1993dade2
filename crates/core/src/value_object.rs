//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. In this
/// workspace they carry guard inputs such as a registration number or the board
/// decision that approved a membership application.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct RegistrationNumber(String);
///
/// impl ValueObject for RegistrationNumber {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
