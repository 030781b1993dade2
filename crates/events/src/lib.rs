//! Domain events and the envelope they are recorded in.
//!
//! Member aggregates emit events; the persistence collaborator wraps them in an
//! [`EventEnvelope`] before journaling. All envelopes produced while applying a
//! single deletion plan share one correlation id.

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
