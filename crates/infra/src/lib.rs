//! Infrastructure layer: configuration, persistence, application services.

pub mod config;
pub mod deletion;
pub mod member_service;
pub mod store;


pub use config::{ConfigError, MemberhubConfig};
pub use deletion::{DeleteUnit, DeletionError, DeletionOutcome, UnitDeletionService, delete_permission};
pub use member_service::{CommandError, CommandOutcome, MemberCommandService};
