//! `memberhub-auth`: scoped role-based access control.
//!
//! A decision answers two questions: does the principal's role grant the
//! permission, and does the principal's territory contain the unit that owns
//! the resource? Everything here is pure decision logic, decoupled from HTTP,
//! storage and authentication.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod scope;

pub use authorize::{
    AuthorizationExplanation, AuthzError, CommandAuthorization, DenialKind, DenialReason,
    PrincipalState, authorize, authorize_command, authorize_tag, explain_authorization,
};
pub use permissions::Permission;
pub use principal::{Principal, Scope, ensure_scope_matches};
pub use roles::{Role, RoleCatalog, ScopeKind};
pub use scope::{ResolvedScope, resolve_scope};
