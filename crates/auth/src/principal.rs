use serde::{Deserialize, Serialize};

use memberhub_core::{DistrictId, ProvinceId, UnitId, UserId};

use crate::{AuthzError, Role, ScopeKind};

/// Territory a principal is assigned to.
///
/// One tagged value instead of three nullable ids: a principal cannot hold a
/// province id and a unit id at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Global,
    Province(ProvinceId),
    District(DistrictId),
    Unit(UnitId),
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Global => ScopeKind::Global,
            Scope::Province(_) => ScopeKind::Province,
            Scope::District(_) => ScopeKind::District,
            Scope::Unit(_) => ScopeKind::Unit,
        }
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Province(id) => write!(f, "province:{id}"),
            Scope::District(id) => write!(f, "district:{id}"),
            Scope::Unit(id) => write!(f, "unit:{id}"),
        }
    }
}

/// Check that an assignment matches the scope kind its role declares.
pub fn ensure_scope_matches(role: &Role, scope: &Scope) -> Result<(), AuthzError> {
    if role.scope_kind() != scope.kind() {
        return Err(AuthzError::ScopeConfiguration {
            role: role.name().to_string(),
            expected: role.scope_kind(),
            actual: scope.kind(),
        });
    }
    Ok(())
}

/// A fully resolved principal for authorization decisions: one user, one role,
/// one territory.
///
/// Construction is decoupled from storage and transport; the boundary layer
/// builds it from the user's role/assignment record for each request.
/// Deserialized values skip [`Principal::new`]'s check, so scope resolution
/// re-validates before trusting the assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    user_id: UserId,
    role: Role,
    scope: Scope,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role, scope: Scope) -> Result<Self, AuthzError> {
        ensure_scope_matches(&role, &scope)?;
        Ok(Self { user_id, role, scope })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Move the principal to another territory of the same kind.
    pub fn reassign_scope(&mut self, scope: Scope) -> Result<(), AuthzError> {
        ensure_scope_matches(&self.role, &scope)?;
        self.scope = scope;
        Ok(())
    }

    /// Re-check the role/assignment invariant.
    pub fn check_consistency(&self) -> Result<(), AuthzError> {
        ensure_scope_matches(&self.role, &self.scope)
    }
}
