use serde::Serialize;
use thiserror::Error;

use memberhub_core::{UnitId, UserId};
use memberhub_organization::UnitDirectory;

use crate::{Permission, Principal, RoleCatalog, Scope, ScopeKind, resolve_scope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unknown permission '{0}'")]
    UnknownPermission(String),

    #[error("forbidden: role '{role}' does not grant '{permission}'")]
    PermissionNotGranted { role: String, permission: Permission },

    #[error("forbidden: unit {unit} is outside the principal's scope for '{permission}'")]
    OutOfScope { permission: Permission, unit: UnitId },

    #[error("forbidden: resource has no owning unit; '{permission}' requires organization-wide scope")]
    UnownedResource { permission: Permission },

    #[error("scope configuration error: role '{role}' is {expected}-scoped but assignment is {actual}")]
    ScopeConfiguration {
        role: String,
        expected: ScopeKind,
        actual: ScopeKind,
    },
}

impl AuthzError {
    /// Configuration errors indicate bad role/assignment data rather than a
    /// denied request; the boundary layer should raise them as alerts.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, AuthzError::ScopeConfiguration { .. })
    }

    pub fn denial_kind(&self) -> DenialKind {
        match self {
            AuthzError::UnknownPermission(_) => DenialKind::UnknownPermission,
            AuthzError::PermissionNotGranted { .. } => DenialKind::PermissionNotGranted,
            AuthzError::OutOfScope { .. } | AuthzError::UnownedResource { .. } => DenialKind::OutOfScope,
            AuthzError::ScopeConfiguration { .. } => DenialKind::ScopeConfiguration,
        }
    }
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Implement this on commands that require permissions. The boundary layer
/// enforces these requirements before dispatching.
pub trait CommandAuthorization {
    fn required_permission(&self) -> Permission;

    /// Unit that owns the resource the command touches, when there is one.
    fn target_unit(&self) -> Option<UnitId>;

    /// The command acts on an existing resource that normally belongs to a
    /// unit. When such a resource has lost its unit, only an unbounded scope
    /// may act on it.
    fn requires_owning_unit(&self) -> bool {
        false
    }
}

/// Authorize a principal to use `permission`, optionally on a resource owned by
/// `target_unit`.
///
/// - No IO beyond reading the directory
/// - No panics
/// - Deterministic for one directory snapshot
pub fn authorize<D>(
    principal: &Principal,
    permission: Permission,
    target_unit: Option<UnitId>,
    directory: &D,
) -> Result<(), AuthzError>
where
    D: UnitDirectory + ?Sized,
{
    if !principal.role().grants(permission) {
        return Err(AuthzError::PermissionNotGranted {
            role: principal.role().name().to_string(),
            permission,
        });
    }

    principal.check_consistency()?;

    if !permission.is_scope_sensitive() {
        return Ok(());
    }

    let Some(unit) = target_unit else {
        return Ok(());
    };

    let scope = resolve_scope(principal, directory)?;
    if scope.contains(unit) {
        Ok(())
    } else {
        Err(AuthzError::OutOfScope { permission, unit })
    }
}

/// [`authorize`] for a transport tag; unknown tags are denied before anything
/// else is looked at.
pub fn authorize_tag<D>(
    principal: &Principal,
    tag: &str,
    target_unit: Option<UnitId>,
    directory: &D,
) -> Result<(), AuthzError>
where
    D: UnitDirectory + ?Sized,
{
    let permission: Permission = tag.parse()?;
    authorize(principal, permission, target_unit, directory)
}

/// Authorize a command through its declared requirements.
pub fn authorize_command<C, D>(principal: &Principal, command: &C, directory: &D) -> Result<(), AuthzError>
where
    C: CommandAuthorization + ?Sized,
    D: UnitDirectory + ?Sized,
{
    let permission = command.required_permission();
    let target_unit = command.target_unit();
    authorize(principal, permission, target_unit, directory)?;

    if target_unit.is_none() && command.requires_owning_unit() && permission.is_scope_sensitive() {
        let scope = resolve_scope(principal, directory)?;
        if !scope.is_all() {
            return Err(AuthzError::UnownedResource { permission });
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: Permission,
    pub target_unit: Option<UnitId>,
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    pub principal: PrincipalState,
    pub denial_reason: Option<DenialReason>,
}

/// Snapshot of the principal as seen by the evaluator.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub role: String,
    pub role_scope_kind: ScopeKind,
    pub scope: Scope,
    pub effective_permissions: Vec<Permission>,
    /// Units covered by the scope; `None` when unbounded or unresolvable.
    pub scope_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    UnknownPermission,
    PermissionNotGranted,
    OutOfScope,
    ScopeConfiguration,
}

/// Explain why an authorization decision was made (or would be made).
///
/// The decision itself comes from [`authorize`], so the explanation can never
/// disagree with enforcement. `catalog` is only used to suggest roles that
/// would grant a missing permission.
pub fn explain_authorization<D>(
    principal: &Principal,
    permission: Permission,
    target_unit: Option<UnitId>,
    directory: &D,
    catalog: &RoleCatalog,
) -> AuthorizationExplanation
where
    D: UnitDirectory + ?Sized,
{
    let decision = authorize(principal, permission, target_unit, directory);

    let state = PrincipalState {
        user_id: principal.user_id(),
        role: principal.role().name().to_string(),
        role_scope_kind: principal.role().scope_kind(),
        scope: *principal.scope(),
        effective_permissions: principal.role().permissions().iter().copied().collect(),
        scope_size: resolve_scope(principal, directory).ok().and_then(|s| s.len()),
    };

    let err = match decision {
        Ok(()) => {
            let reason = match (permission.is_scope_sensitive(), target_unit) {
                (false, _) => format!(
                    "Role '{}' grants organization-global permission '{permission}'",
                    principal.role()
                ),
                (true, Some(unit)) => format!(
                    "Role '{}' grants '{permission}' and unit {unit} is within scope {}",
                    principal.role(),
                    principal.scope()
                ),
                (true, None) => format!(
                    "Role '{}' grants '{permission}' (no target unit to scope)",
                    principal.role()
                ),
            };
            return AuthorizationExplanation {
                required_permission: permission,
                target_unit,
                granted: true,
                reason,
                principal: state,
                denial_reason: None,
            };
        }
        Err(err) => err,
    };

    let suggestions = match &err {
        AuthzError::PermissionNotGranted { .. } => {
            let granting = catalog.roles_granting(permission);
            let mut s = vec![format!("Assign a role that grants '{permission}'")];
            if !granting.is_empty() {
                s.push(format!("Roles granting it: {granting:?}"));
            }
            s
        }
        AuthzError::UnownedResource { .. } => vec![
            "Link the resource to a unit before acting on it".to_string(),
            "Ask an administrator with organization-wide scope to perform the operation".to_string(),
        ],
        AuthzError::OutOfScope { .. } => vec![
            "Act on a unit inside the assigned territory".to_string(),
            "Ask an administrator with a wider scope to perform the operation".to_string(),
        ],
        AuthzError::ScopeConfiguration { .. } => vec![
            "Fix the user's territory assignment so it matches the role's scope kind".to_string(),
        ],
        AuthzError::UnknownPermission(_) => vec![],
    };

    AuthorizationExplanation {
        required_permission: permission,
        target_unit,
        granted: false,
        reason: err.to_string(),
        principal: state,
        denial_reason: Some(DenialReason {
            kind: err.denial_kind(),
            message: err.to_string(),
            suggestions,
        }),
    }
}
