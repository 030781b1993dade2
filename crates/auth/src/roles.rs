use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::Permission;

/// How far a role's authority reaches in the organizational hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeKind {
    Global,
    Province,
    District,
    Unit,
}

impl core::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ScopeKind::Global => "GLOBAL",
            ScopeKind::Province => "PROVINCE",
            ScopeKind::District => "DISTRICT",
            ScopeKind::Unit => "UNIT",
        };
        f.write_str(s)
    }
}

/// A named bundle of permissions plus the scope kind its holders act within.
///
/// Roles are configuration data: created by administrators and read on every
/// authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    name: String,
    scope_kind: ScopeKind,
    permissions: BTreeSet<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Role {
    pub fn new(name: impl Into<String>, scope_kind: ScopeKind) -> Self {
        Self {
            name: name.into(),
            scope_kind,
            permissions: BTreeSet::new(),
            description: None,
        }
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions.extend(permissions);
        self
    }

    pub fn with_all_permissions(self) -> Self {
        self.with_permissions(Permission::all().iter().copied())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope_kind(&self) -> ScopeKind {
        self.scope_kind
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Registry of the roles an installation knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCatalog {
    roles: BTreeMap<String, Role>,
}

impl RoleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: Role) {
        self.roles.insert(role.name().to_string(), role);
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Names of roles that grant `permission`, for audit suggestions.
    pub fn roles_granting(&self, permission: Permission) -> Vec<&str> {
        self.roles
            .values()
            .filter(|r| r.grants(permission))
            .map(|r| r.name())
            .collect()
    }

    /// Parse a catalog from its JSON form (an object keyed by role name).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let parsed: BTreeMap<String, Role> = serde_json::from_str(json)?;
        // Key is informational; the role's own name wins.
        Ok(Self {
            roles: parsed
                .into_values()
                .map(|r| (r.name().to_string(), r))
                .collect(),
        })
    }

    /// Roles shipped with a fresh installation.
    pub fn standard() -> Self {
        use Permission::*;

        let member_ops = [
            MemberRead,
            MemberCreate,
            MemberUpdate,
            MemberApprove,
            MemberReject,
            MemberActivate,
            MemberDeactivate,
            MemberCancel,
            MemberTransfer,
        ];

        let mut catalog = Self::new();
        catalog.insert(
            Role::new("super_admin", ScopeKind::Global)
                .with_all_permissions()
                .with_description("Organization-wide administrator"),
        );
        catalog.insert(
            Role::new("auditor", ScopeKind::Global)
                .with_permissions([MemberRead, ReportView])
                .with_description("Read-only access across the organization"),
        );
        catalog.insert(
            Role::new("province_admin", ScopeKind::Province)
                .with_permissions(member_ops)
                .with_permissions([
                    BranchManage,
                    BranchDelete,
                    InstitutionManage,
                    InstitutionDelete,
                    DealerManage,
                    DealerApproveApplication,
                    WorkplaceManage,
                    DistrictManage,
                    ReportView,
                ])
                .with_description("Administers one province and everything inside it"),
        );
        catalog.insert(
            Role::new("district_admin", ScopeKind::District)
                .with_permissions(member_ops)
                .with_permissions([BranchManage, InstitutionManage, WorkplaceManage, ReportView])
                .with_description("Administers the units of one district"),
        );
        catalog.insert(
            Role::new("unit_officer", ScopeKind::Unit)
                .with_permissions([
                    MemberRead,
                    MemberCreate,
                    MemberUpdate,
                    MemberActivate,
                    MemberDeactivate,
                    ReportView,
                ])
                .with_description("Day-to-day membership work in one unit"),
        );
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_has_one_role_per_scope_kind_at_least() {
        let catalog = RoleCatalog::standard();
        for kind in [ScopeKind::Global, ScopeKind::Province, ScopeKind::District, ScopeKind::Unit] {
            assert!(catalog.roles().any(|r| r.scope_kind() == kind), "missing {kind}");
        }
    }

    #[test]
    fn super_admin_grants_everything() {
        let catalog = RoleCatalog::standard();
        let admin = catalog.get("super_admin").unwrap();
        assert!(Permission::all().iter().all(|p| admin.grants(*p)));
    }

    #[test]
    fn deletion_is_reserved_to_province_and_above() {
        let catalog = RoleCatalog::standard();
        let mut holders = catalog.roles_granting(Permission::BranchDelete);
        holders.sort();
        assert_eq!(holders, vec!["province_admin", "super_admin"]);
    }

    #[test]
    fn catalog_parses_from_json() {
        let json = r#"{
            "clerk": {
                "name": "clerk",
                "scope_kind": "UNIT",
                "permissions": ["MEMBER_READ", "MEMBER_CREATE"]
            }
        }"#;

        let catalog = RoleCatalog::from_json(json).unwrap();
        let clerk = catalog.get("clerk").unwrap();
        assert_eq!(clerk.scope_kind(), ScopeKind::Unit);
        assert!(clerk.grants(Permission::MemberCreate));
        assert!(!clerk.grants(Permission::MemberApprove));
    }

    #[test]
    fn catalog_rejects_unknown_permission_tags() {
        let json = r#"{"x": {"name": "x", "scope_kind": "GLOBAL", "permissions": ["FLY"]}}"#;
        assert!(RoleCatalog::from_json(json).is_err());
    }
}
