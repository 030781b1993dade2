use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AuthzError;

/// Capability tag checked by the authorization evaluator.
///
/// The set is closed: adding a permission is a code change, never a runtime
/// operation. The derived ordering is the declaration order and is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    MemberRead,
    MemberCreate,
    MemberUpdate,
    MemberApprove,
    MemberReject,
    MemberActivate,
    MemberDeactivate,
    MemberCancel,
    MemberTransfer,
    BranchManage,
    BranchDelete,
    InstitutionManage,
    InstitutionDelete,
    DealerManage,
    DealerApproveApplication,
    WorkplaceManage,
    DistrictManage,
    ProvinceManage,
    UserManage,
    RoleManage,
    ReportView,
    SystemSettingsManage,
}

impl Permission {
    /// Stable storage/transport tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemberRead => "MEMBER_READ",
            Self::MemberCreate => "MEMBER_CREATE",
            Self::MemberUpdate => "MEMBER_UPDATE",
            Self::MemberApprove => "MEMBER_APPROVE",
            Self::MemberReject => "MEMBER_REJECT",
            Self::MemberActivate => "MEMBER_ACTIVATE",
            Self::MemberDeactivate => "MEMBER_DEACTIVATE",
            Self::MemberCancel => "MEMBER_CANCEL",
            Self::MemberTransfer => "MEMBER_TRANSFER",
            Self::BranchManage => "BRANCH_MANAGE",
            Self::BranchDelete => "BRANCH_DELETE",
            Self::InstitutionManage => "INSTITUTION_MANAGE",
            Self::InstitutionDelete => "INSTITUTION_DELETE",
            Self::DealerManage => "DEALER_MANAGE",
            Self::DealerApproveApplication => "DEALER_APPROVE_APPLICATION",
            Self::WorkplaceManage => "WORKPLACE_MANAGE",
            Self::DistrictManage => "DISTRICT_MANAGE",
            Self::ProvinceManage => "PROVINCE_MANAGE",
            Self::UserManage => "USER_MANAGE",
            Self::RoleManage => "ROLE_MANAGE",
            Self::ReportView => "REPORT_VIEW",
            Self::SystemSettingsManage => "SYSTEM_SETTINGS_MANAGE",
        }
    }

    /// Every permission, in order.
    pub fn all() -> &'static [Self] {
        const ALL: &[Permission] = &[
            Permission::MemberRead,
            Permission::MemberCreate,
            Permission::MemberUpdate,
            Permission::MemberApprove,
            Permission::MemberReject,
            Permission::MemberActivate,
            Permission::MemberDeactivate,
            Permission::MemberCancel,
            Permission::MemberTransfer,
            Permission::BranchManage,
            Permission::BranchDelete,
            Permission::InstitutionManage,
            Permission::InstitutionDelete,
            Permission::DealerManage,
            Permission::DealerApproveApplication,
            Permission::WorkplaceManage,
            Permission::DistrictManage,
            Permission::ProvinceManage,
            Permission::UserManage,
            Permission::RoleManage,
            Permission::ReportView,
            Permission::SystemSettingsManage,
        ];

        ALL
    }

    /// Membership test for a transport tag.
    pub fn is_valid(tag: &str) -> bool {
        Self::from_str(tag).is_ok()
    }

    /// Whether a grant of this permission is limited by the principal's scope.
    ///
    /// Organization-global permissions act on configuration rather than on a
    /// unit, so there is no unit to scope them to.
    pub fn is_scope_sensitive(&self) -> bool {
        !matches!(self, Self::SystemSettingsManage | Self::RoleManage)
    }
}

impl FromStr for Permission {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == value)
            .ok_or_else(|| AuthzError::UnknownPermission(value.to_string()))
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
