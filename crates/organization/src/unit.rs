use serde::{Deserialize, Serialize};

use memberhub_core::{DistrictId, DomainError, Entity, ProvinceId, UnitId};

/// Kind of organizational unit a member can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Branch,
    Institution,
    Dealer,
    Workplace,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Branch => "branch",
            UnitKind::Institution => "institution",
            UnitKind::Dealer => "dealer",
            UnitKind::Workplace => "workplace",
        }
    }
}

impl core::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for UnitKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "branch" => Ok(UnitKind::Branch),
            "institution" => Ok(UnitKind::Institution),
            "dealer" => Ok(UnitKind::Dealer),
            "workplace" => Ok(UnitKind::Workplace),
            other => Err(DomainError::validation(format!("unknown unit kind '{other}'"))),
        }
    }
}

/// A province: the top of the geographic hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Province {
    pub id: ProvinceId,
    pub name: String,
}

/// A district, always inside exactly one province.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    pub id: DistrictId,
    pub province_id: ProvinceId,
    pub name: String,
}

/// An organizational unit (branch, institution, dealer or workplace).
///
/// The unit holds no reference to its members; members point at units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    pub id: UnitId,
    pub kind: UnitKind,
    pub name: String,
    pub province_id: Option<ProvinceId>,
    pub district_id: Option<DistrictId>,
}

impl OrgUnit {
    pub fn new(id: UnitId, kind: UnitKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            province_id: None,
            district_id: None,
        }
    }

    pub fn in_province(mut self, province_id: ProvinceId) -> Self {
        self.province_id = Some(province_id);
        self
    }

    pub fn in_district(mut self, district_id: DistrictId) -> Self {
        self.district_id = Some(district_id);
        self
    }

    pub fn is_kind(&self, kind: UnitKind) -> bool {
        self.kind == kind
    }
}

impl Entity for OrgUnit {
    type Id = UnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_links_province_and_district() {
        let province = ProvinceId::new();
        let district = DistrictId::new();
        let unit = OrgUnit::new(UnitId::new(), UnitKind::Branch, "Central")
            .in_province(province)
            .in_district(district);

        assert_eq!(unit.province_id, Some(province));
        assert_eq!(unit.district_id, Some(district));
        assert!(unit.is_kind(UnitKind::Branch));
    }

    #[test]
    fn kind_parses_its_own_tag() {
        for kind in [UnitKind::Branch, UnitKind::Institution, UnitKind::Dealer, UnitKind::Workplace] {
            assert_eq!(kind.as_str().parse::<UnitKind>(), Ok(kind));
        }
        assert!("office".parse::<UnitKind>().is_err());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&UnitKind::Institution).unwrap();
        assert_eq!(json, "\"institution\"");
    }

    #[test]
    fn identity_ignores_attributes() {
        let id = UnitId::new();
        let a = OrgUnit::new(id, UnitKind::Dealer, "A");
        let b = OrgUnit::new(id, UnitKind::Dealer, "B");
        assert!(a.same_identity_as(&b));
        assert_ne!(a, b);
    }
}
