//! Unit-containment lookup.
//!
//! [`UnitDirectory`] is the read-side port the scope resolver and the deletion
//! engine consume. [`UnitGraph`] is an in-memory snapshot of the hierarchy that
//! validates containment on insert.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

use memberhub_core::{DistrictId, ProvinceId, UnitId};

use crate::unit::{District, OrgUnit, Province, UnitKind};

/// Read-only view of the province/district/unit graph.
///
/// Implementations must answer from one consistent snapshot for the duration of
/// a request; scope decisions are only deterministic within a snapshot.
pub trait UnitDirectory: Send + Sync {
    fn unit(&self, id: UnitId) -> Option<OrgUnit>;

    fn district(&self, id: DistrictId) -> Option<District>;

    fn units(&self) -> Vec<OrgUnit>;

    /// Province a unit falls under, either directly or through its district.
    fn province_of(&self, unit: &OrgUnit) -> Option<ProvinceId> {
        unit.province_id.or_else(|| {
            unit.district_id
                .and_then(|d| self.district(d))
                .map(|d| d.province_id)
        })
    }

    /// Every unit inside a province, including units only linked via a district.
    fn units_in_province(&self, province_id: ProvinceId) -> BTreeSet<UnitId> {
        self.units()
            .into_iter()
            .filter(|u| self.province_of(u) == Some(province_id))
            .map(|u| u.id)
            .collect()
    }

    fn units_in_district(&self, district_id: DistrictId) -> BTreeSet<UnitId> {
        self.units()
            .into_iter()
            .filter(|u| u.district_id == Some(district_id))
            .map(|u| u.id)
            .collect()
    }

    fn units_of_kind(&self, kind: UnitKind) -> Vec<OrgUnit> {
        self.units().into_iter().filter(|u| u.kind == kind).collect()
    }
}

impl<S> UnitDirectory for Arc<S>
where
    S: UnitDirectory + ?Sized,
{
    fn unit(&self, id: UnitId) -> Option<OrgUnit> {
        (**self).unit(id)
    }

    fn district(&self, id: DistrictId) -> Option<District> {
        (**self).district(id)
    }

    fn units(&self) -> Vec<OrgUnit> {
        (**self).units()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("unknown province {0}")]
    UnknownProvince(ProvinceId),

    #[error("unknown district {0}")]
    UnknownDistrict(DistrictId),

    #[error("district {district} is not inside province {province}")]
    InconsistentContainment {
        district: DistrictId,
        province: ProvinceId,
    },

    #[error("unit {0} already exists")]
    DuplicateUnit(UnitId),

    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
}

/// In-memory hierarchy snapshot.
///
/// Ordered maps keep iteration (and therefore resolved scopes and listings)
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct UnitGraph {
    provinces: BTreeMap<ProvinceId, Province>,
    districts: BTreeMap<DistrictId, District>,
    units: BTreeMap<UnitId, OrgUnit>,
}

impl UnitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_province(&mut self, province: Province) {
        self.provinces.insert(province.id, province);
    }

    pub fn insert_district(&mut self, district: District) -> Result<(), HierarchyError> {
        if !self.provinces.contains_key(&district.province_id) {
            return Err(HierarchyError::UnknownProvince(district.province_id));
        }
        self.districts.insert(district.id, district);
        Ok(())
    }

    /// Insert a unit after checking its province/district links.
    pub fn insert_unit(&mut self, unit: OrgUnit) -> Result<(), HierarchyError> {
        if self.units.contains_key(&unit.id) {
            return Err(HierarchyError::DuplicateUnit(unit.id));
        }
        if let Some(p) = unit.province_id {
            if !self.provinces.contains_key(&p) {
                return Err(HierarchyError::UnknownProvince(p));
            }
        }
        if let Some(d) = unit.district_id {
            let district = self
                .districts
                .get(&d)
                .ok_or(HierarchyError::UnknownDistrict(d))?;
            if let Some(p) = unit.province_id {
                if district.province_id != p {
                    return Err(HierarchyError::InconsistentContainment {
                        district: d,
                        province: p,
                    });
                }
            }
        }
        self.units.insert(unit.id, unit);
        Ok(())
    }

    pub fn remove_unit(&mut self, id: UnitId) -> Result<OrgUnit, HierarchyError> {
        self.units.remove(&id).ok_or(HierarchyError::UnknownUnit(id))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl UnitDirectory for UnitGraph {
    fn unit(&self, id: UnitId) -> Option<OrgUnit> {
        self.units.get(&id).cloned()
    }

    fn district(&self, id: DistrictId) -> Option<District> {
        self.districts.get(&id).cloned()
    }

    fn units(&self) -> Vec<OrgUnit> {
        self.units.values().cloned().collect()
    }
}
