//! Scope resolution: which units may a principal act upon?

use std::collections::BTreeSet;

use serde::Serialize;

use memberhub_core::UnitId;
use memberhub_organization::UnitDirectory;

use crate::{AuthzError, Principal, Scope};

/// Concrete set of units a principal may act upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "units", rename_all = "snake_case")]
pub enum ResolvedScope {
    /// Every unit, present and future.
    All,
    Units(BTreeSet<UnitId>),
}

impl ResolvedScope {
    pub fn contains(&self, unit_id: UnitId) -> bool {
        match self {
            ResolvedScope::All => true,
            ResolvedScope::Units(units) => units.contains(&unit_id),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ResolvedScope::All)
    }

    /// Number of units in a bounded scope; `None` for [`ResolvedScope::All`].
    pub fn len(&self) -> Option<usize> {
        match self {
            ResolvedScope::All => None,
            ResolvedScope::Units(units) => Some(units.len()),
        }
    }

    /// Keep only the items whose owning unit is visible in this scope.
    ///
    /// Items without an owning unit are only visible to an unbounded scope.
    pub fn retain_visible<T>(&self, items: &mut Vec<T>, unit_of: impl Fn(&T) -> Option<UnitId>) {
        if self.is_all() {
            return;
        }
        items.retain(|item| unit_of(item).is_some_and(|u| self.contains(u)));
    }
}

/// Resolve the units a principal may act upon against one hierarchy snapshot.
///
/// Pure: reads the directory, mutates nothing. A role/assignment mismatch fails
/// with [`AuthzError::ScopeConfiguration`] instead of widening or narrowing the
/// result.
pub fn resolve_scope<D>(principal: &Principal, directory: &D) -> Result<ResolvedScope, AuthzError>
where
    D: UnitDirectory + ?Sized,
{
    principal.check_consistency()?;

    let resolved = match *principal.scope() {
        Scope::Global => ResolvedScope::All,
        Scope::Province(province_id) => ResolvedScope::Units(directory.units_in_province(province_id)),
        Scope::District(district_id) => ResolvedScope::Units(directory.units_in_district(district_id)),
        Scope::Unit(unit_id) => ResolvedScope::Units(BTreeSet::from([unit_id])),
    };

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memberhub_core::{DistrictId, ProvinceId, UserId};
    use memberhub_organization::{District, OrgUnit, Province, UnitGraph, UnitKind};

    use crate::{Role, ScopeKind};

    struct World {
        graph: UnitGraph,
        p1: ProvinceId,
        d1: DistrictId,
        b1: UnitId,
        b2: UnitId,
        i1: UnitId,
    }

    fn world() -> World {
        let mut graph = UnitGraph::new();
        let p1 = ProvinceId::new();
        let p2 = ProvinceId::new();
        graph.insert_province(Province { id: p1, name: "P1".into() });
        graph.insert_province(Province { id: p2, name: "P2".into() });
        let d1 = DistrictId::new();
        graph
            .insert_district(District { id: d1, province_id: p1, name: "D1".into() })
            .unwrap();

        let b1 = UnitId::new();
        let b2 = UnitId::new();
        let i1 = UnitId::new();
        graph.insert_unit(OrgUnit::new(b1, UnitKind::Branch, "B1").in_province(p1)).unwrap();
        graph.insert_unit(OrgUnit::new(b2, UnitKind::Branch, "B2").in_province(p2)).unwrap();
        graph.insert_unit(OrgUnit::new(i1, UnitKind::Institution, "I1").in_district(d1)).unwrap();

        World { graph, p1, d1, b1, b2, i1 }
    }

    fn principal(kind: ScopeKind, scope: Scope) -> Principal {
        Principal::new(UserId::new(), Role::new("r", kind), scope).unwrap()
    }

    #[test]
    fn global_resolves_to_all() {
        let w = world();
        let scope = resolve_scope(&principal(ScopeKind::Global, Scope::Global), &w.graph).unwrap();
        assert_eq!(scope, ResolvedScope::All);
        assert!(scope.contains(UnitId::new()));
    }

    #[test]
    fn province_is_transitive_through_districts() {
        let w = world();
        let scope =
            resolve_scope(&principal(ScopeKind::Province, Scope::Province(w.p1)), &w.graph).unwrap();
        assert_eq!(scope, ResolvedScope::Units(BTreeSet::from([w.b1, w.i1])));
        assert!(!scope.contains(w.b2));
    }

    #[test]
    fn district_resolves_to_its_units() {
        let w = world();
        let scope =
            resolve_scope(&principal(ScopeKind::District, Scope::District(w.d1)), &w.graph).unwrap();
        assert_eq!(scope, ResolvedScope::Units(BTreeSet::from([w.i1])));
    }

    #[test]
    fn unit_resolves_to_singleton() {
        let w = world();
        let scope = resolve_scope(&principal(ScopeKind::Unit, Scope::Unit(w.b2)), &w.graph).unwrap();
        assert_eq!(scope.len(), Some(1));
        assert!(scope.contains(w.b2));
    }

    #[test]
    fn inconsistent_principal_fails_closed() {
        let w = world();
        let json = serde_json::json!({
            "user_id": UserId::new(),
            "role": { "name": "x", "scope_kind": "GLOBAL", "permissions": [] },
            "scope": { "kind": "unit", "id": w.b1 }
        });
        let p: Principal = serde_json::from_value(json).unwrap();
        assert!(matches!(
            resolve_scope(&p, &w.graph),
            Err(AuthzError::ScopeConfiguration { .. })
        ));
    }

    #[test]
    fn retain_visible_filters_by_owning_unit() {
        let w = world();
        let scope = ResolvedScope::Units(BTreeSet::from([w.b1]));
        let mut rows = vec![(1, Some(w.b1)), (2, Some(w.b2)), (3, None)];
        scope.retain_visible(&mut rows, |r| r.1);
        assert_eq!(rows, vec![(1, Some(w.b1))]);

        let mut all_rows = vec![(1, Some(w.b2)), (2, None)];
        ResolvedScope::All.retain_visible(&mut all_rows, |r| r.1);
        assert_eq!(all_rows.len(), 2);
    }
}
