use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use memberhub_core::{AggregateRoot, ExpectedVersion, MemberId, UnitId};
use memberhub_events::EventEnvelope;
use memberhub_membership::{DeletionPlan, Member, MemberEvent, MemberSnapshot};
use memberhub_organization::{District, HierarchyError, OrgUnit, Province, UnitDirectory, UnitGraph};

use super::r#trait::{MembershipStore, StoreError, reassign_members};

#[derive(Debug, Default)]
struct State {
    hierarchy: UnitGraph,
    members: BTreeMap<MemberId, Member>,
    journal: Vec<EventEnvelope<MemberEvent>>,
}

impl State {
    fn members_of_unit(&self, unit_id: UnitId) -> Vec<MemberSnapshot> {
        self.members
            .values()
            .filter(|m| m.unit_id() == Some(unit_id))
            .map(Member::snapshot)
            .collect()
    }
}

/// In-memory membership store.
///
/// Intended for tests/dev. Every write holds the single write lock for its
/// whole duration, which makes plan application serializable.
#[derive(Debug, Default)]
pub struct InMemoryMembershipStore {
    state: RwLock<State>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    pub fn insert_province(&self, province: Province) -> Result<(), StoreError> {
        self.write()?.hierarchy.insert_province(province);
        Ok(())
    }

    pub fn insert_district(&self, district: District) -> Result<(), StoreError> {
        self.write()?.hierarchy.insert_district(district)?;
        Ok(())
    }

    pub fn insert_unit(&self, unit: OrgUnit) -> Result<(), StoreError> {
        self.write()?.hierarchy.insert_unit(unit)?;
        Ok(())
    }

    /// Every journaled member event, in write order.
    pub fn journal(&self) -> Result<Vec<EventEnvelope<MemberEvent>>, StoreError> {
        Ok(self.read()?.journal.clone())
    }
}

impl MembershipStore for InMemoryMembershipStore {
    fn load_hierarchy(&self) -> Result<UnitGraph, StoreError> {
        Ok(self.read()?.hierarchy.clone())
    }

    fn members_of_unit(&self, unit_id: UnitId) -> Result<Vec<MemberSnapshot>, StoreError> {
        Ok(self.read()?.members_of_unit(unit_id))
    }

    fn load_member(&self, member_id: MemberId) -> Result<Option<Member>, StoreError> {
        Ok(self.read()?.members.get(&member_id).cloned())
    }

    fn save_member(
        &self,
        member: &Member,
        expected_version: ExpectedVersion,
        events: Vec<EventEnvelope<MemberEvent>>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let member_id = member.id_typed();
        let current = state.members.get(&member_id).map(|m| m.version()).unwrap_or(0);

        if !expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "member {member_id}: expected {expected_version:?}, found {current}"
            )));
        }

        state.members.insert(member_id, member.clone());
        state.journal.extend(events);
        Ok(())
    }

    #[instrument(
        skip(self, plan),
        fields(target_unit = %plan.target_unit(), members = plan.len()),
        err
    )]
    fn apply_deletion_plan(
        &self,
        plan: &DeletionPlan,
        correlation_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<EventEnvelope<MemberEvent>>, StoreError> {
        let mut state = self.write()?;

        if state.hierarchy.unit(plan.target_unit()).is_none() {
            return Err(StoreError::Concurrency(format!(
                "unit {} was deleted concurrently",
                plan.target_unit()
            )));
        }
        if let Some(destination) = plan.destination() {
            if state.hierarchy.unit(destination).is_none() {
                return Err(StoreError::Concurrency(format!(
                    "destination unit {destination} no longer exists"
                )));
            }
        }

        plan.revalidate(&state.members_of_unit(plan.target_unit()))?;

        let updated = reassign_members(
            plan,
            |id| {
                state
                    .members
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("member {id}")))
            },
            correlation_id,
            occurred_at,
        )?;

        // Everything validated; commit.
        state
            .hierarchy
            .remove_unit(plan.target_unit())
            .map_err(|e: HierarchyError| StoreError::Concurrency(e.to_string()))?;

        let mut envelopes = Vec::with_capacity(updated.len());
        for (member, envelope) in updated {
            state.members.insert(member.id_typed(), member);
            envelopes.push(envelope);
        }
        state.journal.extend(envelopes.iter().cloned());

        debug!(%correlation_id, "deletion plan applied");
        Ok(envelopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memberhub_membership::{
        ActivateMember, ApproveMember, BoardDecision, DeletionPolicy, DeletionRequest, MemberCommand,
        MemberStatus, SubmitApplication, plan_deletion,
    };
    use memberhub_core::Aggregate;
    use memberhub_organization::UnitKind;

    fn seed_member(store: &InMemoryMembershipStore, unit: UnitId, activate: bool) -> MemberId {
        let id = MemberId::new();
        let mut m = Member::empty(id);
        let now = Utc::now();
        let mut commands = vec![MemberCommand::SubmitApplication(SubmitApplication {
            member_id: id,
            unit_id: unit,
            full_name: "Member".into(),
            occurred_at: now,
        })];
        if activate {
            commands.push(MemberCommand::ApproveMember(ApproveMember {
                member_id: id,
                registration_number: "R-1".into(),
                board_decision: Some(BoardDecision::new("B-1", now.date_naive())),
                occurred_at: now,
            }));
            commands.push(MemberCommand::ActivateMember(ActivateMember { member_id: id, occurred_at: now }));
        }
        for cmd in commands {
            for e in m.handle(&cmd).unwrap() {
                m.apply(&e);
            }
        }
        store.save_member(&m, ExpectedVersion::Exact(0), vec![]).unwrap();
        id
    }

    fn store_with_branches() -> (InMemoryMembershipStore, OrgUnit, OrgUnit) {
        let store = InMemoryMembershipStore::new();
        let a = OrgUnit::new(UnitId::new(), UnitKind::Branch, "A");
        let b = OrgUnit::new(UnitId::new(), UnitKind::Branch, "B");
        store.insert_unit(a.clone()).unwrap();
        store.insert_unit(b.clone()).unwrap();
        (store, a, b)
    }

    #[test]
    fn save_rejects_stale_version() {
        let (store, a, _) = store_with_branches();
        let id = seed_member(&store, a.id, false);
        let member = store.load_member(id).unwrap().unwrap();
        let err = store.save_member(&member, ExpectedVersion::Exact(0), vec![]).unwrap_err();
        assert!(err.is_concurrency());
    }

    #[test]
    fn applying_a_plan_moves_members_and_deletes_the_unit() {
        let (store, a, b) = store_with_branches();
        let m1 = seed_member(&store, a.id, true);
        let m2 = seed_member(&store, a.id, true);

        let request = DeletionRequest::new(a.clone(), DeletionPolicy::TransferAndDeactivate, Some(b.clone()));
        let plan = plan_deletion(&request, &store.members_of_unit(a.id).unwrap()).unwrap();
        let correlation = Uuid::now_v7();
        let envelopes = store.apply_deletion_plan(&plan, correlation, Utc::now()).unwrap();

        assert_eq!(envelopes.len(), 2);
        assert!(envelopes.iter().all(|e| e.correlation_id() == correlation));
        assert!(store.load_hierarchy().unwrap().unit(a.id).is_none());
        for id in [m1, m2] {
            let m = store.load_member(id).unwrap().unwrap();
            assert_eq!(m.unit_id(), Some(b.id));
            assert_eq!(m.status(), MemberStatus::Inactive);
            assert!(!m.is_active());
        }
        assert_eq!(store.journal().unwrap().len(), 2);
    }

    #[test]
    fn member_joining_after_planning_makes_the_plan_stale() {
        let (store, a, b) = store_with_branches();
        seed_member(&store, a.id, true);

        let request = DeletionRequest::new(a.clone(), DeletionPolicy::Transfer, Some(b));
        let plan = plan_deletion(&request, &store.members_of_unit(a.id).unwrap()).unwrap();
        let late = seed_member(&store, a.id, true);

        let err = store.apply_deletion_plan(&plan, Uuid::now_v7(), Utc::now()).unwrap_err();
        assert!(err.is_concurrency());
        // Nothing was written.
        assert!(store.load_hierarchy().unwrap().unit(a.id).is_some());
        assert_eq!(store.load_member(late).unwrap().unwrap().unit_id(), Some(a.id));
        assert!(store.journal().unwrap().is_empty());
    }

    #[test]
    fn second_application_of_same_plan_fails() {
        let (store, a, b) = store_with_branches();
        seed_member(&store, a.id, true);
        let request = DeletionRequest::new(a.clone(), DeletionPolicy::Transfer, Some(b));
        let plan = plan_deletion(&request, &store.members_of_unit(a.id).unwrap()).unwrap();

        store.apply_deletion_plan(&plan, Uuid::now_v7(), Utc::now()).unwrap();
        let err = store.apply_deletion_plan(&plan, Uuid::now_v7(), Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }
}
