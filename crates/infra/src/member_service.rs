//! Member command execution pipeline.
//!
//! ```text
//! MemberCommand
//!   ↓
//! 1. Load hierarchy snapshot + current member state
//!   ↓
//! 2. Authorize against the member's owning unit (and the destination, for transfers)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Apply events, persist with an optimistic version check
//! ```

use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use memberhub_auth::{AuthzError, Permission, Principal, authorize, authorize_command};
use memberhub_core::{Aggregate, AggregateRoot, ExpectedVersion, MemberId, UnitId};
use memberhub_events::EventEnvelope;
use memberhub_membership::{Member, MemberCommand, MemberError, MemberEvent};
use memberhub_organization::{UnitDirectory, UnitGraph};

use crate::store::{MEMBER_AGGREGATE_TYPE, MembershipStore, StoreError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("member {0} not found")]
    MemberNotFound(MemberId),

    #[error("unit {0} does not exist")]
    UnknownUnit(UnitId),

    #[error(transparent)]
    Authorization(#[from] AuthzError),

    #[error(transparent)]
    Member(#[from] MemberError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    /// Optimistic concurrency failure; reload and retry.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, CommandError::Store(e) if e.is_concurrency())
    }
}

/// Result of a successfully executed member command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub member: Member,
    pub events: Vec<EventEnvelope<MemberEvent>>,
}

#[derive(Debug)]
pub struct MemberCommandService<S> {
    store: S,
}

impl<S> MemberCommandService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S> MemberCommandService<S>
where
    S: MembershipStore,
{
    /// Authorize and execute one member command.
    #[instrument(
        skip(self, principal, command),
        fields(user_id = %principal.user_id(), member_id = %command.member_id(), permission = %command.required_permission()),
        err
    )]
    pub fn execute(&self, principal: &Principal, command: MemberCommand) -> Result<CommandOutcome, CommandError> {
        let hierarchy = self.store.load_hierarchy()?;
        let member_id = command.member_id();

        let mut member = match (&command, self.store.load_member(member_id)?) {
            (_, Some(existing)) => existing,
            (MemberCommand::SubmitApplication(_), None) => Member::empty(member_id),
            (_, None) => return Err(CommandError::MemberNotFound(member_id)),
        };

        self.authorize(principal, &command, &member, &hierarchy)
            .inspect_err(|e| {
                if let CommandError::Authorization(authz) = e {
                    if authz.is_configuration_error() {
                        error!(error = %authz, "role/scope configuration error");
                    }
                }
            })?;

        let expected = ExpectedVersion::Exact(member.version());
        let decided = member.handle(&command)?;
        if decided.is_empty() {
            return Ok(CommandOutcome { member, events: vec![] });
        }

        let correlation_id = Uuid::now_v7();
        let mut envelopes = Vec::with_capacity(decided.len());
        for event in decided {
            member.apply(&event);
            envelopes.push(EventEnvelope::wrap(
                correlation_id,
                *member_id.as_uuid(),
                MEMBER_AGGREGATE_TYPE,
                member.version(),
                event,
            ));
        }

        self.store.save_member(&member, expected, envelopes.clone())?;

        info!(
            status = %member.status(),
            version = member.version(),
            "member command applied"
        );
        Ok(CommandOutcome {
            member,
            events: envelopes,
        })
    }

    fn authorize(
        &self,
        principal: &Principal,
        command: &MemberCommand,
        member: &Member,
        hierarchy: &UnitGraph,
    ) -> Result<(), CommandError> {
        authorize_command(principal, &command.scoped(member.unit_id()), hierarchy)?;

        match command {
            MemberCommand::SubmitApplication(cmd) => {
                if hierarchy.unit(cmd.unit_id).is_none() {
                    return Err(CommandError::UnknownUnit(cmd.unit_id));
                }
            }
            MemberCommand::TransferMember(cmd) => {
                // Moving a member needs authority over both ends.
                authorize(principal, Permission::MemberTransfer, Some(cmd.to_unit), hierarchy)?;
                if hierarchy.unit(cmd.to_unit).is_none() {
                    return Err(CommandError::UnknownUnit(cmd.to_unit));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use memberhub_auth::{RoleCatalog, Scope};
    use memberhub_core::{ProvinceId, UserId};
    use memberhub_membership::{
        ActivateMember, ApproveMember, BoardDecision, CancelMembership, LifecycleError, MemberRecord,
        MemberStatus, RegistrationNumber, RejectMember, SubmitApplication, TransferMember,
    };
    use memberhub_organization::{OrgUnit, Province, UnitKind};

    use crate::store::InMemoryMembershipStore;

    struct Fixture {
        service: MemberCommandService<Arc<InMemoryMembershipStore>>,
        store: Arc<InMemoryMembershipStore>,
        p1: ProvinceId,
        a: UnitId,
        b: UnitId,
        foreign: UnitId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryMembershipStore::new());
        let p1 = ProvinceId::new();
        let p2 = ProvinceId::new();
        store.insert_province(Province { id: p1, name: "P1".into() }).unwrap();
        store.insert_province(Province { id: p2, name: "P2".into() }).unwrap();
        let a = OrgUnit::new(UnitId::new(), UnitKind::Branch, "A").in_province(p1);
        let b = OrgUnit::new(UnitId::new(), UnitKind::Branch, "B").in_province(p1);
        let foreign = OrgUnit::new(UnitId::new(), UnitKind::Branch, "F").in_province(p2);
        let (a_id, b_id, foreign_id) = (a.id, b.id, foreign.id);
        for u in [a, b, foreign] {
            store.insert_unit(u).unwrap();
        }
        Fixture {
            service: MemberCommandService::new(store.clone()),
            store,
            p1,
            a: a_id,
            b: b_id,
            foreign: foreign_id,
        }
    }

    fn principal(role: &str, scope: Scope) -> Principal {
        let role = RoleCatalog::standard().get(role).unwrap().clone();
        Principal::new(UserId::new(), role, scope).unwrap()
    }

    fn submit(member_id: MemberId, unit_id: UnitId) -> MemberCommand {
        MemberCommand::SubmitApplication(SubmitApplication {
            member_id,
            unit_id,
            full_name: "Ayşe Yılmaz".into(),
            occurred_at: Utc::now(),
        })
    }

    fn approve(member_id: MemberId) -> MemberCommand {
        MemberCommand::ApproveMember(ApproveMember {
            member_id,
            registration_number: "2024-001".into(),
            board_decision: Some(BoardDecision::new("KK-12", Utc::now().date_naive())),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn full_onboarding_persists_each_step() {
        let f = fixture();
        let admin = principal("province_admin", Scope::Province(f.p1));
        let id = MemberId::new();

        f.service.execute(&admin, submit(id, f.a)).unwrap();
        f.service.execute(&admin, approve(id)).unwrap();
        let outcome = f
            .service
            .execute(&admin, MemberCommand::ActivateMember(ActivateMember { member_id: id, occurred_at: Utc::now() }))
            .unwrap();

        assert_eq!(outcome.member.status(), MemberStatus::Active);
        assert!(outcome.member.is_active());
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].sequence_number(), 3);

        let stored = f.store.load_member(id).unwrap().unwrap();
        assert_eq!(stored.version(), 3);
        assert_eq!(f.store.journal().unwrap().len(), 3);
    }

    #[test]
    fn submission_outside_scope_is_denied_and_nothing_is_saved() {
        let f = fixture();
        let admin = principal("province_admin", Scope::Province(f.p1));
        let id = MemberId::new();

        let err = f.service.execute(&admin, submit(id, f.foreign)).unwrap_err();
        assert!(matches!(err, CommandError::Authorization(AuthzError::OutOfScope { .. })));
        assert!(f.store.load_member(id).unwrap().is_none());
    }

    #[test]
    fn unit_officer_cannot_approve() {
        let f = fixture();
        let admin = principal("province_admin", Scope::Province(f.p1));
        let officer = principal("unit_officer", Scope::Unit(f.a));
        let id = MemberId::new();

        f.service.execute(&officer, submit(id, f.a)).unwrap();
        let err = f.service.execute(&officer, approve(id)).unwrap_err();
        assert!(matches!(
            err,
            CommandError::Authorization(AuthzError::PermissionNotGranted { .. })
        ));
        f.service.execute(&admin, approve(id)).unwrap();
    }

    #[test]
    fn unknown_member_is_not_found() {
        let f = fixture();
        let admin = principal("super_admin", Scope::Global);
        let err = f.service.execute(&admin, approve(MemberId::new())).unwrap_err();
        assert!(matches!(err, CommandError::MemberNotFound(_)));
    }

    #[test]
    fn submission_to_missing_unit_is_rejected() {
        let f = fixture();
        let admin = principal("super_admin", Scope::Global);
        let err = f.service.execute(&admin, submit(MemberId::new(), UnitId::new())).unwrap_err();
        assert!(matches!(err, CommandError::UnknownUnit(_)));
    }

    #[test]
    fn approval_without_board_decision_fails_the_guard() {
        let f = fixture();
        let admin = principal("super_admin", Scope::Global);
        let id = MemberId::new();
        f.service.execute(&admin, submit(id, f.a)).unwrap();

        let err = f
            .service
            .execute(
                &admin,
                MemberCommand::ApproveMember(ApproveMember {
                    member_id: id,
                    registration_number: "2024-002".into(),
                    board_decision: None,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Member(MemberError::Lifecycle(LifecycleError::GuardNotSatisfied { .. }))
        ));
        assert_eq!(f.store.load_member(id).unwrap().unwrap().status(), MemberStatus::Pending);
    }

    #[test]
    fn rejected_member_cannot_be_activated() {
        let f = fixture();
        let admin = principal("super_admin", Scope::Global);
        let id = MemberId::new();
        f.service.execute(&admin, submit(id, f.a)).unwrap();
        f.service
            .execute(
                &admin,
                MemberCommand::RejectMember(RejectMember {
                    member_id: id,
                    reason: "incomplete documents".into(),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();

        let err = f
            .service
            .execute(&admin, MemberCommand::ActivateMember(ActivateMember { member_id: id, occurred_at: Utc::now() }))
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Member(MemberError::Lifecycle(LifecycleError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn transfer_requires_scope_over_destination() {
        let f = fixture();
        let officer = principal("province_admin", Scope::Province(f.p1));
        let id = MemberId::new();
        f.service.execute(&officer, submit(id, f.a)).unwrap();

        let err = f
            .service
            .execute(
                &officer,
                MemberCommand::TransferMember(TransferMember { member_id: id, to_unit: f.foreign, occurred_at: Utc::now() }),
            )
            .unwrap_err();
        assert!(matches!(err, CommandError::Authorization(AuthzError::OutOfScope { .. })));

        let moved = f
            .service
            .execute(
                &officer,
                MemberCommand::TransferMember(TransferMember { member_id: id, to_unit: f.b, occurred_at: Utc::now() }),
            )
            .unwrap();
        assert_eq!(moved.member.unit_id(), Some(f.b));
        assert_eq!(moved.member.status(), MemberStatus::Pending);
    }

    #[test]
    fn member_without_unit_needs_unbounded_scope() {
        let f = fixture();
        let id = MemberId::new();
        let unlinked = Member::from_record(MemberRecord {
            member_id: id,
            unit_id: None,
            full_name: "Detached".into(),
            status: MemberStatus::Active,
            is_active: true,
            registration_number: Some(RegistrationNumber::new("2024-009").unwrap()),
            board_decision: None,
            rejection_reason: None,
            version: 3,
        });
        f.store.save_member(&unlinked, ExpectedVersion::Any, vec![]).unwrap();

        let cancel = || {
            MemberCommand::CancelMembership(CancelMembership {
                member_id: id,
                reason: None,
                occurred_at: Utc::now(),
            })
        };

        let admin = principal("province_admin", Scope::Province(f.p1));
        let err = f.service.execute(&admin, cancel()).unwrap_err();
        assert!(matches!(
            err,
            CommandError::Authorization(AuthzError::UnownedResource { permission: Permission::MemberCancel })
        ));
        assert_eq!(f.store.load_member(id).unwrap().unwrap().status(), MemberStatus::Active);

        let root = principal("super_admin", Scope::Global);
        let outcome = f.service.execute(&root, cancel()).unwrap();
        assert_eq!(outcome.member.status(), MemberStatus::Resigned);
    }
}
