//! Unit deletion reassignment engine.
//!
//! Given a unit slated for deletion, a policy and a destination, produce a plan
//! that moves every attached member and transitions their status. Planning is
//! all-or-nothing: one member whose transition chain is invalid rejects the
//! whole plan. Applying the plan is the persistence collaborator's job.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use memberhub_auth::ResolvedScope;
use memberhub_core::{ExpectedVersion, MemberId, UnitId};
use memberhub_organization::{OrgUnit, UnitKind};

use crate::lifecycle::{GuardInputs, LifecycleError, LifecycleTrigger, MemberStatus, next_state};
use crate::member::MemberSnapshot;

/// What happens to the members of a deleted unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DeletionPolicy {
    Transfer,
    TransferAndDeactivate,
    TransferAndCancel,
    TransferDeactivateAndCancel,
    /// Institutions only: detach members, moving them to the fallback
    /// institution when one is given.
    RemoveInstitutionLink { deactivate: bool },
}

impl DeletionPolicy {
    /// Whether the policy may be used when deleting a unit of `kind`.
    pub fn supports(&self, kind: UnitKind) -> bool {
        match kind {
            UnitKind::Branch => !matches!(self, DeletionPolicy::RemoveInstitutionLink { .. }),
            UnitKind::Institution => true,
            UnitKind::Dealer | UnitKind::Workplace => false,
        }
    }

    /// Policies offered for a unit kind, in presentation order.
    pub fn available_for(kind: UnitKind) -> Vec<DeletionPolicy> {
        [
            DeletionPolicy::Transfer,
            DeletionPolicy::TransferAndDeactivate,
            DeletionPolicy::TransferAndCancel,
            DeletionPolicy::TransferDeactivateAndCancel,
            DeletionPolicy::RemoveInstitutionLink { deactivate: false },
            DeletionPolicy::RemoveInstitutionLink { deactivate: true },
        ]
        .into_iter()
        .filter(|p| p.supports(kind))
        .collect()
    }

    /// Lifecycle triggers applied to each member, in order.
    pub fn transitions(&self) -> &'static [LifecycleTrigger] {
        use LifecycleTrigger::{Cancel, Deactivate};
        match self {
            DeletionPolicy::Transfer => &[],
            DeletionPolicy::TransferAndDeactivate => &[Deactivate],
            DeletionPolicy::TransferAndCancel => &[Cancel],
            DeletionPolicy::TransferDeactivateAndCancel => &[Deactivate, Cancel],
            DeletionPolicy::RemoveInstitutionLink { deactivate: true } => &[Deactivate],
            DeletionPolicy::RemoveInstitutionLink { deactivate: false } => &[],
        }
    }

    pub fn requires_destination(&self) -> bool {
        !matches!(self, DeletionPolicy::RemoveInstitutionLink { .. })
    }
}

impl core::fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DeletionPolicy::Transfer => f.write_str("transfer"),
            DeletionPolicy::TransferAndDeactivate => f.write_str("transfer_and_deactivate"),
            DeletionPolicy::TransferAndCancel => f.write_str("transfer_and_cancel"),
            DeletionPolicy::TransferDeactivateAndCancel => f.write_str("transfer_deactivate_and_cancel"),
            DeletionPolicy::RemoveInstitutionLink { deactivate } => {
                write!(f, "remove_institution_link(deactivate={deactivate})")
            }
        }
    }
}

/// Request to delete `target`, reassigning its members per `policy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    pub target: OrgUnit,
    pub policy: DeletionPolicy,
    pub destination: Option<OrgUnit>,
}

impl DeletionRequest {
    pub fn new(target: OrgUnit, policy: DeletionPolicy, destination: Option<OrgUnit>) -> Self {
        Self {
            target,
            policy,
            destination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum DestinationProblem {
    SameAsTarget,
    KindMismatch { expected: UnitKind, actual: UnitKind },
    Required,
    Unknown { unit: UnitId },
    OutsideScope { unit: UnitId },
}

impl core::fmt::Display for DestinationProblem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DestinationProblem::SameAsTarget => f.write_str("destination is the unit being deleted"),
            DestinationProblem::KindMismatch { expected, actual } => {
                write!(f, "destination must be a {expected}, got a {actual}")
            }
            DestinationProblem::Required => f.write_str("policy requires a destination"),
            DestinationProblem::Unknown { unit } => write!(f, "destination {unit} does not exist"),
            DestinationProblem::OutsideScope { unit } => {
                write!(f, "destination {unit} is outside the actor's scope")
            }
        }
    }
}

/// Why a single member blocks a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    Lifecycle(LifecycleError),
    NotAttachedToTarget { unit: Option<UnitId> },
    DuplicateMember,
}

impl core::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RejectionReason::Lifecycle(e) => write!(f, "{e}"),
            RejectionReason::NotAttachedToTarget { unit: Some(unit) } => {
                write!(f, "member belongs to unit {unit}, not the deleted unit")
            }
            RejectionReason::NotAttachedToTarget { unit: None } => {
                f.write_str("member has no unit assignment")
            }
            RejectionReason::DuplicateMember => f.write_str("member listed twice"),
        }
    }
}

impl From<LifecycleError> for RejectionReason {
    fn from(value: LifecycleError) -> Self {
        RejectionReason::Lifecycle(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReassignmentError {
    #[error("invalid destination for deleting unit {target}: {problem}")]
    InvalidDestination {
        target: UnitId,
        problem: DestinationProblem,
    },

    #[error("policy {policy} is not available for {kind} units")]
    UnsupportedPolicy { kind: UnitKind, policy: DeletionPolicy },

    #[error("plan rejected at member {member_id}: {reason}")]
    PlanRejected {
        member_id: MemberId,
        reason: RejectionReason,
    },

    #[error("stale plan: {detail}")]
    StalePlan {
        member_id: Option<MemberId>,
        detail: String,
    },
}

/// One member's reassignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub member_id: MemberId,
    /// Aggregate version the step was computed against.
    pub observed_version: u64,
    pub from_unit: Option<UnitId>,
    pub to_unit: Option<UnitId>,
    pub from_status: MemberStatus,
    pub to_status: MemberStatus,
    pub transitions: Vec<LifecycleTrigger>,
    pub was_active: bool,
    pub is_active: bool,
}

impl PlanStep {
    pub fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.observed_version)
    }

    pub fn changes_status(&self) -> bool {
        !self.transitions.is_empty()
    }
}

/// Validated, ordered list of member reassignments for one unit deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionPlan {
    target_unit: UnitId,
    target_kind: UnitKind,
    policy: DeletionPolicy,
    destination: Option<UnitId>,
    steps: Vec<PlanStep>,
}

impl DeletionPlan {
    pub fn target_unit(&self) -> UnitId {
        self.target_unit
    }

    pub fn target_kind(&self) -> UnitKind {
        self.target_kind
    }

    pub fn policy(&self) -> DeletionPolicy {
        self.policy
    }

    /// Unit members end up in; `None` when the link is cleared.
    pub fn destination(&self) -> Option<UnitId> {
        self.destination
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn member_ids(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.steps.iter().map(|s| s.member_id)
    }

    /// Re-check the plan against the members attached to the target at
    /// transaction time.
    ///
    /// Any difference from what was planned (a member joined or left, or a
    /// member's unit, status, flag or version moved) fails with
    /// [`ReassignmentError::StalePlan`]. A member whose chain no longer
    /// validates fails with [`ReassignmentError::PlanRejected`].
    pub fn revalidate(&self, current: &[MemberSnapshot]) -> Result<(), ReassignmentError> {
        let current_by_id: BTreeMap<MemberId, &MemberSnapshot> =
            current.iter().map(|m| (m.member_id, m)).collect();
        let planned: BTreeSet<MemberId> = self.member_ids().collect();

        if let Some(joined) = current_by_id.keys().find(|id| !planned.contains(id)) {
            return Err(ReassignmentError::StalePlan {
                member_id: Some(*joined),
                detail: format!("member {joined} joined unit {} after planning", self.target_unit),
            });
        }

        for step in &self.steps {
            let Some(snapshot) = current_by_id.get(&step.member_id) else {
                return Err(ReassignmentError::StalePlan {
                    member_id: Some(step.member_id),
                    detail: format!(
                        "member {} is no longer attached to unit {}",
                        step.member_id, self.target_unit
                    ),
                });
            };

            let recomputed = plan_step(self.target_unit, self.destination, self.policy, snapshot)
                .map_err(|reason| ReassignmentError::PlanRejected {
                    member_id: step.member_id,
                    reason,
                })?;

            if &recomputed != step {
                return Err(ReassignmentError::StalePlan {
                    member_id: Some(step.member_id),
                    detail: format!("member {} changed since planning", step.member_id),
                });
            }
        }

        Ok(())
    }
}

fn validate_destination(request: &DeletionRequest) -> Result<(), ReassignmentError> {
    let target = &request.target;
    let invalid = |problem| ReassignmentError::InvalidDestination {
        target: target.id,
        problem,
    };

    if let Some(destination) = &request.destination {
        if destination.id == target.id {
            return Err(invalid(DestinationProblem::SameAsTarget));
        }
    }

    if !request.policy.supports(target.kind) {
        return Err(ReassignmentError::UnsupportedPolicy {
            kind: target.kind,
            policy: request.policy,
        });
    }

    match &request.destination {
        Some(destination) if destination.kind != target.kind => {
            Err(invalid(DestinationProblem::KindMismatch {
                expected: target.kind,
                actual: destination.kind,
            }))
        }
        None if request.policy.requires_destination() => Err(invalid(DestinationProblem::Required)),
        _ => Ok(()),
    }
}

/// Compute one member's step, or the reason the member blocks the plan.
pub fn plan_step(
    target_unit: UnitId,
    destination: Option<UnitId>,
    policy: DeletionPolicy,
    member: &MemberSnapshot,
) -> Result<PlanStep, RejectionReason> {
    if member.unit_id != Some(target_unit) {
        return Err(RejectionReason::NotAttachedToTarget { unit: member.unit_id });
    }

    let transitions = policy.transitions();
    let mut status = member.status;
    let mut is_active = member.is_active;
    for trigger in transitions {
        status = next_state(status, *trigger, &GuardInputs::none())?;
        is_active = trigger.active_flag_after();
    }

    Ok(PlanStep {
        member_id: member.member_id,
        observed_version: member.version,
        from_unit: member.unit_id,
        to_unit: destination,
        from_status: member.status,
        to_status: status,
        transitions: transitions.to_vec(),
        was_active: member.is_active,
        is_active,
    })
}

/// Build the reassignment plan for deleting `request.target`.
///
/// The destination is checked before any member is looked at. `members` are
/// the members currently attached to the target; the first one whose
/// transition chain fails rejects the plan.
pub fn plan_deletion(
    request: &DeletionRequest,
    members: &[MemberSnapshot],
) -> Result<DeletionPlan, ReassignmentError> {
    validate_destination(request)?;

    let target = &request.target;
    let destination = request.destination.as_ref().map(|d| d.id);

    let mut seen = BTreeSet::new();
    let mut steps = Vec::with_capacity(members.len());
    for member in members {
        let step = if seen.insert(member.member_id) {
            plan_step(target.id, destination, request.policy, member)
        } else {
            Err(RejectionReason::DuplicateMember)
        };

        match step {
            Ok(step) => steps.push(step),
            Err(reason) => {
                warn!(
                    target_unit = %target.id,
                    policy = %request.policy,
                    member_id = %member.member_id,
                    %reason,
                    "deletion plan rejected"
                );
                return Err(ReassignmentError::PlanRejected {
                    member_id: member.member_id,
                    reason,
                });
            }
        }
    }

    debug!(
        target_unit = %target.id,
        kind = %target.kind,
        policy = %request.policy,
        destination = ?destination,
        members = steps.len(),
        "deletion plan built"
    );

    Ok(DeletionPlan {
        target_unit: target.id,
        target_kind: target.kind,
        policy: request.policy,
        destination,
        steps,
    })
}

/// [`plan_deletion`] for an actor restricted to `scope`: the destination must
/// be a unit the actor may act upon.
pub fn plan_deletion_in_scope(
    scope: &ResolvedScope,
    request: &DeletionRequest,
    members: &[MemberSnapshot],
) -> Result<DeletionPlan, ReassignmentError> {
    validate_destination(request)?;

    if let Some(destination) = &request.destination {
        if !scope.contains(destination.id) {
            return Err(ReassignmentError::InvalidDestination {
                target: request.target.id,
                problem: DestinationProblem::OutsideScope { unit: destination.id },
            });
        }
    }

    plan_deletion(request, members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn branch(name: &str) -> OrgUnit {
        OrgUnit::new(UnitId::new(), UnitKind::Branch, name)
    }

    fn institution(name: &str) -> OrgUnit {
        OrgUnit::new(UnitId::new(), UnitKind::Institution, name)
    }

    fn member_in(unit: UnitId, status: MemberStatus) -> MemberSnapshot {
        MemberSnapshot {
            member_id: MemberId::new(),
            unit_id: Some(unit),
            status,
            is_active: status == MemberStatus::Active,
            version: 3,
        }
    }

    #[test]
    fn transfer_and_deactivate_moves_active_members() {
        // Branch A with two ACTIVE members, destination branch B.
        let a = branch("A");
        let b = branch("B");
        let members = vec![
            member_in(a.id, MemberStatus::Active),
            member_in(a.id, MemberStatus::Active),
        ];

        let request = DeletionRequest::new(a.clone(), DeletionPolicy::TransferAndDeactivate, Some(b.clone()));
        let plan = plan_deletion(&request, &members).unwrap();

        assert_eq!(plan.len(), 2);
        for (step, member) in plan.steps().iter().zip(&members) {
            assert_eq!(step.member_id, member.member_id);
            assert_eq!(step.to_unit, Some(b.id));
            assert_eq!(step.to_status, MemberStatus::Inactive);
            assert!(!step.is_active);
            assert!(step.was_active);
        }
    }

    #[test]
    fn resigned_member_rejects_transfer_and_cancel() {
        let a = branch("A");
        let b = branch("B");
        let active = member_in(a.id, MemberStatus::Active);
        let resigned = member_in(a.id, MemberStatus::Resigned);

        let request = DeletionRequest::new(a.clone(), DeletionPolicy::TransferAndCancel, Some(b));
        let err = plan_deletion(&request, &[active, resigned]).unwrap_err();

        assert_eq!(
            err,
            ReassignmentError::PlanRejected {
                member_id: resigned.member_id,
                reason: RejectionReason::Lifecycle(LifecycleError::InvalidTransition {
                    from: MemberStatus::Resigned,
                    to: MemberStatus::Resigned,
                }),
            }
        );
    }

    #[test]
    fn destination_equal_to_target_fails_before_members_are_inspected() {
        let a = branch("A");
        // This member would reject any policy; the destination check must win.
        let bogus = member_in(UnitId::new(), MemberStatus::Rejected);

        let request = DeletionRequest::new(a.clone(), DeletionPolicy::Transfer, Some(a.clone()));
        let err = plan_deletion(&request, &[bogus]).unwrap_err();
        assert_eq!(
            err,
            ReassignmentError::InvalidDestination {
                target: a.id,
                problem: DestinationProblem::SameAsTarget,
            }
        );
    }

    #[test]
    fn destination_of_other_kind_is_invalid() {
        let a = branch("A");
        let request = DeletionRequest::new(a.clone(), DeletionPolicy::Transfer, Some(institution("I")));
        assert!(matches!(
            plan_deletion(&request, &[]),
            Err(ReassignmentError::InvalidDestination {
                problem: DestinationProblem::KindMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn transfer_policy_needs_a_destination() {
        let a = branch("A");
        let request = DeletionRequest::new(a.clone(), DeletionPolicy::Transfer, None);
        assert!(matches!(
            plan_deletion(&request, &[]),
            Err(ReassignmentError::InvalidDestination { problem: DestinationProblem::Required, .. })
        ));
    }

    #[test]
    fn branches_cannot_remove_institution_link() {
        let a = branch("A");
        let policy = DeletionPolicy::RemoveInstitutionLink { deactivate: false };
        let request = DeletionRequest::new(a.clone(), policy, None);
        assert_eq!(
            plan_deletion(&request, &[]).unwrap_err(),
            ReassignmentError::UnsupportedPolicy { kind: UnitKind::Branch, policy }
        );
        assert_eq!(DeletionPolicy::available_for(UnitKind::Branch).len(), 4);
        assert_eq!(DeletionPolicy::available_for(UnitKind::Institution).len(), 6);
    }

    #[test]
    fn dealers_have_no_deletion_policies() {
        let dealer = OrgUnit::new(UnitId::new(), UnitKind::Dealer, "D");
        let other = OrgUnit::new(UnitId::new(), UnitKind::Dealer, "E");
        let request = DeletionRequest::new(dealer, DeletionPolicy::Transfer, Some(other));
        assert!(matches!(
            plan_deletion(&request, &[]),
            Err(ReassignmentError::UnsupportedPolicy { kind: UnitKind::Dealer, .. })
        ));
        assert!(DeletionPolicy::available_for(UnitKind::Workplace).is_empty());
    }

    #[test]
    fn remove_link_without_fallback_clears_unit() {
        let inst = institution("I");
        let m = member_in(inst.id, MemberStatus::Active);
        let request = DeletionRequest::new(
            inst.clone(),
            DeletionPolicy::RemoveInstitutionLink { deactivate: true },
            None,
        );

        let plan = plan_deletion(&request, &[m]).unwrap();
        let step = &plan.steps()[0];
        assert_eq!(step.to_unit, None);
        assert_eq!(step.to_status, MemberStatus::Inactive);
        assert_eq!(plan.destination(), None);
    }

    #[test]
    fn remove_link_with_fallback_moves_to_fallback() {
        let inst = institution("I");
        let fallback = institution("Fallback");
        let m = member_in(inst.id, MemberStatus::Inactive);
        let request = DeletionRequest::new(
            inst.clone(),
            DeletionPolicy::RemoveInstitutionLink { deactivate: false },
            Some(fallback.clone()),
        );

        let plan = plan_deletion(&request, &[m]).unwrap();
        assert_eq!(plan.steps()[0].to_unit, Some(fallback.id));
        assert_eq!(plan.steps()[0].to_status, MemberStatus::Inactive);
        assert!(!plan.steps()[0].changes_status());
    }

    #[test]
    fn inactive_member_blocks_transfer_and_deactivate() {
        let a = branch("A");
        let m = member_in(a.id, MemberStatus::Inactive);
        let request = DeletionRequest::new(a.clone(), DeletionPolicy::TransferAndDeactivate, Some(branch("B")));
        assert!(matches!(
            plan_deletion(&request, &[m]),
            Err(ReassignmentError::PlanRejected { member_id, .. }) if member_id == m.member_id
        ));
    }

    #[test]
    fn deactivate_then_cancel_reaches_resigned() {
        let a = branch("A");
        let m = member_in(a.id, MemberStatus::Active);
        let request =
            DeletionRequest::new(a.clone(), DeletionPolicy::TransferDeactivateAndCancel, Some(branch("B")));
        let plan = plan_deletion(&request, &[m]).unwrap();
        assert_eq!(plan.steps()[0].to_status, MemberStatus::Resigned);
        assert_eq!(
            plan.steps()[0].transitions,
            vec![LifecycleTrigger::Deactivate, LifecycleTrigger::Cancel]
        );
    }

    #[test]
    fn unattached_or_duplicate_members_reject_the_plan() {
        let a = branch("A");
        let request = DeletionRequest::new(a.clone(), DeletionPolicy::Transfer, Some(branch("B")));

        let stranger = member_in(UnitId::new(), MemberStatus::Active);
        assert!(matches!(
            plan_deletion(&request, &[stranger]),
            Err(ReassignmentError::PlanRejected {
                reason: RejectionReason::NotAttachedToTarget { .. },
                ..
            })
        ));

        let m = member_in(a.id, MemberStatus::Active);
        assert!(matches!(
            plan_deletion(&request, &[m, m]),
            Err(ReassignmentError::PlanRejected { reason: RejectionReason::DuplicateMember, .. })
        ));
    }

    #[test]
    fn empty_unit_yields_empty_plan() {
        let a = branch("A");
        let request = DeletionRequest::new(a.clone(), DeletionPolicy::TransferAndCancel, Some(branch("B")));
        assert!(plan_deletion(&request, &[]).unwrap().is_empty());
    }

    #[test]
    fn destination_outside_scope_is_invalid() {
        let a = branch("A");
        let b = branch("B");
        let scope = ResolvedScope::Units(BTreeSet::from([a.id]));
        let request = DeletionRequest::new(a.clone(), DeletionPolicy::Transfer, Some(b.clone()));

        assert_eq!(
            plan_deletion_in_scope(&scope, &request, &[]).unwrap_err(),
            ReassignmentError::InvalidDestination {
                target: a.id,
                problem: DestinationProblem::OutsideScope { unit: b.id },
            }
        );
        assert!(plan_deletion_in_scope(&ResolvedScope::All, &request, &[]).is_ok());
    }

    #[test]
    fn revalidate_detects_changes() {
        let a = branch("A");
        let m1 = member_in(a.id, MemberStatus::Active);
        let m2 = member_in(a.id, MemberStatus::Active);
        let request = DeletionRequest::new(a.clone(), DeletionPolicy::TransferAndDeactivate, Some(branch("B")));
        let plan = plan_deletion(&request, &[m1, m2]).unwrap();

        assert!(plan.revalidate(&[m2, m1]).is_ok());

        let joined = member_in(a.id, MemberStatus::Active);
        assert!(matches!(
            plan.revalidate(&[m1, m2, joined]),
            Err(ReassignmentError::StalePlan { member_id: Some(id), .. }) if id == joined.member_id
        ));

        assert!(matches!(
            plan.revalidate(&[m1]),
            Err(ReassignmentError::StalePlan { member_id: Some(id), .. }) if id == m2.member_id
        ));

        let bumped = MemberSnapshot { version: m1.version + 1, ..m1 };
        assert!(matches!(
            plan.revalidate(&[bumped, m2]),
            Err(ReassignmentError::StalePlan { .. })
        ));

        let deactivated = MemberSnapshot {
            status: MemberStatus::Inactive,
            is_active: false,
            version: m1.version + 1,
            ..m1
        };
        assert!(matches!(
            plan.revalidate(&[deactivated, m2]),
            Err(ReassignmentError::PlanRejected { .. })
        ));
    }

    fn any_status() -> impl Strategy<Value = MemberStatus> {
        prop::sample::select(MemberStatus::ALL.to_vec())
    }

    fn any_branch_policy() -> impl Strategy<Value = DeletionPolicy> {
        prop::sample::select(DeletionPolicy::available_for(UnitKind::Branch))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a plan either covers every member or names the first
        /// member whose chain is invalid; it is never partial.
        #[test]
        fn planning_is_all_or_nothing(
            statuses in prop::collection::vec(any_status(), 0..24),
            policy in any_branch_policy(),
        ) {
            let a = branch("A");
            let members: Vec<MemberSnapshot> = statuses.iter().map(|s| member_in(a.id, *s)).collect();
            let request = DeletionRequest::new(a.clone(), policy, Some(branch("B")));

            let first_invalid = members.iter().find(|m| {
                policy.transitions().iter().try_fold(m.status, |st, t| next_state(st, *t, &GuardInputs::none())).is_err()
            });

            match plan_deletion(&request, &members) {
                Ok(plan) => {
                    prop_assert!(first_invalid.is_none());
                    prop_assert_eq!(plan.len(), members.len());
                }
                Err(ReassignmentError::PlanRejected { member_id, .. }) => {
                    prop_assert_eq!(Some(member_id), first_invalid.map(|m| m.member_id));
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
