use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use memberhub_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, MemberId, UnitId};
use memberhub_events::EventEnvelope;
use memberhub_membership::{
    DeletionPlan, Member, MemberError, MemberEvent, MemberSnapshot, ReassignmentError,
};
use memberhub_organization::{HierarchyError, UnitGraph};

/// Aggregate type recorded on member event envelopes.
pub const MEMBER_AGGREGATE_TYPE: &str = "membership.member";

/// Membership store operation error.
///
/// Infrastructure failures (storage, concurrency) as opposed to the domain's
/// own validation errors, which reach callers through `Plan` and `Invariant`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Plan(#[from] ReassignmentError),

    #[error("invalid hierarchy data: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying with fresh data could succeed.
    pub fn is_concurrency(&self) -> bool {
        matches!(
            self,
            StoreError::Concurrency(_) | StoreError::Plan(ReassignmentError::StalePlan { .. })
        )
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Conflict(msg) => StoreError::Concurrency(msg),
            DomainError::NotFound => StoreError::NotFound("member".to_string()),
            other => StoreError::Invariant(other.to_string()),
        }
    }
}

impl From<MemberError> for StoreError {
    fn from(value: MemberError) -> Self {
        match value {
            MemberError::Domain(e) => e.into(),
            MemberError::Lifecycle(e) => StoreError::Invariant(e.to_string()),
        }
    }
}

/// Persistence collaborator for members and the unit hierarchy.
///
/// ## Semantics
///
/// - `load_hierarchy` returns one consistent snapshot used for a whole request.
/// - `members_of_unit` lists members attached to a unit, ordered by member id.
/// - `save_member` persists the member's new state and journals its events,
///   failing with `Concurrency` when the stored version differs from
///   `expected_version`.
/// - `apply_deletion_plan` re-reads the target's members, re-validates the
///   plan, writes every member and deletes the unit in a single serializable
///   unit of work. Either everything is written or nothing is.
pub trait MembershipStore: Send + Sync {
    fn load_hierarchy(&self) -> Result<UnitGraph, StoreError>;

    fn members_of_unit(&self, unit_id: UnitId) -> Result<Vec<MemberSnapshot>, StoreError>;

    fn load_member(&self, member_id: MemberId) -> Result<Option<Member>, StoreError>;

    fn save_member(
        &self,
        member: &Member,
        expected_version: ExpectedVersion,
        events: Vec<EventEnvelope<MemberEvent>>,
    ) -> Result<(), StoreError>;

    fn apply_deletion_plan(
        &self,
        plan: &DeletionPlan,
        correlation_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<EventEnvelope<MemberEvent>>, StoreError>;
}

impl<S> MembershipStore for Arc<S>
where
    S: MembershipStore + ?Sized,
{
    fn load_hierarchy(&self) -> Result<UnitGraph, StoreError> {
        (**self).load_hierarchy()
    }

    fn members_of_unit(&self, unit_id: UnitId) -> Result<Vec<MemberSnapshot>, StoreError> {
        (**self).members_of_unit(unit_id)
    }

    fn load_member(&self, member_id: MemberId) -> Result<Option<Member>, StoreError> {
        (**self).load_member(member_id)
    }

    fn save_member(
        &self,
        member: &Member,
        expected_version: ExpectedVersion,
        events: Vec<EventEnvelope<MemberEvent>>,
    ) -> Result<(), StoreError> {
        (**self).save_member(member, expected_version, events)
    }

    fn apply_deletion_plan(
        &self,
        plan: &DeletionPlan,
        correlation_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<EventEnvelope<MemberEvent>>, StoreError> {
        (**self).apply_deletion_plan(plan, correlation_id, occurred_at)
    }
}

/// Apply every step of `plan` to the loaded members, in plan order.
///
/// Returns the updated members paired with their journal envelopes. Nothing
/// is written; callers persist the result only when every step succeeded.
pub fn reassign_members(
    plan: &DeletionPlan,
    mut load: impl FnMut(MemberId) -> Result<Member, StoreError>,
    correlation_id: Uuid,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<(Member, EventEnvelope<MemberEvent>)>, StoreError> {
    let mut updated = Vec::with_capacity(plan.len());
    for step in plan.steps() {
        let mut member = load(step.member_id)?;
        let event = member.reassign(plan.target_unit(), step, occurred_at)?;
        member.apply(&event);
        let envelope = EventEnvelope::wrap(
            correlation_id,
            *step.member_id.as_uuid(),
            MEMBER_AGGREGATE_TYPE,
            member.version(),
            event,
        );
        updated.push((member, envelope));
    }
    Ok(updated)
}
