//! Unit deletion flow: authorize, plan, apply.
//!
//! ```text
//! DeleteUnit
//!   ↓
//! 1. Load one hierarchy snapshot
//!   ↓
//! 2. Authorize BRANCH_DELETE / INSTITUTION_DELETE on the target
//!   ↓
//! 3. Resolve the actor's scope; resolve the destination (or fallback institution)
//!   ↓
//! 4. Plan against the members currently attached to the target
//!   ↓
//! 5. Store re-validates and applies the plan in one transaction
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use memberhub_auth::{AuthzError, Permission, Principal, authorize, resolve_scope};
use memberhub_core::UnitId;
use memberhub_events::EventEnvelope;
use memberhub_membership::{
    DeletionPlan, DeletionPolicy, DeletionRequest, DestinationProblem, MemberEvent,
    ReassignmentError, plan_deletion, plan_deletion_in_scope,
};
use memberhub_organization::{OrgUnit, UnitDirectory, UnitGraph, UnitKind};

use crate::store::{MembershipStore, StoreError};

#[derive(Debug, Error)]
pub enum DeletionError {
    #[error("unit {0} does not exist")]
    UnknownUnit(UnitId),

    #[error(transparent)]
    Authorization(#[from] AuthzError),

    #[error(transparent)]
    Reassignment(#[from] ReassignmentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DeletionError {
    /// Whether retrying the whole request with fresh data could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeletionError::Store(e) if e.is_concurrency())
    }
}

/// Administrator's request to delete a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteUnit {
    pub unit_id: UnitId,
    pub policy: DeletionPolicy,
    pub destination: Option<UnitId>,
}

/// Result of a completed deletion.
#[derive(Debug, Clone)]
pub struct DeletionOutcome {
    pub plan: DeletionPlan,
    pub correlation_id: Uuid,
    pub events: Vec<EventEnvelope<MemberEvent>>,
}

/// Permission required to delete a unit of `kind`.
pub fn delete_permission(kind: UnitKind) -> Permission {
    match kind {
        UnitKind::Branch => Permission::BranchDelete,
        UnitKind::Institution => Permission::InstitutionDelete,
        UnitKind::Dealer => Permission::DealerManage,
        UnitKind::Workplace => Permission::WorkplaceManage,
    }
}

pub struct UnitDeletionService<S> {
    store: S,
    fallback_institution: Option<UnitId>,
}

impl<S> UnitDeletionService<S>
where
    S: MembershipStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            fallback_institution: None,
        }
    }

    pub fn with_fallback_institution(mut self, unit_id: Option<UnitId>) -> Self {
        self.fallback_institution = unit_id;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Build the plan without applying it.
    #[instrument(
        skip(self, principal),
        fields(user_id = %principal.user_id(), unit_id = %command.unit_id, policy = %command.policy),
        err
    )]
    pub fn preview(&self, principal: &Principal, command: &DeleteUnit) -> Result<DeletionPlan, DeletionError> {
        let hierarchy = self.store.load_hierarchy()?;
        self.plan(principal, command, &hierarchy)
    }

    /// Authorize, plan and apply a unit deletion.
    #[instrument(
        skip(self, principal),
        fields(user_id = %principal.user_id(), unit_id = %command.unit_id, policy = %command.policy),
        err
    )]
    pub fn delete_unit(
        &self,
        principal: &Principal,
        command: &DeleteUnit,
        occurred_at: DateTime<Utc>,
    ) -> Result<DeletionOutcome, DeletionError> {
        let hierarchy = self.store.load_hierarchy()?;
        let plan = self.plan(principal, command, &hierarchy)?;

        let correlation_id = Uuid::now_v7();
        let events = self
            .store
            .apply_deletion_plan(&plan, correlation_id, occurred_at)
            .inspect_err(|e| {
                if e.is_concurrency() {
                    warn!(error = %e, "deletion conflicted with a concurrent change");
                }
            })?;

        info!(
            %correlation_id,
            members = plan.len(),
            destination = ?plan.destination(),
            "unit deleted"
        );

        Ok(DeletionOutcome {
            plan,
            correlation_id,
            events,
        })
    }

    fn plan(
        &self,
        principal: &Principal,
        command: &DeleteUnit,
        hierarchy: &UnitGraph,
    ) -> Result<DeletionPlan, DeletionError> {
        let target = hierarchy
            .unit(command.unit_id)
            .ok_or(DeletionError::UnknownUnit(command.unit_id))?;

        authorize(principal, delete_permission(target.kind), Some(target.id), hierarchy)
            .inspect_err(log_authz_failure)?;
        let scope = resolve_scope(principal, hierarchy).inspect_err(log_authz_failure)?;

        let (destination, from_config) = match command.destination {
            Some(id) => (Some(resolve_destination(hierarchy, &target, id)?), false),
            None if matches!(command.policy, DeletionPolicy::RemoveInstitutionLink { .. }) => {
                let fallback = self
                    .fallback_institution
                    .map(|id| resolve_destination(hierarchy, &target, id))
                    .transpose()?;
                (fallback, true)
            }
            None => (None, false),
        };

        let request = DeletionRequest::new(target, command.policy, destination);
        let members = self.store.members_of_unit(command.unit_id)?;

        // The fallback institution is installation-wide and not chosen by the actor.
        let plan = if from_config {
            plan_deletion(&request, &members)?
        } else {
            plan_deletion_in_scope(&scope, &request, &members)?
        };
        Ok(plan)
    }
}

fn resolve_destination(
    hierarchy: &UnitGraph,
    target: &OrgUnit,
    destination: UnitId,
) -> Result<OrgUnit, DeletionError> {
    hierarchy.unit(destination).ok_or_else(|| {
        ReassignmentError::InvalidDestination {
            target: target.id,
            problem: DestinationProblem::Unknown { unit: destination },
        }
        .into()
    })
}

fn log_authz_failure(err: &AuthzError) {
    if err.is_configuration_error() {
        error!(error = %err, "role/scope configuration error");
    }
}
