use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use memberhub_auth::{CommandAuthorization, Permission};
use memberhub_core::{Aggregate, AggregateRoot, DomainError, MemberId, UnitId};
use memberhub_events::Event;

use crate::lifecycle::{
    BoardDecision, GuardInputs, LifecycleError, LifecycleTrigger, MemberStatus, RegistrationNumber,
    next_state,
};
use crate::reassignment::PlanStep;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemberError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Read-only view of the member fields the reassignment engine plans against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub member_id: MemberId,
    pub unit_id: Option<UnitId>,
    pub status: MemberStatus,
    pub is_active: bool,
    pub version: u64,
}

/// Persisted form of a member (one row per member).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub member_id: MemberId,
    pub unit_id: Option<UnitId>,
    pub full_name: String,
    pub status: MemberStatus,
    pub is_active: bool,
    pub registration_number: Option<RegistrationNumber>,
    pub board_decision: Option<BoardDecision>,
    pub rejection_reason: Option<String>,
    pub version: u64,
}

/// Aggregate root: Member.
///
/// Unit and status are private; they move only through [`MemberCommand`]s and
/// [`Member::reassign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    id: MemberId,
    unit_id: Option<UnitId>,
    full_name: String,
    status: MemberStatus,
    is_active: bool,
    registration_number: Option<RegistrationNumber>,
    board_decision: Option<BoardDecision>,
    rejection_reason: Option<String>,
    version: u64,
    created: bool,
}

impl Member {
    /// Create an empty, not-yet-submitted aggregate instance for rehydration.
    pub fn empty(id: MemberId) -> Self {
        Self {
            id,
            unit_id: None,
            full_name: String::new(),
            status: MemberStatus::initial(),
            is_active: false,
            registration_number: None,
            board_decision: None,
            rejection_reason: None,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a member from its persisted row.
    pub fn from_record(record: MemberRecord) -> Self {
        Self {
            id: record.member_id,
            unit_id: record.unit_id,
            full_name: record.full_name,
            status: record.status,
            is_active: record.is_active,
            registration_number: record.registration_number,
            board_decision: record.board_decision,
            rejection_reason: record.rejection_reason,
            version: record.version,
            created: true,
        }
    }

    pub fn to_record(&self) -> MemberRecord {
        MemberRecord {
            member_id: self.id,
            unit_id: self.unit_id,
            full_name: self.full_name.clone(),
            status: self.status,
            is_active: self.is_active,
            registration_number: self.registration_number.clone(),
            board_decision: self.board_decision.clone(),
            rejection_reason: self.rejection_reason.clone(),
            version: self.version,
        }
    }

    pub fn snapshot(&self) -> MemberSnapshot {
        MemberSnapshot {
            member_id: self.id,
            unit_id: self.unit_id,
            status: self.status,
            is_active: self.is_active,
            version: self.version,
        }
    }

    pub fn id_typed(&self) -> MemberId {
        self.id
    }

    pub fn unit_id(&self) -> Option<UnitId> {
        self.unit_id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn status(&self) -> MemberStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn registration_number(&self) -> Option<&RegistrationNumber> {
        self.registration_number.as_ref()
    }

    pub fn board_decision(&self) -> Option<&BoardDecision> {
        self.board_decision.as_ref()
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Decide the event that carries one reassignment plan step into this member.
    ///
    /// Fails with a conflict when the member no longer looks the way the plan
    /// observed it, and replays the step's transitions through the lifecycle
    /// table before emitting anything.
    pub fn reassign(
        &self,
        deleted_unit: UnitId,
        step: &PlanStep,
        occurred_at: DateTime<Utc>,
    ) -> Result<MemberEvent, MemberError> {
        if !self.created {
            return Err(DomainError::not_found().into());
        }
        self.ensure_member_id(step.member_id)?;
        step.expected_version().check(self.version)?;

        if self.unit_id != step.from_unit || self.status != step.from_status {
            return Err(DomainError::conflict(format!(
                "member {} changed since the reassignment was planned",
                self.id
            ))
            .into());
        }

        let mut status = self.status;
        for trigger in &step.transitions {
            status = next_state(status, *trigger, &GuardInputs::none())?;
        }
        if status != step.to_status {
            return Err(DomainError::invariant(format!(
                "plan step for member {} ends in {} but transitions lead to {status}",
                self.id, step.to_status
            ))
            .into());
        }

        Ok(MemberEvent::MemberReassigned(MemberReassigned {
            member_id: self.id,
            deleted_unit,
            from_unit: self.unit_id,
            to_unit: step.to_unit,
            from_status: self.status,
            to_status: status,
            transitions: step.transitions.clone(),
            is_active: step.is_active,
            occurred_at,
        }))
    }
}

impl AggregateRoot for Member {
    type Id = MemberId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SubmitApplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitApplication {
    pub member_id: MemberId,
    pub unit_id: UnitId,
    pub full_name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveMember {
    pub member_id: MemberId,
    pub registration_number: String,
    pub board_decision: Option<BoardDecision>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectMember {
    pub member_id: MemberId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateMember {
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateMember {
    pub member_id: MemberId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelMembership (member resigns or is struck off).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelMembership {
    pub member_id: MemberId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransferMember (one member, status unchanged).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMember {
    pub member_id: MemberId,
    pub to_unit: UnitId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberCommand {
    SubmitApplication(SubmitApplication),
    ApproveMember(ApproveMember),
    RejectMember(RejectMember),
    ActivateMember(ActivateMember),
    DeactivateMember(DeactivateMember),
    CancelMembership(CancelMembership),
    TransferMember(TransferMember),
}

impl MemberCommand {
    pub fn member_id(&self) -> MemberId {
        match self {
            MemberCommand::SubmitApplication(c) => c.member_id,
            MemberCommand::ApproveMember(c) => c.member_id,
            MemberCommand::RejectMember(c) => c.member_id,
            MemberCommand::ActivateMember(c) => c.member_id,
            MemberCommand::DeactivateMember(c) => c.member_id,
            MemberCommand::CancelMembership(c) => c.member_id,
            MemberCommand::TransferMember(c) => c.member_id,
        }
    }

    pub fn required_permission(&self) -> Permission {
        match self {
            MemberCommand::SubmitApplication(_) => Permission::MemberCreate,
            MemberCommand::ApproveMember(_) => Permission::MemberApprove,
            MemberCommand::RejectMember(_) => Permission::MemberReject,
            MemberCommand::ActivateMember(_) => Permission::MemberActivate,
            MemberCommand::DeactivateMember(_) => Permission::MemberDeactivate,
            MemberCommand::CancelMembership(_) => Permission::MemberCancel,
            MemberCommand::TransferMember(_) => Permission::MemberTransfer,
        }
    }

    /// Pair the command with the unit that currently owns the member.
    ///
    /// A submission names its own unit; every other command is authorized
    /// against the member's current unit.
    pub fn scoped(&self, owning_unit: Option<UnitId>) -> ScopedMemberCommand<'_> {
        ScopedMemberCommand {
            command: self,
            owning_unit,
        }
    }
}

/// A member command bound to the unit authorization is checked against.
#[derive(Debug, Clone, Copy)]
pub struct ScopedMemberCommand<'a> {
    command: &'a MemberCommand,
    owning_unit: Option<UnitId>,
}

impl CommandAuthorization for ScopedMemberCommand<'_> {
    fn required_permission(&self) -> Permission {
        self.command.required_permission()
    }

    fn target_unit(&self) -> Option<UnitId> {
        match self.command {
            MemberCommand::SubmitApplication(c) => Some(c.unit_id),
            _ => self.owning_unit,
        }
    }

    fn requires_owning_unit(&self) -> bool {
        !matches!(self.command, MemberCommand::SubmitApplication(_))
    }
}

/// Event: ApplicationSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmitted {
    pub member_id: MemberId,
    pub unit_id: UnitId,
    pub full_name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberApproved {
    pub member_id: MemberId,
    pub registration_number: RegistrationNumber,
    pub board_decision: BoardDecision,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRejected {
    pub member_id: MemberId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberActivated {
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDeactivated {
    pub member_id: MemberId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MembershipCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipCancelled {
    pub member_id: MemberId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberTransferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTransferred {
    pub member_id: MemberId,
    pub from_unit: Option<UnitId>,
    pub to_unit: UnitId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberReassigned (one step of a unit deletion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberReassigned {
    pub member_id: MemberId,
    pub deleted_unit: UnitId,
    pub from_unit: Option<UnitId>,
    /// `None` when the unit link was cleared.
    pub to_unit: Option<UnitId>,
    pub from_status: MemberStatus,
    pub to_status: MemberStatus,
    pub transitions: Vec<LifecycleTrigger>,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberEvent {
    ApplicationSubmitted(ApplicationSubmitted),
    MemberApproved(MemberApproved),
    MemberRejected(MemberRejected),
    MemberActivated(MemberActivated),
    MemberDeactivated(MemberDeactivated),
    MembershipCancelled(MembershipCancelled),
    MemberTransferred(MemberTransferred),
    MemberReassigned(MemberReassigned),
}

impl Event for MemberEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MemberEvent::ApplicationSubmitted(_) => "membership.member.submitted",
            MemberEvent::MemberApproved(_) => "membership.member.approved",
            MemberEvent::MemberRejected(_) => "membership.member.rejected",
            MemberEvent::MemberActivated(_) => "membership.member.activated",
            MemberEvent::MemberDeactivated(_) => "membership.member.deactivated",
            MemberEvent::MembershipCancelled(_) => "membership.member.cancelled",
            MemberEvent::MemberTransferred(_) => "membership.member.transferred",
            MemberEvent::MemberReassigned(_) => "membership.member.reassigned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MemberEvent::ApplicationSubmitted(e) => e.occurred_at,
            MemberEvent::MemberApproved(e) => e.occurred_at,
            MemberEvent::MemberRejected(e) => e.occurred_at,
            MemberEvent::MemberActivated(e) => e.occurred_at,
            MemberEvent::MemberDeactivated(e) => e.occurred_at,
            MemberEvent::MembershipCancelled(e) => e.occurred_at,
            MemberEvent::MemberTransferred(e) => e.occurred_at,
            MemberEvent::MemberReassigned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Member {
    type Command = MemberCommand;
    type Event = MemberEvent;
    type Error = MemberError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MemberEvent::ApplicationSubmitted(e) => {
                self.id = e.member_id;
                self.unit_id = Some(e.unit_id);
                self.full_name = e.full_name.clone();
                self.status = MemberStatus::initial();
                self.is_active = false;
                self.created = true;
            }
            MemberEvent::MemberApproved(e) => {
                self.status = MemberStatus::Approved;
                self.registration_number = Some(e.registration_number.clone());
                self.board_decision = Some(e.board_decision.clone());
            }
            MemberEvent::MemberRejected(e) => {
                self.status = MemberStatus::Rejected;
                self.rejection_reason = Some(e.reason.clone());
                self.is_active = LifecycleTrigger::Reject.active_flag_after();
            }
            MemberEvent::MemberActivated(_) => {
                self.status = MemberStatus::Active;
                self.is_active = LifecycleTrigger::Activate.active_flag_after();
            }
            MemberEvent::MemberDeactivated(_) => {
                self.status = MemberStatus::Inactive;
                self.is_active = LifecycleTrigger::Deactivate.active_flag_after();
            }
            MemberEvent::MembershipCancelled(_) => {
                self.status = MemberStatus::Resigned;
                self.is_active = LifecycleTrigger::Cancel.active_flag_after();
            }
            MemberEvent::MemberTransferred(e) => {
                self.unit_id = Some(e.to_unit);
            }
            MemberEvent::MemberReassigned(e) => {
                self.unit_id = e.to_unit;
                self.status = e.to_status;
                self.is_active = e.is_active;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MemberCommand::SubmitApplication(cmd) => self.handle_submit(cmd),
            MemberCommand::ApproveMember(cmd) => self.handle_approve(cmd),
            MemberCommand::RejectMember(cmd) => self.handle_reject(cmd),
            MemberCommand::ActivateMember(cmd) => self.handle_activate(cmd),
            MemberCommand::DeactivateMember(cmd) => self.handle_deactivate(cmd),
            MemberCommand::CancelMembership(cmd) => self.handle_cancel(cmd),
            MemberCommand::TransferMember(cmd) => self.handle_transfer(cmd),
        }
    }
}

impl Member {
    fn ensure_member_id(&self, member_id: MemberId) -> Result<(), DomainError> {
        if self.id != member_id {
            return Err(DomainError::invariant("member_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, member_id: MemberId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_member_id(member_id)
    }

    fn handle_submit(&self, cmd: &SubmitApplication) -> Result<Vec<MemberEvent>, MemberError> {
        if self.created {
            return Err(DomainError::conflict("member already exists").into());
        }
        if cmd.full_name.trim().is_empty() {
            return Err(DomainError::validation("full name cannot be empty").into());
        }

        Ok(vec![MemberEvent::ApplicationSubmitted(ApplicationSubmitted {
            member_id: cmd.member_id,
            unit_id: cmd.unit_id,
            full_name: cmd.full_name.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveMember) -> Result<Vec<MemberEvent>, MemberError> {
        self.ensure_existing(cmd.member_id)?;

        let guards = GuardInputs {
            registration_number: RegistrationNumber::new(cmd.registration_number.clone()).ok(),
            board_decision: cmd.board_decision.clone(),
            ..GuardInputs::none()
        };
        next_state(self.status, LifecycleTrigger::Approve, &guards)?;

        let (Some(registration_number), Some(board_decision)) =
            (guards.registration_number, guards.board_decision)
        else {
            return Err(DomainError::invariant("approval guard passed without its inputs").into());
        };

        Ok(vec![MemberEvent::MemberApproved(MemberApproved {
            member_id: cmd.member_id,
            registration_number,
            board_decision,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectMember) -> Result<Vec<MemberEvent>, MemberError> {
        self.ensure_existing(cmd.member_id)?;
        next_state(self.status, LifecycleTrigger::Reject, &GuardInputs::rejection(cmd.reason.clone()))?;

        Ok(vec![MemberEvent::MemberRejected(MemberRejected {
            member_id: cmd.member_id,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateMember) -> Result<Vec<MemberEvent>, MemberError> {
        self.ensure_existing(cmd.member_id)?;
        let guards = GuardInputs::none().with_unit_assignment(self.unit_id.is_some());
        next_state(self.status, LifecycleTrigger::Activate, &guards)?;

        Ok(vec![MemberEvent::MemberActivated(MemberActivated {
            member_id: cmd.member_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateMember) -> Result<Vec<MemberEvent>, MemberError> {
        self.ensure_existing(cmd.member_id)?;
        next_state(self.status, LifecycleTrigger::Deactivate, &GuardInputs::none())?;

        Ok(vec![MemberEvent::MemberDeactivated(MemberDeactivated {
            member_id: cmd.member_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelMembership) -> Result<Vec<MemberEvent>, MemberError> {
        self.ensure_existing(cmd.member_id)?;
        next_state(self.status, LifecycleTrigger::Cancel, &GuardInputs::none())?;

        Ok(vec![MemberEvent::MembershipCancelled(MembershipCancelled {
            member_id: cmd.member_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transfer(&self, cmd: &TransferMember) -> Result<Vec<MemberEvent>, MemberError> {
        self.ensure_existing(cmd.member_id)?;

        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "cannot transfer a member in terminal status {}",
                self.status
            ))
            .into());
        }
        if self.unit_id == Some(cmd.to_unit) {
            return Err(DomainError::conflict("member already belongs to that unit").into());
        }

        Ok(vec![MemberEvent::MemberTransferred(MemberTransferred {
            member_id: cmd.member_id,
            from_unit: self.unit_id,
            to_unit: cmd.to_unit,
            occurred_at: cmd.occurred_at,
        })])
    }
}
