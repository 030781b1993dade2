//! Members, their lifecycle, and what happens to them when their unit is deleted.

pub mod lifecycle;
pub mod member;
pub mod reassignment;

pub use lifecycle::{
    BoardDecision, GuardInputs, LifecycleError, LifecycleTrigger, MemberStatus, RegistrationNumber,
    is_defined, next_state,
};
pub use member::{
    ActivateMember, ApproveMember, CancelMembership, DeactivateMember, Member, MemberCommand,
    MemberError, MemberEvent, MemberReassigned, MemberRecord, MemberSnapshot, RejectMember,
    ScopedMemberCommand, SubmitApplication, TransferMember,
};
pub use reassignment::{
    DeletionPlan, DeletionPolicy, DeletionRequest, DestinationProblem, PlanStep,
    ReassignmentError, RejectionReason, plan_deletion, plan_deletion_in_scope, plan_step,
};
