//! Member lifecycle state machine.
//!
//! | From            | To       | Trigger    | Guard                                   |
//! |-----------------|----------|------------|-----------------------------------------|
//! | PENDING         | APPROVED | Approve    | registration number + board decision    |
//! | PENDING         | REJECTED | Reject     | non-empty rejection reason              |
//! | APPROVED/ACTIVE | ACTIVE   | Activate   | member has a unit assignment            |
//! | ACTIVE          | INACTIVE | Deactivate | —                                       |
//! | ACTIVE/INACTIVE | RESIGNED | Cancel     | —                                       |
//!
//! [`next_state`] is pure: callers apply the returned status themselves.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use memberhub_core::{DomainError, ValueObject};

/// Membership standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Pending,
    Approved,
    Active,
    Inactive,
    Resigned,
    Rejected,
}

impl MemberStatus {
    pub const ALL: [MemberStatus; 6] = [
        MemberStatus::Pending,
        MemberStatus::Approved,
        MemberStatus::Active,
        MemberStatus::Inactive,
        MemberStatus::Resigned,
        MemberStatus::Rejected,
    ];

    /// Status of a freshly submitted application.
    pub fn initial() -> Self {
        MemberStatus::Pending
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MemberStatus::Resigned | MemberStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Pending => "PENDING",
            MemberStatus::Approved => "APPROVED",
            MemberStatus::Active => "ACTIVE",
            MemberStatus::Inactive => "INACTIVE",
            MemberStatus::Resigned => "RESIGNED",
            MemberStatus::Rejected => "REJECTED",
        }
    }
}

impl core::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MemberStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown member status '{s}'")))
    }
}

/// Action that moves a member between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleTrigger {
    Approve,
    Reject,
    Activate,
    Deactivate,
    Cancel,
}

impl LifecycleTrigger {
    pub const ALL: [LifecycleTrigger; 5] = [
        LifecycleTrigger::Approve,
        LifecycleTrigger::Reject,
        LifecycleTrigger::Activate,
        LifecycleTrigger::Deactivate,
        LifecycleTrigger::Cancel,
    ];

    /// Status the trigger leads to when the transition is defined.
    pub fn target(&self) -> MemberStatus {
        match self {
            LifecycleTrigger::Approve => MemberStatus::Approved,
            LifecycleTrigger::Reject => MemberStatus::Rejected,
            LifecycleTrigger::Activate => MemberStatus::Active,
            LifecycleTrigger::Deactivate => MemberStatus::Inactive,
            LifecycleTrigger::Cancel => MemberStatus::Resigned,
        }
    }

    /// Value of the member's `is_active` flag after this trigger fires.
    pub fn active_flag_after(&self) -> bool {
        matches!(self, LifecycleTrigger::Activate)
    }
}

impl core::fmt::Display for LifecycleTrigger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            LifecycleTrigger::Approve => "approve",
            LifecycleTrigger::Reject => "reject",
            LifecycleTrigger::Activate => "activate",
            LifecycleTrigger::Deactivate => "deactivate",
            LifecycleTrigger::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Registration number assigned on approval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationNumber(String);

impl RegistrationNumber {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(DomainError::validation("registration number cannot be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for RegistrationNumber {}

/// Board decision that approved a membership application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDecision {
    pub decision_number: String,
    pub decided_on: NaiveDate,
}

impl BoardDecision {
    pub fn new(decision_number: impl Into<String>, decided_on: NaiveDate) -> Self {
        Self {
            decision_number: decision_number.into(),
            decided_on,
        }
    }

    fn is_complete(&self) -> bool {
        !self.decision_number.trim().is_empty()
    }
}

impl ValueObject for BoardDecision {}

/// Data the guards of the transition table look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardInputs {
    pub registration_number: Option<RegistrationNumber>,
    pub board_decision: Option<BoardDecision>,
    pub rejection_reason: Option<String>,
    pub has_unit_assignment: bool,
}

impl GuardInputs {
    /// No guard data; enough for deactivation and cancellation.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn approval(registration_number: RegistrationNumber, board_decision: BoardDecision) -> Self {
        Self {
            registration_number: Some(registration_number),
            board_decision: Some(board_decision),
            ..Self::default()
        }
    }

    pub fn rejection(reason: impl Into<String>) -> Self {
        Self {
            rejection_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_unit_assignment(mut self, has_unit_assignment: bool) -> Self {
        self.has_unit_assignment = has_unit_assignment;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum LifecycleError {
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: MemberStatus, to: MemberStatus },

    #[error("transition {from} -> {to} requires {guard}")]
    GuardNotSatisfied {
        from: MemberStatus,
        to: MemberStatus,
        guard: &'static str,
    },
}

/// Whether the transition table has an entry for `(from, trigger)`, ignoring guards.
pub fn is_defined(from: MemberStatus, trigger: LifecycleTrigger) -> bool {
    use LifecycleTrigger as T;
    use MemberStatus as S;

    matches!(
        (from, trigger),
        (S::Pending, T::Approve)
            | (S::Pending, T::Reject)
            | (S::Approved | S::Active, T::Activate)
            | (S::Active, T::Deactivate)
            | (S::Active | S::Inactive, T::Cancel)
    )
}

/// Compute the status `trigger` leads to from `current`.
///
/// Total over every `(status, trigger)` pair: undefined pairs fail with
/// [`LifecycleError::InvalidTransition`], defined pairs whose guard does not
/// hold fail with [`LifecycleError::GuardNotSatisfied`].
pub fn next_state(
    current: MemberStatus,
    trigger: LifecycleTrigger,
    guards: &GuardInputs,
) -> Result<MemberStatus, LifecycleError> {
    let to = trigger.target();
    if !is_defined(current, trigger) {
        return Err(LifecycleError::InvalidTransition { from: current, to });
    }

    let unmet = |guard| LifecycleError::GuardNotSatisfied { from: current, to, guard };

    match trigger {
        LifecycleTrigger::Approve => {
            if guards.registration_number.is_none() {
                return Err(unmet("a registration number"));
            }
            if !guards.board_decision.as_ref().is_some_and(BoardDecision::is_complete) {
                return Err(unmet("board decision metadata"));
            }
        }
        LifecycleTrigger::Reject => {
            if !guards
                .rejection_reason
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty())
            {
                return Err(unmet("a non-empty rejection reason"));
            }
        }
        LifecycleTrigger::Activate => {
            if !guards.has_unit_assignment {
                return Err(unmet("a unit assignment"));
            }
        }
        LifecycleTrigger::Deactivate | LifecycleTrigger::Cancel => {}
    }

    Ok(to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decision() -> BoardDecision {
        BoardDecision::new("2024/17", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    fn full_guards() -> GuardInputs {
        GuardInputs {
            registration_number: Some(RegistrationNumber::new("R-001").unwrap()),
            board_decision: Some(decision()),
            rejection_reason: Some("incomplete documents".to_string()),
            has_unit_assignment: true,
        }
    }

    #[test]
    fn approval_requires_registration_and_board_decision() {
        let missing = GuardInputs::none();
        assert!(matches!(
            next_state(MemberStatus::Pending, LifecycleTrigger::Approve, &missing),
            Err(LifecycleError::GuardNotSatisfied { guard: "a registration number", .. })
        ));

        let no_board = GuardInputs {
            registration_number: Some(RegistrationNumber::new("R-9").unwrap()),
            ..GuardInputs::none()
        };
        assert!(matches!(
            next_state(MemberStatus::Pending, LifecycleTrigger::Approve, &no_board),
            Err(LifecycleError::GuardNotSatisfied { guard: "board decision metadata", .. })
        ));

        let ok = GuardInputs::approval(RegistrationNumber::new("R-9").unwrap(), decision());
        assert_eq!(
            next_state(MemberStatus::Pending, LifecycleTrigger::Approve, &ok),
            Ok(MemberStatus::Approved)
        );
    }

    #[test]
    fn rejection_requires_reason() {
        let blank = GuardInputs::rejection("   ");
        assert!(next_state(MemberStatus::Pending, LifecycleTrigger::Reject, &blank).is_err());
        assert_eq!(
            next_state(MemberStatus::Pending, LifecycleTrigger::Reject, &GuardInputs::rejection("duplicate")),
            Ok(MemberStatus::Rejected)
        );
    }

    #[test]
    fn activation_requires_unit() {
        let guards = GuardInputs::none();
        assert!(next_state(MemberStatus::Approved, LifecycleTrigger::Activate, &guards).is_err());
        let guards = guards.with_unit_assignment(true);
        assert_eq!(
            next_state(MemberStatus::Active, LifecycleTrigger::Activate, &guards),
            Ok(MemberStatus::Active)
        );
    }

    #[test]
    fn cancelling_resigned_member_is_invalid() {
        assert_eq!(
            next_state(MemberStatus::Resigned, LifecycleTrigger::Cancel, &GuardInputs::none()),
            Err(LifecycleError::InvalidTransition {
                from: MemberStatus::Resigned,
                to: MemberStatus::Resigned
            })
        );
    }

    #[test]
    fn inactive_member_cannot_be_deactivated_again() {
        assert!(next_state(MemberStatus::Inactive, LifecycleTrigger::Deactivate, &GuardInputs::none()).is_err());
    }

    #[test]
    fn registration_number_is_trimmed_and_required() {
        assert!(RegistrationNumber::new("  ").is_err());
        assert_eq!(RegistrationNumber::new(" R-1 ").unwrap().as_str(), "R-1");
    }

    #[test]
    fn status_parses_storage_tag() {
        for st in MemberStatus::ALL {
            assert_eq!(st.as_str().parse::<MemberStatus>(), Ok(st));
        }
        assert!("ARCHIVED".parse::<MemberStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = MemberStatus> {
        prop::sample::select(MemberStatus::ALL.to_vec())
    }

    fn any_trigger() -> impl Strategy<Value = LifecycleTrigger> {
        prop::sample::select(LifecycleTrigger::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: with every guard satisfied, `next_state` succeeds exactly on
        /// table entries and returns the listed target.
        #[test]
        fn next_state_is_total_over_table(from in any_status(), trigger in any_trigger()) {
            let result = next_state(from, trigger, &full_guards());
            if is_defined(from, trigger) {
                prop_assert_eq!(result, Ok(trigger.target()));
            } else {
                let is_invalid = matches!(result, Err(LifecycleError::InvalidTransition { .. }));
                prop_assert!(is_invalid);
            }
        }

        /// Property: identical inputs give identical outputs.
        #[test]
        fn next_state_is_deterministic(from in any_status(), trigger in any_trigger(), unit in any::<bool>()) {
            let guards = GuardInputs::none().with_unit_assignment(unit);
            prop_assert_eq!(next_state(from, trigger, &guards), next_state(from, trigger, &guards));
        }

        /// Property: terminal statuses admit no transitions at all.
        #[test]
        fn terminal_states_are_absorbing(trigger in any_trigger()) {
            for from in [MemberStatus::Resigned, MemberStatus::Rejected] {
                let is_invalid = matches!(
                    next_state(from, trigger, &full_guards()),
                    Err(LifecycleError::InvalidTransition { .. })
                );
                prop_assert!(is_invalid);
            }
        }
    }
}
