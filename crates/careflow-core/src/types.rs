//! Domain enums shared across the sync engine and the workflow state machine.

use serde::{Deserialize, Serialize};

/// Fine-grained lifecycle state of a clinical session.
///
/// `New` is the only initial state and `Closed` is terminal. The legal
/// transition table lives in [`WorkflowState::allowed_transitions`]; every
/// other component (guards, services, exported workflow configuration)
/// derives from it rather than duplicating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Session created, not yet triaged.
    New,
    /// Triage assessment recorded.
    Triaged,
    /// Responsibility handed to another actor or role.
    Referred,
    /// Referral accepted; under specialist review.
    InReview,
    /// Treatment in progress.
    UnderTreatment,
    /// Session closed. Terminal.
    Closed,
}

impl WorkflowState {
    /// All states, in lifecycle order.
    pub const ALL: [WorkflowState; 6] = [
        Self::New,
        Self::Triaged,
        Self::Referred,
        Self::InReview,
        Self::UnderTreatment,
        Self::Closed,
    ];

    /// The initial state for a fresh session.
    #[must_use]
    pub fn initial() -> Self {
        Self::New
    }

    /// The set of states this state may legally transition to.
    ///
    /// This slice is the single source of truth for the transition table.
    #[must_use]
    pub fn allowed_transitions(&self) -> &'static [WorkflowState] {
        match self {
            Self::New => &[Self::Triaged],
            Self::Triaged => &[Self::Referred, Self::UnderTreatment, Self::Closed],
            Self::Referred => &[Self::InReview, Self::Closed],
            Self::InReview => &[Self::UnderTreatment, Self::Referred, Self::Closed],
            Self::UnderTreatment => &[Self::Closed, Self::InReview],
            Self::Closed => &[],
        }
    }

    /// Check if a transition from this state to `target` is legal.
    ///
    /// Pure table lookup; a state is never allowed to transition to itself.
    #[must_use]
    pub fn can_transition_to(&self, target: WorkflowState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Check if this is a terminal state (no outgoing transitions).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Triaged => "triaged",
            Self::Referred => "referred",
            Self::InReview => "in_review",
            Self::UnderTreatment => "under_treatment",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(Self::New),
            "triaged" => Ok(Self::Triaged),
            "referred" => Ok(Self::Referred),
            "in_review" | "in-review" => Ok(Self::InReview),
            "under_treatment" | "under-treatment" => Ok(Self::UnderTreatment),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown workflow state: {s}")),
        }
    }
}

/// Coarse lifecycle phase of a clinical session.
///
/// Distinct from [`WorkflowState`]: the stage is a reporting bucket set by
/// the producing client, not a machine-enforced state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    /// Patient registered, visit not yet assessed.
    Registration,
    /// Clinical assessment underway.
    Assessment,
    /// Treatment being delivered.
    Treatment,
    /// Visit wrapped up.
    Discharge,
}

impl SessionStage {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Assessment => "assessment",
            Self::Treatment => "treatment",
            Self::Discharge => "discharge",
        }
    }
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "registration" => Ok(Self::Registration),
            "assessment" => Ok(Self::Assessment),
            "treatment" => Ok(Self::Treatment),
            "discharge" => Ok(Self::Discharge),
            _ => Err(format!("Unknown session stage: {s}")),
        }
    }
}

/// Triage severity, ordered so that `Red` compares greatest.
///
/// Variant order matters: it is the severity order used when comparing
/// priorities (`Red > Yellow > Green > Unknown`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriagePriority {
    /// Priority not reported or unrecognised.
    Unknown,
    /// Routine case.
    Green,
    /// Needs attention soon.
    Yellow,
    /// Emergency.
    Red,
}

impl TriagePriority {
    /// Check if this priority marks an emergency case.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Red)
    }

    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

impl std::fmt::Display for TriagePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TriagePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Older producers report severity words rather than colours.
        match s.to_lowercase().as_str() {
            "red" | "high" | "emergency" => Ok(Self::Red),
            "yellow" | "medium" | "urgent" => Ok(Self::Yellow),
            "green" | "low" | "routine" => Ok(Self::Green),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown triage priority: {s}")),
        }
    }
}

/// Status of a referral.
///
/// A referral is a sub-state-machine mirroring the session-level
/// `Referred -> InReview / Closed` transitions: it is created pending,
/// concluded by accept/reject, and never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    /// Awaiting a decision from the assignee.
    Pending,
    /// Accepted; the session moved into review.
    Accepted,
    /// Rejected; the session was closed back.
    Rejected,
    /// Review finished and the referral fulfilled.
    Completed,
    /// Withdrawn before a decision.
    Cancelled,
}

impl ReferralStatus {
    /// Check if a transition from this status to `target` is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: ReferralStatus) -> bool {
        match (self, target) {
            (Self::Pending, Self::Accepted | Self::Rejected | Self::Cancelled) => true,
            (Self::Accepted, Self::Completed | Self::Cancelled) => true,
            _ => false,
        }
    }

    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }

    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReferralStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown referral status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_transition_table() {
        assert!(WorkflowState::New.can_transition_to(WorkflowState::Triaged));
        assert!(WorkflowState::Triaged.can_transition_to(WorkflowState::Referred));
        assert!(WorkflowState::Triaged.can_transition_to(WorkflowState::UnderTreatment));
        assert!(WorkflowState::Triaged.can_transition_to(WorkflowState::Closed));
        assert!(WorkflowState::Referred.can_transition_to(WorkflowState::InReview));
        assert!(WorkflowState::InReview.can_transition_to(WorkflowState::Referred));
        assert!(WorkflowState::UnderTreatment.can_transition_to(WorkflowState::InReview));

        assert!(!WorkflowState::New.can_transition_to(WorkflowState::Closed));
        assert!(!WorkflowState::New.can_transition_to(WorkflowState::UnderTreatment));
        assert!(!WorkflowState::Referred.can_transition_to(WorkflowState::UnderTreatment));
    }

    #[test]
    fn test_closed_is_terminal() {
        assert!(WorkflowState::Closed.is_terminal());
        for target in WorkflowState::ALL {
            assert!(!WorkflowState::Closed.can_transition_to(target));
        }
    }

    #[test]
    fn test_no_state_transitions_to_itself() {
        for state in WorkflowState::ALL {
            assert!(!state.can_transition_to(state), "{state} allows a self-loop");
        }
    }

    #[test]
    fn test_workflow_state_roundtrip() {
        for state in WorkflowState::ALL {
            let parsed: WorkflowState = state.as_str().parse().unwrap();
            assert_eq!(state, parsed);
        }
        assert!("closing".parse::<WorkflowState>().is_err());
    }

    #[test]
    fn test_triage_priority_ordering() {
        assert!(TriagePriority::Red > TriagePriority::Yellow);
        assert!(TriagePriority::Yellow > TriagePriority::Green);
        assert!(TriagePriority::Green > TriagePriority::Unknown);
        assert!(TriagePriority::Red.is_critical());
        assert!(!TriagePriority::Yellow.is_critical());
    }

    #[test]
    fn test_triage_priority_legacy_aliases() {
        assert_eq!("HIGH".parse::<TriagePriority>(), Ok(TriagePriority::Red));
        assert_eq!("urgent".parse::<TriagePriority>(), Ok(TriagePriority::Yellow));
        assert_eq!("routine".parse::<TriagePriority>(), Ok(TriagePriority::Green));
        assert!("purple".parse::<TriagePriority>().is_err());
    }

    #[test]
    fn test_referral_sub_machine() {
        assert!(ReferralStatus::Pending.can_transition_to(ReferralStatus::Accepted));
        assert!(ReferralStatus::Pending.can_transition_to(ReferralStatus::Rejected));
        assert!(ReferralStatus::Accepted.can_transition_to(ReferralStatus::Completed));
        assert!(!ReferralStatus::Rejected.can_transition_to(ReferralStatus::Accepted));
        assert!(!ReferralStatus::Completed.can_transition_to(ReferralStatus::Pending));
        assert!(ReferralStatus::Rejected.is_terminal());
        assert!(!ReferralStatus::Pending.is_terminal());
    }

    #[test]
    fn test_session_stage_roundtrip() {
        for stage in [
            SessionStage::Registration,
            SessionStage::Assessment,
            SessionStage::Treatment,
            SessionStage::Discharge,
        ] {
            let parsed: SessionStage = stage.as_str().parse().unwrap();
            assert_eq!(stage, parsed);
        }
    }
}
