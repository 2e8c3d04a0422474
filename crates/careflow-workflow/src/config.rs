//! Workflow configuration: reason requirements and the exported snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use careflow_core::WorkflowState;

use crate::error::WorkflowError;

/// Which transitions require a justification, and the reason vocabulary
/// offered for each pair.
///
/// The default policy requires a reason for every transition into the
/// referred or closed state. The vocabulary is UI guidance: a supplied
/// reason outside it is accepted, only a missing reason on a required pair
/// is a validation failure.
#[derive(Debug, Clone)]
pub struct ReasonPolicy {
    required: HashSet<(WorkflowState, WorkflowState)>,
    vocabulary: HashMap<(WorkflowState, WorkflowState), Vec<String>>,
}

impl Default for ReasonPolicy {
    fn default() -> Self {
        let mut policy = Self::empty();
        for from in WorkflowState::ALL {
            for to in from.allowed_transitions() {
                if matches!(to, WorkflowState::Referred | WorkflowState::Closed) {
                    policy.required.insert((from, *to));
                }
            }
        }
        policy
            .set_vocabulary(
                WorkflowState::Triaged,
                WorkflowState::Referred,
                ["specialist_required", "critical_triage"],
            )
            .set_vocabulary(
                WorkflowState::InReview,
                WorkflowState::Referred,
                ["specialist_required", "second_opinion"],
            )
            .set_vocabulary(
                WorkflowState::Triaged,
                WorkflowState::Closed,
                ["treatment_not_required", "patient_declined"],
            )
            .set_vocabulary(
                WorkflowState::Referred,
                WorkflowState::Closed,
                ["referral_rejected", "patient_declined"],
            )
            .set_vocabulary(
                WorkflowState::InReview,
                WorkflowState::Closed,
                ["review_concluded", "patient_declined"],
            )
            .set_vocabulary(
                WorkflowState::UnderTreatment,
                WorkflowState::Closed,
                ["treatment_completed", "patient_declined"],
            )
    }
}

impl ReasonPolicy {
    /// A policy with no required pairs and no vocabulary.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            required: HashSet::new(),
            vocabulary: HashMap::new(),
        }
    }

    /// Mark a pair as reason-required.
    #[must_use]
    pub fn require(mut self, from: WorkflowState, to: WorkflowState) -> Self {
        self.required.insert((from, to));
        self
    }

    /// Set the reason vocabulary for a pair.
    #[must_use]
    pub fn set_vocabulary<I, S>(mut self, from: WorkflowState, to: WorkflowState, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vocabulary.insert(
            (from, to),
            reasons.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Check if the pair requires a non-empty reason.
    #[must_use]
    pub fn is_required(&self, from: WorkflowState, to: WorkflowState) -> bool {
        self.required.contains(&(from, to))
    }

    /// The configured reason vocabulary for a pair. Empty means the reason
    /// is free-form (or optional, if the pair is not required).
    #[must_use]
    pub fn valid_reasons(&self, from: WorkflowState, to: WorkflowState) -> &[String] {
        self.vocabulary
            .get(&(from, to))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Validate a transition request against the table and this policy.
    pub fn validate(
        &self,
        from: WorkflowState,
        to: WorkflowState,
        reason: Option<&str>,
    ) -> Result<(), WorkflowError> {
        if !from.can_transition_to(to) {
            return Err(WorkflowError::InvalidTransition { from, to });
        }
        if self.is_required(from, to) && reason.map(str::trim).is_none_or(str::is_empty) {
            return Err(WorkflowError::ReasonRequired { from, to });
        }
        Ok(())
    }
}

/// Read-only workflow configuration exported to external collaborators, so
/// UI layers can render legal next actions without duplicating the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Every workflow state, in lifecycle order.
    pub states: Vec<WorkflowState>,
    /// Legal transitions: from-state to its allowed targets.
    pub transitions: BTreeMap<String, Vec<String>>,
    /// Reason vocabulary per "from->to" pair. Absent pair = reason optional.
    pub transition_reasons: BTreeMap<String, Vec<String>>,
}

impl WorkflowConfig {
    /// Build the snapshot from the state enum's own transition table plus a
    /// reason policy.
    #[must_use]
    pub fn snapshot(policy: &ReasonPolicy) -> Self {
        let mut transitions = BTreeMap::new();
        let mut transition_reasons = BTreeMap::new();
        for from in WorkflowState::ALL {
            transitions.insert(
                from.to_string(),
                from.allowed_transitions()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            );
            for to in from.allowed_transitions() {
                let reasons = policy.valid_reasons(from, *to);
                if !reasons.is_empty() {
                    transition_reasons.insert(format!("{from}->{to}"), reasons.to_vec());
                }
            }
        }
        Self {
            states: WorkflowState::ALL.to_vec(),
            transitions,
            transition_reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_requires_referred_and_closed() {
        let policy = ReasonPolicy::default();
        assert!(policy.is_required(WorkflowState::Triaged, WorkflowState::Referred));
        assert!(policy.is_required(WorkflowState::Triaged, WorkflowState::Closed));
        assert!(policy.is_required(WorkflowState::UnderTreatment, WorkflowState::Closed));
        assert!(!policy.is_required(WorkflowState::New, WorkflowState::Triaged));
        assert!(!policy.is_required(WorkflowState::Referred, WorkflowState::InReview));
    }

    #[test]
    fn test_validate_rejects_illegal_pair() {
        let policy = ReasonPolicy::default();
        let err = policy
            .validate(WorkflowState::New, WorkflowState::Closed, Some("because"))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn test_validate_rejects_blank_reason() {
        let policy = ReasonPolicy::default();
        for reason in [None, Some(""), Some("   ")] {
            let err = policy
                .validate(WorkflowState::Triaged, WorkflowState::Closed, reason)
                .unwrap_err();
            assert!(matches!(err, WorkflowError::ReasonRequired { .. }));
        }
        policy
            .validate(
                WorkflowState::Triaged,
                WorkflowState::Closed,
                Some("patient_declined"),
            )
            .unwrap();
    }

    #[test]
    fn test_reason_outside_vocabulary_is_accepted() {
        let policy = ReasonPolicy::default();
        policy
            .validate(
                WorkflowState::Triaged,
                WorkflowState::Closed,
                Some("duplicate registration"),
            )
            .unwrap();
    }

    #[test]
    fn test_custom_policy() {
        let policy = ReasonPolicy::empty()
            .require(WorkflowState::New, WorkflowState::Triaged)
            .set_vocabulary(
                WorkflowState::New,
                WorkflowState::Triaged,
                ["assessment_completed"],
            );
        assert!(policy.is_required(WorkflowState::New, WorkflowState::Triaged));
        assert!(!policy.is_required(WorkflowState::Triaged, WorkflowState::Closed));
        assert_eq!(
            policy.valid_reasons(WorkflowState::New, WorkflowState::Triaged),
            ["assessment_completed".to_string()]
        );
    }

    #[test]
    fn test_snapshot_shape() {
        let config = WorkflowConfig::snapshot(&ReasonPolicy::default());
        assert_eq!(config.states.len(), 6);
        assert_eq!(
            config.transitions.get("new"),
            Some(&vec!["triaged".to_string()])
        );
        assert_eq!(config.transitions.get("closed"), Some(&Vec::new()));
        assert!(config.transition_reasons.contains_key("triaged->closed"));
        assert!(!config.transition_reasons.contains_key("new->triaged"));

        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("transitionReasons").is_some());
    }
}
