//! The workflow service.
//!
//! Validated, transactional state transitions for clinical sessions. The
//! legal-transition table lives on [`WorkflowState`]; the service adds the
//! reason policy, the atomic audit-writing store call, referral side-table
//! bookkeeping, and the state-changed notification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument, warn};

use careflow_core::{Clock, ReferralStatus, SessionId, UserId, WorkflowState};
use careflow_events::{EventEnvelope, EventPublisher, SessionStateChanged};
use careflow_store::{
    ClinicalSession, NewReferral, ReferralStore, SessionStore, StateTransition, StoreError,
    TransitionWrite,
};

use crate::config::{ReasonPolicy, WorkflowConfig};
use crate::error::{Result, WorkflowError};

/// A request to move a session to a new workflow state.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    /// The session to transition.
    pub session_id: SessionId,
    /// The target state.
    pub to: WorkflowState,
    /// Justification. Required for reason-required pairs.
    pub reason: Option<String>,
    /// Free-form metadata recorded on the audit row.
    pub metadata: Option<Value>,
}

/// The workflow state machine service.
pub struct WorkflowService {
    sessions: Arc<dyn SessionStore>,
    referrals: Arc<dyn ReferralStore>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    reasons: ReasonPolicy,
}

impl WorkflowService {
    /// Create a service with the default reason policy.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        referrals: Arc<dyn ReferralStore>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            referrals,
            publisher,
            clock,
            reasons: ReasonPolicy::default(),
        }
    }

    /// Replace the reason policy.
    #[must_use]
    pub fn with_reason_policy(mut self, reasons: ReasonPolicy) -> Self {
        self.reasons = reasons;
        self
    }

    /// Check if `session` may legally transition to `to`.
    ///
    /// Pure table lookup; safe to call for UI hints without committing
    /// anything.
    #[must_use]
    pub fn can_transition(&self, session: &ClinicalSession, to: WorkflowState) -> bool {
        session.workflow_state.can_transition_to(to)
    }

    /// The legal next states for `session`.
    #[must_use]
    pub fn allowed_transitions(&self, session: &ClinicalSession) -> &'static [WorkflowState] {
        session.workflow_state.allowed_transitions()
    }

    /// The configured reason vocabulary for a pair. Empty = reason optional.
    #[must_use]
    pub fn valid_reasons(&self, from: WorkflowState, to: WorkflowState) -> &[String] {
        self.reasons.valid_reasons(from, to)
    }

    /// The read-only workflow configuration for external collaborators.
    #[must_use]
    pub fn config(&self) -> WorkflowConfig {
        WorkflowConfig::snapshot(&self.reasons)
    }

    /// The ordered audit trail for a session.
    pub async fn transition_history(&self, session_id: SessionId) -> Result<Vec<StateTransition>> {
        Ok(self.sessions.transition_history(session_id).await?)
    }

    /// Re-derive a session's workflow state by replaying its audit trail.
    ///
    /// Consistency check: for a session whose history was written by this
    /// service, the result equals the stored workflow state.
    pub async fn replay_state(&self, session_id: SessionId) -> Result<WorkflowState> {
        let history = self.sessions.transition_history(session_id).await?;
        let mut state = WorkflowState::initial();
        for transition in &history {
            if transition.from_state != state {
                warn!(
                    session_id = %session_id,
                    expected = %state,
                    recorded = %transition.from_state,
                    "Audit trail discontinuity during replay"
                );
            }
            state = transition.to_state;
        }
        Ok(state)
    }

    /// Execute a state transition.
    ///
    /// Validates against the legal-transition table and the reason policy,
    /// then writes the audit row and the session update in one atomic store
    /// call. A concurrent transition that wins the race surfaces as an
    /// illegal transition from the state the row actually holds.
    #[instrument(skip(self, request), fields(session_id = %request.session_id, to = %request.to))]
    pub async fn transition(
        &self,
        request: TransitionRequest,
        actor: Option<UserId>,
    ) -> Result<StateTransition> {
        let session = self
            .sessions
            .get_session(request.session_id)
            .await?
            .ok_or(WorkflowError::SessionNotFound {
                session_id: request.session_id,
            })?;
        let from = session.workflow_state;

        self.reasons
            .validate(from, request.to, request.reason.as_deref())?;

        let applied = match self
            .sessions
            .apply_transition(TransitionWrite {
                session_id: request.session_id,
                expected_from: from,
                to: request.to,
                actor_id: actor,
                reason: request.reason,
                metadata: request.metadata.clone(),
                occurred_at: self.clock.now(),
            })
            .await
        {
            Ok(applied) => applied,
            Err(StoreError::StaleState { actual, .. }) => {
                // The row moved between our read and the locked write; the
                // caller re-queries allowed transitions and retries.
                return Err(WorkflowError::InvalidTransition {
                    from: actual,
                    to: request.to,
                });
            }
            Err(other) => return Err(other.into()),
        };

        info!(
            from = %applied.transition.from_state,
            to = %applied.transition.to_state,
            actor = ?actor,
            "Session transitioned"
        );

        self.sync_referrals(&applied.session, &applied.transition)
            .await?;
        self.publish_state_changed(&applied.transition, actor).await;

        Ok(applied.transition)
    }

    /// Accept a pending referral: the session moves into review.
    pub async fn accept_referral(
        &self,
        session_id: SessionId,
        actor: Option<UserId>,
    ) -> Result<StateTransition> {
        self.transition(
            TransitionRequest {
                session_id,
                to: WorkflowState::InReview,
                reason: Some("referral_accepted".to_string()),
                metadata: None,
            },
            actor,
        )
        .await
    }

    /// Reject a pending referral: the session closes.
    pub async fn reject_referral(
        &self,
        session_id: SessionId,
        reason: Option<String>,
        actor: Option<UserId>,
    ) -> Result<StateTransition> {
        self.transition(
            TransitionRequest {
                session_id,
                to: WorkflowState::Closed,
                reason: Some(reason.unwrap_or_else(|| "referral_rejected".to_string())),
                metadata: None,
            },
            actor,
        )
        .await
    }

    /// Begin treatment.
    pub async fn start_treatment(
        &self,
        session_id: SessionId,
        actor: Option<UserId>,
    ) -> Result<StateTransition> {
        self.transition(
            TransitionRequest {
                session_id,
                to: WorkflowState::UnderTreatment,
                reason: Some("treatment_started".to_string()),
                metadata: None,
            },
            actor,
        )
        .await
    }

    /// Refer the session to a specialist.
    pub async fn request_specialist_referral(
        &self,
        session_id: SessionId,
        specialty: impl Into<String>,
        reason: Option<String>,
        actor: Option<UserId>,
    ) -> Result<StateTransition> {
        self.transition(
            TransitionRequest {
                session_id,
                to: WorkflowState::Referred,
                reason: Some(reason.unwrap_or_else(|| "specialist_required".to_string())),
                metadata: Some(serde_json::json!({ "specialty": specialty.into() })),
            },
            actor,
        )
        .await
    }

    /// Close the session.
    pub async fn close_session(
        &self,
        session_id: SessionId,
        reason: impl Into<String>,
        actor: Option<UserId>,
    ) -> Result<StateTransition> {
        self.transition(
            TransitionRequest {
                session_id,
                to: WorkflowState::Closed,
                reason: Some(reason.into()),
                metadata: None,
            },
            actor,
        )
        .await
    }

    /// Keep the referral sub-state-machine in step with the session-level
    /// transition that just committed.
    async fn sync_referrals(
        &self,
        session: &ClinicalSession,
        transition: &StateTransition,
    ) -> Result<()> {
        let now = session.state_updated_at;
        match (transition.from_state, session.workflow_state) {
            // Entering the referred state raises a pending referral.
            (_, WorkflowState::Referred) => {
                let specialty = transition
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("specialty"))
                    .and_then(Value::as_str)
                    .map(ToString::to_string);
                let referral = self
                    .referrals
                    .create_referral(NewReferral {
                        session_id: session.id,
                        priority: session.triage_priority,
                        specialty,
                        reason: transition.reason.clone(),
                        assigned_to: None,
                        created_at: now,
                    })
                    .await?;
                info!(
                    session_id = %session.id,
                    referral_id = %referral.id,
                    "Referral opened"
                );
            }
            (WorkflowState::Referred, WorkflowState::InReview) => {
                self.conclude_pending(session.id, ReferralStatus::Accepted, now)
                    .await?;
            }
            (WorkflowState::Referred, WorkflowState::Closed) => {
                self.conclude_pending(session.id, ReferralStatus::Rejected, now)
                    .await?;
            }
            // Closing a session fulfils any referral still accepted.
            (_, WorkflowState::Closed) => {
                self.complete_accepted(session.id, now).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn conclude_pending(
        &self,
        session_id: SessionId,
        status: ReferralStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(referral) = self.referrals.find_pending_referral(session_id).await? {
            if referral.status.can_transition_to(status) {
                self.referrals
                    .set_referral_status(referral.id, status, at)
                    .await?;
            }
        }
        Ok(())
    }

    async fn complete_accepted(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<()> {
        let accepted = self
            .referrals
            .list_referrals_for_session(session_id)
            .await?
            .into_iter()
            .find(|r| r.status == ReferralStatus::Accepted);
        if let Some(referral) = accepted {
            self.referrals
                .set_referral_status(referral.id, ReferralStatus::Completed, at)
                .await?;
        }
        Ok(())
    }

    /// Publish the state-changed notification. Delivery failure is logged,
    /// never surfaced: the transition has already committed and the core
    /// does not care who subscribes.
    async fn publish_state_changed(&self, transition: &StateTransition, actor: Option<UserId>) {
        let envelope = EventEnvelope::new(
            SessionStateChanged {
                session_id: transition.session_id,
                from_state: transition.from_state,
                to_state: transition.to_state,
            },
            actor,
            transition.occurred_at,
        );
        let raw = match envelope.into_raw() {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, "Failed to serialize state-changed event");
                return;
            }
        };
        if let Err(error) = self.publisher.publish(raw).await {
            warn!(%error, "Failed to publish state-changed event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use careflow_core::{FixedClock, PatientId, SessionStage, TriagePriority};
    use careflow_events::InMemoryPublisher;
    use careflow_store::{InMemoryStore, NewSession, SessionUpsert, SessionWrite};
    use chrono::TimeZone;

    struct Fixture {
        service: WorkflowService,
        store: Arc<InMemoryStore>,
        publisher: Arc<InMemoryPublisher>,
        clock: Arc<FixedClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        ));
        let service = WorkflowService::new(
            store.clone(),
            store.clone(),
            publisher.clone(),
            clock.clone(),
        );
        Fixture {
            service,
            store,
            publisher,
            clock,
        }
    }

    async fn fresh_session(store: &InMemoryStore) -> ClinicalSession {
        store
            .create_session(NewSession {
                patient_id: PatientId::new(),
                stage: SessionStage::Assessment,
                triage_priority: TriagePriority::Yellow,
                chief_complaint: Some("fever".into()),
                created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
            })
            .await
            .unwrap()
    }

    /// Place a session in an arbitrary state through the sync upsert path.
    async fn session_in_state(store: &InMemoryStore, state: WorkflowState) -> ClinicalSession {
        let write = store
            .upsert_session(SessionUpsert {
                doc_id: format!("doc-{state}"),
                patient_id: PatientId::new(),
                stage: None,
                reported_state: Some(state),
                triage_priority: TriagePriority::Green,
                chief_complaint: None,
                notes: None,
                treatment_plan: None,
                doc_created_at: None,
                doc_updated_at: None,
                observed_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
            })
            .await
            .unwrap();
        match write {
            SessionWrite::Created(session) => session,
            other => panic!("expected created session, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transition_closure() {
        let f = fixture();
        for from in WorkflowState::ALL {
            let session = session_in_state(&f.store, from).await;
            for to in WorkflowState::ALL {
                if from.allowed_transitions().contains(&to) {
                    assert!(f.service.can_transition(&session, to));
                    continue;
                }
                assert!(!f.service.can_transition(&session, to));

                let before = f.store.transition_count().await;
                let err = f
                    .service
                    .transition(
                        TransitionRequest {
                            session_id: session.id,
                            to,
                            reason: Some("anything".into()),
                            metadata: None,
                        },
                        None,
                    )
                    .await
                    .unwrap_err();
                assert!(
                    matches!(err, WorkflowError::InvalidTransition { .. }),
                    "{from} -> {to} must be invalid"
                );
                // No audit row and no state change.
                assert_eq!(f.store.transition_count().await, before);
                let unchanged = f.store.get_session(session.id).await.unwrap().unwrap();
                assert_eq!(unchanged.workflow_state, from);
            }
        }
    }

    #[tokio::test]
    async fn test_audit_replay_reproduces_state() {
        let f = fixture();
        let session = fresh_session(&f.store).await;

        let chain = [
            (WorkflowState::Triaged, None),
            (WorkflowState::Referred, Some("specialist_required")),
            (WorkflowState::InReview, None),
            (WorkflowState::UnderTreatment, None),
            (WorkflowState::Closed, Some("treatment_completed")),
        ];
        for (to, reason) in chain {
            f.clock.advance(chrono::Duration::minutes(5));
            f.service
                .transition(
                    TransitionRequest {
                        session_id: session.id,
                        to,
                        reason: reason.map(ToString::to_string),
                        metadata: None,
                    },
                    None,
                )
                .await
                .unwrap();
        }

        let history = f.service.transition_history(session.id).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(
            f.service.replay_state(session.id).await.unwrap(),
            WorkflowState::Closed
        );
        let stored = f.store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.workflow_state, WorkflowState::Closed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_reason_enforcement() {
        let f = fixture();
        let session = fresh_session(&f.store).await;
        f.service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Triaged,
                    reason: None,
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap();

        let err = f
            .service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Closed,
                    reason: None,
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ReasonRequired { .. }));

        f.service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Closed,
                    reason: Some("patient_declined".into()),
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_spec_scenario() {
        let f = fixture();
        let session = fresh_session(&f.store).await;

        // NEW -> TRIAGED succeeds with a reason.
        f.service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Triaged,
                    reason: Some("assessment_completed".into()),
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap();

        // TRIAGED -> CLOSED without a reason is rejected...
        let err = f
            .service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Closed,
                    reason: None,
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ReasonRequired { .. }));

        // ...and succeeds once a reason is supplied.
        f.service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Closed,
                    reason: Some("treatment_not_required".into()),
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap();

        // CLOSED is terminal.
        let err = f
            .service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::UnderTreatment,
                    reason: Some("reopen".into()),
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition {
                from: WorkflowState::Closed,
                to: WorkflowState::UnderTreatment,
            }
        ));
    }

    #[tokio::test]
    async fn test_referral_bookkeeping_through_lifecycle() {
        let f = fixture();
        let session = fresh_session(&f.store).await;
        let actor = UserId::new();

        f.service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Triaged,
                    reason: None,
                    metadata: None,
                },
                Some(actor),
            )
            .await
            .unwrap();

        f.service
            .request_specialist_referral(session.id, "cardiology", None, Some(actor))
            .await
            .unwrap();
        let referral = f
            .store
            .find_pending_referral(session.id)
            .await
            .unwrap()
            .expect("pending referral");
        assert_eq!(referral.specialty.as_deref(), Some("cardiology"));

        f.service
            .accept_referral(session.id, Some(actor))
            .await
            .unwrap();
        let accepted = f.store.get_referral(referral.id).await.unwrap().unwrap();
        assert_eq!(accepted.status, ReferralStatus::Accepted);

        f.service
            .start_treatment(session.id, Some(actor))
            .await
            .unwrap();
        f.service
            .close_session(session.id, "treatment_completed", Some(actor))
            .await
            .unwrap();

        let completed = f.store.get_referral(referral.id).await.unwrap().unwrap();
        assert_eq!(completed.status, ReferralStatus::Completed);
    }

    #[tokio::test]
    async fn test_reject_referral_closes_session() {
        let f = fixture();
        let session = fresh_session(&f.store).await;
        f.service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Triaged,
                    reason: None,
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap();
        f.service
            .request_specialist_referral(session.id, "dermatology", None, None)
            .await
            .unwrap();
        let referral = f
            .store
            .find_pending_referral(session.id)
            .await
            .unwrap()
            .unwrap();

        f.service
            .reject_referral(session.id, None, None)
            .await
            .unwrap();

        let stored = f.store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.workflow_state, WorkflowState::Closed);
        let rejected = f.store.get_referral(referral.id).await.unwrap().unwrap();
        assert_eq!(rejected.status, ReferralStatus::Rejected);
    }

    #[tokio::test]
    async fn test_state_changed_event_published() {
        let f = fixture();
        let session = fresh_session(&f.store).await;
        let actor = UserId::new();

        f.service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Triaged,
                    reason: None,
                    metadata: None,
                },
                Some(actor),
            )
            .await
            .unwrap();

        let events = f.publisher.published().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "careflow.session.state_changed");
        assert_eq!(events[0].actor_id, Some(actor));
        assert_eq!(events[0].payload["from_state"], "new");
        assert_eq!(events[0].payload["to_state"], "triaged");
    }

    #[tokio::test]
    async fn test_racing_transition_fails_cleanly() {
        let f = fixture();
        let session = fresh_session(&f.store).await;

        // Two callers validated against the same NEW snapshot; the second
        // re-reads the row and sees the state the first one committed.
        f.service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Triaged,
                    reason: None,
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap();

        let err = f
            .service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Triaged,
                    reason: None,
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition {
                from: WorkflowState::Triaged,
                to: WorkflowState::Triaged,
            }
        ));
        assert_eq!(f.store.transition_count().await, 1);
    }

    #[tokio::test]
    async fn test_custom_reason_policy() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        ));
        let service = WorkflowService::new(store.clone(), store.clone(), publisher, clock)
            .with_reason_policy(
                ReasonPolicy::empty().require(WorkflowState::New, WorkflowState::Triaged),
            );
        let session = fresh_session(&store).await;

        let err = service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Triaged,
                    reason: None,
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ReasonRequired { .. }));

        // With this policy, closing out of triage no longer needs a reason.
        service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Triaged,
                    reason: Some("assessment_completed".into()),
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap();
        service
            .transition(
                TransitionRequest {
                    session_id: session.id,
                    to: WorkflowState::Closed,
                    reason: None,
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_session() {
        let f = fixture();
        let err = f
            .service
            .transition(
                TransitionRequest {
                    session_id: SessionId::new(),
                    to: WorkflowState::Triaged,
                    reason: None,
                    metadata: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_allowed_transitions_and_config() {
        let f = fixture();
        let session = fresh_session(&f.store).await;
        assert_eq!(
            f.service.allowed_transitions(&session),
            &[WorkflowState::Triaged]
        );
        assert!(!f
            .service
            .valid_reasons(WorkflowState::Triaged, WorkflowState::Closed)
            .is_empty());
        let config = f.service.config();
        assert_eq!(config.states.len(), 6);
    }
}
