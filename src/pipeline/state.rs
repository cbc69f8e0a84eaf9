//! Run state machine and per-stage result slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::fanout::{StageFailure, StageSlot};
use super::stage::StageTag;
use crate::scoring::OpportunityScore;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    GateRunning,
    GateRejected,
    GateAccepted,
    RescueRunning,
    RejectedComplete,
    FanoutRunning,
    Assembling,
    ApprovedComplete,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::RejectedComplete | RunState::ApprovedComplete | RunState::Failed
        )
    }

    /// Whether `next` directly follows `self`.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (Init, GateRunning)
                | (GateRunning, GateRejected)
                | (GateRunning, GateAccepted)
                | (GateRejected, RescueRunning)
                | (RescueRunning, RejectedComplete)
                | (GateAccepted, FanoutRunning)
                | (FanoutRunning, Assembling)
                | (Assembling, ApprovedComplete)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::GateRunning => "gate_running",
            RunState::GateRejected => "gate_rejected",
            RunState::GateAccepted => "gate_accepted",
            RunState::RescueRunning => "rescue_running",
            RunState::RejectedComplete => "rejected_complete",
            RunState::FanoutRunning => "fanout_running",
            RunState::Assembling => "assembling",
            RunState::ApprovedComplete => "approved_complete",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by illegal run mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: RunState, to: RunState },

    #[error("Result for stage '{0}' already recorded")]
    SlotOccupied(StageTag),

    #[error("Run is already terminal ({0})")]
    Terminal(RunState),
}

/// Stored outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StageResult {
    Success(Value),
    Failure(StageFailure),
    Skipped,
}

impl StageResult {
    /// Converts a typed slot, serializing its payload.
    pub fn from_slot<T: Serialize>(slot: &StageSlot<T>) -> Self {
        match slot {
            StageSlot::Success(payload) => match serde_json::to_value(payload) {
                Ok(value) => StageResult::Success(value),
                Err(e) => StageResult::Failure(StageFailure {
                    kind: super::fanout::FailureKind::Validation,
                    message: format!("payload not serializable: {}", e),
                }),
            },
            StageSlot::Failure(failure) => StageResult::Failure(failure.clone()),
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            StageResult::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// One evaluation of a submitted idea.
///
/// Mutated only through its methods; once terminal it rejects every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    id: Uuid,
    idea_text: String,
    account_id: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    state: RunState,
    gate_score: Option<OpportunityScore>,
    stage_results: BTreeMap<StageTag, StageResult>,
    terminal_payload: Option<Value>,
    failure_reason: Option<String>,
}

impl PipelineRun {
    pub fn new(idea_text: impl Into<String>, account_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            idea_text: idea_text.into(),
            account_id,
            created_at: Utc::now(),
            completed_at: None,
            state: RunState::Init,
            gate_score: None,
            stage_results: BTreeMap::new(),
            terminal_payload: None,
            failure_reason: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn idea_text(&self) -> &str {
        &self.idea_text
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn gate_score(&self) -> Option<OpportunityScore> {
        self.gate_score
    }

    pub fn stage_results(&self) -> &BTreeMap<StageTag, StageResult> {
        &self.stage_results
    }

    pub fn stage_result(&self, tag: StageTag) -> Option<&StageResult> {
        self.stage_results.get(&tag)
    }

    pub fn terminal_payload(&self) -> Option<&Value> {
        self.terminal_payload.as_ref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Moves to `next` if the transition is legal.
    pub fn transition(&mut self, next: RunState) -> Result<(), StateError> {
        if self.state.is_terminal() {
            return Err(StateError::Terminal(self.state));
        }
        if !self.state.can_transition_to(next) {
            return Err(StateError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(run_id = %self.id, from = %self.state, to = %next, "Run transition");
        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Records the gate score. Write-once.
    pub fn set_gate_score(&mut self, score: OpportunityScore) -> Result<(), StateError> {
        self.ensure_mutable()?;
        if self.gate_score.is_some() {
            return Err(StateError::SlotOccupied(StageTag::Gate));
        }
        self.gate_score = Some(score);
        Ok(())
    }

    /// Records a stage result. Each slot is write-once.
    pub fn record(&mut self, tag: StageTag, result: StageResult) -> Result<(), StateError> {
        self.ensure_mutable()?;
        if self.stage_results.contains_key(&tag) {
            return Err(StateError::SlotOccupied(tag));
        }
        self.stage_results.insert(tag, result);
        Ok(())
    }

    /// Attaches the final payload and enters the terminal state `state`.
    pub fn complete(&mut self, state: RunState, payload: Value) -> Result<(), StateError> {
        self.ensure_mutable()?;
        if !matches!(state, RunState::ApprovedComplete | RunState::RejectedComplete) {
            return Err(StateError::IllegalTransition {
                from: self.state,
                to: state,
            });
        }
        self.transition(state)?;
        self.terminal_payload = Some(payload);
        Ok(())
    }

    /// Marks the run failed. No-op on an already terminal run.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.failure_reason = Some(reason.into());
        self.state = RunState::Failed;
        self.completed_at = Some(Utc::now());
    }

    fn ensure_mutable(&self) -> Result<(), StateError> {
        if self.state.is_terminal() {
            Err(StateError::Terminal(self.state))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fanout::FailureKind;
    use serde_json::json;

    fn accepted_run() -> PipelineRun {
        let mut run = PipelineRun::new("Marketplace for used lab equipment", None);
        run.transition(RunState::GateRunning).unwrap();
        run.transition(RunState::GateAccepted).unwrap();
        run
    }

    #[test]
    fn test_approve_path() {
        let mut run = accepted_run();
        run.transition(RunState::FanoutRunning).unwrap();
        run.transition(RunState::Assembling).unwrap();
        run.complete(RunState::ApprovedComplete, json!({"status": "approved"}))
            .unwrap();

        assert_eq!(run.state(), RunState::ApprovedComplete);
        assert!(run.completed_at().is_some());
        assert_eq!(run.terminal_payload(), Some(&json!({"status": "approved"})));
    }

    #[test]
    fn test_reject_path() {
        let mut run = PipelineRun::new("Another social network", Some("acct-1".to_string()));
        run.transition(RunState::GateRunning).unwrap();
        run.transition(RunState::GateRejected).unwrap();
        run.transition(RunState::RescueRunning).unwrap();
        run.complete(RunState::RejectedComplete, json!({})).unwrap();
        assert_eq!(run.state(), RunState::RejectedComplete);
        assert_eq!(run.account_id(), Some("acct-1"));
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let mut run = accepted_run();
        assert_eq!(
            run.transition(RunState::GateRunning),
            Err(StateError::IllegalTransition {
                from: RunState::GateAccepted,
                to: RunState::GateRunning,
            })
        );
        assert!(run.transition(RunState::RescueRunning).is_err());
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        for state in [
            RunState::Init,
            RunState::GateRunning,
            RunState::GateAccepted,
            RunState::FanoutRunning,
            RunState::Assembling,
            RunState::RescueRunning,
        ] {
            assert!(state.can_transition_to(RunState::Failed));
        }
        assert!(!RunState::ApprovedComplete.can_transition_to(RunState::Failed));
    }

    #[test]
    fn test_terminal_run_is_immutable() {
        let mut run = PipelineRun::new("idea", None);
        run.fail("gate exhausted");
        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(run.failure_reason(), Some("gate exhausted"));

        assert_eq!(
            run.record(StageTag::Gate, StageResult::Skipped),
            Err(StateError::Terminal(RunState::Failed))
        );
        run.fail("second reason");
        assert_eq!(run.failure_reason(), Some("gate exhausted"));
    }

    #[test]
    fn test_slots_are_write_once() {
        let mut run = accepted_run();
        run.record(StageTag::Finance, StageResult::Success(json!({"ok": 1})))
            .unwrap();
        assert_eq!(
            run.record(StageTag::Finance, StageResult::Skipped),
            Err(StateError::SlotOccupied(StageTag::Finance))
        );
        assert_eq!(
            run.stage_result(StageTag::Finance).and_then(|r| r.payload()),
            Some(&json!({"ok": 1}))
        );
    }

    #[test]
    fn test_result_from_slot() {
        let failure = StageFailure {
            kind: FailureKind::Transport,
            message: "quota".to_string(),
        };
        assert_eq!(
            StageResult::from_slot(&StageSlot::<u8>::Failure(failure.clone())),
            StageResult::Failure(failure)
        );
        assert_eq!(
            StageResult::from_slot(&StageSlot::Success(vec![1, 2])),
            StageResult::Success(json!([1, 2]))
        );
    }

    #[test]
    fn test_run_serde_roundtrip_preserves_state() {
        let mut run = accepted_run();
        run.record(StageTag::Blueprint, StageResult::Skipped).unwrap();
        let json = serde_json::to_string(&run).unwrap();
        let restored: PipelineRun = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, run);
    }
}
