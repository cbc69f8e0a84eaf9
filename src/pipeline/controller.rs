//! Pipeline controller: gate, branch, fan-out, assembly and handoff.
//!
//! One call to [`PipelineController::run`] drives a single [`PipelineRun`]
//! through its state machine:
//!
//! ```text
//! Init -> GateRunning -> GateRejected -> RescueRunning -> RejectedComplete
//!                     \-> GateAccepted -> FanoutRunning -> Assembling -> ApprovedComplete
//! ```
//!
//! Any fatal error (gate failure, ledger refusal) moves the run to `Failed`
//! and emits a single `error` event. Failed runs are not persisted.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::config::{ConfigError, PipelineConfig};
use super::events::{ProgressEmitter, ProgressEvent};
use super::fanout::{fan_out3, StageSlot};
use super::report::VerdictReport;
use super::stage::{RetryPolicy, StageError, StageExecutor, StageTag};
use super::state::{PipelineRun, RunState, StageResult, StateError};
use crate::llm::LlmProvider;
use crate::research::{self, ResearchProvider};
use crate::stages::{
    competition_queries, finance_queries, gate_queries, Blueprint, BlueprintSpec,
    CompetitionAnalysis, CompetitionSpec, FinanceReport, FinanceSpec, GateSpec, RescuePlan,
    RescueSpec, StageContext,
};
use crate::storage::{LedgerError, NoopIndex, RunStore, SecondaryIndex, UsageLedger};

/// Default output language.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Maximum accepted idea length, in characters.
pub const MAX_IDEA_CHARS: usize = 5_000;

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// A request to evaluate one idea.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunRequest {
    pub idea: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl RunRequest {
    pub fn new(idea: impl Into<String>) -> Self {
        Self {
            idea: idea.into(),
            account_id: None,
            language: default_language(),
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Checks the request before a run is created.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let idea = self.idea.trim();
        if idea.is_empty() {
            return Err(PipelineError::InvalidRequest("idea must not be empty".to_string()));
        }
        if idea.chars().count() > MAX_IDEA_CHARS {
            return Err(PipelineError::InvalidRequest(format!(
                "idea exceeds {} characters",
                MAX_IDEA_CHARS
            )));
        }
        if self.language.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("language must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Errors that end a run in the `Failed` state.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Gate analysis failed: {0}")]
    Gate(#[source] StageError),

    #[error("Usage ledger refused the run: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Illegal run state change: {0}")]
    State(#[from] StateError),

    #[error("Report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Drives runs against the configured collaborators.
pub struct PipelineController {
    llm: Arc<dyn LlmProvider>,
    research: Arc<dyn ResearchProvider>,
    store: Arc<dyn RunStore>,
    index: Arc<dyn SecondaryIndex>,
    ledger: Option<Arc<dyn UsageLedger>>,
    config: PipelineConfig,
}

impl PipelineController {
    /// Creates a controller with no secondary index and no ledger.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        research: Arc<dyn ResearchProvider>,
        store: Arc<dyn RunStore>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            llm,
            research,
            store,
            index: Arc::new(NoopIndex),
            ledger: None,
            config,
        })
    }

    pub fn with_index(mut self, index: Arc<dyn SecondaryIndex>) -> Self {
        self.index = index;
        self
    }

    /// Charges accepted runs against `ledger` when the config enables it.
    pub fn with_ledger(mut self, ledger: Arc<dyn UsageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_retries, self.config.backoff_unit)
    }

    /// Starts a run on a detached task.
    ///
    /// Dropping the receiver does not cancel the run; it still completes and
    /// persists.
    pub fn spawn(
        self: &Arc<Self>,
        request: RunRequest,
    ) -> (
        mpsc::UnboundedReceiver<ProgressEvent>,
        JoinHandle<Result<PipelineRun, PipelineError>>,
    ) {
        let (emitter, rx) = ProgressEmitter::channel();
        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move { controller.run(request, emitter).await });
        (rx, handle)
    }

    /// Runs one idea to a terminal state.
    ///
    /// On success the terminal run is returned after the `complete` event
    /// was emitted and the run handed to the store.
    pub async fn run(
        &self,
        request: RunRequest,
        emitter: ProgressEmitter,
    ) -> Result<PipelineRun, PipelineError> {
        if let Err(err) = request.validate() {
            emitter.fail(err.to_string());
            return Err(err);
        }

        let mut run = PipelineRun::new(request.idea.trim(), request.account_id.clone());
        let span = tracing::info_span!("run", run_id = %run.id());

        let outcome = self
            .drive(&mut run, &request, &emitter)
            .instrument(span.clone())
            .await;

        match outcome {
            Ok(report) => {
                emitter.complete(report);
                self.hand_off(&run).instrument(span).await;
                Ok(run)
            }
            Err(err) => {
                span.in_scope(|| {
                    tracing::error!(state = %run.state(), error = %err, "Run failed");
                });
                run.fail(err.to_string());
                emitter.fail(err.to_string());
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        request: &RunRequest,
        emitter: &ProgressEmitter,
    ) -> Result<Value, PipelineError> {
        let ctx = StageContext::from_config(&request.idea, &request.language, &self.config);
        let executor = StageExecutor::new(self.llm.as_ref(), self.retry_policy(), emitter.clone());

        tracing::info!(account = ?run.account_id(), "Run started");
        run.transition(RunState::GateRunning)?;
        emitter.log("Researching market size, trends and audience");

        let research = research::gather(
            self.research.as_ref(),
            &gate_queries(&ctx.idea, self.config.results_per_query),
        )
        .await;
        let gate = GateSpec::new(ctx.clone(), research, self.config.match_mode);
        let verdict = executor.run(&gate).await.map_err(PipelineError::Gate)?;

        let score = verdict.opportunity_score;
        run.set_gate_score(score)?;
        run.record(StageTag::Gate, StageResult::Success(serde_json::to_value(&verdict)?))?;
        emitter.log(format!(
            "Opportunity score {}/100 ({} confidence)",
            score, verdict.confidence
        ));

        let report = if score.value() < self.config.gate_threshold {
            tracing::info!(score = score.value(), "Idea rejected at gate");
            run.transition(RunState::GateRejected)?;
            run.transition(RunState::RescueRunning)?;

            let spec = RescueSpec::new(
                ctx.clone(),
                score,
                &verdict.dimensions,
                self.config.rescue_focus_dimensions,
            );
            let plan = match executor.run(&spec).await {
                Ok(plan) => {
                    run.record(StageTag::Rescue, StageResult::Success(serde_json::to_value(&plan)?))?;
                    plan
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Rescue stage failed, using default plan");
                    emitter.log("Rescue plan unavailable, using default recommendations");
                    run.record(
                        StageTag::Rescue,
                        StageResult::from_slot(&StageSlot::<RescuePlan>::from(Err(err))),
                    )?;
                    RescuePlan::fallback()
                }
            };
            for tag in StageTag::FANOUT {
                run.record(tag, StageResult::Skipped)?;
            }

            let report = serde_json::to_value(VerdictReport::rejected(run, verdict, plan))?;
            run.complete(RunState::RejectedComplete, report.clone())?;
            report
        } else {
            tracing::info!(score = score.value(), "Idea accepted at gate");
            run.transition(RunState::GateAccepted)?;
            self.charge(run).await?;

            run.transition(RunState::FanoutRunning)?;
            emitter.log("Running competition, finance and blueprint analyses");

            let (competition, finance, blueprint) = fan_out3(
                self.competition_stage(&executor, &ctx),
                self.finance_stage(&executor, &ctx),
                self.blueprint_stage(&executor, &ctx),
            )
            .await;

            run.record(StageTag::Competition, StageResult::from_slot(&competition))?;
            run.record(StageTag::Finance, StageResult::from_slot(&finance))?;
            run.record(StageTag::Blueprint, StageResult::from_slot(&blueprint))?;

            run.transition(RunState::Assembling)?;
            let assembled = VerdictReport::approved(
                run,
                verdict,
                competition.success(),
                finance.success(),
                blueprint.success(),
            );
            tracing::info!(
                sections = assembled.sections.present_count(),
                "Approved report assembled"
            );

            let report = serde_json::to_value(assembled)?;
            run.complete(RunState::ApprovedComplete, report.clone())?;
            report
        };

        Ok(report)
    }

    /// Charges the run's account once, before fan-out.
    async fn charge(&self, run: &PipelineRun) -> Result<(), PipelineError> {
        if !self.config.ledger_enabled {
            return Ok(());
        }
        let (Some(ledger), Some(account)) = (self.ledger.as_ref(), run.account_id()) else {
            return Ok(());
        };
        ledger.charge(account, self.config.credits_per_run).await?;
        tracing::debug!(account, credits = self.config.credits_per_run, "Run charged");
        Ok(())
    }

    async fn competition_stage(
        &self,
        executor: &StageExecutor<'_>,
        ctx: &StageContext,
    ) -> Result<CompetitionAnalysis, StageError> {
        let research = research::gather(
            self.research.as_ref(),
            &competition_queries(&ctx.idea, self.config.results_per_query),
        )
        .await;
        executor.run(&CompetitionSpec::new(ctx.clone(), research)).await
    }

    async fn finance_stage(
        &self,
        executor: &StageExecutor<'_>,
        ctx: &StageContext,
    ) -> Result<FinanceReport, StageError> {
        let research = research::gather(
            self.research.as_ref(),
            &finance_queries(&ctx.idea, self.config.results_per_query),
        )
        .await;
        executor.run(&FinanceSpec::new(ctx.clone(), research)).await
    }

    async fn blueprint_stage(
        &self,
        executor: &StageExecutor<'_>,
        ctx: &StageContext,
    ) -> Result<Blueprint, StageError> {
        executor.run(&BlueprintSpec::new(ctx.clone())).await
    }

    /// Persists a terminal run and indexes it. Neither failure affects the
    /// already emitted result.
    async fn hand_off(&self, run: &PipelineRun) {
        match self.store.save_run(run).await {
            Ok(()) => tracing::info!(state = %run.state(), "Run persisted"),
            Err(e) => tracing::error!(error = %e, "Failed to persist run"),
        }
        if let Err(e) = self.index.index_run(run).await {
            tracing::warn!(error = %e, "Secondary indexing failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: RunRequest = serde_json::from_str(r#"{"idea": "Solar kiosks"}"#).unwrap();
        assert_eq!(request.language, "en");
        assert_eq!(request.account_id, None);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        assert!(matches!(
            RunRequest::new("   ").validate(),
            Err(PipelineError::InvalidRequest(_))
        ));
        assert!(matches!(
            RunRequest::new("x".repeat(MAX_IDEA_CHARS + 1)).validate(),
            Err(PipelineError::InvalidRequest(_))
        ));
        assert!(RunRequest::new("ok").with_language("").validate().is_err());
        assert_eq!(
            RunRequest::new("ok").with_account("acct").account_id.as_deref(),
            Some("acct")
        );
    }
}
