//! Stage execution with validation retries.
//!
//! A stage is one generation call followed by a structural validation of
//! its output. Validation failures are recoverable and retried with linear
//! backoff; a failure of the generation call itself is fatal to the stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::events::ProgressEmitter;
use crate::error::{LlmError, ValidationError};
use crate::llm::{GenerationRequest, LlmProvider};

/// Identifies a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTag {
    Gate,
    Rescue,
    Competition,
    Finance,
    Blueprint,
}

impl StageTag {
    /// The accept-branch stages, in report order.
    pub const FANOUT: [StageTag; 3] = [StageTag::Competition, StageTag::Finance, StageTag::Blueprint];

    pub fn as_str(self) -> &'static str {
        match self {
            StageTag::Gate => "gate",
            StageTag::Rescue => "rescue",
            StageTag::Competition => "competition",
            StageTag::Finance => "finance",
            StageTag::Blueprint => "blueprint",
        }
    }
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of one stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// Every attempt produced an invalid payload.
    #[error("{stage} stage failed validation after {attempts} attempts: {last}")]
    Exhausted {
        stage: StageTag,
        attempts: u32,
        last: ValidationError,
    },

    /// The stage inputs cannot produce a valid payload; nothing was generated.
    #[error("{stage} stage cannot start: {reason}")]
    Precondition {
        stage: StageTag,
        reason: ValidationError,
    },

    /// The generation call itself failed; never retried.
    #[error("{stage} stage generation failed: {source}")]
    Transport {
        stage: StageTag,
        #[source]
        source: LlmError,
    },
}

impl StageError {
    pub fn stage(&self) -> StageTag {
        match self {
            StageError::Exhausted { stage, .. }
            | StageError::Precondition { stage, .. }
            | StageError::Transport { stage, .. } => *stage,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, StageError::Transport { .. })
    }
}

/// Retry policy for validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first call included. Never below 1.
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

/// A stage definition: how to ask for a payload and how to check it.
pub trait StageSpec: Send + Sync {
    type Output: Serialize + Send;

    fn tag(&self) -> StageTag;

    /// Builds the generation request for `attempt` (1-based).
    fn request(&self, attempt: u32) -> GenerationRequest;

    /// Parses and checks the generated content.
    fn validate(&self, content: &str) -> Result<Self::Output, ValidationError>;

    /// Rejects inputs that no generated payload could satisfy.
    fn precheck(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Runs stages against a generation provider, emitting progress events.
pub struct StageExecutor<'a> {
    llm: &'a dyn LlmProvider,
    policy: RetryPolicy,
    emitter: ProgressEmitter,
}

impl<'a> StageExecutor<'a> {
    pub fn new(llm: &'a dyn LlmProvider, policy: RetryPolicy, emitter: ProgressEmitter) -> Self {
        Self {
            llm,
            policy,
            emitter,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn emitter(&self) -> &ProgressEmitter {
        &self.emitter
    }

    /// Runs a stage from a generation closure and a validator.
    ///
    /// Emits `StageStarted`, then `StageCompleted` with the validated payload
    /// or `StageFailed` with the reason.
    pub async fn execute<T, G, Fut, V>(
        &self,
        stage: StageTag,
        mut generate: G,
        mut validate: V,
    ) -> Result<T, StageError>
    where
        T: Serialize,
        G: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<String, LlmError>>,
        V: FnMut(&str) -> Result<T, ValidationError>,
    {
        self.emitter.stage_started(stage);
        let mut attempt = 1;

        loop {
            tracing::debug!(%stage, attempt, "Invoking generator");

            let content = match generate(attempt).await {
                Ok(content) => content,
                Err(source) => {
                    tracing::error!(%stage, attempt, error = %source, "Generation call failed");
                    self.emitter.stage_failed(stage, source.to_string());
                    return Err(StageError::Transport { stage, source });
                }
            };

            match validate(&content) {
                Ok(output) => {
                    tracing::info!(%stage, attempt, "Stage completed");
                    let payload = serde_json::to_value(&output).unwrap_or_default();
                    self.emitter.stage_completed(stage, payload);
                    return Ok(output);
                }
                Err(err) if attempt >= self.policy.max_attempts => {
                    tracing::error!(%stage, attempt, error = %err, "Validation retries exhausted");
                    self.emitter.stage_failed(stage, err.to_string());
                    return Err(StageError::Exhausted {
                        stage,
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.policy.backoff_after(attempt);
                    tracing::warn!(
                        %stage,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Validation failed, retrying"
                    );
                    self.emitter.log(format!(
                        "{} attempt {} rejected ({}), retrying",
                        stage, attempt, err
                    ));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Runs a [`StageSpec`] against the configured provider.
    pub async fn run<S: StageSpec>(&self, spec: &S) -> Result<S::Output, StageError> {
        if let Err(reason) = spec.precheck() {
            let stage = spec.tag();
            tracing::error!(%stage, error = %reason, "Stage inputs rejected before generation");
            self.emitter.stage_started(stage);
            self.emitter.stage_failed(stage, reason.to_string());
            return Err(StageError::Precondition { stage, reason });
        }

        let llm = self.llm;
        self.execute(
            spec.tag(),
            |attempt| {
                let request = spec.request(attempt);
                async move {
                    llm.generate(request)
                        .await
                        .map(|response| response.first_content().unwrap_or_default().to_string())
                }
            },
            |content| spec.validate(content),
        )
        .await
    }
}
