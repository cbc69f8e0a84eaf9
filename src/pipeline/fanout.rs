//! Concurrent fan-out of independent stages.
//!
//! The accept branch runs its follow-up stages as concurrent futures on the
//! run's own task. Every outcome is captured in its own slot, so one failing
//! stage never cancels or poisons the others.

use futures::future::join3;
use serde::{Deserialize, Serialize};
use std::future::Future;

use super::stage::StageError;

/// Why a stage slot holds no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Validation retries were exhausted.
    Validation,
    /// The generation call failed.
    Transport,
}

/// A stage failure as recorded in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&StageError> for StageFailure {
    fn from(err: &StageError) -> Self {
        let kind = if err.is_transport() {
            FailureKind::Transport
        } else {
            FailureKind::Validation
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Outcome of one fanned-out stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSlot<T> {
    Success(T),
    Failure(StageFailure),
}

impl<T> StageSlot<T> {
    /// The payload, if the stage succeeded.
    pub fn success(self) -> Option<T> {
        match self {
            StageSlot::Success(value) => Some(value),
            StageSlot::Failure(_) => None,
        }
    }
}

impl<T> From<Result<T, StageError>> for StageSlot<T> {
    fn from(result: Result<T, StageError>) -> Self {
        match result {
            Ok(value) => StageSlot::Success(value),
            Err(err) => StageSlot::Failure(StageFailure::from(&err)),
        }
    }
}

/// Runs three heterogeneous stages concurrently and waits for all of them.
pub async fn fan_out3<A, B, C, FA, FB, FC>(
    a: FA,
    b: FB,
    c: FC,
) -> (StageSlot<A>, StageSlot<B>, StageSlot<C>)
where
    FA: Future<Output = Result<A, StageError>>,
    FB: Future<Output = Result<B, StageError>>,
    FC: Future<Output = Result<C, StageError>>,
{
    let (ra, rb, rc) = join3(a, b, c).await;
    (ra.into(), rb.into(), rc.into())
}
