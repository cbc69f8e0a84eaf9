//! Progress events for one run.
//!
//! The controller and the stage executor report lifecycle transitions
//! through a [`ProgressEmitter`]. Each run owns one unbounded channel; the
//! receiving side (an SSE response, the CLI) may go away at any time, in which
//! case emission silently continues and the run still completes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::stage::StageTag;

/// A lifecycle event emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted { stage: StageTag },
    StageCompleted { stage: StageTag, payload: Value },
    StageFailed { stage: StageTag, reason: String },
    Log { message: String },
    /// Terminal: the assembled report.
    Complete { report: Value },
    /// Terminal: the run failed before producing a report.
    Error { message: String },
}

impl ProgressEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
        )
    }

    /// JSON body sent to streaming clients.
    ///
    /// The `type` field is one of `status`, `log`, `agent_complete`,
    /// `complete` or `error`.
    pub fn to_wire(&self) -> Value {
        match self {
            ProgressEvent::StageStarted { stage } => json!({
                "type": "status",
                "agent": stage.as_str(),
                "status": "running",
            }),
            ProgressEvent::StageFailed { stage, reason } => json!({
                "type": "status",
                "agent": stage.as_str(),
                "status": "failed",
                "reason": reason,
            }),
            ProgressEvent::StageCompleted { stage, payload } => json!({
                "type": "agent_complete",
                "agent": stage.as_str(),
                "data": payload,
            }),
            ProgressEvent::Log { message } => json!({
                "type": "log",
                "message": message,
            }),
            ProgressEvent::Complete { report } => json!({
                "type": "complete",
                "data": report,
            }),
            ProgressEvent::Error { message } => json!({
                "type": "error",
                "message": message,
            }),
        }
    }

    /// A full server-sent-events frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_wire())
    }
}

/// Sending half of a run's progress channel.
///
/// Cheap to clone; all clones share the terminal-event guard.
#[derive(Debug, Clone)]
pub struct ProgressEmitter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    terminal_sent: Arc<AtomicBool>,
}

impl ProgressEmitter {
    /// Creates an emitter and its receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                terminal_sent: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// An emitter nobody listens to.
    pub fn detached() -> Self {
        let (emitter, _rx) = Self::channel();
        emitter
    }

    /// Whether a terminal event has been emitted.
    pub fn is_finished(&self) -> bool {
        self.terminal_sent.load(Ordering::SeqCst)
    }

    /// Whether the receiving side is gone.
    pub fn is_detached(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: ProgressEvent) {
        if self.is_finished() {
            tracing::debug!(?event, "Dropping event emitted after terminal event");
            return;
        }
        // A dropped receiver is not an error: the run keeps going.
        let _ = self.tx.send(event);
    }

    pub fn stage_started(&self, stage: StageTag) {
        self.send(ProgressEvent::StageStarted { stage });
    }

    pub fn stage_completed(&self, stage: StageTag, payload: Value) {
        self.send(ProgressEvent::StageCompleted { stage, payload });
    }

    pub fn stage_failed(&self, stage: StageTag, reason: impl Into<String>) {
        self.send(ProgressEvent::StageFailed {
            stage,
            reason: reason.into(),
        });
    }

    pub fn log(&self, message: impl Into<String>) {
        self.send(ProgressEvent::Log {
            message: message.into(),
        });
    }

    /// Emits the final report. Returns `false` if a terminal event was already sent.
    pub fn complete(&self, report: Value) -> bool {
        self.finish(ProgressEvent::Complete { report })
    }

    /// Emits a fatal error. Returns `false` if a terminal event was already sent.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.finish(ProgressEvent::Error {
            message: message.into(),
        })
    }

    fn finish(&self, event: ProgressEvent) -> bool {
        if self.terminal_sent.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(event);
        true
    }
}
