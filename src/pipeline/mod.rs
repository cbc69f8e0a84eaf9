//! Pipeline orchestration for idea evaluation.
//!
//! This module provides the run controller and everything it is built from:
//! the run state machine, stage execution with validation retries, parallel
//! fan-out, progress events and final report assembly.
//!
//! # Architecture
//!
//! - **Controller**: drives one run from the gate to a terminal state
//! - **Stage executor**: calls the generation provider, validates the output
//!   and retries with linear backoff
//! - **Fan-out**: runs the accept-branch stages concurrently, isolating
//!   their failures
//! - **Events**: per-run progress channel with exactly one terminal event
//!
//! # Pipeline Flow
//!
//! 1. **Gate**: research the market and score the idea
//! 2. **Branch**: scores below the threshold take the rescue branch
//! 3. **Rescue**: propose improvements and pivots for a rejected idea
//! 4. **Fan-out**: competition, finance and blueprint run in parallel
//! 5. **Assembly**: build the final report, emit it, then persist the run
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use verdict_forge::pipeline::{PipelineConfig, PipelineController, RunRequest};
//!
//! let controller = Arc::new(PipelineController::new(llm, research, store, PipelineConfig::default())?);
//! let (mut events, handle) = controller.spawn(RunRequest::new("B2B invoice factoring for freelancers"));
//!
//! while let Some(event) = events.recv().await {
//!     print!("{}", event.to_sse_frame());
//! }
//! let run = handle.await??;
//! println!("Run {} finished as {}", run.id(), run.state());
//! ```

pub mod config;
pub mod controller;
pub mod events;
pub mod fanout;
pub mod report;
pub mod stage;
pub mod state;

pub use config::{ConfigError, PipelineConfig};
pub use controller::{PipelineController, PipelineError, RunRequest, DEFAULT_LANGUAGE};
pub use events::{ProgressEmitter, ProgressEvent};
pub use fanout::{fan_out3, FailureKind, StageFailure, StageSlot};
pub use report::{ReportSections, ReportStatus, VerdictReport};
pub use stage::{RetryPolicy, StageError, StageExecutor, StageSpec, StageTag};
pub use state::{PipelineRun, RunState, StageResult, StateError};
