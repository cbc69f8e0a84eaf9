//! verdict-forge: gated LLM analysis of startup ideas.
//!
//! This library scores an idea against seven market dimensions, then either
//! generates a rescue plan or runs competition, finance and blueprint
//! analyses in parallel, assembling everything into one streamed report.

// Core modules
pub mod cli;
pub mod error;
pub mod finance;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod research;
pub mod scoring;
pub mod server;
pub mod stages;
pub mod storage;
pub mod utils;

// Re-export commonly used error types
pub use error::{LlmError, SearchError, ValidationError};
