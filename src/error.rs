//! Error types for the collaborator boundaries.
//!
//! Defines the error enums shared across subsystems:
//! - LLM API interactions (generation collaborator)
//! - Web research (research collaborator)
//! - Stage payload validation (minimum-content contracts)

use thiserror::Error;

/// Errors that can occur during LLM operations.
///
/// Every variant is a transport-level failure from the point of view of the
/// stage executor: none of them is retried by the pipeline.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("HTTP client initialization failed: {0}")]
    ClientInit(String),
}

/// Errors that can occur while querying the research collaborator.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Missing API key: TAVILY_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Search API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse search response: {0}")]
    ParseError(String),

    #[error("HTTP client initialization failed: {0}")]
    ClientInit(String),
}

/// A generated payload that failed its minimum-content contract.
///
/// These are the only failures the stage executor retries.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Generator returned no content")]
    EmptyResponse,

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Required list '{0}' is empty")]
    EmptyList(&'static str),

    #[error("No verified source URLs available: {0}")]
    MissingEvidence(String),

    #[error("Unmapped or missing scoring dimension: {0}")]
    UnmappedDimension(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::Malformed(err.to_string())
    }
}
