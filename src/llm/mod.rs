//! LLM integration.
//!
//! This module provides the generation collaborator: the [`LlmProvider`]
//! trait every pipeline stage calls through, and [`LiteLlmClient`], an
//! OpenAI-compatible implementation.
//!
//! ```ignore
//! use verdict_forge::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, JsonSchemaSpec, LiteLlmClient, LlmProvider,
    Message, ResponseFormat, Usage, DEFAULT_MODEL,
};
