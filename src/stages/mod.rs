//! Generating stages of the evaluation pipeline.
//!
//! Each submodule defines a stage payload, the research queries that ground
//! it, a strict JSON schema for structured output, and the validator that
//! enforces the payload's minimum-content contract. Validators are the only
//! place where generated content is trusted or rejected; anything numeric
//! that matters (the opportunity score, unit economics) is recomputed here
//! by the deterministic engines.

pub mod blueprint;
pub mod competition;
pub mod finance;
pub mod gate;
pub mod rescue;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

pub use blueprint::{Blueprint, BlueprintSpec, FlowStep, Integration, Milestone, TechCategory, TechRisk};
pub use competition::{
    competition_queries, CompetitionAnalysis, CompetitionSpec, Competitor, Complaint,
    StrategicOpening,
};
pub use finance::{
    finance_queries, FinanceDraft, FinanceReport, FinanceSpec, PricingTier, ProjectionRow,
    RoadmapPhase, UnitEconomics,
};
pub use gate::{gate_queries, GateAnalysis, GateSpec, GateVerdict, MarketMetric, SeoKeyword, TargetPersona};
pub use rescue::{RescueOption, RescuePlan, RescueSpec};

use crate::error::ValidationError;
use crate::llm::{GenerationRequest, Message, ResponseFormat};
use crate::pipeline::PipelineConfig;
use crate::prompts::StagePrompt;
use crate::research::clean_text;
use crate::utils::parse_payload;

/// Per-run generation settings shared by every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageContext {
    /// The submitted idea, trimmed.
    pub idea: String,
    /// Output language for generated text.
    pub language: String,
    /// Model identifier; empty selects the client default.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl StageContext {
    pub fn new(idea: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            idea: idea.into().trim().to_string(),
            language: language.into(),
            model: String::new(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    /// Context using the generation settings of `config`.
    pub fn from_config(
        idea: impl Into<String>,
        language: impl Into<String>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..Self::new(idea, language)
        }
    }

    /// Builds a structured-output request for one stage.
    pub fn request(&self, prompt: &StagePrompt, schema_name: &str, schema: Value) -> GenerationRequest {
        GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system(prompt.system.clone()),
                Message::user(prompt.user.clone()),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .with_response_format(ResponseFormat::strict_schema(schema_name, schema))
    }
}

/// Parses a generated payload, cleaning control characters out of every
/// string value first.
pub(crate) fn parse_stage_payload<T: DeserializeOwned>(content: &str) -> Result<T, ValidationError> {
    let mut value: Value = parse_payload(content)?;
    clean_strings(&mut value);
    Ok(serde_json::from_value(value)?)
}

fn clean_strings(value: &mut Value) {
    match value {
        Value::String(s) => *s = clean_text(s),
        Value::Array(items) => items.iter_mut().for_each(clean_strings),
        Value::Object(map) => map.values_mut().for_each(clean_strings),
        _ => {}
    }
}

/// Strict-mode object schema: every property required, no extras.
pub(crate) fn object_schema(properties: &[(&str, Value)]) -> Value {
    let required: Vec<&str> = properties.iter().map(|(name, _)| *name).collect();
    let properties: Map<String, Value> = properties
        .iter()
        .map(|(name, schema)| (name.to_string(), schema.clone()))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

pub(crate) fn array_schema(items: Value) -> Value {
    json!({ "type": "array", "items": items })
}

pub(crate) fn string_schema() -> Value {
    json!({ "type": "string" })
}

pub(crate) fn number_schema() -> Value {
    json!({ "type": "number" })
}

pub(crate) fn integer_schema() -> Value {
    json!({ "type": "integer" })
}

pub(crate) fn boolean_schema() -> Value {
    json!({ "type": "boolean" })
}

/// True when a generated text field is empty or whitespace.
pub(crate) fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        title: String,
        items: Vec<String>,
    }

    #[test]
    fn test_parse_stage_payload_cleans_strings() {
        let content = "```json\n{\"title\": \"Line\\none\", \"items\": [\"a\\tb\", \"  c  \"]}\n```";
        let sample: Sample = parse_stage_payload(content).unwrap();
        assert_eq!(sample.title, "Line one");
        assert_eq!(sample.items, vec!["a b", "c"]);
    }

    #[test]
    fn test_parse_stage_payload_errors() {
        assert_eq!(
            parse_stage_payload::<Sample>("").unwrap_err(),
            ValidationError::EmptyResponse
        );
        assert!(matches!(
            parse_stage_payload::<Sample>("{\"title\": 3}"),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_object_schema_is_strict() {
        let schema = object_schema(&[("name", string_schema()), ("score", number_schema())]);
        assert_eq!(schema["required"], json!(["name", "score"]));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["properties"]["score"]["type"], "number");
    }

    #[test]
    fn test_context_from_config() {
        let config = PipelineConfig::default()
            .with_default_model("gpt-4o-mini")
            .with_temperature(0.2);
        let ctx = StageContext::from_config("  idea  ", "fr", &config);
        assert_eq!(ctx.idea, "idea");
        assert_eq!(ctx.model, "gpt-4o-mini");

        let request = ctx.request(&StagePrompt::new("sys", "user"), "sample", json!({}));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.messages.len(), 2);
        assert!(request.response_format.is_some());
    }
}
