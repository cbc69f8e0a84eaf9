//! Rescue stage for rejected ideas.
//!
//! The rescue plan is advisory and must always exist: the controller falls
//! back to [`RescuePlan::fallback`] whenever this stage fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{is_blank, object_schema, parse_stage_payload, string_schema, StageContext};
use crate::error::ValidationError;
use crate::llm::GenerationRequest;
use crate::pipeline::stage::{StageSpec, StageTag};
use crate::prompts::{build_rescue_prompt, StagePrompt};
use crate::scoring::{DimensionSet, OpportunityScore};

/// One way forward for a rejected idea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueOption {
    pub title: String,
    pub description: String,
    /// A short rewritten idea the user can resubmit.
    #[serde(default)]
    pub ai_suggested_prompt: String,
}

impl RescueOption {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        ai_suggested_prompt: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ai_suggested_prompt: ai_suggested_prompt.into(),
        }
    }

    fn is_empty(&self) -> bool {
        is_blank(&self.title) || is_blank(&self.description)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescuePlan {
    pub improve: RescueOption,
    pub pivot: RescueOption,
}

impl RescuePlan {
    /// Plan used when generation fails.
    pub fn fallback() -> Self {
        Self {
            improve: RescueOption::new(
                "Refine Value Proposition",
                "Focus on a specific niche.",
                "Niche down to specific vertical",
            ),
            pivot: RescueOption::new(
                "Explore Adjacent Markets",
                "Look for similar problems in other industries.",
                "Pivot to adjacent market solution",
            ),
        }
    }
}

pub fn rescue_schema() -> Value {
    let option = object_schema(&[
        ("title", string_schema()),
        ("description", string_schema()),
        ("ai_suggested_prompt", string_schema()),
    ]);
    object_schema(&[("improve", option.clone()), ("pivot", option)])
}

pub struct RescueSpec {
    context: StageContext,
    prompt: StagePrompt,
}

impl RescueSpec {
    /// Builds the rescue stage around the `focus` weakest dimensions.
    pub fn new(
        context: StageContext,
        score: OpportunityScore,
        dimensions: &DimensionSet,
        focus: usize,
    ) -> Self {
        let weakest: Vec<(String, f64)> = dimensions
            .weakest(focus)
            .into_iter()
            .map(|(dim, value)| (dim.label().to_string(), value))
            .collect();
        let prompt = build_rescue_prompt(&context.idea, score.value(), &weakest, &context.language);
        Self { context, prompt }
    }
}

impl StageSpec for RescueSpec {
    type Output = RescuePlan;

    fn tag(&self) -> StageTag {
        StageTag::Rescue
    }

    fn request(&self, _attempt: u32) -> GenerationRequest {
        self.context.request(&self.prompt, "rescue_plan", rescue_schema())
    }

    fn validate(&self, content: &str) -> Result<RescuePlan, ValidationError> {
        let plan: RescuePlan = parse_stage_payload(content)?;
        if plan.improve.is_empty() {
            return Err(ValidationError::ConstraintViolation(
                "improve option is empty".to_string(),
            ));
        }
        if plan.pivot.is_empty() {
            return Err(ValidationError::ConstraintViolation(
                "pivot option is empty".to_string(),
            ));
        }
        Ok(plan)
    }
}
