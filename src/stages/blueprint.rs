//! Blueprint stage: MVP architecture, user flow and build plan.
//!
//! Unlike the other accept-branch stages the blueprint is not grounded in
//! web research.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    array_schema, integer_schema, is_blank, object_schema, parse_stage_payload, string_schema,
    StageContext,
};
use crate::error::ValidationError;
use crate::llm::GenerationRequest;
use crate::pipeline::stage::{StageSpec, StageTag};
use crate::prompts::{build_blueprint_prompt, StagePrompt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechCategory {
    pub name: String,
    #[serde(default)]
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    pub step: u32,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    #[serde(default)]
    pub duration_weeks: u32,
    #[serde(default)]
    pub deliverables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechRisk {
    pub risk: String,
    #[serde(default)]
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub tech_stack: Vec<TechCategory>,
    #[serde(default)]
    pub user_flow: Vec<FlowStep>,
    #[serde(default)]
    pub integrations: Vec<Integration>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub tech_risks: Vec<TechRisk>,
    #[serde(default)]
    pub summary: String,
}

pub fn blueprint_schema() -> Value {
    let category = object_schema(&[
        ("name", string_schema()),
        ("technologies", array_schema(string_schema())),
    ]);
    let step = object_schema(&[("step", integer_schema()), ("action", string_schema())]);
    let integration = object_schema(&[
        ("name", string_schema()),
        ("category", string_schema()),
        ("justification", string_schema()),
    ]);
    let milestone = object_schema(&[
        ("title", string_schema()),
        ("duration_weeks", integer_schema()),
        ("deliverables", array_schema(string_schema())),
    ]);
    let risk = object_schema(&[("risk", string_schema()), ("mitigation", string_schema())]);

    object_schema(&[
        ("tech_stack", array_schema(category)),
        ("user_flow", array_schema(step)),
        ("integrations", array_schema(integration)),
        ("milestones", array_schema(milestone)),
        ("tech_risks", array_schema(risk)),
        ("summary", string_schema()),
    ])
}

pub struct BlueprintSpec {
    context: StageContext,
    prompt: StagePrompt,
}

impl BlueprintSpec {
    pub fn new(context: StageContext) -> Self {
        let prompt = build_blueprint_prompt(&context.idea, &context.language);
        Self { context, prompt }
    }
}

impl StageSpec for BlueprintSpec {
    type Output = Blueprint;

    fn tag(&self) -> StageTag {
        StageTag::Blueprint
    }

    fn request(&self, _attempt: u32) -> GenerationRequest {
        self.context
            .request(&self.prompt, "mvp_blueprint", blueprint_schema())
    }

    fn validate(&self, content: &str) -> Result<Blueprint, ValidationError> {
        let mut blueprint: Blueprint = parse_stage_payload(content)?;

        for category in &mut blueprint.tech_stack {
            category.technologies.retain(|t| !is_blank(t));
        }
        blueprint
            .tech_stack
            .retain(|c| !is_blank(&c.name) && !c.technologies.is_empty());
        blueprint.user_flow.retain(|s| !is_blank(&s.action));
        blueprint.user_flow.sort_by_key(|s| s.step);

        if blueprint.tech_stack.is_empty() {
            return Err(ValidationError::EmptyList("tech_stack"));
        }
        if blueprint.user_flow.is_empty() {
            return Err(ValidationError::EmptyList("user_flow"));
        }
        Ok(blueprint)
    }
}
