//! Competition stage: named competitors, complaints and the open position.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use super::{array_schema, is_blank, object_schema, parse_stage_payload, string_schema, StageContext};
use crate::error::ValidationError;
use crate::llm::GenerationRequest;
use crate::pipeline::stage::{StageSpec, StageTag};
use crate::prompts::{build_competition_prompt, StagePrompt};
use crate::research::{ResearchContext, ResearchQuery};

/// Generic stand-in names ("Competitor A", "Company 2") the generator
/// sometimes emits instead of real products.
static PLACEHOLDER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(competitor|company|product|startup|brand)\s*[a-z0-9]?\s*$")
        .expect("Invalid regex for placeholder names")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    #[serde(default)]
    pub market_position: String,
    #[serde(default)]
    pub pricing_tier: String,
    #[serde(default)]
    pub key_strength: String,
    #[serde(default)]
    pub verified_url: String,
}

/// A customer complaint quoted from reviews or forums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub quote: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub competitor: String,
    #[serde(default)]
    pub verified_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategicOpening {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionAnalysis {
    #[serde(default)]
    pub competitors: Vec<Competitor>,
    #[serde(default)]
    pub complaints: Vec<Complaint>,
    #[serde(default)]
    pub strategic_opening: StrategicOpening,
    #[serde(default)]
    pub summary: String,
}

/// Landscape and complaint queries for `idea`.
pub fn competition_queries(idea: &str, max_results: usize) -> Vec<ResearchQuery> {
    vec![
        ResearchQuery::new(
            format!("Top competitors for {idea} list names pricing features comparison alternatives"),
            max_results,
        ),
        ResearchQuery::new(
            format!("{idea} complaints reddit G2 Capterra negative reviews"),
            max_results,
        ),
        ResearchQuery::new(
            format!("{idea} competitors complaints reddit G2 Capterra cons negative reviews"),
            max_results,
        ),
    ]
}

pub fn competition_schema() -> Value {
    let competitor = object_schema(&[
        ("name", string_schema()),
        ("market_position", string_schema()),
        ("pricing_tier", string_schema()),
        ("key_strength", string_schema()),
        ("verified_url", string_schema()),
    ]);
    let complaint = object_schema(&[
        ("quote", string_schema()),
        ("source", string_schema()),
        ("competitor", string_schema()),
        ("verified_url", string_schema()),
    ]);
    let opening = object_schema(&[("label", string_schema()), ("description", string_schema())]);

    object_schema(&[
        ("competitors", array_schema(competitor)),
        ("complaints", array_schema(complaint)),
        ("strategic_opening", opening),
        ("summary", string_schema()),
    ])
}

pub struct CompetitionSpec {
    context: StageContext,
    research: ResearchContext,
    prompt: StagePrompt,
}

impl CompetitionSpec {
    pub fn new(context: StageContext, research: ResearchContext) -> Self {
        let prompt = build_competition_prompt(
            &context.idea,
            &research.render(),
            &research.verified_urls(),
            &context.language,
        );
        Self {
            context,
            research,
            prompt,
        }
    }
}

impl StageSpec for CompetitionSpec {
    type Output = CompetitionAnalysis;

    fn tag(&self) -> StageTag {
        StageTag::Competition
    }

    fn request(&self, _attempt: u32) -> GenerationRequest {
        self.context
            .request(&self.prompt, "competition_analysis", competition_schema())
    }

    fn validate(&self, content: &str) -> Result<CompetitionAnalysis, ValidationError> {
        let mut analysis: CompetitionAnalysis = parse_stage_payload(content)?;

        let before = analysis.competitors.len();
        analysis.competitors.retain(|c| {
            !is_blank(&c.name)
                && !PLACEHOLDER_NAME.is_match(&c.name)
                && self.research.is_verified(&c.verified_url)
        });
        analysis
            .complaints
            .retain(|c| !is_blank(&c.quote) && self.research.is_verified(&c.verified_url));

        if analysis.competitors.len() < before {
            tracing::warn!(
                dropped = before - analysis.competitors.len(),
                kept = analysis.competitors.len(),
                "Dropped unverified or placeholder competitors"
            );
        }
        if analysis.competitors.is_empty() {
            return Err(ValidationError::EmptyList("competitors"));
        }

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::SearchHit;
    use serde_json::json;

    fn spec() -> CompetitionSpec {
        let research = ResearchContext::from_hits(vec![
            SearchHit::new("Labx review", "Listings for used gear", "https://labx.example"),
            SearchHit::new("Reddit thread", "Fees are too high", "https://reddit.example/r/labs"),
        ]);
        CompetitionSpec::new(StageContext::new("Used lab equipment marketplace", "en"), research)
    }

    #[test]
    fn test_keeps_only_verified_named_competitors() {
        let content = json!({
            "competitors": [
                {"name": "LabX", "market_position": "Leader", "pricing_tier": "Mid", "key_strength": "Inventory", "verified_url": "https://labx.example"},
                {"name": "Competitor B", "market_position": "", "pricing_tier": "", "key_strength": "", "verified_url": "https://labx.example"},
                {"name": "GhostCo", "market_position": "", "pricing_tier": "", "key_strength": "", "verified_url": "https://ghost.example"}
            ],
            "complaints": [
                {"quote": "Fees are too high", "source": "Reddit", "competitor": "LabX", "verified_url": "https://reddit.example/r/labs"},
                {"quote": "Made up", "source": "G2", "competitor": "LabX", "verified_url": "https://g2.example"}
            ],
            "strategic_opening": {"label": "Low-fee niche", "description": "Flat fee listings"},
            "summary": "One dominant player."
        })
        .to_string();

        let analysis = spec().validate(&content).unwrap();
        assert_eq!(analysis.competitors.len(), 1);
        assert_eq!(analysis.competitors[0].name, "LabX");
        assert_eq!(analysis.complaints.len(), 1);
        assert_eq!(analysis.strategic_opening.label, "Low-fee niche");
    }

    #[test]
    fn test_no_verified_competitor_is_retryable() {
        let content = json!({
            "competitors": [
                {"name": "GhostCo", "market_position": "", "pricing_tier": "", "key_strength": "", "verified_url": ""}
            ],
            "complaints": [],
            "strategic_opening": {"label": "", "description": ""},
            "summary": ""
        })
        .to_string();
        assert_eq!(
            spec().validate(&content).unwrap_err(),
            ValidationError::EmptyList("competitors")
        );
    }

    #[test]
    fn test_placeholder_names() {
        assert!(PLACEHOLDER_NAME.is_match("Competitor A"));
        assert!(PLACEHOLDER_NAME.is_match("company 2"));
        assert!(!PLACEHOLDER_NAME.is_match("Competitive Labs"));
        assert!(!PLACEHOLDER_NAME.is_match("Notion"));
    }

    #[test]
    fn test_queries() {
        let queries = competition_queries("note taking", 4);
        assert_eq!(queries.len(), 3);
        assert!(queries[1].text.starts_with("note taking complaints"));
    }
}
