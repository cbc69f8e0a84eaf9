//! Gate stage: market analysis plus the seven scoring dimensions.
//!
//! The generator never produces the opportunity score. The validator drops
//! market metrics that cite a URL outside the research set, enforces the
//! minimum content, then scores the dimension breakdown with the confidence
//! tier implied by the number of verified sources.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    array_schema, is_blank, number_schema, object_schema, parse_stage_payload, string_schema,
    StageContext,
};
use crate::error::ValidationError;
use crate::llm::GenerationRequest;
use crate::pipeline::stage::{StageSpec, StageTag};
use crate::prompts::{build_gate_prompt, StagePrompt};
use crate::research::{ResearchContext, ResearchQuery};
use crate::scoring::{self, ConfidenceTier, DimensionScore, DimensionSet, MatchMode, OpportunityScore};

/// A sourced market figure (TAM, SAM, CAGR...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetric {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub change_percentage: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub verified_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoKeyword {
    pub keyword: String,
    #[serde(default)]
    pub opportunity_level: String,
}

/// Ideal customer sketch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetPersona {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pain_points: Vec<String>,
}

/// Payload as generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateAnalysis {
    #[serde(default)]
    pub market_overview: String,
    #[serde(default)]
    pub market_metrics: Vec<MarketMetric>,
    #[serde(default)]
    pub seo_keywords: Vec<SeoKeyword>,
    #[serde(default)]
    pub target_persona: TargetPersona,
    #[serde(default)]
    pub scoring_breakdown: Vec<DimensionScore>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendation_title: String,
    #[serde(default)]
    pub recommendation_text: String,
}

/// Validated gate output with its computed score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateVerdict {
    #[serde(flatten)]
    pub analysis: GateAnalysis,
    pub opportunity_score: OpportunityScore,
    pub confidence: ConfidenceTier,
    pub risk_flags: Vec<String>,
    pub verified_sources: usize,
    #[serde(skip)]
    pub dimensions: DimensionSet,
}

/// Market size, trend and audience queries for `idea`.
pub fn gate_queries(idea: &str, max_results: usize) -> Vec<ResearchQuery> {
    vec![
        ResearchQuery::new(
            format!("Total addressable market size TAM SAM CAGR statistics for {idea} 2024 2025"),
            max_results,
        ),
        ResearchQuery::new(
            format!("Key market trends growth drivers and challenges for {idea} industry"),
            max_results,
        ),
        ResearchQuery::new(
            format!("Target audience customer demographics and psychographics for {idea} users"),
            max_results,
        ),
    ]
}

/// Strict structured-output schema for [`GateAnalysis`].
pub fn gate_schema() -> Value {
    let metric = object_schema(&[
        ("name", string_schema()),
        ("value", string_schema()),
        ("change_percentage", string_schema()),
        ("note", string_schema()),
        ("verified_url", string_schema()),
    ]);
    let keyword = object_schema(&[
        ("keyword", string_schema()),
        ("opportunity_level", string_schema()),
    ]);
    let persona = object_schema(&[
        ("name", string_schema()),
        ("description", string_schema()),
        ("pain_points", array_schema(string_schema())),
    ]);
    let dimension = object_schema(&[("name", string_schema()), ("score", number_schema())]);

    object_schema(&[
        ("market_overview", string_schema()),
        ("market_metrics", array_schema(metric)),
        ("seo_keywords", array_schema(keyword)),
        ("target_persona", persona),
        ("scoring_breakdown", array_schema(dimension)),
        ("summary", string_schema()),
        ("recommendation_title", string_schema()),
        ("recommendation_text", string_schema()),
    ])
}

/// The gate stage for one idea and its research.
pub struct GateSpec {
    context: StageContext,
    research: ResearchContext,
    verified_urls: Vec<String>,
    prompt: StagePrompt,
    mode: MatchMode,
}

impl GateSpec {
    pub fn new(context: StageContext, research: ResearchContext, mode: MatchMode) -> Self {
        let verified_urls = research.verified_urls();
        let prompt = build_gate_prompt(
            &context.idea,
            &research.render(),
            &verified_urls,
            &context.language,
        );
        Self {
            context,
            research,
            verified_urls,
            prompt,
            mode,
        }
    }

    /// Confidence tier implied by the research.
    pub fn confidence(&self) -> ConfidenceTier {
        ConfidenceTier::from_source_count(self.verified_urls.len())
    }
}

impl StageSpec for GateSpec {
    type Output = GateVerdict;

    fn tag(&self) -> StageTag {
        StageTag::Gate
    }

    fn request(&self, _attempt: u32) -> GenerationRequest {
        self.context.request(&self.prompt, "gate_analysis", gate_schema())
    }

    fn precheck(&self) -> Result<(), ValidationError> {
        if self.verified_urls.is_empty() {
            return Err(ValidationError::MissingEvidence(
                "market research returned no verifiable sources".to_string(),
            ));
        }
        Ok(())
    }

    fn validate(&self, content: &str) -> Result<GateVerdict, ValidationError> {
        let mut analysis: GateAnalysis = parse_stage_payload(content)?;

        analysis.market_metrics.retain(|metric| {
            let keep = self.research.is_verified(&metric.verified_url);
            if !keep {
                tracing::warn!(
                    metric = %metric.name,
                    url = %metric.verified_url,
                    "Dropping market metric with unverified source"
                );
            }
            keep
        });
        analysis.seo_keywords.retain(|k| !is_blank(&k.keyword));

        if analysis.market_metrics.is_empty() {
            return Err(ValidationError::EmptyList("market_metrics"));
        }
        if analysis.seo_keywords.is_empty() {
            return Err(ValidationError::EmptyList("seo_keywords"));
        }
        if analysis.scoring_breakdown.is_empty() {
            return Err(ValidationError::EmptyList("scoring_breakdown"));
        }

        let confidence = self.confidence();
        let (dimensions, report) =
            scoring::evaluate(&analysis.scoring_breakdown, confidence, self.mode)?;

        tracing::info!(
            score = report.score.value(),
            confidence = %confidence,
            sources = self.verified_urls.len(),
            "Gate scored"
        );

        Ok(GateVerdict {
            analysis,
            opportunity_score: report.score,
            confidence,
            risk_flags: report.risk_flags,
            verified_sources: self.verified_urls.len(),
            dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::SearchHit;
    use crate::scoring::Dimension;
    use serde_json::json;

    fn research(n: usize) -> ResearchContext {
        ResearchContext::from_hits(
            (0..n).map(|i| SearchHit::new(format!("Report {i}"), "Market data", format!("https://src{i}.example"))),
        )
    }

    fn breakdown(value: f64) -> Value {
        Value::Array(
            Dimension::ALL
                .into_iter()
                .map(|d| json!({"name": d.label(), "score": value}))
                .collect(),
        )
    }

    fn payload(metric_url: &str, value: f64) -> String {
        json!({
            "market_overview": "Growing niche",
            "market_metrics": [
                {"name": "TAM", "value": "$2B", "change_percentage": "", "note": "", "verified_url": metric_url},
                {"name": "CAGR", "value": "14%", "change_percentage": "", "note": "", "verified_url": "https://invented.example"}
            ],
            "seo_keywords": [{"keyword": "lab equipment resale", "opportunity_level": "High"}],
            "target_persona": {"name": "Lab manager", "description": "", "pain_points": []},
            "scoring_breakdown": breakdown(value),
            "summary": "Solid market",
            "recommendation_title": "Go",
            "recommendation_text": "Validate pricing"
        })
        .to_string()
    }

    fn spec(sources: usize, mode: MatchMode) -> GateSpec {
        GateSpec::new(StageContext::new("Used lab equipment marketplace", "en"), research(sources), mode)
    }

    #[test]
    fn test_unverified_metrics_are_dropped() {
        let verdict = spec(3, MatchMode::Lenient)
            .validate(&payload("https://src1.example", 8.0))
            .unwrap();
        assert_eq!(verdict.analysis.market_metrics.len(), 1);
        assert_eq!(verdict.analysis.market_metrics[0].name, "TAM");
        assert_eq!(verdict.confidence, ConfidenceTier::High);
        assert_eq!(verdict.opportunity_score.value(), 80);
        assert!(verdict.risk_flags.is_empty());
    }

    #[test]
    fn test_all_metrics_unverified_is_retryable() {
        let err = spec(3, MatchMode::Lenient)
            .validate(&payload("https://nowhere.example", 8.0))
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyList("market_metrics"));
    }

    #[test]
    fn test_no_research_is_missing_evidence() {
        let err = spec(0, MatchMode::Lenient).precheck().unwrap_err();
        assert!(matches!(err, ValidationError::MissingEvidence(_)));
        assert!(spec(1, MatchMode::Lenient).precheck().is_ok());
    }

    #[test]
    fn test_confidence_follows_source_count() {
        let verdict = spec(2, MatchMode::Lenient)
            .validate(&payload("https://src0.example", 10.0))
            .unwrap();
        assert_eq!(verdict.confidence, ConfidenceTier::Medium);
        assert_eq!(verdict.opportunity_score.value(), 90);
    }

    #[test]
    fn test_empty_keywords_rejected() {
        let mut body: Value = serde_json::from_str(&payload("https://src0.example", 5.0)).unwrap();
        body["seo_keywords"] = json!([{"keyword": "  ", "opportunity_level": "Low"}]);
        let err = spec(1, MatchMode::Lenient).validate(&body.to_string()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyList("seo_keywords"));
    }

    #[test]
    fn test_strict_mode_rejects_partial_breakdown() {
        let mut body: Value = serde_json::from_str(&payload("https://src0.example", 5.0)).unwrap();
        body["scoring_breakdown"] = json!([{"name": "Market Magnitude", "score": 9}]);

        let lenient = spec(3, MatchMode::Lenient).validate(&body.to_string()).unwrap();
        assert_eq!(lenient.dimensions.get(Dimension::ProblemUrgency), 0.0);

        let err = spec(3, MatchMode::Strict).validate(&body.to_string()).unwrap_err();
        assert!(matches!(err, ValidationError::UnmappedDimension(_)));
    }

    #[test]
    fn test_malformed_content_is_retryable() {
        let err = spec(3, MatchMode::Lenient).validate("I cannot help with that").unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_request_carries_schema_and_sources() {
        let spec = spec(2, MatchMode::Lenient);
        let request = spec.request(1);
        let system = &request.messages[0].content;
        assert!(system.contains("- https://src0.example"));
        assert!(system.contains("- https://src1.example"));
        let format = serde_json::to_value(request.response_format.unwrap()).unwrap();
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "gate_analysis");
    }

    #[test]
    fn test_gate_queries_embed_idea() {
        let queries = gate_queries("pet insurance", 5);
        assert_eq!(queries.len(), 3);
        assert!(queries.iter().all(|q| q.text.contains("pet insurance") && q.max_results == 5));
    }

    #[test]
    fn test_verdict_serializes_flat() {
        let verdict = spec(3, MatchMode::Lenient)
            .validate(&payload("https://src2.example", 8.0))
            .unwrap();
        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(value["opportunity_score"], 80);
        assert_eq!(value["summary"], "Solid market");
        assert!(value.get("dimensions").is_none());
    }
}
