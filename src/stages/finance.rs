//! Finance stage: the generator proposes pricing, levers and costs; the
//! simulation engine computes everything derived from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    array_schema, boolean_schema, integer_schema, is_blank, number_schema, object_schema,
    parse_stage_payload, string_schema, StageContext,
};
use crate::error::ValidationError;
use crate::finance::{
    format_currency, group_thousands, simulate, CostCategory, FinancialProjection, FinancialStatus,
    LeverSet,
};
use crate::llm::GenerationRequest;
use crate::pipeline::stage::{StageSpec, StageTag};
use crate::prompts::{build_finance_prompt, StagePrompt};
use crate::research::{ResearchContext, ResearchQuery};

/// Number of pricing tiers requested from the generator.
pub const REQUESTED_TIERS: usize = 3;

/// Largest monthly amount accepted for a price, spend or cost.
pub const MAX_MONTHLY_AMOUNT: f64 = 1e9;

fn within_bounds(value: f64, limit: f64) -> bool {
    value.is_finite() && value.abs() <= limit
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub recommended: bool,
    #[serde(default)]
    pub benchmark_competitor: String,
    #[serde(default)]
    pub verified_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapPhase {
    pub phase_name: String,
    #[serde(default)]
    pub duration_months: u32,
    #[serde(default)]
    pub required_budget: String,
    #[serde(default)]
    pub milestone_goal: String,
}

/// Model inputs as generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceDraft {
    #[serde(default)]
    pub pricing_tiers: Vec<PricingTier>,
    pub levers: LeverSet,
    #[serde(default)]
    pub cost_structure: Vec<CostCategory>,
    #[serde(default)]
    pub roadmap: Vec<RoadmapPhase>,
    #[serde(default)]
    pub summary: String,
}

/// Display-ready unit economics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitEconomics {
    /// `"3.2:1"`.
    pub ltv_cac_ratio: String,
    pub status: FinancialStatus,
    pub estimated_cac: String,
    pub estimated_ltv: String,
    pub break_even_users: String,
    pub break_even_month: Option<u32>,
    /// `"18 months"`.
    pub projected_runway_months: String,
}

impl UnitEconomics {
    fn from_projection(p: &FinancialProjection) -> Self {
        Self {
            ltv_cac_ratio: format!("{:.1}:1", p.ltv_cac_ratio),
            status: p.status,
            estimated_cac: format_currency(p.cac),
            estimated_ltv: format_currency(p.ltv),
            break_even_users: group_thousands(p.break_even_customers.min(i64::MAX as u64) as i64),
            break_even_month: p.break_even_month,
            projected_runway_months: format!("{} months", p.projected_runway_months),
        }
    }
}

/// One display row of the five-year projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRow {
    /// `"Year 1"`.
    pub year: String,
    pub revenue: String,
    pub profit: String,
    pub customers: u64,
}

/// Validated finance output: the draft plus computed figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinanceReport {
    #[serde(flatten)]
    pub draft: FinanceDraft,
    pub metrics: UnitEconomics,
    pub projections: Vec<ProjectionRow>,
    pub simulation: FinancialProjection,
}

impl FinanceReport {
    /// Runs the simulation over a validated draft.
    pub fn from_draft(draft: FinanceDraft) -> Self {
        let simulation = simulate(&draft.levers, &draft.cost_structure);
        let projections = simulation
            .years
            .iter()
            .map(|y| ProjectionRow {
                year: format!("Year {}", y.year_index),
                revenue: format_currency(y.revenue),
                profit: format_currency(y.profit),
                customers: y.customer_count,
            })
            .collect();
        Self {
            metrics: UnitEconomics::from_projection(&simulation),
            projections,
            simulation,
            draft,
        }
    }
}

/// Pricing benchmark and cost queries for `idea`.
pub fn finance_queries(idea: &str, max_results: usize) -> Vec<ResearchQuery> {
    vec![
        ResearchQuery::new(
            format!("Pricing for {idea} competitors SaaS pricing models"),
            max_results,
        ),
        ResearchQuery::new(
            format!("Bootstrapped operating costs for {idea} solopreneur indie hacker tech stack"),
            max_results,
        ),
    ]
}

pub fn finance_schema() -> Value {
    let tier = object_schema(&[
        ("name", string_schema()),
        ("price", number_schema()),
        ("features", array_schema(string_schema())),
        ("recommended", boolean_schema()),
        ("benchmark_competitor", string_schema()),
        ("verified_url", string_schema()),
    ]);
    let lever = object_schema(&[
        ("value", number_schema()),
        ("min", number_schema()),
        ("max", number_schema()),
        ("step", number_schema()),
    ]);
    let levers = object_schema(&[
        ("monthly_price", lever.clone()),
        ("ad_spend", lever.clone()),
        ("conversion_rate", lever),
    ]);
    let cost = object_schema(&[
        ("name", string_schema()),
        ("monthly_amount", number_schema()),
        ("is_variable", boolean_schema()),
    ]);
    let phase = object_schema(&[
        ("phase_name", string_schema()),
        ("duration_months", integer_schema()),
        ("required_budget", string_schema()),
        ("milestone_goal", string_schema()),
    ]);

    object_schema(&[
        ("pricing_tiers", array_schema(tier)),
        ("levers", levers),
        ("cost_structure", array_schema(cost)),
        ("roadmap", array_schema(phase)),
        ("summary", string_schema()),
    ])
}

pub struct FinanceSpec {
    context: StageContext,
    research: ResearchContext,
    prompt: StagePrompt,
}

impl FinanceSpec {
    pub fn new(context: StageContext, research: ResearchContext) -> Self {
        let prompt = build_finance_prompt(
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

impl StageSpec for FinanceSpec {
    type Output = FinanceReport;

    fn tag(&self) -> StageTag {
        StageTag::Finance
    }

    fn request(&self, _attempt: u32) -> GenerationRequest {
        self.context
            .request(&self.prompt, "finance_model", finance_schema())
    }

    fn validate(&self, content: &str) -> Result<FinanceReport, ValidationError> {
        let mut draft: FinanceDraft = parse_stage_payload(content)?;

        draft.pricing_tiers.retain(|t| !is_blank(&t.name));
        if draft.pricing_tiers.is_empty() {
            return Err(ValidationError::EmptyList("pricing_tiers"));
        }
        if draft.pricing_tiers.len() != REQUESTED_TIERS {
            tracing::debug!(
                tiers = draft.pricing_tiers.len(),
                "Generator returned an unexpected number of pricing tiers"
            );
        }
        if let Some(tier) = draft.pricing_tiers.iter().find(|t| !t.price.is_finite()) {
            return Err(ValidationError::ConstraintViolation(format!(
                "pricing tier '{}' has a non-finite price",
                tier.name
            )));
        }
        // Benchmarks are optional, but an invented source is cleared.
        for tier in &mut draft.pricing_tiers {
            if !tier.verified_url.is_empty() && !self.research.is_verified(&tier.verified_url) {
                tier.verified_url.clear();
            }
        }

        if !draft.levers.is_well_formed() {
            return Err(ValidationError::ConstraintViolation(
                "levers must be finite with min <= max".to_string(),
            ));
        }
        let levers = [
            ("monthly_price", draft.levers.monthly_price, MAX_MONTHLY_AMOUNT),
            ("ad_spend", draft.levers.ad_spend, MAX_MONTHLY_AMOUNT),
            ("conversion_rate", draft.levers.conversion_rate_percent, 100.0),
        ];
        for (name, lever, limit) in levers {
            if ![lever.value, lever.min, lever.max].iter().all(|v| within_bounds(*v, limit)) {
                return Err(ValidationError::ConstraintViolation(format!(
                    "lever '{}' must have a magnitude of at most {}",
                    name, limit
                )));
            }
        }
        if let Some(cost) = draft
            .cost_structure
            .iter()
            .find(|c| !within_bounds(c.monthly_amount, MAX_MONTHLY_AMOUNT) || c.monthly_amount < 0.0)
        {
            return Err(ValidationError::ConstraintViolation(format!(
                "cost '{}' must be a non-negative amount up to {}",
                cost.name, MAX_MONTHLY_AMOUNT
            )));
        }

        let report = FinanceReport::from_draft(draft);
        tracing::info!(
            status = %report.simulation.status,
            ltv_cac = report.simulation.ltv_cac_ratio,
            break_even_month = ?report.simulation.break_even_month,
            "Finance simulated"
        );
        Ok(report)
    }
}
