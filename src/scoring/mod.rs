//! Opportunity scoring engine.
//!
//! Turns the seven dimension scores produced by the gate stage into a
//! deterministic 0-100 opportunity score. The generator never computes the
//! score itself; it only supplies labelled dimension values, which are matched
//! onto the canonical dimensions here.
//!
//! Scoring steps:
//! 1. Weighted sum (weights total 10, so ten across the board yields 100)
//! 2. Multiplicative kill switches for saturated, declining and regulated markets
//! 3. Data-confidence discount
//! 4. Clamp to `[0, 100]` and truncate

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Lowest value a dimension can take after clamping.
pub const MIN_DIMENSION_VALUE: f64 = 0.0;

/// Highest value a dimension can take after clamping.
pub const MAX_DIMENSION_VALUE: f64 = 10.0;

/// Competitive void below this triggers the saturated-market penalty.
const VOID_KILL_THRESHOLD: f64 = 3.0;
const VOID_KILL_FACTOR: f64 = 0.6;

/// Momentum below this triggers the declining-market penalty.
const MOMENTUM_KILL_THRESHOLD: f64 = 2.0;
const MOMENTUM_KILL_FACTOR: f64 = 0.7;

/// Macro risk below this triggers the regulatory penalty.
const MACRO_KILL_THRESHOLD: f64 = 3.0;
const MACRO_KILL_FACTOR: f64 = 0.8;

/// The seven canonical scoring dimensions, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    MarketMagnitude,
    MarketMomentum,
    ProblemUrgency,
    CompetitiveVoid,
    SolutionUniqueness,
    TechnicalFeasibility,
    MacroRisk,
}

impl Dimension {
    /// All dimensions in canonical order.
    pub const ALL: [Dimension; 7] = [
        Dimension::MarketMagnitude,
        Dimension::MarketMomentum,
        Dimension::ProblemUrgency,
        Dimension::CompetitiveVoid,
        Dimension::SolutionUniqueness,
        Dimension::TechnicalFeasibility,
        Dimension::MacroRisk,
    ];

    /// Weight of this dimension in the base sum.
    pub fn weight(self) -> f64 {
        match self {
            Dimension::MarketMagnitude => 1.5,
            Dimension::MarketMomentum => 1.5,
            Dimension::ProblemUrgency => 2.5,
            Dimension::CompetitiveVoid => 2.0,
            Dimension::SolutionUniqueness => 1.0,
            Dimension::TechnicalFeasibility => 1.0,
            Dimension::MacroRisk => 0.5,
        }
    }

    /// Human-readable label, as requested from the generator.
    pub fn label(self) -> &'static str {
        match self {
            Dimension::MarketMagnitude => "Market Magnitude",
            Dimension::MarketMomentum => "Market Momentum",
            Dimension::ProblemUrgency => "Problem Urgency",
            Dimension::CompetitiveVoid => "Competitive Void",
            Dimension::SolutionUniqueness => "Solution Uniqueness",
            Dimension::TechnicalFeasibility => "Technical Feasibility",
            Dimension::MacroRisk => "Macro Risk",
        }
    }

    /// Keywords that identify this dimension inside a free-form label.
    fn keywords(self) -> &'static [&'static str] {
        match self {
            Dimension::MarketMagnitude => &["magnitude", "size", "tam"],
            Dimension::MarketMomentum => &["momentum", "growth", "cagr"],
            Dimension::ProblemUrgency => &["urgency", "need", "pain"],
            Dimension::CompetitiveVoid => &["void", "competition", "entry"],
            Dimension::SolutionUniqueness => &["uniqueness", "moat"],
            Dimension::TechnicalFeasibility => &["feasibility", "tech"],
            Dimension::MacroRisk => &["macro", "risk"],
        }
    }

    /// Matches a generated label onto a dimension.
    ///
    /// Matching is case-insensitive substring search over the keyword table,
    /// evaluated in canonical order; the first dimension with a hit wins.
    pub fn match_label(label: &str) -> Option<Dimension> {
        let lowered = label.to_lowercase();
        Dimension::ALL
            .into_iter()
            .find(|dim| dim.keywords().iter().any(|kw| lowered.contains(kw)))
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A labelled dimension value as produced by the gate stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// Free-form label, matched onto a canonical dimension.
    pub name: String,
    /// Value in `0..=10`; clamped on ingestion.
    #[serde(alias = "score")]
    pub value: f64,
}

impl DimensionScore {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Data-confidence tier derived from the number of verified sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Multiplier applied to the penalized score.
    pub fn multiplier(self) -> f64 {
        match self {
            ConfidenceTier::Low => 0.7,
            ConfidenceTier::Medium => 0.9,
            ConfidenceTier::High => 1.0,
        }
    }

    /// Tier for a count of distinct verified source URLs.
    pub fn from_source_count(count: usize) -> Self {
        match count {
            0 => ConfidenceTier::Low,
            1 | 2 => ConfidenceTier::Medium,
            _ => ConfidenceTier::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::Low => "Low",
            ConfidenceTier::Medium => "Medium",
            ConfidenceTier::High => "High",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(ConfidenceTier::Low),
            "medium" => Ok(ConfidenceTier::Medium),
            "high" => Ok(ConfidenceTier::High),
            other => Err(format!("unknown confidence tier '{}'", other)),
        }
    }
}

/// How generated labels are matched onto dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Unmatched labels are ignored and missing dimensions count as 0.
    #[default]
    Lenient,
    /// Any unmatched label or missing dimension is a validation error.
    Strict,
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(MatchMode::Lenient),
            "strict" => Ok(MatchMode::Strict),
            other => Err(format!("unknown match mode '{}'", other)),
        }
    }
}

/// Final opportunity score, always within `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpportunityScore(u8);

impl OpportunityScore {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for OpportunityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clamped values for all seven dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DimensionSet {
    values: [f64; 7],
}

impl DimensionSet {
    /// A set with every dimension at the same value.
    pub fn uniform(value: f64) -> Self {
        Self {
            values: [clamp_dimension(value); 7],
        }
    }

    /// Returns a copy with one dimension replaced.
    pub fn with(mut self, dim: Dimension, value: f64) -> Self {
        self.values[dim.index()] = clamp_dimension(value);
        self
    }

    pub fn get(&self, dim: Dimension) -> f64 {
        self.values[dim.index()]
    }

    /// Maps generated labels onto the canonical dimensions.
    ///
    /// Later labels for the same dimension overwrite earlier ones.
    ///
    /// # Errors
    ///
    /// In [`MatchMode::Strict`], returns `ValidationError::UnmappedDimension`
    /// for the first label that matches nothing or the first dimension that
    /// received no value.
    pub fn from_scores(
        scores: &[DimensionScore],
        mode: MatchMode,
    ) -> Result<Self, ValidationError> {
        let mut set = DimensionSet::default();
        let mut seen = [false; 7];

        for score in scores {
            match Dimension::match_label(&score.name) {
                Some(dim) => {
                    set.values[dim.index()] = clamp_dimension(score.value);
                    seen[dim.index()] = true;
                }
                None if mode == MatchMode::Strict => {
                    return Err(ValidationError::UnmappedDimension(score.name.clone()));
                }
                None => {
                    tracing::debug!(label = %score.name, "Ignoring unmatched dimension label");
                }
            }
        }

        if mode == MatchMode::Strict {
            if let Some(missing) = Dimension::ALL.into_iter().find(|d| !seen[d.index()]) {
                return Err(ValidationError::UnmappedDimension(missing.label().to_string()));
            }
        }

        Ok(set)
    }

    /// Weighted sum before penalties, in `[0, 100]`.
    pub fn weighted_sum(&self) -> f64 {
        Dimension::ALL
            .into_iter()
            .map(|dim| self.get(dim) * dim.weight())
            .sum()
    }

    /// The `n` weakest dimensions, ascending by value, ties in canonical order.
    pub fn weakest(&self, n: usize) -> Vec<(Dimension, f64)> {
        let mut dims: Vec<(Dimension, f64)> =
            Dimension::ALL.into_iter().map(|d| (d, self.get(d))).collect();
        // Stable sort keeps canonical order among equal values.
        dims.sort_by(|a, b| a.1.total_cmp(&b.1));
        dims.truncate(n);
        dims
    }

    /// Risk flags raised by kill switches and the confidence tier.
    pub fn risk_flags(&self, tier: ConfidenceTier) -> Vec<String> {
        let mut flags = Vec::new();
        if self.get(Dimension::CompetitiveVoid) < VOID_KILL_THRESHOLD {
            flags.push("Saturated Market".to_string());
        }
        if self.get(Dimension::MarketMomentum) < MOMENTUM_KILL_THRESHOLD {
            flags.push("Declining Market".to_string());
        }
        if self.get(Dimension::MacroRisk) < MACRO_KILL_THRESHOLD {
            flags.push("Regulatory Risk".to_string());
        }
        if tier == ConfidenceTier::Low {
            flags.push("Low Data Confidence".to_string());
        }
        flags
    }
}

/// Clamps a raw dimension value into `[0, 10]`; NaN becomes 0.
pub fn clamp_dimension(value: f64) -> f64 {
    if value.is_nan() {
        MIN_DIMENSION_VALUE
    } else {
        value.clamp(MIN_DIMENSION_VALUE, MAX_DIMENSION_VALUE)
    }
}

/// Computes the opportunity score for a dimension set and confidence tier.
pub fn compute(set: &DimensionSet, tier: ConfidenceTier) -> OpportunityScore {
    let mut score = set.weighted_sum();

    if set.get(Dimension::CompetitiveVoid) < VOID_KILL_THRESHOLD {
        score *= VOID_KILL_FACTOR;
    }
    if set.get(Dimension::MarketMomentum) < MOMENTUM_KILL_THRESHOLD {
        score *= MOMENTUM_KILL_FACTOR;
    }
    if set.get(Dimension::MacroRisk) < MACRO_KILL_THRESHOLD {
        score *= MACRO_KILL_FACTOR;
    }

    score *= tier.multiplier();

    // Truncation, not rounding.
    OpportunityScore(score.clamp(0.0, 100.0) as u8)
}

/// Full scoring result for a gate payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub score: OpportunityScore,
    pub confidence: ConfidenceTier,
    pub risk_flags: Vec<String>,
}

/// Matches labels, then scores them, collecting risk flags on the way.
pub fn evaluate(
    scores: &[DimensionScore],
    tier: ConfidenceTier,
    mode: MatchMode,
) -> Result<(DimensionSet, ScoreReport), ValidationError> {
    let set = DimensionSet::from_scores(scores, mode)?;
    let report = ScoreReport {
        score: compute(&set, tier),
        confidence: tier,
        risk_flags: set.risk_flags(tier),
    };
    Ok((set, report))
}
