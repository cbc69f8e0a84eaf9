//! Final report assembly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::state::PipelineRun;
use crate::scoring::{ConfidenceTier, OpportunityScore};
use crate::stages::{Blueprint, CompetitionAnalysis, FinanceReport, GateVerdict, RescuePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Approved,
    Rejected,
}

/// Per-stage sections. Accept-branch sections are `null` when their stage
/// failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSections {
    pub gate: GateVerdict,
    pub competition: Option<CompetitionAnalysis>,
    pub finance: Option<FinanceReport>,
    pub blueprint: Option<Blueprint>,
}

impl ReportSections {
    /// Number of accept-branch sections present.
    pub fn present_count(&self) -> usize {
        [
            self.competition.is_some(),
            self.finance.is_some(),
            self.blueprint.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

/// The report streamed to the caller and stored with the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictReport {
    pub report_id: Uuid,
    pub run_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub idea: String,
    pub status: ReportStatus,
    pub opportunity_score: OpportunityScore,
    pub confidence: ConfidenceTier,
    pub risk_flags: Vec<String>,
    pub global_summary: String,
    pub sections: ReportSections,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescue_plan: Option<RescuePlan>,
}

impl VerdictReport {
    pub fn approved(
        run: &PipelineRun,
        gate: GateVerdict,
        competition: Option<CompetitionAnalysis>,
        finance: Option<FinanceReport>,
        blueprint: Option<Blueprint>,
    ) -> Self {
        let sections = ReportSections {
            gate,
            competition,
            finance,
            blueprint,
        };
        let global_summary = approved_summary(&sections);
        Self::assemble(run, ReportStatus::Approved, sections, global_summary, None)
    }

    pub fn rejected(run: &PipelineRun, gate: GateVerdict, plan: RescuePlan) -> Self {
        let global_summary = format!(
            "Idea viability is low (score: {}). Rescue plan generated.",
            gate.opportunity_score
        );
        let sections = ReportSections {
            gate,
            competition: None,
            finance: None,
            blueprint: None,
        };
        Self::assemble(run, ReportStatus::Rejected, sections, global_summary, Some(plan))
    }

    fn assemble(
        run: &PipelineRun,
        status: ReportStatus,
        sections: ReportSections,
        global_summary: String,
        rescue_plan: Option<RescuePlan>,
    ) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            run_id: run.id(),
            submitted_at: run.created_at(),
            idea: run.idea_text().to_string(),
            status,
            opportunity_score: sections.gate.opportunity_score,
            confidence: sections.gate.confidence,
            risk_flags: sections.gate.risk_flags.clone(),
            global_summary,
            sections,
            rescue_plan,
        }
    }
}

/// Concatenates the summaries of the sections that are present.
fn approved_summary(sections: &ReportSections) -> String {
    let parts = [
        ("Market Analysis", Some(sections.gate.analysis.summary.as_str())),
        (
            "Strategic Analysis",
            sections.competition.as_ref().map(|c| c.summary.as_str()),
        ),
        (
            "Financial Analysis",
            sections.finance.as_ref().map(|f| f.draft.summary.as_str()),
        ),
        (
            "Product Blueprint",
            sections.blueprint.as_ref().map(|b| b.summary.as_str()),
        ),
    ];

    parts
        .into_iter()
        .filter_map(|(heading, summary)| {
            summary
                .filter(|s| !s.trim().is_empty())
                .map(|s| format!("{}: {}", heading, s.trim()))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
