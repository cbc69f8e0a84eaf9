//! End-to-end runs of the pipeline controller against scripted providers.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use verdict_forge::error::{LlmError, SearchError};
use verdict_forge::llm::{
    Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, ResponseFormat, Usage,
};
use verdict_forge::pipeline::{
    PipelineConfig, PipelineController, PipelineError, PipelineRun, ProgressEmitter, ProgressEvent,
    RunRequest, RunState, StageResult, StageTag,
};
use verdict_forge::research::{ResearchProvider, ResearchQuery, SearchHit};
use verdict_forge::scoring::Dimension;
use verdict_forge::storage::{
    InMemoryLedger, InMemoryRunStore, RunStore, SecondaryIndex, StoreError, UsageLedger,
};

const SOURCES: [&str; 3] = [
    "https://market.example/report",
    "https://trends.example/2024",
    "https://forum.example/thread",
];

/// Answers each structured-output schema with a fixed body. Schemas without
/// a scripted body fail at the transport level.
#[derive(Default)]
struct ScriptedLlm {
    bodies: HashMap<&'static str, String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedLlm {
    fn answer(mut self, schema: &'static str, body: Value) -> Self {
        self.bodies.insert(schema, body.to_string());
        self
    }

    fn calls(&self, schema: &str) -> usize {
        self.calls.lock().unwrap().get(schema).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let schema = match &request.response_format {
            Some(ResponseFormat::JsonSchema { json_schema }) => json_schema.name.clone(),
            _ => String::new(),
        };
        *self.calls.lock().unwrap().entry(schema.clone()).or_insert(0) += 1;

        let body = self
            .bodies
            .get(schema.as_str())
            .cloned()
            .ok_or_else(|| LlmError::RequestFailed(format!("no script for '{}'", schema)))?;

        Ok(GenerationResponse {
            id: "scripted".to_string(),
            model: request.model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(body),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

struct FixedResearch {
    urls: Vec<&'static str>,
}

#[async_trait]
impl ResearchProvider for FixedResearch {
    async fn search(&self, _query: &ResearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        Ok(self
            .urls
            .iter()
            .enumerate()
            .map(|(i, url)| SearchHit::new(format!("Source {}", i + 1), "Relevant market data", *url))
            .collect())
    }
}

fn gate_body(value: f64) -> Value {
    let breakdown: Vec<Value> = Dimension::ALL
        .into_iter()
        .map(|d| json!({"name": d.label(), "score": value}))
        .collect();
    json!({
        "market_overview": "Independent clinics are digitising slowly.",
        "market_metrics": [
            {"name": "TAM", "value": "$1.2B", "change_percentage": "+9%", "note": "EU only", "verified_url": SOURCES[0]}
        ],
        "seo_keywords": [{"keyword": "vet clinic scheduling", "opportunity_level": "High"}],
        "target_persona": {"name": "Clinic owner", "description": "Runs 2-5 vets", "pain_points": ["No-shows"]},
        "scoring_breakdown": breakdown,
        "summary": "Fragmented market with weak incumbents.",
        "recommendation_title": "Proceed",
        "recommendation_text": "Pilot with ten clinics."
    })
}

fn competition_body() -> Value {
    json!({
        "competitors": [
            {"name": "PetDesk", "market_position": "Leader", "pricing_tier": "Premium", "key_strength": "Reminders", "verified_url": SOURCES[1]}
        ],
        "complaints": [
            {"quote": "Support takes days", "source": "Forum", "competitor": "PetDesk", "verified_url": SOURCES[2]}
        ],
        "strategic_opening": {"label": "Small clinics", "description": "Self-serve onboarding"},
        "summary": "One premium incumbent."
    })
}

fn finance_body() -> Value {
    json!({
        "pricing_tiers": [
            {"name": "Solo", "price": 29.0, "features": ["1 vet"], "recommended": false, "benchmark_competitor": "PetDesk", "verified_url": SOURCES[0]},
            {"name": "Clinic", "price": 79.0, "features": ["5 vets"], "recommended": true, "benchmark_competitor": "", "verified_url": ""},
            {"name": "Group", "price": 199.0, "features": ["Unlimited"], "recommended": false, "benchmark_competitor": "", "verified_url": ""}
        ],
        "levers": {
            "monthly_price": {"value": 79.0, "min": 19.0, "max": 199.0, "step": 1.0},
            "ad_spend": {"value": 1000.0, "min": 0.0, "max": 10000.0, "step": 100.0},
            "conversion_rate": {"value": 2.0, "min": 0.5, "max": 10.0, "step": 0.1}
        },
        "cost_structure": [
            {"name": "Hosting", "monthly_amount": 300.0, "is_variable": false}
        ],
        "roadmap": [
            {"phase_name": "Pilot", "duration_months": 3, "required_budget": "€5 000", "milestone_goal": "10 clinics"}
        ],
        "summary": "Profitable within the first year."
    })
}

fn blueprint_body() -> Value {
    json!({
        "tech_stack": [{"name": "Backend", "technologies": ["Rust", "PostgreSQL"]}],
        "user_flow": [{"step": 1, "action": "Clinic signs up"}, {"step": 2, "action": "Imports calendar"}],
        "integrations": [{"name": "Twilio", "category": "SMS", "justification": "Reminders"}],
        "milestones": [{"title": "MVP", "duration_weeks": 6, "deliverables": ["Booking page"]}],
        "tech_risks": [{"risk": "Calendar sync drift", "mitigation": "Two-way webhooks"}],
        "summary": "Standard SaaS build."
    })
}

fn rescue_body() -> Value {
    json!({
        "improve": {"title": "Narrow the niche", "description": "Exotic pet clinics only.", "ai_suggested_prompt": "Scheduling for exotic animal vets"},
        "pivot": {"title": "Sell to insurers", "description": "Claims intake for pet insurers.", "ai_suggested_prompt": "Claims intake API for pet insurers"}
    })
}

fn accepting_llm() -> ScriptedLlm {
    ScriptedLlm::default()
        .answer("gate_analysis", gate_body(8.0))
        .answer("competition_analysis", competition_body())
        .answer("finance_model", finance_body())
        .answer("mvp_blueprint", blueprint_body())
}

/// Index that always fails, counting attempts.
#[derive(Default)]
struct FailingIndex {
    attempts: AtomicUsize,
}

#[async_trait]
impl SecondaryIndex for FailingIndex {
    async fn index_run(&self, _run: &PipelineRun) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Index("search cluster unavailable".to_string()))
    }
}

struct Harness {
    llm: Arc<ScriptedLlm>,
    store: Arc<InMemoryRunStore>,
    controller: Arc<PipelineController>,
}

fn harness(llm: ScriptedLlm, urls: Vec<&'static str>, ledger: Option<Arc<InMemoryLedger>>) -> Harness {
    let llm = Arc::new(llm);
    let store = Arc::new(InMemoryRunStore::new());
    let config = PipelineConfig::default().with_backoff_unit(Duration::from_millis(1));

    let mut controller = PipelineController::new(
        llm.clone(),
        Arc::new(FixedResearch { urls }),
        store.clone(),
        config,
    )
    .unwrap();
    if let Some(ledger) = ledger {
        controller = controller.with_ledger(ledger);
    }

    Harness {
        llm,
        store,
        controller: Arc::new(controller),
    }
}

async fn run_collecting(
    harness: &Harness,
    request: RunRequest,
) -> (Result<PipelineRun, PipelineError>, Vec<ProgressEvent>) {
    let (emitter, mut rx) = ProgressEmitter::channel();
    let result = harness.controller.run(request, emitter).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (result, events)
}

fn terminal_events(events: &[ProgressEvent]) -> Vec<&ProgressEvent> {
    events.iter().filter(|e| e.is_terminal()).collect()
}

#[tokio::test]
async fn test_accepted_idea_produces_full_report() {
    let h = harness(accepting_llm(), SOURCES.to_vec(), None);
    let (result, events) = run_collecting(&h, RunRequest::new("Scheduling for vet clinics")).await;

    let run = result.unwrap();
    assert_eq!(run.state(), RunState::ApprovedComplete);
    assert_eq!(run.gate_score().map(|s| s.value()), Some(80));

    let terminal = terminal_events(&events);
    assert_eq!(terminal.len(), 1);
    assert!(events.last().unwrap().is_terminal());

    let report = match terminal[0] {
        ProgressEvent::Complete { report } => report.clone(),
        other => panic!("expected complete event, got {:?}", other),
    };
    assert_eq!(report["status"], "approved");
    assert_eq!(report["opportunity_score"], 80);
    assert_eq!(report["confidence"], "High");
    assert!(report["sections"]["competition"].is_object());
    assert!(report["sections"]["finance"]["metrics"].is_object());
    assert!(report["sections"]["blueprint"].is_object());
    assert!(report.get("rescue_plan").is_none());
    assert!(report["global_summary"]
        .as_str()
        .unwrap()
        .contains("Financial Analysis: Profitable within the first year."));

    let stored = h.store.get_run(run.id()).await.unwrap().expect("persisted");
    assert_eq!(stored.terminal_payload(), Some(&report));
    assert_eq!(h.llm.calls("rescue_plan"), 0);
}

#[tokio::test]
async fn test_low_score_takes_rescue_branch() {
    let llm = ScriptedLlm::default()
        .answer("gate_analysis", gate_body(4.5))
        .answer("rescue_plan", rescue_body());
    let h = harness(llm, SOURCES.to_vec(), None);

    let (result, events) = run_collecting(&h, RunRequest::new("Scheduling for vet clinics")).await;
    let run = result.unwrap();

    assert_eq!(run.state(), RunState::RejectedComplete);
    assert_eq!(run.gate_score().map(|s| s.value()), Some(45));
    let report = run.terminal_payload().unwrap();
    assert_eq!(report["status"], "rejected");
    assert_eq!(report["rescue_plan"]["improve"]["title"], "Narrow the niche");
    assert_eq!(
        report["global_summary"],
        "Idea viability is low (score: 45). Rescue plan generated."
    );
    assert!(report["sections"]["competition"].is_null());
    for tag in StageTag::FANOUT {
        assert_eq!(run.stage_result(tag), Some(&StageResult::Skipped));
    }

    assert_eq!(terminal_events(&events).len(), 1);
    assert_eq!(h.llm.calls("competition_analysis"), 0);
    assert_eq!(h.llm.calls("finance_model"), 0);
    assert_eq!(h.llm.calls("mvp_blueprint"), 0);
}

#[tokio::test]
async fn test_rescue_failure_falls_back_to_default_plan() {
    let llm = ScriptedLlm::default().answer("gate_analysis", gate_body(4.5));
    let h = harness(llm, SOURCES.to_vec(), None);

    let (result, _events) = run_collecting(&h, RunRequest::new("Scheduling for vet clinics")).await;
    let run = result.unwrap();

    assert_eq!(run.state(), RunState::RejectedComplete);
    let report = run.terminal_payload().unwrap();
    assert_eq!(report["rescue_plan"]["improve"]["title"], "Refine Value Proposition");
    assert!(matches!(
        run.stage_result(StageTag::Rescue),
        Some(StageResult::Failure(_))
    ));
    assert_eq!(h.llm.calls("rescue_plan"), 1);
    assert!(h.store.get_run(run.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_fanout_stage_leaves_null_section() {
    let llm = ScriptedLlm::default()
        .answer("gate_analysis", gate_body(8.0))
        .answer("competition_analysis", competition_body())
        .answer("finance_model", finance_body());
    let h = harness(llm, SOURCES.to_vec(), None);

    let (result, events) = run_collecting(&h, RunRequest::new("Scheduling for vet clinics")).await;
    let run = result.unwrap();

    assert_eq!(run.state(), RunState::ApprovedComplete);
    let report = run.terminal_payload().unwrap();
    assert!(report["sections"]["blueprint"].is_null());
    assert!(report["sections"]["competition"].is_object());
    assert!(report["sections"]["finance"].is_object());
    assert!(!report["global_summary"]
        .as_str()
        .unwrap()
        .contains("Product Blueprint"));

    assert!(matches!(
        run.stage_result(StageTag::Blueprint),
        Some(StageResult::Failure(_))
    ));
    let blueprint_failed = events.iter().any(|e| {
        matches!(e, ProgressEvent::StageFailed { stage: StageTag::Blueprint, .. })
    });
    assert!(blueprint_failed);
    assert_eq!(h.llm.calls("mvp_blueprint"), 1);
}

#[tokio::test]
async fn test_gate_without_sources_fails_run() {
    let h = harness(accepting_llm(), Vec::new(), None);

    let (result, events) = run_collecting(&h, RunRequest::new("Scheduling for vet clinics")).await;

    assert!(matches!(result, Err(PipelineError::Gate(_))));
    let terminal = terminal_events(&events);
    assert_eq!(terminal.len(), 1);
    assert!(matches!(terminal[0], ProgressEvent::Error { .. }));

    // Nothing is generated without evidence.
    assert_eq!(h.llm.calls("gate_analysis"), 0);
    assert_eq!(h.llm.calls("competition_analysis"), 0);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_ledger_charges_accepted_runs_once() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.grant("acct-7", 2).await;
    let h = harness(accepting_llm(), SOURCES.to_vec(), Some(ledger.clone()));

    let (result, _) = run_collecting(
        &h,
        RunRequest::new("Scheduling for vet clinics").with_account("acct-7"),
    )
    .await;

    assert_eq!(result.unwrap().state(), RunState::ApprovedComplete);
    assert_eq!(ledger.balance("acct-7").await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_ledger_refusal_fails_before_fanout() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.grant("acct-0", 0).await;
    let h = harness(accepting_llm(), SOURCES.to_vec(), Some(ledger));

    let (result, events) = run_collecting(
        &h,
        RunRequest::new("Scheduling for vet clinics").with_account("acct-0"),
    )
    .await;

    assert!(matches!(result, Err(PipelineError::Ledger(_))));
    assert_eq!(terminal_events(&events).len(), 1);
    assert_eq!(h.llm.calls("competition_analysis"), 0);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_rejected_runs_are_not_charged() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.grant("acct-3", 1).await;
    let llm = ScriptedLlm::default()
        .answer("gate_analysis", gate_body(4.5))
        .answer("rescue_plan", rescue_body());
    let h = harness(llm, SOURCES.to_vec(), Some(ledger.clone()));

    let (result, _) = run_collecting(
        &h,
        RunRequest::new("Scheduling for vet clinics").with_account("acct-3"),
    )
    .await;

    assert_eq!(result.unwrap().state(), RunState::RejectedComplete);
    assert_eq!(ledger.balance("acct-3").await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_dropped_receiver_does_not_cancel_run() {
    let h = harness(accepting_llm(), SOURCES.to_vec(), None);

    let (events, handle) = h.controller.spawn(RunRequest::new("Scheduling for vet clinics"));
    drop(events);

    let run = handle.await.unwrap().unwrap();
    assert_eq!(run.state(), RunState::ApprovedComplete);
    assert!(h.store.get_run(run.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_empty_idea_is_rejected_without_run() {
    let h = harness(accepting_llm(), SOURCES.to_vec(), None);

    let (result, events) = run_collecting(&h, RunRequest::new("   ")).await;

    assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ProgressEvent::Error { .. }));
    assert_eq!(h.llm.calls("gate_analysis"), 0);
}

#[tokio::test]
async fn test_index_failure_does_not_affect_run() {
    let llm = Arc::new(accepting_llm());
    let store = Arc::new(InMemoryRunStore::new());
    let index = Arc::new(FailingIndex::default());
    let controller = PipelineController::new(
        llm,
        Arc::new(FixedResearch {
            urls: SOURCES.to_vec(),
        }),
        store.clone(),
        PipelineConfig::default().with_backoff_unit(Duration::from_millis(1)),
    )
    .unwrap()
    .with_index(index.clone());

    let (emitter, mut rx) = ProgressEmitter::channel();
    let run = controller
        .run(RunRequest::new("Scheduling for vet clinics"), emitter)
        .await
        .unwrap();
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(run.state(), RunState::ApprovedComplete);
    let terminal = terminal_events(&events);
    assert_eq!(terminal.len(), 1);
    assert!(matches!(terminal[0], ProgressEvent::Complete { .. }));
    assert_eq!(index.attempts.load(Ordering::SeqCst), 1);
    assert!(store.get_run(run.id()).await.unwrap().is_some());
}
