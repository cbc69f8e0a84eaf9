//! Integration tests against live collaborators.
//!
//! These tests make real API calls.
//! Run with: LITELLM_API_BASE=... LITELLM_API_KEY=... TAVILY_API_KEY=... cargo test --test llm_integration -- --ignored

use verdict_forge::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
use verdict_forge::pipeline::stage::StageSpec;
use verdict_forge::research::{self, TavilyClient};
use verdict_forge::scoring::MatchMode;
use verdict_forge::stages::{gate_queries, GateSpec, StageContext};

fn create_test_client() -> LiteLlmClient {
    LiteLlmClient::from_env().expect("LITELLM_API_BASE environment variable must be set for integration tests")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();

    let request = GenerationRequest::new(
        "",
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = client.generate(request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    let content = response.first_content().expect("Should have content");
    assert!(content.contains('4'), "Response should contain '4', got: {}", content);
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_live_gate_stage() {
    let client = create_test_client();
    let search = TavilyClient::from_env().expect("TAVILY_API_KEY must be set");

    let ctx = StageContext::new("Booking software for independent physiotherapists", "en");
    let research = research::gather(&search, &gate_queries(&ctx.idea, 5)).await;
    assert!(!research.is_empty(), "Research returned no sources");

    let spec = GateSpec::new(ctx, research, MatchMode::Lenient);
    let response = client
        .generate(spec.request(1))
        .await
        .expect("Gate generation should succeed");
    let content = response.first_content().expect("Should have content");

    let verdict = spec.validate(content).expect("Gate payload should validate");
    assert!(verdict.opportunity_score.value() <= 100);
    assert!(!verdict.analysis.market_metrics.is_empty());
}
