//! CLI command definitions for verdict-forge.
//!
//! This module provides the command-line interface for serving the HTTP API,
//! evaluating a single idea from the terminal, and running the deterministic
//! scoring and financial engines on their own.

use crate::finance::{self, CostCategory, Lever, LeverSet};
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::pipeline::{PipelineConfig, PipelineController, ProgressEvent, RunRequest};
use crate::research::{ResearchProvider, TavilyClient};
use crate::scoring::{self, ConfidenceTier, Dimension, DimensionSet};
use crate::server::{self, AppState};
use crate::storage::{Database, InMemoryRunStore};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Gated LLM analysis of startup ideas.
#[derive(Parser)]
#[command(name = "verdict-forge")]
#[command(about = "Evaluate startup ideas with gated LLM analysis, scoring and financial simulation")]
#[command(version)]
#[command(
    long_about = "verdict-forge scores an idea against seven market dimensions, then either proposes a rescue plan or runs competition, finance and blueprint analyses in parallel.\n\nExample usage:\n  verdict-forge evaluate \"Subscription meal kits for shift workers\"\n  verdict-forge serve --bind 0.0.0.0:8000"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Serve the HTTP API with SQLite persistence.
    Serve(ServeArgs),

    /// Evaluate one idea and stream progress to stdout.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Compute an opportunity score from dimension values.
    Score(ScoreArgs),

    /// Run the 60-month financial simulation.
    #[command(alias = "sim")]
    Simulate(SimulateArgs),
}

/// Arguments for `verdict-forge serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(short, long, env = "VERDICT_BIND_ADDR")]
    pub bind: Option<String>,

    /// SQLite connection URL.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Arguments for `verdict-forge evaluate`.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// The idea to evaluate.
    pub idea: String,

    /// Output language for generated text.
    #[arg(long, default_value = crate::pipeline::DEFAULT_LANGUAGE)]
    pub language: String,

    /// Model to use instead of the client default.
    #[arg(short = 'm', long, env = "VERDICT_MODEL")]
    pub model: Option<String>,

    /// Print only the final report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `verdict-forge score`. Values are on a 0-10 scale.
#[derive(Parser, Debug)]
pub struct ScoreArgs {
    #[arg(long, default_value = "0")]
    pub market_magnitude: f64,
    #[arg(long, default_value = "0")]
    pub market_momentum: f64,
    #[arg(long, default_value = "0")]
    pub problem_urgency: f64,
    #[arg(long, default_value = "0")]
    pub competitive_void: f64,
    #[arg(long, default_value = "0")]
    pub solution_uniqueness: f64,
    #[arg(long, default_value = "0")]
    pub technical_feasibility: f64,
    #[arg(long, default_value = "0")]
    pub macro_risk: f64,

    /// Number of verified research sources backing the scores.
    #[arg(short, long, default_value = "3")]
    pub sources: usize,
}

/// Arguments for `verdict-forge simulate`.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Monthly subscription price.
    #[arg(short, long)]
    pub price: f64,

    /// Monthly advertising spend.
    #[arg(short, long)]
    pub ad_spend: f64,

    /// Conversion rate in percent.
    #[arg(short, long)]
    pub conversion_rate: f64,

    /// Fixed monthly costs.
    #[arg(long, default_value = "0")]
    pub fixed_costs: f64,

    /// Variable monthly cost per customer.
    #[arg(long, default_value = "0")]
    pub variable_cost: f64,
}

impl ScoreArgs {
    fn dimensions(&self) -> DimensionSet {
        DimensionSet::uniform(0.0)
            .with(Dimension::MarketMagnitude, self.market_magnitude)
            .with(Dimension::MarketMomentum, self.market_momentum)
            .with(Dimension::ProblemUrgency, self.problem_urgency)
            .with(Dimension::CompetitiveVoid, self.competitive_void)
            .with(Dimension::SolutionUniqueness, self.solution_uniqueness)
            .with(Dimension::TechnicalFeasibility, self.technical_feasibility)
            .with(Dimension::MacroRisk, self.macro_risk)
    }
}

impl SimulateArgs {
    fn levers(&self) -> LeverSet {
        LeverSet {
            monthly_price: Lever::fixed(self.price),
            ad_spend: Lever::fixed(self.ad_spend),
            conversion_rate_percent: Lever::fixed(self.conversion_rate),
        }
    }

    fn costs(&self) -> Vec<CostCategory> {
        let mut costs = Vec::new();
        if self.fixed_costs > 0.0 {
            costs.push(CostCategory::fixed("Fixed", self.fixed_costs));
        }
        if self.variable_cost > 0.0 {
            costs.push(CostCategory::variable("Per customer", self.variable_cost));
        }
        costs
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::Evaluate(args) => run_evaluate_command(args).await,
        Commands::Score(args) => run_score_command(args),
        Commands::Simulate(args) => run_simulate_command(args),
    }
}

fn build_providers() -> anyhow::Result<(Arc<dyn LlmProvider>, Arc<dyn ResearchProvider>)> {
    let llm = LiteLlmClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Please set LITELLM_API_BASE (and LITELLM_API_KEY if required).",
            e
        )
    })?;
    let research = TavilyClient::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to initialize research client: {}", e))?;
    Ok((Arc::new(llm), Arc::new(research)))
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(bind) = args.bind {
        config = config.with_bind_addr(bind);
    }
    if let Some(url) = args.database_url {
        config = config.with_database_url(url);
    }

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(database_url = %config.database_url, "Database ready");

    let (llm, research) = build_providers()?;
    let bind_addr = config.bind_addr.clone();
    let ledger_enabled = config.ledger_enabled;

    let mut controller =
        PipelineController::new(llm, research, Arc::new(database.clone()), config)?;
    if ledger_enabled {
        controller = controller.with_ledger(Arc::new(database));
    }

    server::serve(AppState::new(Arc::new(controller)), &bind_addr).await
}

async fn run_evaluate_command(args: EvaluateArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?.with_ledger(false);
    if let Some(model) = args.model {
        config = config.with_default_model(model);
    }

    let (llm, research) = build_providers()?;
    let controller = Arc::new(PipelineController::new(
        llm,
        research,
        Arc::new(InMemoryRunStore::new()),
        config,
    )?);

    let request = RunRequest::new(args.idea).with_language(args.language);
    let (mut events, handle) = controller.spawn(request);

    while let Some(event) = events.recv().await {
        if args.json {
            if let ProgressEvent::Complete { report } = &event {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
        } else {
            print!("{}", event.to_sse_frame());
        }
        if event.is_terminal() {
            break;
        }
    }

    let run = handle.await??;
    info!(run_id = %run.id(), state = %run.state(), "Evaluation finished");
    Ok(())
}

fn run_score_command(args: ScoreArgs) -> anyhow::Result<()> {
    let dims = args.dimensions();
    let tier = ConfidenceTier::from_source_count(args.sources);
    let score = scoring::compute(&dims, tier);

    let output = json!({
        "opportunity_score": score,
        "confidence": tier,
        "weighted_sum": dims.weighted_sum(),
        "risk_flags": dims.risk_flags(tier),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_simulate_command(args: SimulateArgs) -> anyhow::Result<()> {
    let levers = args.levers();
    if !levers.is_well_formed() {
        anyhow::bail!("price, ad spend and conversion rate must be finite numbers");
    }
    let projection = finance::simulate(&levers, &args.costs());
    println!("{}", serde_json::to_string_pretty(&projection)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_evaluate_command_defaults() {
        let cli = Cli::try_parse_from(["verdict-forge", "evaluate", "Pet insurance broker"])
            .expect("should parse");
        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.idea, "Pet insurance broker");
                assert_eq!(args.language, "en");
                assert!(args.model.is_none());
                assert!(!args.json);
            }
            _ => panic!("Expected Evaluate command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_score_args_build_dimensions() {
        let cli = Cli::try_parse_from([
            "verdict-forge",
            "score",
            "--market-magnitude",
            "8",
            "--competitive-void",
            "2",
            "-s",
            "1",
        ])
        .expect("should parse");
        match cli.command {
            Commands::Score(args) => {
                let dims = args.dimensions();
                assert_eq!(dims.get(Dimension::MarketMagnitude), 8.0);
                assert_eq!(dims.get(Dimension::CompetitiveVoid), 2.0);
                assert_eq!(dims.get(Dimension::MacroRisk), 0.0);
                assert_eq!(
                    ConfidenceTier::from_source_count(args.sources),
                    ConfidenceTier::Medium
                );
            }
            _ => panic!("Expected Score command"),
        }
    }

    #[test]
    fn test_simulate_alias_and_costs() {
        let cli = Cli::try_parse_from([
            "verdict-forge",
            "sim",
            "-p",
            "29",
            "-a",
            "1000",
            "-c",
            "2.5",
            "--fixed-costs",
            "500",
        ])
        .expect("should parse");
        match cli.command {
            Commands::Simulate(args) => {
                assert!(args.levers().is_well_formed());
                assert_eq!(args.costs().len(), 1);
                assert!(!args.costs()[0].is_variable);
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from(["verdict-forge", "serve", "--log-level", "debug"])
            .expect("should parse");
        assert_eq!(cli.log_level, "debug");
    }
}
