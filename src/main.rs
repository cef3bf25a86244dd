use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use qualimetry::config::AppConfig;
use qualimetry::progress::LogProgressTracker;
use qualimetry::telemetry::{open_store, TelemetryRecord, TelemetryStore};
use qualimetry::{AssessmentEngine, Goal, QualityAssessmentService};

#[derive(Parser)]
#[command(name = "qualimetry", about = "Score quality goals from telemetry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $QUALIMETRY_CONFIG, then ./qualimetry.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one assessment cycle and print each goal's score
    Assess,
    /// Append telemetry records from a JSON array file, then reassess
    Ingest { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = AppConfig::resolve_path(cli.config);
    let config = AppConfig::load(&path)?;
    tracing::info!(config = %path.display(), "qualimetry starting");

    let store = open_store(&config.source).context("opening telemetry store")?;
    store.connect().await.context("connecting to telemetry store")?;

    let service = QualityAssessmentService::new();
    service.set_progress_tracker(Arc::new(LogProgressTracker));
    service.set_persist_assessments(config.persist_assessments);
    service.set_context(Arc::clone(&store), config.build_goals()).await;

    let goals = execute(store.as_ref(), &service, cli.command).await?;
    print_scores(&goals);
    Ok(())
}

/// Runs `command`, then disconnects the store whether or not the command succeeded.
async fn execute(store: &dyn TelemetryStore, service: &QualityAssessmentService, command: Commands) -> Result<Vec<Goal>> {
    let outcome = run(service, command).await;
    if let Err(e) = store.disconnect().await {
        tracing::warn!("Failed to disconnect store: {}", e);
    }
    outcome
}

async fn run(service: &QualityAssessmentService, command: Commands) -> Result<Vec<Goal>> {
    let goals = match command {
        Commands::Assess => service.assess_quality_goals().await?,
        Commands::Ingest { file } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let records: Vec<TelemetryRecord> =
                serde_json::from_str(&contents).with_context(|| format!("parsing {}", file.display()))?;
            service.ingest_telemetry(records).await?
        }
    };
    Ok(goals)
}

fn print_scores(goals: &[Goal]) {
    let engine = AssessmentEngine::new();
    let latest: Vec<_> = goals.iter().filter_map(|g| g.latest_assessment().cloned()).collect();

    for assessment in &latest {
        println!("{:<24} {:>10.3}", assessment.goal_name(), assessment.global_score());
        for (metric, contribution) in assessment.details() {
            println!("  {:<22} {:>10.3}", metric, contribution);
        }
        for gap in assessment.gaps() {
            println!("  ! {} {}", gap.metric, gap.reason);
        }
    }
    println!("{:<24} {:>10.3}", "overall", engine.overall_score(goals, &latest));
}
