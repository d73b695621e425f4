//! `coach-report`: run the engine against a JSON fixture.
//!
//! ```bash
//! # Prediction and insights for the last week of data
//! coach-report --input data.json --window week --now 2026-03-15T00:00:00
//!
//! # Also generate recommendations (uses COACH_* / ANTHROPIC_API_KEY)
//! coach-report --input data.json --window month --recommend
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use health_coach::aggregate::{HealthDataset, InMemoryAggregateProvider};
use health_coach::cache::RecommendationCache;
use health_coach::config::{EngineConfig, ModelConstants};
use health_coach::db::{initialize_db, DbError};
use health_coach::history::SqliteHistoryStore;
use health_coach::llm::{DeviceCapabilities, ProviderSet};
use health_coach::models::{AnalysisWindow, UserProfile};
use health_coach::orchestrator::{
  analyze_window, OrchestratorError, RecommendationOrchestrator, RecommendationRun,
};

#[derive(Parser)]
#[command(
  name = "coach-report",
  about = "Body composition, activity patterns and coaching recommendations from wearable data"
)]
struct Args {
  /// JSON file with `profile` and `data`
  #[arg(long, short = 'i')]
  input: PathBuf,

  /// day, week, month, 6months or year
  #[arg(long, short = 'w', default_value = "week", value_parser = parse_window)]
  window: AnalysisWindow,

  /// End of the window, local time (YYYY-MM-DDTHH:MM:SS). Defaults to now.
  #[arg(long, value_parser = parse_now)]
  now: Option<NaiveDateTime>,

  /// Generate recommendations through the configured provider
  #[arg(long)]
  recommend: bool,

  /// Enable debug logging
  #[arg(long, short = 'v')]
  verbose: bool,
}

fn parse_window(raw: &str) -> Result<AnalysisWindow, String> {
  AnalysisWindow::from_label(raw).ok_or_else(|| format!("unknown window: {}", raw))
}

fn parse_now(raw: &str) -> Result<NaiveDateTime, String> {
  NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map_err(|e| e.to_string())
}

#[derive(Deserialize)]
struct ReportInput {
  profile: UserProfile,
  #[serde(default)]
  data: HealthDataset,
  /// When the data last changed; defaults to file load time
  refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct RecommendationOutput {
  #[serde(flatten)]
  run: Option<RecommendationRun>,
  error: Option<String>,
  from_cache: bool,
}

#[derive(Error, Debug)]
enum CliError {
  #[error("Failed to read input: {0}")]
  Io(#[from] std::io::Error),

  #[error("Invalid input: {0}")]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Engine(#[from] OrchestratorError),

  #[error(transparent)]
  Database(#[from] DbError),
}

#[tokio::main]
async fn main() {
  let args = Args::parse();
  let directive = if args.verbose {
    "health_coach=debug"
  } else {
    "health_coach=info"
  };
  health_coach::init_tracing_with(directive);

  if let Err(e) = run(args).await {
    eprintln!("error: {}", e);
    std::process::exit(1);
  }
}

async fn run(args: Args) -> Result<(), CliError> {
  let config = EngineConfig::from_env();
  let input: ReportInput = serde_json::from_str(&std::fs::read_to_string(&args.input)?)?;
  let now = args
    .now
    .unwrap_or_else(|| chrono::Local::now().naive_local());

  let aggregates = Arc::new(InMemoryAggregateProvider::new(
    input.data,
    input.refreshed_at.unwrap_or_else(Utc::now),
  ));

  if !args.recommend {
    let analysis = analyze_window(
      aggregates.as_ref(),
      &input.profile,
      args.window,
      now,
      &ModelConstants::default(),
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    return Ok(());
  }

  let pool = initialize_db(&config.db_path).await?;
  let orchestrator = RecommendationOrchestrator::new(
    ProviderSet::from_config(&config),
    &DeviceCapabilities::from_config(&config),
    aggregates,
    Arc::new(SqliteHistoryStore::new(pool.clone(), config.history_limit)),
    Arc::new(RecommendationCache::new()),
    config,
  );

  let report = orchestrator.analyze(&input.profile, args.window, now).await?;
  info!(window = %report.window, period = %report.analyzed_period, "Analysis complete");

  let recommendations = match report.recommendations {
    Ok(run) => RecommendationOutput {
      run: Some(run),
      error: None,
      from_cache: report.from_cache,
    },
    Err(e) => RecommendationOutput {
      run: None,
      error: Some(e.to_string()),
      from_cache: report.from_cache,
    },
  };

  let output = serde_json::json!({
    "window": report.window,
    "analyzed_period": report.analyzed_period,
    "prediction": report.prediction,
    "insights": report.insights,
    "recommendations": recommendations,
  });
  println!("{}", serde_json::to_string_pretty(&output)?);

  pool.close().await;
  Ok(())
}
