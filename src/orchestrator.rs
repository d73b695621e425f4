//! Recommendation orchestrator
//!
//! Runs one analysis request end to end: aggregate fetch, composition and
//! pattern analysis, prompt, generation, parse, then cache and history
//! writes. The text provider is chosen once at construction. Calls into the
//! provider go through a single session gate so no two generations are ever
//! in flight at once.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::aggregate::{AggregateError, AggregateProvider};
use crate::cache::{CachedAiResponse, RecommendationCache};
use crate::composition::{CompositionError, CompositionPrediction};
use crate::config::{EngineConfig, ModelConstants};
use crate::history::{generated_key, EngineStore, HistoryError, LAST_DATA_REFRESH_KEY};
use crate::llm::{
  DeviceCapabilities, GenerationOptions, ProviderChoice, ProviderError, ProviderSet, TextGenerator,
};
use crate::models::metrics::MetricAggregate;
use crate::models::profile::UserProfile;
use crate::models::recommendation::{
  ComprehensiveRecommendations, MetricsSnapshot, RecommendationHistoryEntry,
};
use crate::models::window::AnalysisWindow;
use crate::parser::{parse_recommendations, ParseFailure};
use crate::patterns::PatternInsights;
use crate::prompt::{build_prompt, PromptContext, SYSTEM_PROMPT};

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum OrchestratorError {
  #[error("Invalid profile: {field} = {value}")]
  InvalidProfile { field: &'static str, value: f64 },

  #[error("Aggregate error: {0}")]
  Aggregate(#[from] AggregateError),

  #[error("Generation failed: {0}")]
  Generation(#[from] ProviderError),

  #[error("Could not parse recommendations: {reason}")]
  ParseFailed { reason: ParseFailure },
}

impl From<CompositionError> for OrchestratorError {
  fn from(err: CompositionError) -> Self {
    match err {
      CompositionError::InvalidProfile { field, value } => {
        OrchestratorError::InvalidProfile { field, value }
      }
    }
  }
}

/// ---------------------------------------------------------------------------
/// Results
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationRun {
  pub recommendations: ComprehensiveRecommendations,
  /// Name of the provider that produced the text
  pub provider: String,
  /// Set when the result could not be written to history
  pub history_warning: Option<String>,
}

#[derive(Debug)]
pub struct AnalysisReport {
  pub window: AnalysisWindow,
  pub analyzed_period: String,
  pub prediction: CompositionPrediction,
  pub insights: PatternInsights,
  /// Analysis succeeds even when generation or parsing does not
  pub recommendations: Result<RecommendationRun, OrchestratorError>,
  pub from_cache: bool,
}

/// Lifecycle of one recommendation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
  Idle,
  ProviderSelected,
  PromptBuilt,
  AwaitingResponse,
  Parsed,
  Failed,
}

struct RequestTrace<'a> {
  window: &'a str,
  state: RequestState,
}

impl<'a> RequestTrace<'a> {
  fn new(window: &'a str) -> Self {
    Self {
      window,
      state: RequestState::Idle,
    }
  }

  fn advance(&mut self, next: RequestState) {
    debug!(window = self.window, from = ?self.state, to = ?next, "Request state");
    self.state = next;
  }
}

/// ---------------------------------------------------------------------------
/// Window Analysis
/// ---------------------------------------------------------------------------

/// Analyzer output for one window, before any text generation
#[derive(Debug, Clone, Serialize)]
pub struct WindowAnalysis {
  pub window: AnalysisWindow,
  pub analyzed_period: String,
  pub aggregate: MetricAggregate,
  pub prediction: CompositionPrediction,
  pub insights: PatternInsights,
}

/// Fetch the window and its prior period, then run both analyzers.
///
/// A missing prior period only disables the comparison.
pub async fn analyze_window(
  aggregates: &dyn AggregateProvider,
  profile: &UserProfile,
  window: AnalysisWindow,
  now: NaiveDateTime,
  constants: &ModelConstants,
) -> Result<WindowAnalysis, OrchestratorError> {
  let label = window.label();
  let range = window.range_ending(now);

  let aggregate = aggregates.filter(&range).await?;
  let series = aggregates.daily_series(&range).await?;
  let samples = aggregates.body_composition(&range).await?;
  let previous = match aggregates.filter(&window.previous_range(&range)).await {
    Ok(prev) => Some(prev),
    Err(e) => {
      warn!(window = label, error = %e, "Previous period unavailable, skipping comparison");
      None
    }
  };

  let prediction = CompositionPrediction::compute(profile, &aggregate, samples.as_ref(), constants)?;
  let insights = PatternInsights::analyze(&series, &aggregate, &prediction, previous.as_ref(), constants);
  debug!(
    window = label,
    days = aggregate.day_count,
    workouts = aggregate.workout_count(),
    "Window analyzed"
  );

  Ok(WindowAnalysis {
    window,
    analyzed_period: range.describe(),
    aggregate,
    prediction,
    insights,
  })
}

/// ---------------------------------------------------------------------------
/// Orchestrator
/// ---------------------------------------------------------------------------

pub struct RecommendationOrchestrator {
  provider: Option<Arc<dyn TextGenerator>>,
  choice: ProviderChoice,
  aggregates: Arc<dyn AggregateProvider>,
  store: Arc<dyn EngineStore>,
  cache: Arc<RecommendationCache>,
  config: EngineConfig,
  constants: ModelConstants,
  session: Mutex<()>,
}

impl RecommendationOrchestrator {
  pub fn new(
    providers: ProviderSet,
    capabilities: &DeviceCapabilities,
    aggregates: Arc<dyn AggregateProvider>,
    store: Arc<dyn EngineStore>,
    cache: Arc<RecommendationCache>,
    config: EngineConfig,
  ) -> Self {
    let choice = ProviderChoice::select(capabilities);
    let provider = providers.resolve(choice);
    if provider.is_none() {
      warn!(choice = ?choice, "No text provider available, recommendations disabled");
    }

    Self {
      provider,
      choice,
      aggregates,
      store,
      cache,
      config,
      constants: ModelConstants::default(),
      session: Mutex::new(()),
    }
  }

  pub fn with_constants(mut self, constants: ModelConstants) -> Self {
    self.constants = constants;
    self
  }

  pub fn provider_choice(&self) -> ProviderChoice {
    self.choice
  }

  pub fn provider_name(&self) -> Option<&str> {
    self.provider.as_deref().map(|p| p.name())
  }

  /// Full analysis for `window` ending at `now` (local wall-clock)
  pub async fn analyze(
    &self,
    profile: &UserProfile,
    window: AnalysisWindow,
    now: NaiveDateTime,
  ) -> Result<AnalysisReport, OrchestratorError> {
    profile
      .validate()
      .map_err(|f| OrchestratorError::InvalidProfile {
        field: f.field,
        value: f.value,
      })?;

    let label = window.label();
    let last_refreshed = self.sync_refresh().await;

    if let Some(report) = self.cached_report(window, last_refreshed) {
      info!(window = label, "Serving analysis from cache");
      return Ok(report);
    }

    // Taken before the fetch so a refresh during it leaves the entry stale
    let analysis_created_at = Utc::now();
    let WindowAnalysis {
      analyzed_period,
      aggregate,
      prediction,
      insights,
      ..
    } = analyze_window(self.aggregates.as_ref(), profile, window, now, &self.constants).await?;

    self.cache.store_analysis(
      label,
      &analyzed_period,
      prediction.clone(),
      insights.clone(),
      analysis_created_at,
    );

    let recommendations = self
      .recommend(
        profile,
        window,
        &analyzed_period,
        &aggregate,
        &prediction,
        &insights,
        analysis_created_at,
      )
      .await;

    Ok(AnalysisReport {
      window,
      analyzed_period,
      prediction,
      insights,
      recommendations,
      from_cache: false,
    })
  }

  /// Purge cache entries older than the provider's last refresh and persist
  /// the refresh time when it moved
  async fn sync_refresh(&self) -> DateTime<Utc> {
    let last_refreshed = self.aggregates.last_refreshed();
    self.cache.purge_stale(last_refreshed);

    match self.store.get_timestamp(LAST_DATA_REFRESH_KEY).await {
      Ok(Some(seen)) if seen >= last_refreshed => {}
      Ok(_) => {
        if let Err(e) = self.store.set_timestamp(LAST_DATA_REFRESH_KEY, last_refreshed).await {
          warn!(error = %e, "Failed to persist data refresh time");
        }
      }
      Err(e) => warn!(error = %e, "Failed to read data refresh time"),
    }
    last_refreshed
  }

  fn cached_report(&self, window: AnalysisWindow, last_refreshed: DateTime<Utc>) -> Option<AnalysisReport> {
    let hit = self.cache.get(window.label(), last_refreshed)?;
    let CachedAiResponse {
      analyzed_period,
      prediction: Some(prediction),
      insights: Some(insights),
      recommendations: Some(recommendations),
      provider,
      ..
    } = hit
    else {
      return None;
    };

    Some(AnalysisReport {
      window,
      analyzed_period,
      prediction,
      insights,
      recommendations: Ok(RecommendationRun {
        recommendations,
        provider: provider.unwrap_or_default(),
        history_warning: None,
      }),
      from_cache: true,
    })
  }

  async fn recommend(
    &self,
    profile: &UserProfile,
    window: AnalysisWindow,
    analyzed_period: &str,
    aggregate: &MetricAggregate,
    prediction: &CompositionPrediction,
    insights: &PatternInsights,
    analysis_created_at: DateTime<Utc>,
  ) -> Result<RecommendationRun, OrchestratorError> {
    let label = window.label();
    let mut trace = RequestTrace::new(label);

    let Some(provider) = self.provider.clone() else {
      trace.advance(RequestState::Failed);
      return Err(ProviderError::Unavailable("no text provider configured".to_string()).into());
    };
    trace.advance(RequestState::ProviderSelected);

    let previous_entry = match self.store.last_for(label).await {
      Ok(entry) => entry,
      Err(e) => {
        warn!(window = label, error = %e, "Failed to load recommendation history");
        None
      }
    };

    let snapshot = MetricsSnapshot::capture(aggregate, prediction);
    let prompt = build_prompt(&PromptContext {
      profile,
      window,
      analyzed_period,
      aggregate,
      prediction,
      insights,
      snapshot: &snapshot,
      previous: previous_entry.as_ref(),
    });
    trace.advance(RequestState::PromptBuilt);

    let options = GenerationOptions {
      system: Some(SYSTEM_PROMPT.to_string()),
      ..GenerationOptions::from_config(&self.config)
    };

    trace.advance(RequestState::AwaitingResponse);
    let text = match self.generate(provider.as_ref(), &prompt, &options).await {
      Ok(text) => text,
      Err(e) => {
        trace.advance(RequestState::Failed);
        error!(window = label, provider = provider.name(), error = %e, "Generation failed");
        return Err(e.into());
      }
    };

    let actions = match parse_recommendations(&text).into_result() {
      Ok(actions) => actions,
      Err(reason) => {
        trace.advance(RequestState::Failed);
        error!(window = label, reason = %reason, "Could not parse recommendations");
        return Err(OrchestratorError::ParseFailed { reason });
      }
    };
    trace.advance(RequestState::Parsed);

    let recommendations = ComprehensiveRecommendations {
      window_label: label.to_string(),
      actions,
    };
    let generated_at = Utc::now();
    self.cache.store_recommendations(
      label,
      analysis_created_at,
      recommendations.clone(),
      provider.name(),
    );

    let entry = RecommendationHistoryEntry {
      generated_at,
      window_label: label.to_string(),
      analyzed_period: analyzed_period.to_string(),
      recommendations: recommendations.clone(),
      snapshot,
    };
    let history_warning = match self.store.save(&entry).await {
      Ok(()) => None,
      Err(e) => {
        warn!(window = label, error = %e, "Failed to save recommendation history");
        Some(format!("Recommendation history not saved: {}", e))
      }
    };
    if let Err(e) = self.store.set_timestamp(&generated_key(label), generated_at).await {
      warn!(window = label, error = %e, "Failed to persist generation time");
    }

    info!(
      window = label,
      provider = provider.name(),
      actions = recommendations.actions.len(),
      "Recommendations generated"
    );

    Ok(RecommendationRun {
      recommendations,
      provider: provider.name().to_string(),
      history_warning,
    })
  }

  /// One generation behind the session gate. A busy session is waited out
  /// once; every other failure is returned as is.
  async fn generate(
    &self,
    provider: &dyn TextGenerator,
    prompt: &str,
    options: &GenerationOptions,
  ) -> Result<String, ProviderError> {
    let _session = self.acquire_session().await?;

    match provider.generate(prompt, options).await {
      Err(e) if e.is_retryable() => {
        warn!(wait_ms = self.config.busy_wait.as_millis() as u64, "Model session busy, retrying once");
        tokio::time::sleep(self.config.busy_wait).await;
        provider.generate(prompt, options).await
      }
      result => result,
    }
  }

  async fn acquire_session(&self) -> Result<MutexGuard<'_, ()>, ProviderError> {
    if let Ok(guard) = self.session.try_lock() {
      return Ok(guard);
    }
    debug!("Waiting for in-flight generation");
    tokio::time::timeout(self.config.busy_wait, self.session.lock())
      .await
      .map_err(|_| ProviderError::SessionBusy)
  }

  /// Fresh cached result for `window`, complete or not
  pub fn cached(&self, window: AnalysisWindow) -> Option<CachedAiResponse> {
    self.cache.get(window.label(), self.aggregates.last_refreshed())
  }

  pub async fn history(
    &self,
    window: AnalysisWindow,
    limit: usize,
  ) -> Result<Vec<RecommendationHistoryEntry>, HistoryError> {
    self.store.recent_for(window.label(), limit).await
  }

  pub async fn last_generated(&self, window: AnalysisWindow) -> Result<Option<DateTime<Utc>>, HistoryError> {
    self.store.get_timestamp(&generated_key(window.label())).await
  }

  /// Drop history and the cached result for one window
  pub async fn clear_history(&self, window: AnalysisWindow) -> Result<u64, HistoryError> {
    self.cache.invalidate(window.label());
    self.store.clear(window.label()).await
  }

  /// Forget everything: cache, history and persisted timestamps
  pub async fn reset(&self) -> Result<(), HistoryError> {
    self.cache.clear();
    self.store.clear_all().await?;
    info!("Engine state reset");
    Ok(())
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
