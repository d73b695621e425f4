//! In-memory cache of analysis results per window label
//!
//! An entry is only valid while its creation time is at or after the data
//! source's last refresh. Entries are replaced whole, so a reader never sees
//! a half-written entry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::composition::CompositionPrediction;
use crate::models::recommendation::ComprehensiveRecommendations;
use crate::patterns::PatternInsights;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAiResponse {
  pub window_label: String,
  pub created_at: DateTime<Utc>,
  pub analyzed_period: String,
  pub prediction: Option<CompositionPrediction>,
  pub insights: Option<PatternInsights>,
  pub recommendations: Option<ComprehensiveRecommendations>,
  /// Provider that produced the recommendations
  pub provider: Option<String>,
}

impl CachedAiResponse {
  pub fn is_fresh(&self, last_refreshed: DateTime<Utc>) -> bool {
    self.created_at >= last_refreshed
  }

  pub fn is_complete(&self) -> bool {
    self.prediction.is_some() && self.insights.is_some() && self.recommendations.is_some()
  }
}

#[derive(Default)]
pub struct RecommendationCache {
  entries: RwLock<HashMap<String, CachedAiResponse>>,
}

impl RecommendationCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fresh entry for `window_label`. A stale entry is removed on the way out.
  pub fn get(&self, window_label: &str, last_refreshed: DateTime<Utc>) -> Option<CachedAiResponse> {
    {
      let entries = self.entries.read();
      match entries.get(window_label) {
        None => return None,
        Some(entry) if entry.is_fresh(last_refreshed) => return Some(entry.clone()),
        Some(_) => {}
      }
    }

    let mut entries = self.entries.write();
    // Another writer may have replaced it since the read lock was released
    if entries
      .get(window_label)
      .is_some_and(|e| !e.is_fresh(last_refreshed))
    {
      entries.remove(window_label);
      debug!(window = window_label, "Purged stale cache entry");
      return None;
    }
    entries.get(window_label).cloned()
  }

  /// Without a freshness check
  pub fn peek(&self, window_label: &str) -> Option<CachedAiResponse> {
    self.entries.read().get(window_label).cloned()
  }

  /// Cache analyzer output as soon as it is computed. Replaces any earlier
  /// entry for the label, including its recommendations.
  pub fn store_analysis(
    &self,
    window_label: &str,
    analyzed_period: &str,
    prediction: CompositionPrediction,
    insights: PatternInsights,
    created_at: DateTime<Utc>,
  ) {
    let entry = CachedAiResponse {
      window_label: window_label.to_string(),
      created_at,
      analyzed_period: analyzed_period.to_string(),
      prediction: Some(prediction),
      insights: Some(insights),
      recommendations: None,
      provider: None,
    };
    self.entries.write().insert(window_label.to_string(), entry);
  }

  /// Attach parsed recommendations to the analysis they were built from.
  /// Skipped when the label's entry is gone or was replaced by a newer
  /// analysis since `analysis_created_at`.
  pub fn store_recommendations(
    &self,
    window_label: &str,
    analysis_created_at: DateTime<Utc>,
    recommendations: ComprehensiveRecommendations,
    provider: &str,
  ) -> bool {
    let mut entries = self.entries.write();
    match entries.get_mut(window_label) {
      Some(entry) if entry.created_at == analysis_created_at => {
        entry.recommendations = Some(recommendations);
        entry.provider = Some(provider.to_string());
        true
      }
      _ => {
        debug!(window = window_label, "Analysis replaced, recommendations not cached");
        false
      }
    }
  }

  /// Remove every entry created before `last_refreshed`
  pub fn purge_stale(&self, last_refreshed: DateTime<Utc>) -> usize {
    let mut entries = self.entries.write();
    let before = entries.len();
    entries.retain(|_, e| e.is_fresh(last_refreshed));
    let purged = before - entries.len();
    if purged > 0 {
      debug!(purged, "Purged stale cache entries");
    }
    purged
  }

  pub fn invalidate(&self, window_label: &str) {
    self.entries.write().remove(window_label);
  }

  pub fn clear(&self) {
    self.entries.write().clear();
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }
}
