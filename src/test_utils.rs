//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock profile, aggregate and history factories
//! - A scripted text generator
//! - Helper assertions

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use sqlx::SqlitePool;

use crate::aggregate::{DailyMetrics, HealthDataset};
use crate::llm::{GenerationOptions, ProviderError, TextGenerator};
use crate::models::metrics::{MetricAggregate, Sample, WorkoutRecord};
use crate::models::profile::{BiologicalSex, FitnessGoal, UserProfile};
use crate::models::recommendation::{
  ActionCategory, CoachAction, ComprehensiveRecommendations, MetricsSnapshot,
  RecommendationHistoryEntry,
};
use crate::models::window::DateRange;

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// ---------------------------------------------------------------------------
/// Dates
/// ---------------------------------------------------------------------------

/// Day of March 2026
pub fn date(day: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(2026, 3, day).expect("valid March date")
}

/// Local wall-clock time on a day of March 2026
pub fn local(day: u32, hour: u32) -> NaiveDateTime {
  date(day).and_hms_opt(hour, 0, 0).expect("valid hour")
}

/// Measured sample taken at 08:00
pub fn sample(day: u32, value: f64) -> Sample {
  Sample {
    at: local(day, 8),
    value,
  }
}

pub fn workout(
  activity_type: &str,
  day: u32,
  hour: u32,
  minutes: f64,
  energy_kcal: Option<f64>,
) -> WorkoutRecord {
  let offset = FixedOffset::east_opt(0).expect("zero offset");
  let start = offset
    .from_local_datetime(&local(day, hour))
    .single()
    .expect("unambiguous start");
  WorkoutRecord {
    start,
    end: start + Duration::seconds((minutes * 60.0) as i64),
    duration_minutes: minutes,
    activity_type: activity_type.to_string(),
    energy_kcal,
  }
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

pub fn mock_profile() -> UserProfile {
  UserProfile {
    age: 30,
    sex: BiologicalSex::Male,
    height_cm: 180.0,
    weight_kg: 90.0,
    target_weight_kg: 80.0,
    goals: vec![FitnessGoal::LoseWeight],
  }
}

/// Nothing measured over `days` days from Mar 1, 2026
pub fn mock_aggregate(days: u32) -> MetricAggregate {
  let start = local(1, 0);
  MetricAggregate::empty(&DateRange {
    start,
    end: start + Duration::days(days as i64),
  })
}

fn deficit_workouts(strength: bool) -> Vec<WorkoutRecord> {
  let (first_type, first_kcal) = if strength {
    ("Traditional Strength Training", 300.0)
  } else {
    ("Yoga", 200.0)
  };
  let mut workouts: Vec<WorkoutRecord> = [1, 3, 5, 8]
    .into_iter()
    .map(|d| workout(first_type, d, 7, 45.0, Some(first_kcal)))
    .collect();
  workouts.extend(
    [10, 12]
      .into_iter()
      .map(|d| workout("Running", d, 7, 45.0, Some(450.0))),
  );
  workouts
}

/// 14 days burning 2800 kcal/day (1900 basal + 900 active) and eating 2300,
/// four strength (or yoga) sessions and two runs, 7.5 h sleep
pub fn deficit_aggregate(strength: bool) -> MetricAggregate {
  let mut agg = mock_aggregate(14);
  agg.total_basal_calories = Some(1900.0 * 14.0);
  agg.total_active_calories = Some(900.0 * 14.0);
  agg.total_dietary_calories = Some(2300.0 * 14.0);
  agg.avg_sleep_hours = Some(7.5);
  agg.workouts = deficit_workouts(strength);
  agg
}

/// Raw daily records matching `deficit_aggregate`
pub fn deficit_dataset(strength: bool) -> HealthDataset {
  let days = (1..=14)
    .map(|d| {
      let mut m = DailyMetrics::empty(date(d));
      m.basal_calories = Some(1900.0);
      m.active_calories = Some(900.0);
      m.dietary_calories = Some(2300.0);
      m.sleep_hours = Some(7.5);
      m.steps = Some(8_000.0);
      m
    })
    .collect();
  HealthDataset {
    days,
    workouts: deficit_workouts(strength),
    ..Default::default()
  }
}

fn mock_action(priority: u8) -> CoachAction {
  let category = ActionCategory::ALL[(priority as usize - 1) % ActionCategory::ALL.len()];
  CoachAction {
    priority,
    category,
    command: format!("Do thing number {}", priority),
    current_state: "2 sessions/week".to_string(),
    target_state: "4 sessions/week".to_string(),
    expected_impact: "Faster progress".to_string(),
    rationale: "Volume is below target".to_string(),
    health_note: None,
    is_estimated: false,
  }
}

pub fn mock_history_entry(window_label: &str, generated_at: DateTime<Utc>) -> RecommendationHistoryEntry {
  RecommendationHistoryEntry {
    generated_at,
    window_label: window_label.to_string(),
    analyzed_period: "Mar 1 to Mar 14, 2026 (14 days)".to_string(),
    recommendations: ComprehensiveRecommendations {
      window_label: window_label.to_string(),
      actions: (1..=4).map(mock_action).collect(),
    },
    snapshot: MetricsSnapshot {
      workouts_per_week: 1.0,
      avg_active_calories: Some(600.0),
      avg_steps: None,
      strength_workouts: 1,
      cardio_workouts: 1,
      sleep_hours: Some(7.0),
      recovery_score: Some(60.0),
      fat_loss_kg: Some(0.2),
      muscle_gain_kg: Some(0.0),
    },
  }
}

/// Model output with `count` bracketed items
pub fn well_formed_response(count: usize) -> String {
  let mut out = String::from("Here is your plan.\n\n");
  for i in 1..=count {
    let category = ActionCategory::ALL[(i - 1) % ActionCategory::ALL.len()];
    out.push_str(&format!(
      "[{}] {}: Do thing number {}\nCurrent: 2 sessions/week\nTarget: 4 sessions/week\nImpact: Faster progress\nWhy: Volume is below target\n\n",
      i,
      category.as_str().to_uppercase(),
      i
    ));
  }
  out
}

/// ---------------------------------------------------------------------------
/// Scripted Text Generator
/// ---------------------------------------------------------------------------

/// Replays canned results in order and records every prompt it receives
pub struct ScriptedGenerator {
  name: String,
  script: Mutex<VecDeque<Result<String, ProviderError>>>,
  prompts: Mutex<Vec<String>>,
  delay: StdDuration,
  in_flight: AtomicUsize,
  max_in_flight: AtomicUsize,
}

impl ScriptedGenerator {
  pub fn new(name: &str, script: Vec<Result<String, ProviderError>>) -> Self {
    Self {
      name: name.to_string(),
      script: Mutex::new(script.into()),
      prompts: Mutex::new(Vec::new()),
      delay: StdDuration::ZERO,
      in_flight: AtomicUsize::new(0),
      max_in_flight: AtomicUsize::new(0),
    }
  }

  pub fn with_delay(mut self, delay: StdDuration) -> Self {
    self.delay = delay;
    self
  }

  pub fn calls(&self) -> usize {
    self.prompts.lock().len()
  }

  pub fn prompts(&self) -> Vec<String> {
    self.prompts.lock().clone()
  }

  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
  fn name(&self) -> &str {
    &self.name
  }

  async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String, ProviderError> {
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    self.prompts.lock().push(prompt.to_string());

    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }

    let next = self
      .script
      .lock()
      .pop_front()
      .unwrap_or_else(|| Err(ProviderError::Unavailable("script exhausted".to_string())));
    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    next
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('recommendation_history', 'engine_timestamps')",
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 2);

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_mock_factories_create_valid_data() {
    assert!(mock_profile().validate().is_ok());

    let agg = deficit_aggregate(true);
    assert_eq!(agg.day_count, 14);
    assert_eq!(agg.workout_count(), 6);
    assert_eq!(agg.total_energy(), Some(2800.0 * 14.0));

    let entry = mock_history_entry("week", Utc::now());
    assert_eq!(entry.recommendations.actions.len(), 4);
    assert_eq!(entry.recommendations.actions[0].category, ActionCategory::Cardio);
  }

  #[tokio::test]
  async fn test_scripted_generator_replays_in_order() {
    let generator = ScriptedGenerator::new(
      "scripted",
      vec![Ok("first".to_string()), Err(ProviderError::RateLimited)],
    );
    let options = GenerationOptions {
      temperature: 0.7,
      max_tokens: 100,
      system: None,
    };

    assert_eq!(generator.generate("a", &options).await, Ok("first".to_string()));
    assert_eq!(generator.generate("b", &options).await, Err(ProviderError::RateLimited));
    assert!(matches!(
      generator.generate("c", &options).await,
      Err(ProviderError::Unavailable(_))
    ));
    assert_eq!(generator.calls(), 3);
    assert_eq!(generator.prompts()[1], "b");
  }
}
