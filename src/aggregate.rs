//! Metric aggregate provider
//!
//! The engine never reads wearable data directly. It asks a provider for
//! pre-aggregated totals over a range, a zero-filled daily activity series
//! and a refresh timestamp used for cache invalidation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::metrics::{
  BodyCompositionSamples, DailyActivity, MetricAggregate, Sample, WorkoutRecord,
};
use crate::models::window::DateRange;

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum AggregateError {
  #[error("Health data unavailable: {0}")]
  Unavailable(String),

  #[error("Invalid range: {start} is after {end}")]
  InvalidRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
  },
}

/// ---------------------------------------------------------------------------
/// Provider Contract
/// ---------------------------------------------------------------------------

#[async_trait]
pub trait AggregateProvider: Send + Sync {
  /// Totals and averages over `range`
  async fn filter(&self, range: &DateRange) -> Result<MetricAggregate, AggregateError>;

  /// One entry per local calendar day touched by `range`
  async fn daily_series(&self, range: &DateRange) -> Result<Vec<DailyActivity>, AggregateError>;

  /// Directly measured body composition inside `range`, if any
  async fn body_composition(
    &self,
    _range: &DateRange,
  ) -> Result<Option<BodyCompositionSamples>, AggregateError> {
    Ok(None)
  }

  /// When the underlying data last changed
  fn last_refreshed(&self) -> DateTime<Utc>;
}

/// ---------------------------------------------------------------------------
/// In-Memory Provider
/// ---------------------------------------------------------------------------

/// One day of wearable readings. Missing fields were not measured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMetrics {
  pub date: NaiveDate,
  #[serde(default)]
  pub steps: Option<f64>,
  #[serde(default)]
  pub distance_km: Option<f64>,
  #[serde(default)]
  pub active_calories: Option<f64>,
  #[serde(default)]
  pub basal_calories: Option<f64>,
  #[serde(default)]
  pub dietary_calories: Option<f64>,
  #[serde(default)]
  pub protein_g: Option<f64>,
  #[serde(default)]
  pub avg_heart_rate: Option<f64>,
  #[serde(default)]
  pub resting_heart_rate: Option<f64>,
  #[serde(default)]
  pub hrv_ms: Option<f64>,
  #[serde(default)]
  pub heart_rate_recovery: Option<f64>,
  #[serde(default)]
  pub max_workout_heart_rate: Option<f64>,
  #[serde(default)]
  pub sleep_hours: Option<f64>,
  #[serde(default)]
  pub in_bed_hours: Option<f64>,
  #[serde(default)]
  pub blood_oxygen_pct: Option<f64>,
  #[serde(default)]
  pub vo2_max: Option<f64>,
}

impl DailyMetrics {
  pub fn empty(date: NaiveDate) -> Self {
    Self {
      date,
      steps: None,
      distance_km: None,
      active_calories: None,
      basal_calories: None,
      dietary_calories: None,
      protein_g: None,
      avg_heart_rate: None,
      resting_heart_rate: None,
      hrv_ms: None,
      heart_rate_recovery: None,
      max_workout_heart_rate: None,
      sleep_hours: None,
      in_bed_hours: None,
      blood_oxygen_pct: None,
      vo2_max: None,
    }
  }
}

/// Raw records backing an in-memory provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthDataset {
  #[serde(default)]
  pub days: Vec<DailyMetrics>,
  #[serde(default)]
  pub workouts: Vec<WorkoutRecord>,
  #[serde(default)]
  pub body_composition: BodyCompositionSamples,
}

pub struct InMemoryAggregateProvider {
  dataset: RwLock<HealthDataset>,
  last_refreshed: RwLock<DateTime<Utc>>,
}

fn day_start(date: NaiveDate) -> NaiveDateTime {
  date.and_time(NaiveTime::MIN)
}

/// Local dates whose midnight-to-midnight span overlaps `range`
fn dates_in(range: &DateRange) -> Vec<NaiveDate> {
  let mut dates = Vec::new();
  let mut date = range.start.date();
  while day_start(date) < range.end {
    dates.push(date);
    date += Duration::days(1);
  }
  dates
}

fn sum(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
  values.flatten().fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
  let present: Vec<f64> = values.flatten().collect();
  if present.is_empty() {
    None
  } else {
    Some(present.iter().sum::<f64>() / present.len() as f64)
  }
}

fn samples_in(samples: &[Sample], range: &DateRange) -> Vec<Sample> {
  samples.iter().filter(|s| range.contains(s.at)).copied().collect()
}

impl InMemoryAggregateProvider {
  pub fn new(dataset: HealthDataset, refreshed_at: DateTime<Utc>) -> Self {
    Self {
      dataset: RwLock::new(dataset),
      last_refreshed: RwLock::new(refreshed_at),
    }
  }

  /// Swap in new data and bump the refresh timestamp
  pub fn replace(&self, dataset: HealthDataset, refreshed_at: DateTime<Utc>) {
    *self.dataset.write() = dataset;
    *self.last_refreshed.write() = refreshed_at;
  }

  pub fn mark_refreshed(&self, at: DateTime<Utc>) {
    *self.last_refreshed.write() = at;
  }

  fn check(range: &DateRange) -> Result<(), AggregateError> {
    if range.end < range.start {
      return Err(AggregateError::InvalidRange {
        start: range.start,
        end: range.end,
      });
    }
    Ok(())
  }
}

#[async_trait]
impl AggregateProvider for InMemoryAggregateProvider {
  async fn filter(&self, range: &DateRange) -> Result<MetricAggregate, AggregateError> {
    Self::check(range)?;
    let data = self.dataset.read();
    let dates = dates_in(range);
    let days: Vec<&DailyMetrics> = data.days.iter().filter(|d| dates.contains(&d.date)).collect();

    let mut aggregate = MetricAggregate::empty(range);
    aggregate.total_steps = sum(days.iter().map(|d| d.steps));
    aggregate.total_distance_km = sum(days.iter().map(|d| d.distance_km));
    aggregate.total_active_calories = sum(days.iter().map(|d| d.active_calories));
    aggregate.total_basal_calories = sum(days.iter().map(|d| d.basal_calories));
    aggregate.total_dietary_calories = sum(days.iter().map(|d| d.dietary_calories));
    aggregate.total_protein_g = sum(days.iter().map(|d| d.protein_g));
    aggregate.avg_heart_rate = mean(days.iter().map(|d| d.avg_heart_rate));
    aggregate.resting_heart_rate = mean(days.iter().map(|d| d.resting_heart_rate));
    aggregate.hrv_ms = mean(days.iter().map(|d| d.hrv_ms));
    aggregate.heart_rate_recovery = mean(days.iter().map(|d| d.heart_rate_recovery));
    aggregate.max_workout_heart_rate = days
      .iter()
      .filter_map(|d| d.max_workout_heart_rate)
      .reduce(f64::max);
    aggregate.avg_sleep_hours = mean(days.iter().map(|d| d.sleep_hours));
    aggregate.avg_in_bed_hours = mean(days.iter().map(|d| d.in_bed_hours));
    aggregate.blood_oxygen_pct = mean(days.iter().map(|d| d.blood_oxygen_pct));
    // Latest reading, not an average
    aggregate.vo2_max = days
      .iter()
      .filter(|d| d.vo2_max.is_some())
      .max_by_key(|d| d.date)
      .and_then(|d| d.vo2_max);
    aggregate.workouts = data
      .workouts
      .iter()
      .filter(|w| range.contains(w.start.naive_local()))
      .cloned()
      .collect();

    debug!(
      start = %range.start,
      end = %range.end,
      days = days.len(),
      workouts = aggregate.workouts.len(),
      "Filtered aggregate"
    );
    Ok(aggregate)
  }

  async fn daily_series(&self, range: &DateRange) -> Result<Vec<DailyActivity>, AggregateError> {
    Self::check(range)?;
    let data = self.dataset.read();

    let series = dates_in(range)
      .into_iter()
      .map(|date| {
        let record = data.days.iter().find(|d| d.date == date);
        let workouts: Vec<&WorkoutRecord> = data
          .workouts
          .iter()
          .filter(|w| w.local_date() == date && range.contains(w.start.naive_local()))
          .collect();
        DailyActivity {
          date,
          steps: record.and_then(|r| r.steps).unwrap_or(0.0),
          active_calories: record.and_then(|r| r.active_calories).unwrap_or(0.0),
          workout_count: workouts.len() as u32,
          workout_minutes: workouts.iter().map(|w| w.duration_minutes).sum(),
        }
      })
      .collect();
    Ok(series)
  }

  async fn body_composition(
    &self,
    range: &DateRange,
  ) -> Result<Option<BodyCompositionSamples>, AggregateError> {
    Self::check(range)?;
    let data = self.dataset.read();
    let source = &data.body_composition;
    let samples = BodyCompositionSamples {
      weight_kg: samples_in(&source.weight_kg, range),
      body_fat_pct: samples_in(&source.body_fat_pct, range),
      lean_mass_kg: samples_in(&source.lean_mass_kg, range),
      waist_cm: samples_in(&source.waist_cm, range),
    };
    let any = !(samples.weight_kg.is_empty()
      && samples.body_fat_pct.is_empty()
      && samples.lean_mass_kg.is_empty()
      && samples.waist_cm.is_empty());
    Ok(any.then_some(samples))
  }

  fn last_refreshed(&self) -> DateTime<Utc> {
    *self.last_refreshed.read()
  }
}
