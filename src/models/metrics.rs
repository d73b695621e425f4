use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::window::DateRange;

/// ---------------------------------------------------------------------------
/// Workouts
/// ---------------------------------------------------------------------------

/// Binary training classification used by the composition model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutCategory {
  Strength,
  Cardio,
  Unclassified,
}

const STRENGTH_TAGS: &[&str] = &[
  "traditional_strength_training",
  "functional_strength_training",
  "strength_training",
  "strength",
  "weightlifting",
  "core_training",
  "cross_training",
];

const CARDIO_TAGS: &[&str] = &[
  "running",
  "run",
  "cycling",
  "ride",
  "walking",
  "swimming",
  "rowing",
  "elliptical",
  "hiit",
  "high_intensity_interval_training",
  "stair_climbing",
  "hiking",
  "dance",
  "cardio",
];

impl WorkoutCategory {
  /// Map a wearable activity tag; unknown tags count as neither
  pub fn from_activity_type(activity_type: &str) -> Self {
    let tag = activity_type.trim().to_lowercase().replace([' ', '-'], "_");
    if STRENGTH_TAGS.contains(&tag.as_str()) {
      WorkoutCategory::Strength
    } else if CARDIO_TAGS.contains(&tag.as_str()) {
      WorkoutCategory::Cardio
    } else {
      WorkoutCategory::Unclassified
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutRecord {
  /// Local wall-clock start, offset preserved for time-of-day bucketing
  pub start: DateTime<FixedOffset>,
  pub end: DateTime<FixedOffset>,
  pub duration_minutes: f64,
  pub activity_type: String,
  pub energy_kcal: Option<f64>,
}

impl WorkoutRecord {
  pub fn category(&self) -> WorkoutCategory {
    WorkoutCategory::from_activity_type(&self.activity_type)
  }

  pub fn local_date(&self) -> NaiveDate {
    self.start.date_naive()
  }
}

/// ---------------------------------------------------------------------------
/// Metric Aggregate
/// ---------------------------------------------------------------------------

/// Totals and averages over a date range.
///
/// `None` means the metric was not measured for this user. It is never the
/// same thing as zero and every formula downstream branches on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAggregate {
  pub start: NaiveDateTime,
  pub end: NaiveDateTime,
  pub day_count: u32,

  // Activity totals
  pub total_steps: Option<f64>,
  pub total_distance_km: Option<f64>,
  pub total_active_calories: Option<f64>,
  pub total_basal_calories: Option<f64>,

  // Nutrition totals
  pub total_dietary_calories: Option<f64>,
  pub total_protein_g: Option<f64>,

  // Heart (averages, bpm / ms)
  pub avg_heart_rate: Option<f64>,
  pub resting_heart_rate: Option<f64>,
  pub hrv_ms: Option<f64>,
  /// Direct one-minute heart-rate recovery, bpm
  pub heart_rate_recovery: Option<f64>,
  pub max_workout_heart_rate: Option<f64>,

  // Sleep (nightly averages)
  pub avg_sleep_hours: Option<f64>,
  pub avg_in_bed_hours: Option<f64>,

  pub blood_oxygen_pct: Option<f64>,
  /// Cardio fitness index (VO2max, ml/kg/min)
  pub vo2_max: Option<f64>,

  #[serde(default)]
  pub workouts: Vec<WorkoutRecord>,
}

impl MetricAggregate {
  /// Aggregate for a range with nothing measured
  pub fn empty(range: &DateRange) -> Self {
    Self {
      start: range.start,
      end: range.end,
      day_count: range.day_count(),
      total_steps: None,
      total_distance_km: None,
      total_active_calories: None,
      total_basal_calories: None,
      total_dietary_calories: None,
      total_protein_g: None,
      avg_heart_rate: None,
      resting_heart_rate: None,
      hrv_ms: None,
      heart_rate_recovery: None,
      max_workout_heart_rate: None,
      avg_sleep_hours: None,
      avg_in_bed_hours: None,
      blood_oxygen_pct: None,
      vo2_max: None,
      workouts: Vec::new(),
    }
  }

  pub fn range(&self) -> DateRange {
    DateRange {
      start: self.start,
      end: self.end,
    }
  }

  /// Day count used as a divisor, never zero
  pub fn days(&self) -> f64 {
    self.day_count.max(1) as f64
  }

  pub fn weeks(&self) -> f64 {
    self.days() / 7.0
  }

  pub fn per_day(&self, total: Option<f64>) -> Option<f64> {
    total.map(|t| t / self.days())
  }

  pub fn workout_count(&self) -> usize {
    self.workouts.len()
  }

  pub fn workouts_per_week(&self) -> f64 {
    self.workouts.len() as f64 / self.weeks()
  }

  pub fn total_workout_minutes(&self) -> f64 {
    self.workouts.iter().map(|w| w.duration_minutes).sum()
  }

  /// Energy recorded on workouts, `None` when no workout carried any
  pub fn total_workout_energy(&self) -> Option<f64> {
    let values: Vec<f64> = self.workouts.iter().filter_map(|w| w.energy_kcal).collect();
    if values.is_empty() {
      None
    } else {
      Some(values.iter().sum())
    }
  }

  /// Active + basal energy, only when both are measured
  pub fn total_energy(&self) -> Option<f64> {
    match (self.total_active_calories, self.total_basal_calories) {
      (Some(active), Some(basal)) => Some(active + basal),
      _ => None,
    }
  }

  pub fn has_recovery_signal(&self) -> bool {
    self.avg_sleep_hours.is_some()
      || self.resting_heart_rate.is_some()
      || self.hrv_ms.is_some()
      || self.heart_rate_recovery.is_some()
  }
}

/// ---------------------------------------------------------------------------
/// Daily Activity Series
/// ---------------------------------------------------------------------------

/// One local calendar day of activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyActivity {
  pub date: NaiveDate,
  pub steps: f64,
  pub active_calories: f64,
  pub workout_count: u32,
  pub workout_minutes: f64,
}

/// ---------------------------------------------------------------------------
/// Directly Measured Body Composition
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sample {
  pub at: NaiveDateTime,
  pub value: f64,
}

/// Measured samples inside the analysis range (smart scale, DEXA, tape)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyCompositionSamples {
  #[serde(default)]
  pub weight_kg: Vec<Sample>,
  #[serde(default)]
  pub body_fat_pct: Vec<Sample>,
  #[serde(default)]
  pub lean_mass_kg: Vec<Sample>,
  #[serde(default)]
  pub waist_cm: Vec<Sample>,
}

/// First and last samples of a series, requiring two distinct readings
pub fn range_boundaries(samples: &[Sample]) -> Option<(Sample, Sample)> {
  if samples.len() < 2 {
    return None;
  }
  let first = samples.iter().min_by_key(|s| s.at)?;
  let last = samples.iter().max_by_key(|s| s.at)?;
  if first.at == last.at {
    return None;
  }
  Some((*first, *last))
}
