//! Period-over-period comparison
//!
//! Compares a fixed list of metrics (plus calories per workout type) between
//! the current window and its equivalent prior window.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::metrics::MetricAggregate;

/// Changes smaller than this (in percent) count as stable
const STABLE_BAND_PCT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
  Improving,
  Stable,
  Declining,
}

impl Trend {
  pub fn as_str(&self) -> &'static str {
    match self {
      Trend::Improving => "improving",
      Trend::Stable => "stable",
      Trend::Declining => "declining",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
  pub metric: String,
  pub unit: String,
  pub current: Option<f64>,
  pub previous: Option<f64>,
  pub absolute_change: Option<f64>,
  /// Clamped to [-100, 100]
  pub percent_change: f64,
  pub trend: Trend,
  pub lower_is_better: bool,
}

impl MetricComparison {
  /// Compare one metric. Presence on only one side yields a full ±100%
  /// directional signal instead of a division.
  pub fn between(
    metric: impl Into<String>,
    unit: impl Into<String>,
    current: Option<f64>,
    previous: Option<f64>,
    lower_is_better: bool,
  ) -> Self {
    // A "better" direction of +1 means the value going up is good
    let better = if lower_is_better { -1.0 } else { 1.0 };

    let (percent_change, trend) = match (current, previous) {
      (Some(c), Some(p)) if p != 0.0 => {
        let pct = ((c - p) / p.abs() * 100.0).clamp(-100.0, 100.0);
        (pct, trend_for(pct * better))
      }
      (Some(c), Some(_)) if c == 0.0 => (0.0, Trend::Stable),
      // Newly present (or up from zero)
      (Some(_), _) => (100.0 * better, Trend::Improving),
      // Gone since last period
      (None, Some(p)) if p != 0.0 => (-100.0 * better, Trend::Declining),
      _ => (0.0, Trend::Stable),
    };

    let absolute_change = match (current, previous) {
      (Some(c), Some(p)) => Some(c - p),
      _ => None,
    };

    Self {
      metric: metric.into(),
      unit: unit.into(),
      current,
      previous,
      absolute_change,
      percent_change,
      trend,
      lower_is_better,
    }
  }

  pub fn describe(&self) -> String {
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.1}", v));
    format!(
      "{}: {} -> {} {} ({:+.0}%, {})",
      self.metric,
      fmt(self.previous),
      fmt(self.current),
      self.unit,
      self.percent_change,
      self.trend.as_str()
    )
  }
}

fn trend_for(directional_pct: f64) -> Trend {
  if directional_pct >= STABLE_BAND_PCT {
    Trend::Improving
  } else if directional_pct <= -STABLE_BAND_PCT {
    Trend::Declining
  } else {
    Trend::Stable
  }
}

/// Energy recorded per activity type, only for types that carried energy
fn calories_by_type(aggregate: &MetricAggregate) -> BTreeMap<String, f64> {
  let mut by_type = BTreeMap::new();
  for w in &aggregate.workouts {
    if let Some(kcal) = w.energy_kcal {
      *by_type.entry(w.activity_type.clone()).or_insert(0.0) += kcal;
    }
  }
  by_type
}

/// Compare `current` against the equivalent prior window
pub fn compare_periods(current: &MetricAggregate, previous: &MetricAggregate) -> Vec<MetricComparison> {
  let workout_minutes = |a: &MetricAggregate| Some(a.total_workout_minutes());

  let mut comparisons = vec![
    MetricComparison::between(
      "Total energy",
      "kcal",
      current.total_energy(),
      previous.total_energy(),
      false,
    ),
    MetricComparison::between(
      "Active energy",
      "kcal",
      current.total_active_calories,
      previous.total_active_calories,
      false,
    ),
    MetricComparison::between(
      "Workout minutes",
      "min",
      workout_minutes(current),
      workout_minutes(previous),
      false,
    ),
    MetricComparison::between(
      "Sleep",
      "h/night",
      current.avg_sleep_hours,
      previous.avg_sleep_hours,
      false,
    ),
    MetricComparison::between("Steps", "steps", current.total_steps, previous.total_steps, false),
    MetricComparison::between(
      "Distance",
      "km",
      current.total_distance_km,
      previous.total_distance_km,
      false,
    ),
    MetricComparison::between(
      "Heart rate",
      "bpm",
      current.avg_heart_rate,
      previous.avg_heart_rate,
      true,
    ),
    MetricComparison::between(
      "Blood oxygen",
      "%",
      current.blood_oxygen_pct,
      previous.blood_oxygen_pct,
      false,
    ),
    MetricComparison::between("VO2max", "ml/kg/min", current.vo2_max, previous.vo2_max, false),
  ];

  let now = calories_by_type(current);
  let before = calories_by_type(previous);
  let mut types: Vec<&String> = now.keys().chain(before.keys()).collect();
  types.sort();
  types.dedup();
  for activity in types {
    comparisons.push(MetricComparison::between(
      format!("{} calories", activity),
      "kcal",
      now.get(activity).copied(),
      before.get(activity).copied(),
      false,
    ));
  }

  comparisons
}
