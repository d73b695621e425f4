//! Activity pattern analysis
//!
//! Derives weekday performance, streaks, time-of-day distribution, efficiency
//! metrics, a consistency heatmap and plateau status from the daily activity
//! series and the window aggregate. Pure and synchronous.

use std::collections::BTreeMap;

use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::comparison::{compare_periods, MetricComparison, Trend};
use crate::composition::{CompositionPrediction, Measured};
use crate::config::ModelConstants;
use crate::models::metrics::{DailyActivity, MetricAggregate, WorkoutCategory};

/// ---------------------------------------------------------------------------
/// Output Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPerformance {
  pub weekday: Weekday,
  pub avg_score: f64,
  /// Percent above (negative: below) the mean daily score
  pub pct_vs_mean: f64,
  pub sample_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreakSummary {
  pub active_days: u32,
  pub inactive_days: u32,
  pub longest_active_streak: u32,
  pub longest_inactive_streak: u32,
  /// Run length at the end of the series (one of these is zero)
  pub current_active_streak: u32,
  pub current_inactive_streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
  Morning,
  Afternoon,
  Evening,
  Night,
}

impl TimeOfDay {
  pub const ALL: [TimeOfDay; 4] = [
    TimeOfDay::Morning,
    TimeOfDay::Afternoon,
    TimeOfDay::Evening,
    TimeOfDay::Night,
  ];

  /// morning 6-12, afternoon 12-18, evening 18-22, night 22-6
  pub fn from_hour(hour: u32) -> Self {
    match hour {
      6..=11 => TimeOfDay::Morning,
      12..=17 => TimeOfDay::Afternoon,
      18..=21 => TimeOfDay::Evening,
      _ => TimeOfDay::Night,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      TimeOfDay::Morning => "morning",
      TimeOfDay::Afternoon => "afternoon",
      TimeOfDay::Evening => "evening",
      TimeOfDay::Night => "night",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
  pub bucket: TimeOfDay,
  pub workout_count: u32,
  pub total_minutes: f64,
  /// Average minutes per workout started in this bucket
  pub avg_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayDistribution {
  pub buckets: Vec<TimeBucket>,
  /// `None` when there were no workouts
  pub dominant: Option<TimeOfDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
  pub workout_kcal_per_min: Option<f64>,
  /// Direct one-minute recovery when recorded, else estimated
  pub hr_recovery_bpm_per_min: Option<Measured<f64>>,
  pub fitness_gain_rate: Option<f64>,
  pub sleep_efficiency_pct: Option<f64>,
  /// 0-100
  pub overall_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
  Inactive,
  Low,
  Medium,
  High,
  VeryHigh,
}

impl ActivityLevel {
  pub fn from_score(score: f64) -> Self {
    match score {
      s if s < 1_000.0 => ActivityLevel::Inactive,
      s if s < 3_000.0 => ActivityLevel::Low,
      s if s < 6_000.0 => ActivityLevel::Medium,
      s if s < 10_000.0 => ActivityLevel::High,
      _ => ActivityLevel::VeryHigh,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapDay {
  pub date: chrono::NaiveDate,
  pub score: f64,
  pub level: ActivityLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityHeatmap {
  pub days: Vec<HeatmapDay>,
  /// Percent of days that were not inactive
  pub consistency_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateauSeverity {
  Mild,
  Moderate,
  Severe,
}

impl PlateauSeverity {
  pub fn as_str(&self) -> &'static str {
    match self {
      PlateauSeverity::Mild => "mild",
      PlateauSeverity::Moderate => "moderate",
      PlateauSeverity::Severe => "severe",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauStatus {
  pub is_plateau: bool,
  pub severity: Option<PlateauSeverity>,
  pub suggested_actions: Vec<String>,
  /// 0-1
  pub confidence: f64,
  /// `None` when the weight change over the window is unknown
  pub net_change_kg: Option<f64>,
  pub weekly_rate_kg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInsights {
  pub best_days: Vec<DayPerformance>,
  pub worst_days: Vec<DayPerformance>,
  pub streaks: StreakSummary,
  pub time_of_day: TimeOfDayDistribution,
  pub trend: Trend,
  pub efficiency: EfficiencyMetrics,
  pub heatmap: ActivityHeatmap,
  pub plateau: PlateauStatus,
  pub comparisons: Vec<MetricComparison>,
}

pub const ADD_STRENGTH_ACTION: &str =
  "Add strength training 2-3 times per week to build metabolically active muscle";
pub const MORE_VOLUME_ACTION: &str =
  "Increase workout duration toward at least 150 minutes per week";
pub const SLEEP_ACTION: &str = "Prioritize 7-9 hours of sleep to support recovery and metabolism";
pub const VARY_ROUTINE_ACTION: &str =
  "Vary your routine with new exercises or intensities to break through";

/// How many weekdays to report as best and worst
const RANKED_DAYS: usize = 3;

/// ---------------------------------------------------------------------------
/// Daily Scoring
/// ---------------------------------------------------------------------------

/// steps/10 + active kcal + weight x workouts
pub fn combined_score(day: &DailyActivity, constants: &ModelConstants) -> f64 {
  day.steps / 10.0 + day.active_calories + constants.workout_score_weight * day.workout_count as f64
}

pub fn is_active_day(day: &DailyActivity, constants: &ModelConstants) -> bool {
  day.steps >= constants.active_day_steps
    || day.active_calories >= constants.active_day_calories
    || day.workout_count >= 1
}

/// Mean daily combined score over a whole aggregate
fn aggregate_daily_score(aggregate: &MetricAggregate, constants: &ModelConstants) -> f64 {
  let steps = aggregate.total_steps.unwrap_or(0.0);
  let active = aggregate.total_active_calories.unwrap_or(0.0);
  let workouts = aggregate.workout_count() as f64;
  (steps / 10.0 + active + constants.workout_score_weight * workouts) / aggregate.days()
}

/// ---------------------------------------------------------------------------
/// Analyzers
/// ---------------------------------------------------------------------------

pub fn rank_weekdays(
  series: &[DailyActivity],
  constants: &ModelConstants,
) -> (Vec<DayPerformance>, Vec<DayPerformance>) {
  if series.is_empty() {
    return (Vec::new(), Vec::new());
  }

  let overall_mean =
    series.iter().map(|d| combined_score(d, constants)).sum::<f64>() / series.len() as f64;

  let mut by_weekday: BTreeMap<u32, (Weekday, f64, u32)> = BTreeMap::new();
  for day in series {
    let weekday = day.date.weekday();
    let entry = by_weekday
      .entry(weekday.num_days_from_monday())
      .or_insert((weekday, 0.0, 0));
    entry.1 += combined_score(day, constants);
    entry.2 += 1;
  }

  let mut ranked: Vec<DayPerformance> = by_weekday
    .into_values()
    .map(|(weekday, total, count)| {
      let avg = total / count as f64;
      let pct_vs_mean = if overall_mean > 0.0 {
        (avg - overall_mean) / overall_mean * 100.0
      } else {
        0.0
      };
      DayPerformance {
        weekday,
        avg_score: avg,
        pct_vs_mean,
        sample_days: count,
      }
    })
    .collect();

  ranked.sort_by(|a, b| b.avg_score.total_cmp(&a.avg_score));

  let best = ranked.iter().take(RANKED_DAYS).cloned().collect();
  let worst = ranked.iter().rev().take(RANKED_DAYS).cloned().collect();
  (best, worst)
}

pub fn streaks(series: &[DailyActivity], constants: &ModelConstants) -> StreakSummary {
  let mut sorted: Vec<&DailyActivity> = series.iter().collect();
  sorted.sort_by_key(|d| d.date);

  let mut summary = StreakSummary::default();
  for day in sorted {
    if is_active_day(day, constants) {
      summary.active_days += 1;
      summary.current_active_streak += 1;
      summary.current_inactive_streak = 0;
      summary.longest_active_streak = summary.longest_active_streak.max(summary.current_active_streak);
    } else {
      summary.inactive_days += 1;
      summary.current_inactive_streak += 1;
      summary.current_active_streak = 0;
      summary.longest_inactive_streak =
        summary.longest_inactive_streak.max(summary.current_inactive_streak);
    }
  }
  summary
}

pub fn time_of_day(aggregate: &MetricAggregate) -> TimeOfDayDistribution {
  let mut totals: BTreeMap<TimeOfDay, (u32, f64)> = BTreeMap::new();
  for w in &aggregate.workouts {
    let entry = totals.entry(TimeOfDay::from_hour(w.start.hour())).or_insert((0, 0.0));
    entry.0 += 1;
    entry.1 += w.duration_minutes;
  }

  let buckets: Vec<TimeBucket> = TimeOfDay::ALL
    .into_iter()
    .map(|bucket| {
      let (count, minutes) = totals.get(&bucket).copied().unwrap_or((0, 0.0));
      TimeBucket {
        bucket,
        workout_count: count,
        total_minutes: minutes,
        avg_minutes: if count > 0 { minutes / count as f64 } else { 0.0 },
      }
    })
    .collect();

  let dominant = buckets
    .iter()
    .filter(|b| b.workout_count > 0)
    .max_by(|a, b| a.total_minutes.total_cmp(&b.total_minutes))
    .map(|b| b.bucket);

  TimeOfDayDistribution { buckets, dominant }
}

/// Current mean daily score against the equal-length prior period. Stable
/// when steps or active calories were measured in only one of the two.
pub fn trend(
  current: &MetricAggregate,
  previous: Option<&MetricAggregate>,
  constants: &ModelConstants,
) -> Trend {
  let Some(previous) = previous else {
    return Trend::Stable;
  };
  if current.total_steps.is_some() != previous.total_steps.is_some()
    || current.total_active_calories.is_some() != previous.total_active_calories.is_some()
  {
    return Trend::Stable;
  }
  let now = aggregate_daily_score(current, constants);
  let before = aggregate_daily_score(previous, constants);

  if before <= 0.0 {
    return if now > 0.0 { Trend::Improving } else { Trend::Stable };
  }

  let pct = (now - before) / before * 100.0;
  if pct > constants.trend_threshold_pct {
    Trend::Improving
  } else if pct < -constants.trend_threshold_pct {
    Trend::Declining
  } else {
    Trend::Stable
  }
}

pub fn efficiency(aggregate: &MetricAggregate, constants: &ModelConstants) -> EfficiencyMetrics {
  let minutes = aggregate.total_workout_minutes();
  let workout_kcal_per_min = if minutes > 0.0 {
    aggregate
      .total_active_calories
      .or_else(|| aggregate.total_workout_energy())
      .map(|kcal| kcal / minutes)
  } else {
    None
  };

  let hr_recovery_bpm_per_min = match aggregate.heart_rate_recovery {
    Some(direct) => Some(Measured::Measured(direct)),
    None => aggregate.max_workout_heart_rate.and_then(|max| {
      aggregate
        .resting_heart_rate
        .or(aggregate.avg_heart_rate)
        .map(|baseline| Measured::Derived((max - baseline) / constants.hr_recovery_window_min))
    }),
  };

  let fitness_gain_rate = aggregate.vo2_max.map(|vo2| {
    let divisor = if aggregate.workout_count() > 0 {
      aggregate.workout_count() as f64
    } else {
      aggregate.days()
    };
    vo2 / divisor
  });

  let sleep_efficiency_pct = match (aggregate.avg_sleep_hours, aggregate.avg_in_bed_hours) {
    (Some(asleep), Some(in_bed)) if asleep > 0.0 && in_bed > 0.0 => {
      Some((asleep / in_bed * 100.0).clamp(0.0, 100.0))
    }
    _ => None,
  };

  let mut score: f64 = 50.0;
  if let Some(kpm) = workout_kcal_per_min {
    score += match kpm {
      k if k >= 10.0 => 20.0,
      k if k >= 7.0 => 15.0,
      k if k >= 5.0 => 10.0,
      _ => 0.0,
    };
  }
  if let Some(hrr) = hr_recovery_bpm_per_min.map(|m| m.value()) {
    score += match hrr {
      r if r > 25.0 => 15.0,
      r if r > 15.0 => 8.0,
      _ => 0.0,
    };
  }
  if let Some(gain) = fitness_gain_rate {
    score += match gain {
      g if g > 1.0 => 15.0,
      g if g > 0.5 => 8.0,
      _ => 0.0,
    };
  }
  if let Some(eff) = sleep_efficiency_pct {
    score += match eff {
      e if e >= 85.0 => 20.0,
      e if e >= 75.0 => 10.0,
      e if e < 65.0 => -10.0,
      _ => 0.0,
    };
  }

  EfficiencyMetrics {
    workout_kcal_per_min,
    hr_recovery_bpm_per_min,
    fitness_gain_rate,
    sleep_efficiency_pct,
    overall_score: score.clamp(0.0, 100.0),
  }
}

pub fn heatmap(series: &[DailyActivity], constants: &ModelConstants) -> ActivityHeatmap {
  let mut days: Vec<HeatmapDay> = series
    .iter()
    .map(|d| {
      let score = combined_score(d, constants);
      HeatmapDay {
        date: d.date,
        score,
        level: ActivityLevel::from_score(score),
      }
    })
    .collect();
  days.sort_by_key(|d| d.date);

  let consistency_score = if days.is_empty() {
    0.0
  } else {
    let engaged = days.iter().filter(|d| d.level != ActivityLevel::Inactive).count();
    engaged as f64 / days.len() as f64 * 100.0
  };

  ActivityHeatmap {
    days,
    consistency_score,
  }
}

/// An unknown net change is never a plateau
pub fn plateau(
  aggregate: &MetricAggregate,
  net_change_kg: Option<f64>,
  constants: &ModelConstants,
) -> PlateauStatus {
  let weekly_rate = net_change_kg.map(|n| n.abs() / aggregate.weeks());
  let (magnitude, is_plateau) = match (net_change_kg, weekly_rate) {
    (Some(net), Some(rate)) => {
      let magnitude = net.abs();
      let flat = aggregate.day_count >= constants.plateau_min_days
        && magnitude < constants.plateau_max_net_change_kg
        && rate < constants.plateau_max_weekly_rate_kg;
      (magnitude, flat)
    }
    _ => (0.0, false),
  };

  if !is_plateau {
    return PlateauStatus {
      is_plateau,
      severity: None,
      suggested_actions: Vec::new(),
      confidence: 0.0,
      net_change_kg,
      weekly_rate_kg: weekly_rate,
    };
  }

  let severity = if magnitude < 0.1 {
    PlateauSeverity::Severe
  } else if magnitude < 0.15 {
    PlateauSeverity::Moderate
  } else {
    PlateauSeverity::Mild
  };

  let mut actions = Vec::new();
  let has_strength = aggregate
    .workouts
    .iter()
    .any(|w| w.category() == WorkoutCategory::Strength);
  if !has_strength {
    actions.push(ADD_STRENGTH_ACTION.to_string());
  }
  if aggregate.total_workout_minutes() < constants.plateau_min_workout_minutes {
    actions.push(MORE_VOLUME_ACTION.to_string());
  }
  if aggregate.avg_sleep_hours.is_some_and(|h| h < 7.0) {
    actions.push(SLEEP_ACTION.to_string());
  }
  actions.push(VARY_ROUTINE_ACTION.to_string());

  // Longer windows and flatter curves are more convincing
  let span = (aggregate.day_count as f64 / 28.0).min(1.0);
  let flatness = 1.0 - 0.5 * magnitude / constants.plateau_max_net_change_kg;
  let confidence = ((0.5 + 0.5 * span) * flatness).clamp(0.0, 1.0);

  PlateauStatus {
    is_plateau,
    severity: Some(severity),
    suggested_actions: actions,
    confidence,
    net_change_kg,
    weekly_rate_kg: weekly_rate,
  }
}

impl PatternInsights {
  pub fn analyze(
    series: &[DailyActivity],
    aggregate: &MetricAggregate,
    prediction: &CompositionPrediction,
    previous: Option<&MetricAggregate>,
    constants: &ModelConstants,
  ) -> Self {
    let (best_days, worst_days) = rank_weekdays(series, constants);

    Self {
      best_days,
      worst_days,
      streaks: streaks(series, constants),
      time_of_day: time_of_day(aggregate),
      trend: trend(aggregate, previous, constants),
      efficiency: efficiency(aggregate, constants),
      heatmap: heatmap(series, constants),
      plateau: plateau(
        aggregate,
        prediction.net_weight_change_kg.map(|n| n.value()),
        constants,
      ),
      comparisons: previous
        .map(|prev| compare_periods(aggregate, prev))
        .unwrap_or_default(),
    }
  }
}
