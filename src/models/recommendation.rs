use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::composition::CompositionPrediction;
use crate::models::metrics::{MetricAggregate, WorkoutCategory};

/// ---------------------------------------------------------------------------
/// Coach Actions
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
  Cardio,
  Strength,
  Nutrition,
  Recovery,
  Activity,
  Calories,
}

impl ActionCategory {
  pub const ALL: [ActionCategory; 6] = [
    ActionCategory::Cardio,
    ActionCategory::Strength,
    ActionCategory::Nutrition,
    ActionCategory::Recovery,
    ActionCategory::Activity,
    ActionCategory::Calories,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ActionCategory::Cardio => "cardio",
      ActionCategory::Strength => "strength",
      ActionCategory::Nutrition => "nutrition",
      ActionCategory::Recovery => "recovery",
      ActionCategory::Activity => "activity",
      ActionCategory::Calories => "calories",
    }
  }
}

impl std::str::FromStr for ActionCategory {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lowered = s.trim().to_lowercase();
    Self::ALL
      .into_iter()
      .find(|c| c.as_str() == lowered)
      .ok_or_else(|| format!("Unknown action category: {}", s))
  }
}

/// One prioritized directive from the coach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachAction {
  /// 1 = highest
  pub priority: u8,
  pub category: ActionCategory,
  pub command: String,
  pub current_state: String,
  pub target_state: String,
  pub expected_impact: String,
  pub rationale: String,
  pub health_note: Option<String>,
  /// Built on derived rather than measured numbers
  pub is_estimated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveRecommendations {
  pub window_label: String,
  pub actions: Vec<CoachAction>,
}

/// ---------------------------------------------------------------------------
/// Metrics Snapshot (for deltas between runs)
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
  pub workouts_per_week: f64,
  pub avg_active_calories: Option<f64>,
  pub avg_steps: Option<f64>,
  pub strength_workouts: u32,
  pub cardio_workouts: u32,
  pub sleep_hours: Option<f64>,
  /// Only with sleep or heart-rate recovery signals
  pub recovery_score: Option<f64>,
  /// Only when the mass change over the window is known
  pub fat_loss_kg: Option<f64>,
  pub muscle_gain_kg: Option<f64>,
}

impl MetricsSnapshot {
  pub fn capture(aggregate: &MetricAggregate, prediction: &CompositionPrediction) -> Self {
    let count = |category| {
      aggregate
        .workouts
        .iter()
        .filter(|w| w.category() == category)
        .count() as u32
    };
    let mass_known = prediction.net_weight_change_kg.is_some();
    Self {
      workouts_per_week: aggregate.workouts_per_week(),
      avg_active_calories: aggregate.per_day(aggregate.total_active_calories),
      avg_steps: aggregate.per_day(aggregate.total_steps),
      strength_workouts: count(WorkoutCategory::Strength),
      cardio_workouts: count(WorkoutCategory::Cardio),
      sleep_hours: aggregate.avg_sleep_hours,
      recovery_score: aggregate
        .has_recovery_signal()
        .then_some(prediction.recovery_score),
      fat_loss_kg: mass_known.then(|| prediction.fat_loss_kg.value()),
      muscle_gain_kg: mass_known.then(|| prediction.muscle_gain_kg.value()),
    }
  }

  /// Lines describing movement since `previous`. Metrics missing on either
  /// side are skipped entirely, as are workouts when none were logged now.
  pub fn delta_lines(&self, previous: &MetricsSnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    if self.workouts_per_week > 0.0 {
      lines.push(delta_line("Workouts/week", previous.workouts_per_week, self.workouts_per_week, 1));
      lines.push(delta_line(
        "Strength sessions",
        previous.strength_workouts as f64,
        self.strength_workouts as f64,
        0,
      ));
      lines.push(delta_line(
        "Cardio sessions",
        previous.cardio_workouts as f64,
        self.cardio_workouts as f64,
        0,
      ));
    }

    if let (Some(prev), Some(curr)) = (previous.avg_active_calories, self.avg_active_calories) {
      lines.push(delta_line("Avg active kcal/day", prev, curr, 0));
    }
    if let (Some(prev), Some(curr)) = (previous.avg_steps, self.avg_steps) {
      lines.push(delta_line("Avg steps/day", prev, curr, 0));
    }
    if let (Some(prev), Some(curr)) = (previous.sleep_hours, self.sleep_hours) {
      lines.push(delta_line("Sleep hours", prev, curr, 1));
    }

    if let (Some(prev), Some(curr)) = (previous.recovery_score, self.recovery_score) {
      lines.push(delta_line("Recovery score", prev, curr, 0));
    }
    if let (Some(prev), Some(curr)) = (previous.fat_loss_kg, self.fat_loss_kg) {
      lines.push(delta_line("Fat loss kg", prev, curr, 2));
    }
    if let (Some(prev), Some(curr)) = (previous.muscle_gain_kg, self.muscle_gain_kg) {
      lines.push(delta_line("Muscle gain kg", prev, curr, 2));
    }
    lines
  }
}

fn delta_line(label: &str, previous: f64, current: f64, precision: usize) -> String {
  let delta = current - previous;
  format!(
    "{}: {:.p$} -> {:.p$} ({:+.p$})",
    label,
    previous,
    current,
    delta,
    p = precision
  )
}

/// ---------------------------------------------------------------------------
/// History
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationHistoryEntry {
  pub generated_at: DateTime<Utc>,
  pub window_label: String,
  pub analyzed_period: String,
  pub recommendations: ComprehensiveRecommendations,
  pub snapshot: MetricsSnapshot,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
      workouts_per_week: 3.0,
      avg_active_calories: Some(450.0),
      avg_steps: None,
      strength_workouts: 2,
      cardio_workouts: 4,
      sleep_hours: Some(6.5),
      recovery_score: Some(70.0),
      fat_loss_kg: Some(0.5),
      muscle_gain_kg: Some(0.0),
    }
  }

  #[test]
  fn test_category_from_str_is_case_insensitive() {
    assert_eq!("Cardio".parse::<ActionCategory>(), Ok(ActionCategory::Cardio));
    assert_eq!(" NUTRITION ".parse::<ActionCategory>(), Ok(ActionCategory::Nutrition));
    assert!("mindset".parse::<ActionCategory>().is_err());
  }

  #[test]
  fn test_delta_lines_skip_metrics_missing_on_either_side() {
    let previous = snapshot();
    let mut current = snapshot();
    current.workouts_per_week = 4.5;
    current.avg_steps = Some(8000.0);
    current.sleep_hours = Some(7.4);

    let lines = current.delta_lines(&previous);
    assert!(lines.iter().any(|l| l == "Workouts/week: 3.0 -> 4.5 (+1.5)"));
    assert!(lines.iter().any(|l| l == "Sleep hours: 6.5 -> 7.4 (+0.9)"));
    assert!(!lines.iter().any(|l| l.contains("steps")));
    assert!(lines.iter().any(|l| l == "Recovery score: 70 -> 70 (+0)"));
  }

  #[test]
  fn test_delta_lines_without_current_data_mention_nothing() {
    let previous = snapshot();
    let empty = MetricsSnapshot {
      workouts_per_week: 0.0,
      avg_active_calories: None,
      avg_steps: None,
      strength_workouts: 0,
      cardio_workouts: 0,
      sleep_hours: None,
      recovery_score: None,
      fat_loss_kg: None,
      muscle_gain_kg: None,
    };
    assert!(empty.delta_lines(&previous).is_empty());
  }
}
