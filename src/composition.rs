//! Body composition prediction
//!
//! Converts energy balance and workout data into fat/muscle/metabolism
//! estimates through a layered set of bounded physiological modifiers.
//! Directly measured samples always win over derived estimates; every
//! output records which path produced it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ModelConstants;
use crate::models::metrics::{
  range_boundaries, BodyCompositionSamples, MetricAggregate, Sample, WorkoutCategory,
};
use crate::models::profile::{BiologicalSex, GoalFocus, UserProfile};

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
  #[error("Invalid profile: {field} must be positive (got {value})")]
  InvalidProfile { field: &'static str, value: f64 },
}

/// ---------------------------------------------------------------------------
/// Measured-or-Derived Values
/// ---------------------------------------------------------------------------

/// A value tagged with the path that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Measured<T> {
  /// Taken from directly measured samples
  Measured(T),
  /// Computed by the heuristic model
  Derived(T),
}

impl<T: Copy> Measured<T> {
  pub fn value(&self) -> T {
    match self {
      Measured::Measured(v) | Measured::Derived(v) => *v,
    }
  }

  pub fn is_measured(&self) -> bool {
    matches!(self, Measured::Measured(_))
  }

  pub fn source(&self) -> &'static str {
    match self {
      Measured::Measured(_) => "measured",
      Measured::Derived(_) => "derived",
    }
  }
}

/// ---------------------------------------------------------------------------
/// Output Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OvertrainingRisk {
  Low,
  Moderate,
  High,
}

impl OvertrainingRisk {
  pub fn from_recovery_score(score: f64) -> Self {
    if score >= 85.0 {
      OvertrainingRisk::Low
    } else if score >= 70.0 {
      OvertrainingRisk::Moderate
    } else {
      OvertrainingRisk::High
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      OvertrainingRisk::Low => "low",
      OvertrainingRisk::Moderate => "moderate",
      OvertrainingRisk::High => "high",
    }
  }
}

/// Where the daily energy difference came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyBasis {
  /// Logged dietary intake minus burned energy
  Logged,
  /// Intake assumed at maintenance
  Estimated,
}

/// Signed energy balance, negative = deficit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyBalance {
  pub daily_difference: f64,
  pub total: f64,
  pub basis: EnergyBasis,
}

impl EnergyBalance {
  pub fn is_deficit(&self) -> bool {
    self.total < 0.0
  }

  pub fn is_surplus(&self) -> bool {
    self.total > 0.0
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkoutSplit {
  pub strength_count: u32,
  pub cardio_count: u32,
  pub strength_minutes: f64,
  pub cardio_minutes: f64,
  /// strength / (strength + cardio), zero when neither is present
  pub strength_ratio: f64,
}

impl WorkoutSplit {
  pub fn compute(aggregate: &MetricAggregate) -> Self {
    let mut split = WorkoutSplit::default();
    for w in &aggregate.workouts {
      match w.category() {
        WorkoutCategory::Strength => {
          split.strength_count += 1;
          split.strength_minutes += w.duration_minutes;
        }
        WorkoutCategory::Cardio => {
          split.cardio_count += 1;
          split.cardio_minutes += w.duration_minutes;
        }
        WorkoutCategory::Unclassified => {}
      }
    }
    let classified = split.strength_count + split.cardio_count;
    if classified > 0 {
      split.strength_ratio = split.strength_count as f64 / classified as f64;
    }
    split
  }
}

/// Intermediate modifiers, exposed for transparency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modifiers {
  pub sleep: f64,
  pub age: f64,
  pub gender: f64,
  pub consistency: f64,
  pub recovery: f64,
  pub workout_balance: f64,
  pub protein: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPrediction {
  pub bmr: Measured<f64>,
  pub maintenance_calories: f64,
  /// `None` when neither intake nor burned energy is known
  pub energy_balance: Option<EnergyBalance>,
  pub workout_split: WorkoutSplit,

  pub fat_loss_kg: Measured<f64>,
  pub muscle_gain_kg: Measured<f64>,
  pub muscle_loss_kg: Measured<f64>,
  /// `None` without an energy balance or measured samples
  pub net_weight_change_kg: Option<Measured<f64>>,
  pub lean_mass_change_kg: Measured<f64>,
  pub fat_mass_change_kg: Measured<f64>,
  pub body_fat_pct_change: Option<f64>,
  pub waist_change_cm: Option<f64>,

  pub bmr_increase_kcal: f64,
  pub new_maintenance_calories: f64,
  pub strength_gain_pct: f64,
  pub endurance_gain_pct: f64,
  pub vo2_max_improvement: Option<f64>,

  pub recovery_score: f64,
  pub overtraining_risk: OvertrainingRisk,
  pub energy_improvement_score: f64,
  pub composition_score: f64,

  pub modifiers: Modifiers,
}

/// ---------------------------------------------------------------------------
/// Modifiers
/// ---------------------------------------------------------------------------

/// Sleep hours → fat-loss / muscle-gain efficiency. Unknown sleep is neutral.
pub fn sleep_modifier(avg_sleep_hours: Option<f64>) -> f64 {
  match avg_sleep_hours {
    None => 1.0,
    Some(h) if h < 6.0 => 0.75,
    Some(h) if h < 7.0 => 0.90,
    Some(h) if h < 8.0 => 1.00,
    Some(h) if h < 9.0 => 1.05,
    Some(_) => 1.00,
  }
}

pub fn age_modifier(age: u32) -> f64 {
  match age {
    0..=29 => 1.00,
    30..=39 => 0.95,
    40..=49 => 0.85,
    50..=59 => 0.75,
    _ => 0.65,
  }
}

pub fn gender_modifier(sex: BiologicalSex) -> f64 {
  match sex {
    BiologicalSex::Male => 1.00,
    _ => 0.85,
  }
}

pub fn consistency_modifier(workouts_per_week: f64) -> f64 {
  if workouts_per_week < 2.0 {
    0.70
  } else if workouts_per_week < 4.0 {
    0.90
  } else if workouts_per_week < 6.0 {
    1.00
  } else {
    0.95
  }
}

/// Rest-day spacing base; 1-2 rest days between sessions is optimal
pub fn rest_spacing_modifier(avg_rest_days: Option<f64>) -> f64 {
  match avg_rest_days {
    None => 1.00,
    Some(d) if d < 1.0 => 0.75,
    Some(d) if d <= 2.0 => 1.00,
    Some(d) if d <= 3.0 => 0.95,
    Some(_) => 0.85,
  }
}

/// Lower resting HR → better recovery
pub fn resting_hr_modifier(resting_hr: Option<f64>) -> f64 {
  match resting_hr {
    None => 1.00,
    Some(hr) if hr < 60.0 => 1.05,
    Some(hr) if hr < 70.0 => 1.00,
    Some(hr) if hr < 80.0 => 0.92,
    Some(_) => 0.85,
  }
}

/// Higher HRV → better recovery
pub fn hrv_modifier(hrv_ms: Option<f64>) -> f64 {
  match hrv_ms {
    None => 1.00,
    Some(v) if v >= 70.0 => 1.05,
    Some(v) if v >= 50.0 => 1.00,
    Some(v) if v >= 30.0 => 0.92,
    Some(_) => 0.85,
  }
}

pub fn recovery_modifier(
  avg_rest_days: Option<f64>,
  resting_hr: Option<f64>,
  hrv_ms: Option<f64>,
) -> f64 {
  let combined =
    rest_spacing_modifier(avg_rest_days) * resting_hr_modifier(resting_hr) * hrv_modifier(hrv_ms);
  combined.clamp(0.70, 1.10)
}

pub fn workout_balance_modifier(strength_ratio: f64) -> f64 {
  if strength_ratio >= 0.60 {
    1.00
  } else if strength_ratio >= 0.40 {
    0.90
  } else if strength_ratio >= 0.20 {
    0.75
  } else {
    0.60
  }
}

/// Protein intake (g/kg/day) against the target band. Unknown intake is neutral.
pub fn protein_modifier(grams_per_kg: Option<f64>, constants: &ModelConstants) -> f64 {
  match grams_per_kg {
    None => 1.00,
    Some(g) if g < constants.protein_target_low - 0.4 => 0.85,
    Some(g) if g < constants.protein_target_low => 1.00,
    Some(g) if g <= constants.protein_target_high => 1.15,
    Some(_) => 1.10,
  }
}

/// Average rest days between distinct training days
pub fn average_rest_days(aggregate: &MetricAggregate) -> Option<f64> {
  let days: BTreeSet<_> = aggregate.workouts.iter().map(|w| w.local_date()).collect();
  if days.len() < 2 {
    return None;
  }
  let days: Vec<_> = days.into_iter().collect();
  let gaps: Vec<f64> = days
    .windows(2)
    .map(|pair| ((pair[1] - pair[0]).num_days() - 1) as f64)
    .collect();
  Some(gaps.iter().sum::<f64>() / gaps.len() as f64)
}

/// Mifflin-St Jeor resting energy
pub fn mifflin_st_jeor(profile: &UserProfile) -> f64 {
  let sex_offset = match profile.sex {
    BiologicalSex::Male => 5.0,
    BiologicalSex::Female => -161.0,
    BiologicalSex::Other => -78.0,
  };
  10.0 * profile.weight_kg + 6.25 * profile.height_cm - 5.0 * profile.age as f64 + sex_offset
}

/// ---------------------------------------------------------------------------
/// Scores
/// ---------------------------------------------------------------------------

fn frequency_points(workouts_per_week: f64) -> f64 {
  if (3.0..=5.0).contains(&workouts_per_week) {
    20.0
  } else if (2.0..=6.0).contains(&workouts_per_week) {
    15.0
  } else if (1.0..=7.0).contains(&workouts_per_week) {
    10.0
  } else {
    5.0
  }
}

/// 0-100. Components without data are left out and the rest rescaled, so a
/// missing sensor never reads as a bad night.
pub fn recovery_score(
  aggregate: &MetricAggregate,
  recovery_modifier: f64,
  workouts_per_week: f64,
) -> f64 {
  let mut earned: f64 = 0.0;
  let mut available: f64 = 0.0;

  if let Some(hours) = aggregate.avg_sleep_hours {
    earned += (hours / 8.0).clamp(0.0, 1.0) * 30.0;
    available += 30.0;
  }

  earned += ((recovery_modifier - 0.70) / 0.40).clamp(0.0, 1.0) * 30.0;
  available += 30.0;

  earned += frequency_points(workouts_per_week);
  available += 20.0;

  if let Some(hr) = aggregate.resting_heart_rate {
    earned += match hr {
      h if h < 60.0 => 10.0,
      h if h < 70.0 => 7.0,
      h if h < 80.0 => 4.0,
      _ => 2.0,
    };
    available += 10.0;
  }

  if let Some(hrv) = aggregate.hrv_ms {
    earned += match hrv {
      v if v >= 70.0 => 10.0,
      v if v >= 50.0 => 7.0,
      v if v >= 30.0 => 4.0,
      _ => 2.0,
    };
    available += 10.0;
  }

  (earned / available * 100.0).clamp(0.0, 100.0)
}

pub fn energy_improvement_score(aggregate: &MetricAggregate, recovery_score: f64) -> f64 {
  let mut score: f64 = 50.0;

  if let Some(h) = aggregate.avg_sleep_hours {
    if (7.0..=9.0).contains(&h) {
      score += 30.0;
    } else if (6.0..7.0).contains(&h) {
      score += 15.0;
    } else {
      score -= 10.0;
    }
  }

  if let Some(active) = aggregate.per_day(aggregate.total_active_calories) {
    if (300.0..=600.0).contains(&active) {
      score += 10.0;
    } else if active > 600.0 {
      score += 5.0;
    }
  }

  score += (recovery_score / 10.0).clamp(0.0, 10.0);
  score.clamp(0.0, 100.0)
}

/// Goal-weighted composition score, 0-100
pub fn composition_score(
  profile: &UserProfile,
  fat_loss: f64,
  muscle_gain: f64,
  muscle_loss: f64,
  net_change: Option<f64>,
  body_fat_pct_change: Option<f64>,
) -> f64 {
  let mut score: f64 = 50.0;

  score += match profile.primary_focus() {
    GoalFocus::WeightLoss => (fat_loss * 10.0).min(30.0) - (muscle_loss * 20.0).min(20.0),
    GoalFocus::MuscleGain => (muscle_gain * 40.0).min(35.0) + (fat_loss * 3.0).min(10.0),
    GoalFocus::Fitness => (fat_loss * 5.0).min(15.0) + (muscle_gain * 20.0).min(15.0),
    GoalFocus::Maintenance => match net_change.map(f64::abs) {
      Some(drift) if drift < 0.5 => 20.0,
      Some(drift) if drift < 1.0 => 10.0,
      _ => 0.0,
    },
    GoalFocus::Other => (fat_loss * 3.0).min(10.0) + (muscle_gain * 10.0).min(10.0),
  };

  if let Some(change) = body_fat_pct_change {
    if change < 0.0 {
      score += (change.abs() * 5.0).min(10.0);
    }
  }

  score.clamp(0.0, 100.0)
}

/// ---------------------------------------------------------------------------
/// Measured Deltas
/// ---------------------------------------------------------------------------

struct MeasuredDeltas {
  weight: Option<(Sample, Sample)>,
  body_fat_pct: Option<(Sample, Sample)>,
  fat_mass_change: Option<f64>,
  lean_mass_change: Option<f64>,
  waist_change: Option<f64>,
}

impl MeasuredDeltas {
  fn from_samples(samples: Option<&BodyCompositionSamples>) -> Self {
    let Some(samples) = samples else {
      return Self {
        weight: None,
        body_fat_pct: None,
        fat_mass_change: None,
        lean_mass_change: None,
        waist_change: None,
      };
    };

    let weight = range_boundaries(&samples.weight_kg);
    let body_fat_pct = range_boundaries(&samples.body_fat_pct);

    let fat_mass = match (weight, body_fat_pct) {
      (Some((w0, w1)), Some((bf0, bf1))) => {
        Some((w0.value * bf0.value / 100.0, w1.value * bf1.value / 100.0))
      }
      _ => None,
    };

    // Direct lean readings first, else lean implied by weight and body fat
    let lean_mass_change = range_boundaries(&samples.lean_mass_kg)
      .map(|(l0, l1)| l1.value - l0.value)
      .or_else(|| match (weight, fat_mass) {
        (Some((w0, w1)), Some((f0, f1))) => Some((w1.value - f1) - (w0.value - f0)),
        _ => None,
      });

    Self {
      weight,
      body_fat_pct,
      fat_mass_change: fat_mass.map(|(f0, f1)| f1 - f0),
      lean_mass_change,
      waist_change: range_boundaries(&samples.waist_cm).map(|(a, b)| b.value - a.value),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Prediction
/// ---------------------------------------------------------------------------

impl CompositionPrediction {
  /// Pure function of profile, aggregate and optional measured samples
  pub fn compute(
    profile: &UserProfile,
    aggregate: &MetricAggregate,
    samples: Option<&BodyCompositionSamples>,
    constants: &ModelConstants,
  ) -> Result<Self, CompositionError> {
    profile
      .validate()
      .map_err(|f| CompositionError::InvalidProfile {
        field: f.field,
        value: f.value,
      })?;

    let measured = MeasuredDeltas::from_samples(samples);

    // 1. BMR and maintenance
    let bmr = match aggregate.per_day(aggregate.total_basal_calories) {
      Some(basal) => Measured::Measured(basal),
      None => Measured::Derived(mifflin_st_jeor(profile)),
    };
    let maintenance = bmr.value() * constants.activity_factor;
    debug!(path = bmr.source(), bmr = bmr.value(), "BMR");

    // 2. Energy balance
    let energy_balance = Self::energy_balance(aggregate, bmr.value(), maintenance);

    // 3. Workout split
    let split = WorkoutSplit::compute(aggregate);
    let workouts_per_week = aggregate.workouts_per_week();

    // 4. Modifiers
    let protein_per_kg = aggregate
      .per_day(aggregate.total_protein_g)
      .map(|g| g / profile.weight_kg);
    let modifiers = Modifiers {
      sleep: sleep_modifier(aggregate.avg_sleep_hours),
      age: age_modifier(profile.age),
      gender: gender_modifier(profile.sex),
      consistency: consistency_modifier(workouts_per_week),
      recovery: recovery_modifier(
        average_rest_days(aggregate),
        aggregate.resting_heart_rate,
        aggregate.hrv_ms,
      ),
      workout_balance: workout_balance_modifier(split.strength_ratio),
      protein: protein_modifier(protein_per_kg, constants),
    };

    let deficit = energy_balance
      .filter(|b| b.is_deficit())
      .map(|b| -b.total);
    let surplus = energy_balance
      .filter(|b| b.is_surplus())
      .map(|b| b.total);

    // 5. Fat loss
    let fat_loss = match measured.fat_mass_change {
      Some(change) => Measured::Measured((-change).max(0.0)),
      None => Measured::Derived(deficit.map_or(0.0, |d| {
        d / constants.kcal_per_kg_fat * modifiers.sleep * modifiers.consistency
      })),
    };
    debug!(path = fat_loss.source(), kg = fat_loss.value(), "Fat loss");

    // 6. Muscle loss
    let muscle_loss = match measured.lean_mass_change {
      Some(change) => Measured::Measured((-change).max(0.0)),
      None => Measured::Derived(if deficit.is_some() {
        let ratio = if split.strength_count > 0 {
          constants.muscle_loss_ratio_with_strength
        } else {
          constants.muscle_loss_ratio_without_strength
        };
        fat_loss.value() * ratio * (1.0 / modifiers.recovery)
      } else {
        0.0
      }),
    };
    debug!(path = muscle_loss.source(), kg = muscle_loss.value(), "Muscle loss");

    // 7. Muscle gain
    let muscle_gain = match measured.lean_mass_change {
      Some(change) => Measured::Measured(change.max(0.0)),
      None => Measured::Derived(match surplus {
        Some(s) if split.strength_count >= 1 => {
          s * constants.muscle_partition / constants.kcal_per_kg_muscle
            * modifiers.sleep
            * modifiers.age
            * modifiers.gender
            * modifiers.consistency
            * modifiers.recovery
            * modifiers.workout_balance
            * modifiers.protein
        }
        _ => 0.0,
      }),
    };
    debug!(path = muscle_gain.source(), kg = muscle_gain.value(), "Muscle gain");

    // 8. Net weight change
    let change_known = energy_balance.is_some()
      || measured.fat_mass_change.is_some()
      || measured.lean_mass_change.is_some();
    let net_weight_change = match measured.weight {
      Some((w0, w1)) => Some(Measured::Measured(w1.value - w0.value)),
      None if change_known => Some(Measured::Derived(
        fat_loss.value() - muscle_loss.value() + muscle_gain.value(),
      )),
      None => None,
    };
    match &net_weight_change {
      Some(net) => debug!(path = net.source(), kg = net.value(), "Net change"),
      None => debug!("Net change unknown"),
    }

    let lean_mass_change = match measured.lean_mass_change {
      Some(change) => Measured::Measured(change),
      None => Measured::Derived(muscle_gain.value() - muscle_loss.value()),
    };
    let fat_mass_change = match measured.fat_mass_change {
      Some(change) => Measured::Measured(change),
      None => Measured::Derived(-fat_loss.value()),
    };
    let body_fat_pct_change = measured.body_fat_pct.map(|(a, b)| b.value - a.value);

    // 9. Metabolism
    let bmr_increase = muscle_gain.value() * constants.muscle_bmr_kcal_per_kg;
    let new_maintenance = maintenance + bmr_increase;

    // 10. Performance
    let weeks = aggregate.weeks();
    let weekly_strength_hours = split.strength_minutes / weeks / 60.0;
    let weekly_cardio_hours = split.cardio_minutes / weeks / 60.0;
    let strength_gain_pct = weekly_strength_hours * 0.2 + muscle_gain.value() * 5.0;
    let endurance_gain_pct = weekly_cardio_hours * 2.0;
    let vo2_max_improvement = aggregate
      .vo2_max
      .map(|_| weekly_cardio_hours * 0.3 * (aggregate.day_count as f64 / 30.0));

    // 11-13. Scores
    let recovery = recovery_score(aggregate, modifiers.recovery, workouts_per_week);
    let energy_improvement = energy_improvement_score(aggregate, recovery);
    let composition = composition_score(
      profile,
      fat_loss.value(),
      muscle_gain.value(),
      muscle_loss.value(),
      net_weight_change.map(|n| n.value()),
      body_fat_pct_change,
    );

    Ok(Self {
      bmr,
      maintenance_calories: maintenance,
      energy_balance,
      workout_split: split,
      fat_loss_kg: fat_loss,
      muscle_gain_kg: muscle_gain,
      muscle_loss_kg: muscle_loss,
      net_weight_change_kg: net_weight_change,
      lean_mass_change_kg: lean_mass_change,
      fat_mass_change_kg: fat_mass_change,
      body_fat_pct_change,
      waist_change_cm: measured.waist_change,
      bmr_increase_kcal: bmr_increase,
      new_maintenance_calories: new_maintenance,
      strength_gain_pct,
      endurance_gain_pct,
      vo2_max_improvement,
      recovery_score: recovery,
      overtraining_risk: OvertrainingRisk::from_recovery_score(recovery),
      energy_improvement_score: energy_improvement,
      composition_score: composition,
      modifiers,
    })
  }

  /// Logged intake minus burned when intake exists, otherwise intake is
  /// assumed at maintenance. Burned energy needs active calories.
  fn energy_balance(
    aggregate: &MetricAggregate,
    bmr: f64,
    maintenance: f64,
  ) -> Option<EnergyBalance> {
    let burned = aggregate
      .per_day(aggregate.total_active_calories)
      .map(|active| active + bmr);

    let (daily_difference, basis) = match aggregate.per_day(aggregate.total_dietary_calories) {
      Some(consumed) => (consumed - burned.unwrap_or(maintenance), EnergyBasis::Logged),
      None => (maintenance - burned?, EnergyBasis::Estimated),
    };

    Some(EnergyBalance {
      daily_difference,
      total: daily_difference * aggregate.day_count as f64,
      basis,
    })
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assert_approx_eq;
  use crate::models::profile::FitnessGoal;
  use crate::test_utils::*;

  fn constants() -> ModelConstants {
    ModelConstants::default()
  }

  #[test]
  fn test_sleep_modifier_band_boundaries() {
    let cases = [
      (5.99, 0.75),
      (6.00, 0.90),
      (6.99, 0.90),
      (7.00, 1.00),
      (7.99, 1.00),
      (8.00, 1.05),
      (8.99, 1.05),
      (9.00, 1.00),
    ];
    for (hours, expected) in cases {
      assert_eq!(sleep_modifier(Some(hours)), expected, "sleep = {}", hours);
    }
    assert_eq!(sleep_modifier(None), 1.0);
  }

  #[test]
  fn test_age_modifier_bands() {
    assert_eq!(age_modifier(29), 1.00);
    assert_eq!(age_modifier(30), 0.95);
    assert_eq!(age_modifier(39), 0.95);
    assert_eq!(age_modifier(40), 0.85);
    assert_eq!(age_modifier(50), 0.75);
    assert_eq!(age_modifier(59), 0.75);
    assert_eq!(age_modifier(60), 0.65);
  }

  #[test]
  fn test_gender_modifier() {
    assert_eq!(gender_modifier(BiologicalSex::Male), 1.00);
    assert_eq!(gender_modifier(BiologicalSex::Female), 0.85);
    assert_eq!(gender_modifier(BiologicalSex::Other), 0.85);
  }

  #[test]
  fn test_consistency_modifier_boundaries() {
    assert_eq!(consistency_modifier(1.99), 0.70);
    assert_eq!(consistency_modifier(2.0), 0.90);
    assert_eq!(consistency_modifier(3.99), 0.90);
    assert_eq!(consistency_modifier(4.0), 1.00);
    assert_eq!(consistency_modifier(5.99), 1.00);
    assert_eq!(consistency_modifier(6.0), 0.95);
  }

  #[test]
  fn test_workout_balance_boundaries() {
    assert_eq!(workout_balance_modifier(0.60), 1.00);
    assert_eq!(workout_balance_modifier(0.59), 0.90);
    assert_eq!(workout_balance_modifier(0.40), 0.90);
    assert_eq!(workout_balance_modifier(0.20), 0.75);
    assert_eq!(workout_balance_modifier(0.19), 0.60);
  }

  #[test]
  fn test_recovery_modifier_is_clamped() {
    // Best case: 1.00 * 1.05 * 1.05 = 1.1025 -> 1.10
    assert_eq!(recovery_modifier(Some(1.5), Some(50.0), Some(90.0)), 1.10);
    // Worst case: 0.75 * 0.85 * 0.85 = 0.54 -> 0.70
    assert_eq!(recovery_modifier(Some(0.0), Some(90.0), Some(10.0)), 0.70);
    // Unknown everything is neutral
    assert_eq!(recovery_modifier(None, None, None), 1.00);
  }

  #[test]
  fn test_rest_spacing_bands() {
    assert_eq!(rest_spacing_modifier(Some(0.5)), 0.75);
    assert_eq!(rest_spacing_modifier(Some(1.0)), 1.00);
    assert_eq!(rest_spacing_modifier(Some(2.0)), 1.00);
    assert_eq!(rest_spacing_modifier(Some(2.5)), 0.95);
    assert_eq!(rest_spacing_modifier(Some(3.5)), 0.85);
  }

  #[test]
  fn test_protein_modifier_bands() {
    let c = constants();
    assert_eq!(protein_modifier(None, &c), 1.00);
    assert_eq!(protein_modifier(Some(1.0), &c), 0.85);
    assert_eq!(protein_modifier(Some(1.4), &c), 1.00);
    assert_eq!(protein_modifier(Some(1.6), &c), 1.15);
    assert_eq!(protein_modifier(Some(2.2), &c), 1.15);
    assert_eq!(protein_modifier(Some(2.5), &c), 1.10);
  }

  #[test]
  fn test_mifflin_st_jeor() {
    let profile = mock_profile();
    // 10*90 + 6.25*180 - 5*30 + 5
    assert_approx_eq!(mifflin_st_jeor(&profile), 1880.0, 1e-9);
  }

  #[test]
  fn test_invalid_profile_rejected() {
    let mut profile = mock_profile();
    profile.weight_kg = 0.0;
    let result = CompositionPrediction::compute(&profile, &mock_aggregate(14), None, &constants());
    assert_eq!(
      result.unwrap_err(),
      CompositionError::InvalidProfile {
        field: "weight_kg",
        value: 0.0
      }
    );
  }

  #[test]
  fn test_measured_basal_preferred_over_formula() {
    let profile = mock_profile();
    let mut aggregate = mock_aggregate(14);
    aggregate.total_basal_calories = Some(1900.0 * 14.0);
    let prediction =
      CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();
    assert!(prediction.bmr.is_measured());
    assert_approx_eq!(prediction.bmr.value(), 1900.0, 1e-9);

    aggregate.total_basal_calories = None;
    let prediction =
      CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();
    assert!(!prediction.bmr.is_measured());
    assert_approx_eq!(prediction.maintenance_calories, 1880.0 * 1.55, 1e-9);
  }

  #[test]
  fn test_deficit_scenario_fat_loss_and_strength_protection() {
    let profile = mock_profile();
    let aggregate = deficit_aggregate(true);
    let prediction =
      CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();

    let balance = prediction.energy_balance.unwrap();
    assert_approx_eq!(balance.daily_difference, -500.0, 1e-9);
    assert_eq!(balance.basis, EnergyBasis::Logged);

    // 7000 kcal / 7700 * sleep(7.5h = 1.0) * consistency(3/wk = 0.9)
    assert_approx_eq!(prediction.fat_loss_kg.value(), 7000.0 / 7700.0 * 0.9, 1e-9);
    assert!(prediction.muscle_loss_kg.value() > 0.0);
    assert_eq!(prediction.muscle_gain_kg.value(), 0.0);

    let without_strength = CompositionPrediction::compute(
      &profile,
      &deficit_aggregate(false),
      None,
      &constants(),
    )
    .unwrap();
    assert!(prediction.muscle_loss_kg.value() < without_strength.muscle_loss_kg.value());
  }

  #[test]
  fn test_surplus_scenario_builds_muscle_only() {
    let profile = mock_profile();
    let mut aggregate = deficit_aggregate(true);
    aggregate.total_dietary_calories = Some(3200.0 * 14.0);
    let prediction =
      CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();

    assert!(prediction.energy_balance.unwrap().is_surplus());
    assert!(prediction.muscle_gain_kg.value() > 0.0);
    assert_eq!(prediction.fat_loss_kg.value(), 0.0);
    assert_eq!(prediction.muscle_loss_kg.value(), 0.0);
    assert!(prediction.bmr_increase_kcal > 0.0);
    assert!(prediction.new_maintenance_calories > prediction.maintenance_calories);
  }

  #[test]
  fn test_muscle_gain_formula_exact() {
    let profile = mock_profile();
    let mut aggregate = deficit_aggregate(true);
    aggregate.total_dietary_calories = Some(3200.0 * 14.0);
    aggregate.total_protein_g = Some(180.0 * 14.0);
    aggregate.avg_sleep_hours = Some(8.5);
    let p = CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();

    // +400 kcal/day over 14 days; sleep 1.05, age 0.95, male 1.00,
    // 3/week 0.90, rest spacing 1.00, 4 of 6 strength 1.00, 2.0 g/kg 1.15
    let expected = 5600.0 * 0.35 / 2500.0 * 1.05 * 0.95 * 1.00 * 0.90 * 1.00 * 1.00 * 1.15;
    assert!(!p.muscle_gain_kg.is_measured());
    assert_approx_eq!(p.muscle_gain_kg.value(), expected, 1e-12);
    assert_approx_eq!(p.bmr_increase_kcal, expected * 13.0, 1e-9);

    // 4 x 45 min strength over 2 weeks = 1.5 h/week
    assert_approx_eq!(p.strength_gain_pct, 1.5 * 0.2 + expected * 5.0, 1e-12);
  }

  #[test]
  fn test_recovery_score_component_weights() {
    let mut aggregate = deficit_aggregate(true);
    aggregate.resting_heart_rate = Some(65.0);
    aggregate.hrv_ms = Some(55.0);

    // sleep 7.5/8 * 30, modifier (1.0 - 0.7)/0.4 * 30, 3/week 20, RHR 7, HRV 7
    let full = recovery_score(&aggregate, 1.0, 3.0);
    assert_approx_eq!(full, 28.125 + 22.5 + 20.0 + 7.0 + 7.0, 1e-9);

    // Missing heart signals drop out of the denominator
    aggregate.resting_heart_rate = None;
    aggregate.hrv_ms = None;
    let partial = recovery_score(&aggregate, 1.0, 3.0);
    assert_approx_eq!(partial, (28.125 + 22.5 + 20.0) / 80.0 * 100.0, 1e-9);

    // Modifier component saturates at 1.10
    aggregate.avg_sleep_hours = Some(8.0);
    assert_approx_eq!(recovery_score(&aggregate, 1.10, 4.0), 100.0, 1e-9);
  }

  #[test]
  fn test_surplus_without_strength_builds_nothing() {
    let profile = mock_profile();
    let mut aggregate = deficit_aggregate(false);
    aggregate.total_dietary_calories = Some(3200.0 * 14.0);
    let prediction =
      CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();
    assert_eq!(prediction.muscle_gain_kg.value(), 0.0);
  }

  #[test]
  fn test_exclusivity_over_balance_sweep() {
    let profile = mock_profile();
    for intake in (1500..=3800).step_by(100) {
      let mut aggregate = deficit_aggregate(true);
      aggregate.total_dietary_calories = Some(intake as f64 * 14.0);
      let p = CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();
      let total = p.energy_balance.unwrap().total;
      if total >= 0.0 {
        assert_eq!(p.muscle_loss_kg.value(), 0.0, "intake {}", intake);
      } else {
        assert_eq!(p.muscle_gain_kg.value(), 0.0, "intake {}", intake);
      }
      assert_approx_eq!(
        p.net_weight_change_kg.unwrap().value(),
        p.fat_loss_kg.value() - p.muscle_loss_kg.value() + p.muscle_gain_kg.value(),
        1e-12
      );
    }
  }

  #[test]
  fn test_unknown_energy_balance_leaves_net_change_unknown() {
    let profile = mock_profile();
    let aggregate = mock_aggregate(14);
    let prediction =
      CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();
    assert!(prediction.energy_balance.is_none());
    assert_eq!(prediction.fat_loss_kg, Measured::Derived(0.0));
    assert_eq!(prediction.net_weight_change_kg, None);

    // Workouts and sleep alone do not make the change known
    let mut no_calories = deficit_aggregate(true);
    no_calories.total_basal_calories = None;
    no_calories.total_active_calories = None;
    no_calories.total_dietary_calories = None;
    let prediction =
      CompositionPrediction::compute(&profile, &no_calories, None, &constants()).unwrap();
    assert!(prediction.energy_balance.is_none());
    assert_eq!(prediction.net_weight_change_kg, None);
  }

  #[test]
  fn test_measured_weight_known_without_energy_balance() {
    let profile = mock_profile();
    let samples = BodyCompositionSamples {
      weight_kg: vec![sample(1, 90.0), sample(14, 90.4)],
      body_fat_pct: vec![],
      lean_mass_kg: vec![],
      waist_cm: vec![],
    };
    let prediction =
      CompositionPrediction::compute(&profile, &mock_aggregate(14), Some(&samples), &constants())
        .unwrap();
    assert!(prediction.energy_balance.is_none());
    let net = prediction.net_weight_change_kg.unwrap();
    assert!(net.is_measured());
    assert_approx_eq!(net.value(), 0.4, 1e-9);
  }

  #[test]
  fn test_estimated_balance_assumes_maintenance_intake() {
    let profile = mock_profile();
    let mut aggregate = mock_aggregate(14);
    aggregate.total_active_calories = Some(1200.0 * 14.0);
    let prediction =
      CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();
    let balance = prediction.energy_balance.unwrap();
    assert_eq!(balance.basis, EnergyBasis::Estimated);
    // maintenance 2914 - burned (1880 + 1200)
    assert_approx_eq!(balance.daily_difference, 1880.0 * 1.55 - 3080.0, 1e-9);
    assert!(balance.is_deficit());
  }

  #[test]
  fn test_measured_samples_override_derived_paths() {
    let profile = mock_profile();
    let aggregate = deficit_aggregate(true);
    let samples = BodyCompositionSamples {
      weight_kg: vec![sample(1, 90.0), sample(14, 89.0)],
      body_fat_pct: vec![sample(1, 25.0), sample(14, 24.0)],
      lean_mass_kg: vec![],
      waist_cm: vec![sample(1, 95.0), sample(14, 93.5)],
    };
    let prediction =
      CompositionPrediction::compute(&profile, &aggregate, Some(&samples), &constants()).unwrap();

    // fat 22.5 -> 21.36
    assert!(prediction.fat_loss_kg.is_measured());
    assert_approx_eq!(prediction.fat_loss_kg.value(), 22.5 - 21.36, 1e-9);
    let net = prediction.net_weight_change_kg.unwrap();
    assert!(net.is_measured());
    assert_approx_eq!(net.value(), -1.0, 1e-9);
    // lean 67.5 -> 67.64, a gain
    assert!(prediction.muscle_gain_kg.is_measured());
    assert_approx_eq!(prediction.muscle_gain_kg.value(), 0.14, 1e-9);
    assert_eq!(prediction.muscle_loss_kg, Measured::Measured(0.0));
    assert_approx_eq!(prediction.body_fat_pct_change.unwrap(), -1.0, 1e-9);
    assert_approx_eq!(prediction.waist_change_cm.unwrap(), -1.5, 1e-9);
  }

  #[test]
  fn test_scores_stay_in_bounds() {
    let profile = mock_profile();
    let mut aggregate = deficit_aggregate(true);
    aggregate.avg_sleep_hours = Some(14.0);
    aggregate.resting_heart_rate = Some(40.0);
    aggregate.hrv_ms = Some(200.0);
    aggregate.total_active_calories = Some(5000.0 * 14.0);
    let p = CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();
    for score in [p.recovery_score, p.energy_improvement_score, p.composition_score] {
      assert!((0.0..=100.0).contains(&score), "score {}", score);
    }

    let mut starved = mock_aggregate(14);
    starved.avg_sleep_hours = Some(2.0);
    starved.resting_heart_rate = Some(100.0);
    starved.hrv_ms = Some(5.0);
    let p = CompositionPrediction::compute(&profile, &starved, None, &constants()).unwrap();
    assert!((0.0..=100.0).contains(&p.recovery_score));
    assert_eq!(p.overtraining_risk, OvertrainingRisk::High);
  }

  #[test]
  fn test_overtraining_risk_bands() {
    assert_eq!(OvertrainingRisk::from_recovery_score(85.0), OvertrainingRisk::Low);
    assert_eq!(OvertrainingRisk::from_recovery_score(84.9), OvertrainingRisk::Moderate);
    assert_eq!(OvertrainingRisk::from_recovery_score(70.0), OvertrainingRisk::Moderate);
    assert_eq!(OvertrainingRisk::from_recovery_score(69.9), OvertrainingRisk::High);
  }

  #[test]
  fn test_composition_score_weighting_by_goal() {
    let mut profile = mock_profile();
    profile.goals = vec![FitnessGoal::LoseWeight];
    let loss_focus = composition_score(&profile, 1.0, 0.0, 0.1, Some(0.9), None);
    assert_approx_eq!(loss_focus, 50.0 + 10.0 - 2.0, 1e-9);

    profile.goals = vec![FitnessGoal::BuildMuscle];
    let gain_focus = composition_score(&profile, 1.0, 0.5, 0.0, Some(1.5), None);
    assert_approx_eq!(gain_focus, 50.0 + 20.0 + 3.0, 1e-9);

    profile.goals = vec![FitnessGoal::Maintenance];
    assert_approx_eq!(composition_score(&profile, 0.0, 0.0, 0.0, Some(0.2), None), 70.0, 1e-9);
    // Unknown drift earns nothing
    assert_approx_eq!(composition_score(&profile, 0.0, 0.0, 0.0, None, None), 50.0, 1e-9);

    // Measured body fat drop adds a bonus
    profile.goals = vec![FitnessGoal::GeneralHealth];
    assert_approx_eq!(composition_score(&profile, 0.0, 0.0, 0.0, Some(0.0), Some(-1.0)), 55.0, 1e-9);
  }

  #[test]
  fn test_vo2_improvement_only_with_vo2_data() {
    let profile = mock_profile();
    let mut aggregate = deficit_aggregate(true);
    let p = CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();
    assert!(p.vo2_max_improvement.is_none());

    aggregate.vo2_max = Some(42.0);
    let p = CompositionPrediction::compute(&profile, &aggregate, None, &constants()).unwrap();
    // 2 x 45 min cardio over 2 weeks = 0.75 h/week
    assert_approx_eq!(p.vo2_max_improvement.unwrap(), 0.75 * 0.3 * (14.0 / 30.0), 1e-9);
    assert_approx_eq!(p.endurance_gain_pct, 1.5, 1e-9);
  }
}
