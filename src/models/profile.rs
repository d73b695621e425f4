use serde::{Deserialize, Serialize};

/// ---------------------------------------------------------------------------
/// Biological Sex
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiologicalSex {
  Male,
  Female,
  Other,
}

impl BiologicalSex {
  pub fn as_str(&self) -> &'static str {
    match self {
      BiologicalSex::Male => "male",
      BiologicalSex::Female => "female",
      BiologicalSex::Other => "other",
    }
  }
}

/// ---------------------------------------------------------------------------
/// Fitness Goals
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessGoal {
  LoseWeight,
  BuildMuscle,
  Maintenance,
  Endurance,
  Flexibility,
  StressReduction,
  BetterSleep,
  Recovery,
  GeneralHealth,
  AthleticPerformance,
}

/// How a goal weights the overall composition score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalFocus {
  WeightLoss,
  MuscleGain,
  Fitness,
  Maintenance,
  Other,
}

impl FitnessGoal {
  pub fn label(&self) -> &'static str {
    match self {
      FitnessGoal::LoseWeight => "Lose weight",
      FitnessGoal::BuildMuscle => "Build muscle",
      FitnessGoal::Maintenance => "Maintain weight",
      FitnessGoal::Endurance => "Improve endurance",
      FitnessGoal::Flexibility => "Improve flexibility",
      FitnessGoal::StressReduction => "Reduce stress",
      FitnessGoal::BetterSleep => "Sleep better",
      FitnessGoal::Recovery => "Improve recovery",
      FitnessGoal::GeneralHealth => "General health",
      FitnessGoal::AthleticPerformance => "Athletic performance",
    }
  }

  pub fn focus(&self) -> GoalFocus {
    match self {
      FitnessGoal::LoseWeight => GoalFocus::WeightLoss,
      FitnessGoal::BuildMuscle => GoalFocus::MuscleGain,
      FitnessGoal::Endurance | FitnessGoal::AthleticPerformance => GoalFocus::Fitness,
      FitnessGoal::Maintenance => GoalFocus::Maintenance,
      _ => GoalFocus::Other,
    }
  }
}

/// ---------------------------------------------------------------------------
/// User Profile
/// ---------------------------------------------------------------------------

/// Immutable per analysis. Goals are ordered, most important first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
  pub age: u32,
  pub sex: BiologicalSex,
  pub height_cm: f64,
  pub weight_kg: f64,
  pub target_weight_kg: f64,
  #[serde(default)]
  pub goals: Vec<FitnessGoal>,
}

/// A profile field that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidField {
  pub field: &'static str,
  pub value: f64,
}

impl UserProfile {
  /// Reject non-positive or non-finite body measurements
  pub fn validate(&self) -> Result<(), InvalidField> {
    for (field, value) in [
      ("weight_kg", self.weight_kg),
      ("height_cm", self.height_cm),
    ] {
      if !value.is_finite() || value <= 0.0 {
        return Err(InvalidField { field, value });
      }
    }
    Ok(())
  }

  /// Primary goal focus; profiles without goals count as general health
  pub fn primary_focus(&self) -> GoalFocus {
    self
      .goals
      .first()
      .map(|g| g.focus())
      .unwrap_or(GoalFocus::Other)
  }

  pub fn has_goal(&self, goal: FitnessGoal) -> bool {
    self.goals.contains(&goal)
  }

  /// Signed kg remaining to target (negative = needs to lose)
  pub fn kg_to_target(&self) -> f64 {
    self.target_weight_kg - self.weight_kg
  }
}
