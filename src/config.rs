//! Engine configuration
//!
//! Runtime settings come from the environment (a `.env` file is honored).
//! Physiological heuristics live in `ModelConstants` so they can be tuned
//! without touching the formulas.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// ---------------------------------------------------------------------------
/// Defaults
/// ---------------------------------------------------------------------------

const DEFAULT_DB_PATH: &str = "health-coach.db";
const DEFAULT_HISTORY_LIMIT: usize = 5;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1200;
const DEFAULT_BUSY_WAIT_MS: u64 = 2000;
const DEFAULT_LOCAL_MODEL_URL: &str = "http://localhost:11434";
const DEFAULT_LOCAL_MODEL: &str = "llama3.2:3b";
const DEFAULT_PLATFORM_VERSION: &str = "0.0";
const DEFAULT_HARDWARE_CLASS: &str = "standard";

/// ---------------------------------------------------------------------------
/// Engine Config
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub db_path: PathBuf,
  /// Entries kept per analysis window
  pub history_limit: usize,
  pub temperature: f32,
  pub max_tokens: u32,
  /// How long to wait for a busy model session before giving up
  pub busy_wait: Duration,
  pub local_model_url: String,
  pub local_model: String,
  pub anthropic_api_key: Option<String>,
  /// Host platform version used by the provider capability probe
  pub platform_version: String,
  /// entry, standard, high_end or workstation
  pub hardware_class: String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      db_path: PathBuf::from(DEFAULT_DB_PATH),
      history_limit: DEFAULT_HISTORY_LIMIT,
      temperature: DEFAULT_TEMPERATURE,
      max_tokens: DEFAULT_MAX_TOKENS,
      busy_wait: Duration::from_millis(DEFAULT_BUSY_WAIT_MS),
      local_model_url: DEFAULT_LOCAL_MODEL_URL.to_string(),
      local_model: DEFAULT_LOCAL_MODEL.to_string(),
      anthropic_api_key: None,
      platform_version: DEFAULT_PLATFORM_VERSION.to_string(),
      hardware_class: DEFAULT_HARDWARE_CLASS.to_string(),
    }
  }
}

impl EngineConfig {
  /// Load from the environment, falling back to defaults for anything
  /// missing or unparseable
  pub fn from_env() -> Self {
    dotenvy::dotenv().ok();

    Self {
      db_path: env::var("COACH_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH)),
      history_limit: parse_var("COACH_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT).max(1),
      temperature: parse_var("COACH_MODEL_TEMPERATURE", DEFAULT_TEMPERATURE),
      max_tokens: parse_var("COACH_MODEL_MAX_TOKENS", DEFAULT_MAX_TOKENS),
      busy_wait: Duration::from_millis(parse_var("COACH_BUSY_WAIT_MS", DEFAULT_BUSY_WAIT_MS)),
      local_model_url: env::var("COACH_LOCAL_MODEL_URL")
        .unwrap_or_else(|_| DEFAULT_LOCAL_MODEL_URL.to_string()),
      local_model: env::var("COACH_LOCAL_MODEL").unwrap_or_else(|_| DEFAULT_LOCAL_MODEL.to_string()),
      anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty()),
      platform_version: env::var("COACH_PLATFORM_VERSION")
        .unwrap_or_else(|_| DEFAULT_PLATFORM_VERSION.to_string()),
      hardware_class: env::var("COACH_HARDWARE_CLASS")
        .unwrap_or_else(|_| DEFAULT_HARDWARE_CLASS.to_string()),
    }
  }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
  match env::var(name) {
    Ok(raw) => match raw.trim().parse::<T>() {
      Ok(value) => value,
      Err(_) => {
        warn!(var = name, value = %raw, default = %default, "Invalid value, using default");
        default
      }
    },
    Err(_) => default,
  }
}

/// ---------------------------------------------------------------------------
/// Model Constants
/// ---------------------------------------------------------------------------

/// Heuristic constants behind the composition and pattern models.
///
/// These are behavioral-parity values, not validated physiology.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConstants {
  /// kcal per kg of fat tissue
  pub kcal_per_kg_fat: f64,
  /// kcal surplus per kg of lean tissue built
  pub kcal_per_kg_muscle: f64,
  /// Share of a surplus partitioned toward muscle
  pub muscle_partition: f64,
  /// Maintenance = BMR x this
  pub activity_factor: f64,
  /// Resting kcal/day burned per kg of added muscle
  pub muscle_bmr_kcal_per_kg: f64,
  /// Muscle lost per kg fat when strength training is present / absent
  pub muscle_loss_ratio_with_strength: f64,
  pub muscle_loss_ratio_without_strength: f64,
  /// Protein target band, g per kg bodyweight per day
  pub protein_target_low: f64,
  pub protein_target_high: f64,

  // Pattern analysis
  pub active_day_steps: f64,
  pub active_day_calories: f64,
  pub workout_score_weight: f64,
  pub trend_threshold_pct: f64,
  pub plateau_min_days: u32,
  pub plateau_max_net_change_kg: f64,
  pub plateau_max_weekly_rate_kg: f64,
  /// Fixed window used when estimating heart-rate recovery
  pub hr_recovery_window_min: f64,
  /// Workout minutes in the window below which a plateau suggests more volume
  pub plateau_min_workout_minutes: f64,
}

impl Default for ModelConstants {
  fn default() -> Self {
    Self {
      kcal_per_kg_fat: 7700.0,
      kcal_per_kg_muscle: 2500.0,
      muscle_partition: 0.35,
      activity_factor: 1.55,
      muscle_bmr_kcal_per_kg: 13.0,
      muscle_loss_ratio_with_strength: 0.10,
      muscle_loss_ratio_without_strength: 0.25,
      protein_target_low: 1.6,
      protein_target_high: 2.2,
      active_day_steps: 5000.0,
      active_day_calories: 300.0,
      workout_score_weight: 200.0,
      trend_threshold_pct: 5.0,
      plateau_min_days: 14,
      plateau_max_net_change_kg: 0.2,
      plateau_max_weekly_rate_kg: 0.1,
      hr_recovery_window_min: 2.0,
      plateau_min_workout_minutes: 150.0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn test_from_env_uses_defaults() {
    temp_env::with_vars_unset(
      [
        "COACH_DB_PATH",
        "COACH_HISTORY_LIMIT",
        "COACH_MODEL_TEMPERATURE",
        "COACH_BUSY_WAIT_MS",
        "ANTHROPIC_API_KEY",
      ],
      || {
        let config = EngineConfig::from_env();
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.busy_wait, Duration::from_millis(DEFAULT_BUSY_WAIT_MS));
        assert!(config.anthropic_api_key.is_none());
      },
    );
  }

  #[test]
  #[serial]
  fn test_from_env_reads_overrides() {
    temp_env::with_vars(
      [
        ("COACH_HISTORY_LIMIT", Some("3")),
        ("COACH_MODEL_TEMPERATURE", Some("0.2")),
        ("COACH_DB_PATH", Some("/tmp/coach-test.db")),
        ("ANTHROPIC_API_KEY", Some("sk-test")),
      ],
      || {
        let config = EngineConfig::from_env();
        assert_eq!(config.history_limit, 3);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.db_path, PathBuf::from("/tmp/coach-test.db"));
        assert_eq!(config.anthropic_api_key.as_deref(), Some("sk-test"));
      },
    );
  }

  #[test]
  #[serial]
  fn test_from_env_invalid_number_falls_back() {
    temp_env::with_vars(
      [("COACH_HISTORY_LIMIT", Some("lots")), ("COACH_MODEL_MAX_TOKENS", Some("-5"))],
      || {
        let config = EngineConfig::from_env();
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
      },
    );
  }
}
