//! Recommendation prompt construction
//!
//! Every section is gated on `AvailableMetrics`. A metric group with no
//! underlying data is never mentioned, not even to say it is missing, so the
//! model cannot build advice on numbers that do not exist. The prompt is
//! provider-agnostic and bounded in size; low-priority sections are dropped
//! first when it grows too long.

use crate::comparison::MetricComparison;
use crate::composition::{CompositionPrediction, EnergyBasis};
use crate::models::metrics::MetricAggregate;
use crate::models::profile::UserProfile;
use crate::models::recommendation::{ActionCategory, MetricsSnapshot, RecommendationHistoryEntry};
use crate::models::window::AnalysisWindow;
use crate::patterns::PatternInsights;

/// Upper bound on prompt length, in characters
pub const MAX_PROMPT_CHARS: usize = 6_000;

const TOP_COMPARISONS: usize = 5;

pub const SYSTEM_PROMPT: &str = "You are a pragmatic personal fitness coach. \
Give specific, measurable directives grounded only in the data you are shown. \
You are not a medical provider; keep health notes general.";

/// ---------------------------------------------------------------------------
/// Available Metrics
/// ---------------------------------------------------------------------------

/// Which metric groups have real data behind them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvailableMetrics {
  pub workouts: bool,
  pub steps: bool,
  pub distance: bool,
  pub active_calories: bool,
  pub dietary_calories: bool,
  pub protein: bool,
  pub heart_rate: bool,
  pub resting_heart_rate: bool,
  pub hrv: bool,
  pub hr_recovery: bool,
  pub sleep: bool,
  pub blood_oxygen: bool,
  pub vo2_max: bool,
  pub measured_body_composition: bool,
}

impl AvailableMetrics {
  pub fn detect(aggregate: &MetricAggregate, prediction: &CompositionPrediction) -> Self {
    Self {
      workouts: !aggregate.workouts.is_empty(),
      steps: aggregate.total_steps.is_some(),
      distance: aggregate.total_distance_km.is_some(),
      active_calories: aggregate.total_active_calories.is_some(),
      dietary_calories: aggregate.total_dietary_calories.is_some(),
      protein: aggregate.total_protein_g.is_some(),
      heart_rate: aggregate.avg_heart_rate.is_some(),
      resting_heart_rate: aggregate.resting_heart_rate.is_some(),
      hrv: aggregate.hrv_ms.is_some(),
      hr_recovery: aggregate.heart_rate_recovery.is_some() || aggregate.max_workout_heart_rate.is_some(),
      sleep: aggregate.avg_sleep_hours.is_some(),
      blood_oxygen: aggregate.blood_oxygen_pct.is_some(),
      vo2_max: aggregate.vo2_max.is_some(),
      measured_body_composition: prediction.fat_loss_kg.is_measured()
        || prediction.net_weight_change_kg.is_some_and(|n| n.is_measured())
        || prediction.lean_mass_change_kg.is_measured(),
    }
  }

  pub fn has_recovery_signal(&self) -> bool {
    self.sleep || self.resting_heart_rate || self.hrv || self.hr_recovery
  }

  pub fn has_nutrition(&self) -> bool {
    self.dietary_calories || self.protein
  }

  /// Categories the model may use
  pub fn allowed_categories(&self) -> Vec<ActionCategory> {
    ActionCategory::ALL
      .into_iter()
      .filter(|c| match c {
        ActionCategory::Nutrition => self.has_nutrition(),
        ActionCategory::Recovery => self.has_recovery_signal(),
        ActionCategory::Calories => self.active_calories || self.dietary_calories,
        ActionCategory::Cardio | ActionCategory::Strength | ActionCategory::Activity => true,
      })
      .collect()
  }

  /// Whether a period comparison row may be shown
  fn allows_comparison(&self, comparison: &MetricComparison) -> bool {
    comparison.current.is_some()
  }
}

/// ---------------------------------------------------------------------------
/// Prompt Context
/// ---------------------------------------------------------------------------

pub struct PromptContext<'a> {
  pub profile: &'a UserProfile,
  pub window: AnalysisWindow,
  pub analyzed_period: &'a str,
  pub aggregate: &'a MetricAggregate,
  pub prediction: &'a CompositionPrediction,
  pub insights: &'a PatternInsights,
  pub snapshot: &'a MetricsSnapshot,
  pub previous: Option<&'a RecommendationHistoryEntry>,
}

/// A prompt section; lower priority is dropped first
struct Section {
  priority: u8,
  body: String,
}

fn section(priority: u8, title: &str, lines: Vec<String>) -> Option<Section> {
  if lines.is_empty() {
    return None;
  }
  Some(Section {
    priority,
    body: format!("{}:\n{}", title, lines.join("\n")),
  })
}

fn source_tag(measured: bool) -> &'static str {
  if measured {
    "measured"
  } else {
    "estimated"
  }
}

/// ---------------------------------------------------------------------------
/// Sections
/// ---------------------------------------------------------------------------

fn profile_section(ctx: &PromptContext) -> Section {
  let p = ctx.profile;
  let goals = if p.goals.is_empty() {
    "General health".to_string()
  } else {
    p.goals.iter().map(|g| g.label()).collect::<Vec<_>>().join(", ")
  };
  let lines = vec![
    format!("- {} years old, {}", p.age, p.sex.as_str()),
    format!("- Height {:.0} cm, weight {:.1} kg, target {:.1} kg", p.height_cm, p.weight_kg, p.target_weight_kg),
    format!("- Goals (most important first): {}", goals),
    format!("- Analysis window: {} ({})", ctx.window.label(), ctx.analyzed_period),
  ];
  Section {
    priority: 100,
    body: format!("USER PROFILE:\n{}", lines.join("\n")),
  }
}

fn workout_section(ctx: &PromptContext, available: &AvailableMetrics) -> Option<Section> {
  let agg = ctx.aggregate;
  let split = &ctx.prediction.workout_split;
  let mut lines = Vec::new();

  if available.workouts {
    lines.push(format!(
      "- Workouts: {} ({:.1}/week, {:.0} total minutes)",
      agg.workout_count(),
      agg.workouts_per_week(),
      agg.total_workout_minutes()
    ));
    lines.push(format!(
      "- Strength: {} sessions, {:.0} min; cardio: {} sessions, {:.0} min",
      split.strength_count, split.strength_minutes, split.cardio_count, split.cardio_minutes
    ));
  }
  if available.steps {
    if let Some(steps) = agg.per_day(agg.total_steps) {
      lines.push(format!("- Steps: {:.0}/day", steps));
    }
  }
  if available.distance {
    if let Some(km) = agg.total_distance_km {
      lines.push(format!("- Distance: {:.1} km total", km));
    }
  }
  if available.active_calories {
    if let Some(kcal) = agg.per_day(agg.total_active_calories) {
      lines.push(format!("- Active energy: {:.0} kcal/day", kcal));
    }
  }
  section(90, "ACTIVITY", lines)
}

fn composition_section(ctx: &PromptContext, available: &AvailableMetrics) -> Option<Section> {
  let p = ctx.prediction;
  if p.energy_balance.is_none() && !available.measured_body_composition {
    return None;
  }

  let mut lines = vec![
    format!("- Fat loss: {:.2} kg ({})", p.fat_loss_kg.value(), source_tag(p.fat_loss_kg.is_measured())),
    format!(
      "- Muscle gain: {:.2} kg, muscle loss: {:.2} kg ({})",
      p.muscle_gain_kg.value(),
      p.muscle_loss_kg.value(),
      source_tag(p.muscle_gain_kg.is_measured())
    ),
  ];
  if let Some(net) = p.net_weight_change_kg {
    lines.push(format!(
      "- Net weight change: {:+.2} kg ({})",
      net.value(),
      source_tag(net.is_measured())
    ));
  }
  if let Some(bf) = p.body_fat_pct_change {
    lines.push(format!("- Body fat change: {:+.1} percentage points (measured)", bf));
  }
  if let Some(waist) = p.waist_change_cm {
    lines.push(format!("- Waist change: {:+.1} cm (measured)", waist));
  }
  lines.push(format!("- Composition score: {:.0}/100", p.composition_score));
  section(80, "BODY COMPOSITION", lines)
}

fn metabolic_section(ctx: &PromptContext, available: &AvailableMetrics) -> Option<Section> {
  let p = ctx.prediction;
  let agg = ctx.aggregate;
  let mut lines = vec![
    format!("- BMR: {:.0} kcal/day ({})", p.bmr.value(), source_tag(p.bmr.is_measured())),
    format!("- Maintenance: {:.0} kcal/day", p.maintenance_calories),
  ];
  if let Some(balance) = &p.energy_balance {
    let basis = match balance.basis {
      EnergyBasis::Logged => "from logged intake",
      EnergyBasis::Estimated => "estimated",
    };
    lines.push(format!("- Energy balance: {:+.0} kcal/day ({})", balance.daily_difference, basis));
  }
  if available.dietary_calories {
    if let Some(intake) = agg.per_day(agg.total_dietary_calories) {
      lines.push(format!("- Intake: {:.0} kcal/day", intake));
    }
  }
  if available.protein {
    if let Some(grams) = agg.per_day(agg.total_protein_g) {
      lines.push(format!(
        "- Protein: {:.0} g/day ({:.2} g/kg)",
        grams,
        grams / ctx.profile.weight_kg
      ));
    }
  }
  if p.muscle_gain_kg.value() > 0.0 {
    lines.push(format!(
      "- Projected maintenance after muscle gain: {:.0} kcal/day",
      p.new_maintenance_calories
    ));
  }
  section(70, "METABOLISM", lines)
}

fn efficiency_section(ctx: &PromptContext) -> Option<Section> {
  let e = &ctx.insights.efficiency;
  let mut lines = Vec::new();
  if let Some(kpm) = e.workout_kcal_per_min {
    lines.push(format!("- Workout burn rate: {:.1} kcal/min", kpm));
  }
  if let Some(hrr) = &e.hr_recovery_bpm_per_min {
    lines.push(format!(
      "- Heart-rate recovery: {:.1} bpm/min ({})",
      hrr.value(),
      source_tag(hrr.is_measured())
    ));
  }
  if let Some(gain) = e.fitness_gain_rate {
    lines.push(format!("- Cardio fitness per session: {:.2}", gain));
  }
  if let Some(eff) = e.sleep_efficiency_pct {
    lines.push(format!("- Sleep efficiency: {:.0}%", eff));
  }
  if !lines.is_empty() {
    lines.push(format!("- Efficiency score: {:.0}/100", e.overall_score));
  }
  section(40, "EFFICIENCY", lines)
}

fn pattern_section(ctx: &PromptContext, available: &AvailableMetrics) -> Option<Section> {
  let i = ctx.insights;
  let mut lines = Vec::new();

  if !i.heatmap.days.is_empty() {
    lines.push(format!(
      "- Active days: {} of {} (longest active streak {}, longest inactive streak {})",
      i.streaks.active_days,
      i.streaks.active_days + i.streaks.inactive_days,
      i.streaks.longest_active_streak,
      i.streaks.longest_inactive_streak
    ));
    lines.push(format!("- Consistency: {:.0}%", i.heatmap.consistency_score));
  }
  if let Some(best) = i.best_days.first() {
    lines.push(format!("- Strongest day: {} ({:+.0}% vs average)", best.weekday, best.pct_vs_mean));
  }
  if let Some(worst) = i.worst_days.first() {
    lines.push(format!("- Weakest day: {} ({:+.0}% vs average)", worst.weekday, worst.pct_vs_mean));
  }
  if let Some(dominant) = i.time_of_day.dominant {
    lines.push(format!("- Usually trains in the {}", dominant.as_str()));
  }
  // Comparisons exist only when a previous period was fetched
  let has_activity = available.workouts || available.steps || available.active_calories;
  if has_activity && !i.comparisons.is_empty() {
    lines.push(format!("- Activity trend: {}", i.trend.as_str()));
  }
  if let (true, Some(net)) = (i.plateau.is_plateau, i.plateau.net_change_kg) {
    let severity = i.plateau.severity.map_or("mild", |s| s.as_str());
    lines.push(format!(
      "- Weight plateau: {} ({:+.2} kg over the window)",
      severity, net
    ));
    for action in &i.plateau.suggested_actions {
      lines.push(format!("  - {}", action));
    }
  }
  section(50, "PATTERNS", lines)
}

fn recovery_section(ctx: &PromptContext, available: &AvailableMetrics) -> Option<Section> {
  if !available.has_recovery_signal() {
    return None;
  }
  let agg = ctx.aggregate;
  let p = ctx.prediction;
  let mut lines = Vec::new();
  if let Some(sleep) = agg.avg_sleep_hours {
    lines.push(format!("- Sleep: {:.1} h/night", sleep));
  }
  if let Some(rhr) = agg.resting_heart_rate {
    lines.push(format!("- Resting heart rate: {:.0} bpm", rhr));
  }
  if let Some(hrv) = agg.hrv_ms {
    lines.push(format!("- HRV: {:.0} ms", hrv));
  }
  lines.push(format!(
    "- Recovery score: {:.0}/100, overtraining risk {}",
    p.recovery_score,
    p.overtraining_risk.as_str()
  ));
  section(60, "RECOVERY", lines)
}

fn comparison_section(ctx: &PromptContext, available: &AvailableMetrics) -> Option<Section> {
  let mut shown: Vec<&MetricComparison> = ctx
    .insights
    .comparisons
    .iter()
    .filter(|c| available.allows_comparison(c))
    .collect();
  shown.sort_by(|a, b| b.percent_change.abs().total_cmp(&a.percent_change.abs()));
  let lines = shown
    .into_iter()
    .take(TOP_COMPARISONS)
    .map(|c| format!("- {}", c.describe()))
    .collect();
  section(30, "CHANGE VS PREVIOUS PERIOD", lines)
}

fn history_section(ctx: &PromptContext) -> Option<Section> {
  let previous = ctx.previous?;
  let mut lines = vec![format!(
    "- Last generated {} for {}",
    previous.generated_at.format("%b %-d, %Y"),
    previous.analyzed_period
  )];
  for action in &previous.recommendations.actions {
    lines.push(format!("- Previously advised: {}", action.command));
  }
  for delta in ctx.snapshot.delta_lines(&previous.snapshot) {
    lines.push(format!("- {}", delta));
  }
  lines.push("- Acknowledge progress and adjust advice that has not worked".to_string());
  section(65, "SINCE LAST RECOMMENDATIONS", lines)
}

fn format_section(available: &AvailableMetrics) -> Section {
  let categories = available
    .allowed_categories()
    .iter()
    .map(|c| c.as_str().to_uppercase())
    .collect::<Vec<_>>()
    .join(", ");

  let body = format!(
    "INSTRUCTIONS:
Give exactly 4-5 recommendations ranked by expected impact, highest first.
Use only the numbers above. Say \"estimated\" in Why when a number is estimated.
CATEGORY must be one of: {}.
Use this format for every item:

[1] CATEGORY: imperative command
Current: where the user is now
Target: specific measurable target
Impact: expected result
Why: reasoning from the data
Health: optional general-health note",
    categories
  );
  Section {
    priority: 100,
    body,
  }
}

/// ---------------------------------------------------------------------------
/// Assembly
/// ---------------------------------------------------------------------------

pub fn build_prompt(ctx: &PromptContext) -> String {
  let available = AvailableMetrics::detect(ctx.aggregate, ctx.prediction);

  let mut sections: Vec<Section> = vec![profile_section(ctx)];
  sections.extend(
    [
      workout_section(ctx, &available),
      composition_section(ctx, &available),
      metabolic_section(ctx, &available),
      efficiency_section(ctx),
      pattern_section(ctx, &available),
      recovery_section(ctx, &available),
      comparison_section(ctx, &available),
      history_section(ctx),
    ]
    .into_iter()
    .flatten(),
  );
  sections.push(format_section(&available));

  let total = |sections: &[Section]| -> usize {
    sections.iter().map(|s| s.body.chars().count() + 2).sum()
  };

  // Drop the least important optional section until the prompt fits
  while total(&sections) > MAX_PROMPT_CHARS {
    let droppable = sections
      .iter()
      .enumerate()
      .filter(|(_, s)| s.priority < 100)
      .min_by_key(|(_, s)| s.priority)
      .map(|(i, _)| i);
    match droppable {
      Some(i) => {
        sections.remove(i);
      }
      None => break,
    }
  }

  sections
    .into_iter()
    .map(|s| s.body)
    .collect::<Vec<_>>()
    .join("\n\n")
}
