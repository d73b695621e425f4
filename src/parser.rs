//! Recommendation response parser
//!
//! Line-oriented and tolerant of the formatting drift language models
//! produce: bracketed (`[1]`), numbered (`1.` / `1)`) and `Recommendation 1:`
//! headers, markdown emphasis, and a handful of field label spellings.
//! Producing zero items is a failure, never an empty success.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::models::recommendation::{ActionCategory, CoachAction};

/// The model is asked for 4-5 items; anything past this is dropped
pub const MAX_ACTIONS: usize = 5;

/// Labeled fields an item needs to be kept
const MIN_LABELED_FIELDS: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParseFailure {
  #[error("response was empty")]
  EmptyResponse,

  #[error("no recommendation headers found")]
  NoHeaders,

  #[error("no well-formed recommendations ({discarded} discarded)")]
  NoValidItems { discarded: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
  Parsed(Vec<CoachAction>),
  Failed(ParseFailure),
}

impl ParseOutcome {
  pub fn into_result(self) -> Result<Vec<CoachAction>, ParseFailure> {
    match self {
      ParseOutcome::Parsed(actions) => Ok(actions),
      ParseOutcome::Failed(reason) => Err(reason),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Line Classification
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Current,
  Target,
  Impact,
  Why,
  Health,
  Note,
  Category,
  Command,
}

impl Field {
  fn from_label(label: &str) -> Option<Self> {
    match label.trim().to_lowercase().as_str() {
      "current" | "current state" | "now" => Some(Field::Current),
      "target" | "target state" | "goal" => Some(Field::Target),
      "impact" | "expected impact" | "expected result" => Some(Field::Impact),
      "why" | "rationale" | "reason" => Some(Field::Why),
      "health" | "health note" => Some(Field::Health),
      "note" => Some(Field::Note),
      "category" | "type" => Some(Field::Category),
      "action" | "command" => Some(Field::Command),
      _ => None,
    }
  }
}

/// Strip markdown emphasis, heading marks and list bullets
fn clean_line(line: &str) -> String {
  let without_bold = line.replace("**", "").replace("__", "");
  without_bold
    .trim()
    .trim_start_matches('#')
    .trim_start_matches(['-', '*', '•'])
    .trim()
    .to_string()
}

fn leading_number(s: &str) -> Option<(u32, &str)> {
  let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
  if digits == 0 || digits > 2 {
    return None;
  }
  let n = s[..digits].parse().ok()?;
  Some((n, &s[digits..]))
}

/// Index and remaining text of a header line
fn parse_header(line: &str) -> Option<(u32, String)> {
  // [1] ...
  if let Some(rest) = line.strip_prefix('[') {
    let (n, rest) = leading_number(rest)?;
    let rest = rest.strip_prefix(']')?;
    return Some((n, rest.trim().to_string()));
  }

  // Recommendation 1: ...
  const PREFIX: &str = "recommendation ";
  if line
    .get(..PREFIX.len())
    .is_some_and(|p| p.eq_ignore_ascii_case(PREFIX))
  {
    let (n, rest) = leading_number(&line[PREFIX.len()..])?;
    let rest = rest.trim_start_matches([':', '.', '-', ')']).trim();
    return Some((n, rest.to_string()));
  }

  // 1. ... or 1) ...
  let (n, rest) = leading_number(line)?;
  let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
  if !rest.starts_with(' ') {
    return None;
  }
  Some((n, rest.trim().to_string()))
}

/// `Label: value` where the label is one we know
fn parse_field(line: &str) -> Option<(Field, String)> {
  let (label, value) = line.split_once(':')?;
  let field = Field::from_label(label)?;
  Some((field, value.trim().to_string()))
}

/// Split "CATEGORY: command" when the prefix is a known category
fn split_category(text: &str) -> (Option<ActionCategory>, String) {
  if let Some((prefix, rest)) = text.split_once(':') {
    if let Ok(category) = prefix.trim().parse::<ActionCategory>() {
      return (Some(category), rest.trim().to_string());
    }
  }
  (None, text.trim().to_string())
}

/// Keyword fallback when no category was given
fn infer_category(text: &str) -> ActionCategory {
  let lower = text.to_lowercase();
  let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

  if has(&["protein", "meal", "nutrition", "diet", "fiber", "eat "]) {
    ActionCategory::Nutrition
  } else if has(&["calorie", "kcal", "deficit", "surplus", "intake"]) {
    ActionCategory::Calories
  } else if has(&["strength", "lift", "resistance", "weights", "squat"]) {
    ActionCategory::Strength
  } else if has(&["cardio", "run", "cycl", "swim", "row", "hiit", "interval", "zone 2"]) {
    ActionCategory::Cardio
  } else if has(&["sleep", "rest day", "recovery", "hrv", "recover"]) {
    ActionCategory::Recovery
  } else {
    ActionCategory::Activity
  }
}

/// ---------------------------------------------------------------------------
/// Item Assembly
/// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RawItem {
  header_category: Option<ActionCategory>,
  field_category: Option<ActionCategory>,
  command: String,
  current: Option<String>,
  target: Option<String>,
  impact: Option<String>,
  why: Option<String>,
  health: Option<String>,
  note: Option<String>,
  last_field: Option<Field>,
}

impl RawItem {
  fn from_header(rest: &str) -> Self {
    let (category, command) = split_category(rest);
    Self {
      header_category: category,
      command,
      ..Default::default()
    }
  }

  fn slot(&mut self, field: Field) -> Option<&mut Option<String>> {
    match field {
      Field::Current => Some(&mut self.current),
      Field::Target => Some(&mut self.target),
      Field::Impact => Some(&mut self.impact),
      Field::Why => Some(&mut self.why),
      Field::Health => Some(&mut self.health),
      Field::Note => Some(&mut self.note),
      Field::Category | Field::Command => None,
    }
  }

  fn set(&mut self, field: Field, value: String) {
    match field {
      Field::Category => self.field_category = value.parse().ok(),
      Field::Command => {
        if self.command.is_empty() {
          let (category, command) = split_category(&value);
          self.header_category = self.header_category.or(category);
          self.command = command;
        }
      }
      _ => {
        if let Some(slot) = self.slot(field) {
          *slot = Some(value);
        }
      }
    }
    self.last_field = Some(field);
  }

  /// Unlabeled line inside an item wraps onto the previous field
  fn continue_line(&mut self, text: &str) {
    match self.last_field {
      Some(field) => {
        if let Some(Some(existing)) = self.slot(field) {
          existing.push(' ');
          existing.push_str(text);
        }
      }
      None if self.command.is_empty() => self.command = text.to_string(),
      None => {
        self.command.push(' ');
        self.command.push_str(text);
      }
    }
  }

  fn labeled_fields(&self) -> usize {
    [
      &self.current,
      &self.target,
      &self.impact,
      &self.why,
      &self.health,
      &self.note,
    ]
    .iter()
    .filter(|f| f.as_ref().is_some_and(|v| !v.is_empty()))
    .count()
  }

  fn into_action(self, priority: u8) -> Option<CoachAction> {
    if self.command.is_empty() || self.labeled_fields() < MIN_LABELED_FIELDS {
      return None;
    }

    let all_text = [
      Some(&self.command),
      self.current.as_ref(),
      self.target.as_ref(),
      self.impact.as_ref(),
      self.why.as_ref(),
      self.health.as_ref(),
      self.note.as_ref(),
    ]
    .into_iter()
    .flatten()
    .map(|s| s.as_str())
    .collect::<Vec<_>>()
    .join(" ");
    let is_estimated = all_text.to_lowercase().contains("estimat");

    let category = self
      .header_category
      .or(self.field_category)
      .unwrap_or_else(|| infer_category(&format!("{} {}", self.command, self.why.as_deref().unwrap_or(""))));

    let health_note = match (self.health, self.note) {
      (Some(h), Some(n)) => Some(format!("{} {}", h, n)),
      (h, n) => h.or(n),
    }
    .filter(|s| !s.is_empty());

    Some(CoachAction {
      priority,
      category,
      command: self.command,
      current_state: self.current.unwrap_or_default(),
      target_state: self.target.unwrap_or_default(),
      expected_impact: self.impact.unwrap_or_default(),
      rationale: self.why.unwrap_or_default(),
      health_note,
      is_estimated,
    })
  }
}

/// ---------------------------------------------------------------------------
/// Entry Point
/// ---------------------------------------------------------------------------

pub fn parse_recommendations(text: &str) -> ParseOutcome {
  if text.trim().is_empty() {
    return ParseOutcome::Failed(ParseFailure::EmptyResponse);
  }

  let mut items: Vec<RawItem> = Vec::new();
  for raw in text.lines() {
    let line = clean_line(raw);
    if line.is_empty() {
      continue;
    }
    if let Some((_, rest)) = parse_header(&line) {
      items.push(RawItem::from_header(&rest));
      continue;
    }
    // Preamble before the first header is ignored
    let Some(current) = items.last_mut() else {
      continue;
    };
    match parse_field(&line) {
      Some((field, value)) => current.set(field, value),
      None => current.continue_line(&line),
    }
  }

  if items.is_empty() {
    return ParseOutcome::Failed(ParseFailure::NoHeaders);
  }

  let total = items.len();
  let actions: Vec<CoachAction> = items
    .into_iter()
    .filter_map(|item| item.into_action(0))
    .take(MAX_ACTIONS)
    .enumerate()
    .map(|(i, mut action)| {
      action.priority = (i + 1) as u8;
      action
    })
    .collect();

  debug!(headers = total, parsed = actions.len(), "Parsed model response");

  if actions.is_empty() {
    return ParseOutcome::Failed(ParseFailure::NoValidItems { discarded: total });
  }
  ParseOutcome::Parsed(actions)
}
