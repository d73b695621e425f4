use chrono::{Duration, Months, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// ---------------------------------------------------------------------------
/// Analysis Window
/// ---------------------------------------------------------------------------

/// Granularity of an analysis request. The label keys cache and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisWindow {
  Day,
  Week,
  Month,
  SixMonths,
  Year,
}

/// Half-open local wall-clock range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
  pub start: NaiveDateTime,
  pub end: NaiveDateTime,
}

impl DateRange {
  /// Calendar days touched by the range, at least one
  pub fn day_count(&self) -> u32 {
    let secs = (self.end - self.start).num_seconds().max(0) as f64;
    (secs / 86_400.0).ceil().max(1.0) as u32
  }

  pub fn contains(&self, at: NaiveDateTime) -> bool {
    at >= self.start && at < self.end
  }

  /// Human-readable period, e.g. "Mar 1 to Mar 14, 2026 (14 days)"
  pub fn describe(&self) -> String {
    let days = self.day_count();
    let last = if self.end > self.start {
      self.end - Duration::seconds(1)
    } else {
      self.end
    };
    let plural = if days == 1 { "day" } else { "days" };
    if self.start.date() == last.date() {
      format!("{} ({} {})", self.start.format("%b %-d, %Y"), days, plural)
    } else {
      format!(
        "{} to {} ({} {})",
        self.start.format("%b %-d"),
        last.format("%b %-d, %Y"),
        days,
        plural
      )
    }
  }
}

fn shift_back_months(at: NaiveDateTime, months: u32) -> NaiveDateTime {
  // Day-of-month clamps to the shorter month's length
  at.checked_sub_months(Months::new(months))
    .unwrap_or(at - Duration::days(30 * months as i64))
}

impl AnalysisWindow {
  pub const ALL: [AnalysisWindow; 5] = [
    AnalysisWindow::Day,
    AnalysisWindow::Week,
    AnalysisWindow::Month,
    AnalysisWindow::SixMonths,
    AnalysisWindow::Year,
  ];

  pub fn label(&self) -> &'static str {
    match self {
      AnalysisWindow::Day => "day",
      AnalysisWindow::Week => "week",
      AnalysisWindow::Month => "month",
      AnalysisWindow::SixMonths => "6months",
      AnalysisWindow::Year => "year",
    }
  }

  pub fn from_label(label: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|w| w.label() == label)
  }

  /// Range for this window ending at `now`
  pub fn range_ending(&self, now: NaiveDateTime) -> DateRange {
    let start = match self {
      AnalysisWindow::Day => now.date().and_time(NaiveTime::MIN),
      AnalysisWindow::Week => now - Duration::days(7),
      AnalysisWindow::Month => shift_back_months(now, 1),
      AnalysisWindow::SixMonths => shift_back_months(now, 6),
      AnalysisWindow::Year => shift_back_months(now, 12),
    };
    DateRange { start, end: now }
  }

  /// Equivalent prior period for `current`.
  ///
  /// Day: yesterday over the same elapsed duration. Week: seven days back.
  /// Month and longer: calendar-shifted, day-of-month clamped.
  pub fn previous_range(&self, current: &DateRange) -> DateRange {
    match self {
      AnalysisWindow::Day | AnalysisWindow::Week => {
        let back = if *self == AnalysisWindow::Day {
          Duration::days(1)
        } else {
          Duration::days(7)
        };
        DateRange {
          start: current.start - back,
          end: current.end - back,
        }
      }
      AnalysisWindow::Month | AnalysisWindow::SixMonths | AnalysisWindow::Year => {
        let months = match self {
          AnalysisWindow::Month => 1,
          AnalysisWindow::SixMonths => 6,
          _ => 12,
        };
        DateRange {
          start: shift_back_months(current.start, months),
          end: shift_back_months(current.end, months),
        }
      }
    }
  }
}

impl std::fmt::Display for AnalysisWindow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.label())
  }
}
