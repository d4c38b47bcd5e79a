//! Time budgets and greedy plan trimming.
//!
//! # Policy
//! Tasks are visited in priority order (stable, so the model's ordering
//! breaks ties) and taken first-fit while the running total stays within
//! the ceiling. A task that does not fit is skipped for good, even if a
//! later shorter task would have filled the gap better.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Task;

/// Ceiling used for an unrecognised tier name.
pub const DEFAULT_CEILING_MINUTES: i64 = 60;

/// How much time the user has for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBudget {
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[default]
    #[serde(rename = "1hr")]
    OneHour,
    #[serde(rename = "weekend")]
    Weekend,
}

impl TimeBudget {
    pub const ALL: [TimeBudget; 3] = [
        TimeBudget::FifteenMinutes,
        TimeBudget::OneHour,
        TimeBudget::Weekend,
    ];

    pub fn parse(tier: &str) -> Option<Self> {
        match tier {
            "15min" => Some(TimeBudget::FifteenMinutes),
            "1hr" => Some(TimeBudget::OneHour),
            "weekend" => Some(TimeBudget::Weekend),
            _ => None,
        }
    }

    /// Wire name of the tier.
    pub fn as_str(self) -> &'static str {
        match self {
            TimeBudget::FifteenMinutes => "15min",
            TimeBudget::OneHour => "1hr",
            TimeBudget::Weekend => "weekend",
        }
    }

    /// Total minutes a plan for this tier may take.
    pub fn ceiling_minutes(self) -> i64 {
        match self {
            TimeBudget::FifteenMinutes => 20,
            TimeBudget::OneHour => 75,
            TimeBudget::Weekend => 240,
        }
    }

    /// Resolve a tier name to its ceiling, tolerating unknown names.
    pub fn ceiling_for(tier: &str) -> i64 {
        Self::parse(tier)
            .map(Self::ceiling_minutes)
            .unwrap_or(DEFAULT_CEILING_MINUTES)
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeBudget::FifteenMinutes => "15 Minutes",
            TimeBudget::OneHour => "1 Hour",
            TimeBudget::Weekend => "Weekend",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TimeBudget::FifteenMinutes => "Quick wins only",
            TimeBudget::OneHour => "Solid progress",
            TimeBudget::Weekend => "Deep clean",
        }
    }

    /// Emoji shown next to the tier in pickers.
    pub fn icon(self) -> &'static str {
        match self {
            TimeBudget::FifteenMinutes => "⚡",
            TimeBudget::OneHour => "🎯",
            TimeBudget::Weekend => "🏠",
        }
    }

    /// Length of the offline default plan for this tier.
    pub fn max_tasks(self) -> usize {
        match self {
            TimeBudget::FifteenMinutes => 3,
            TimeBudget::OneHour => 8,
            TimeBudget::Weekend => 20,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown tier '{0}', expected one of: 15min, 1hr, weekend")]
pub struct UnknownTier(pub String);

/// Strict parse for callers that must not fall back to the default ceiling.
impl FromStr for TimeBudget {
    type Err = UnknownTier;

    fn from_str(tier: &str) -> Result<Self, Self::Err> {
        Self::parse(tier).ok_or_else(|| UnknownTier(tier.to_string()))
    }
}

impl fmt::Display for TimeBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Select the priority-ordered subset of `tasks` that fits in
/// `ceiling_minutes`.
///
/// If nothing fits but `tasks` is non-empty, the most urgent task is
/// returned on its own so a plan is never empty when work exists.
pub fn enforce_budget(tasks: &[Task], ceiling_minutes: i64) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    sorted.sort_by_key(|task| Reverse(task.priority.rank()));

    let mut total = 0i64;
    let mut selected = Vec::with_capacity(sorted.len());
    for task in &sorted {
        let next = total.saturating_add(task.estimated_minutes);
        if next <= ceiling_minutes {
            total = next;
            selected.push(task.clone());
        }
    }

    if selected.is_empty() {
        if let Some(first) = sorted.into_iter().next() {
            tracing::debug!(
                "No task fits in {} minutes, keeping '{}' ({} min)",
                ceiling_minutes,
                first.title,
                first.estimated_minutes
            );
            selected.push(first);
        }
    }

    selected
}
