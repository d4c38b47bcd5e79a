//! Cleaning plan generation.
//!
//! The vision model is asked to "return only JSON", but what comes back is
//! conversational text. This module turns that text into a plan:
//!
//! ```text
//!   raw output ──► extract ──► sanitize ──► enforce budget ──► Vec<Task>
//!   (string or      (JSON       (strictly     (greedy,
//!    chunks)         array)      typed)        priority-first)
//! ```
//!
//! Every step is a pure function over locally owned data. A failure at the
//! extraction step yields `None` ("no plan this round"), never an error.

mod budget;
mod extract;
mod fallback;
mod sanitize;

pub use budget::{enforce_budget, TimeBudget, UnknownTier, DEFAULT_CEILING_MINUTES};
pub use extract::extract_json_array;
pub use fallback::fallback_plan;
pub use sanitize::{
    sanitize_tasks, DEFAULT_AREA, DEFAULT_MINUTES, DEFAULT_TITLE, MAX_TASK_MINUTES,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::util::format_minutes;

/// Urgency of a task. Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Parse a model-supplied priority. Anything unrecognised is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    /// Sort rank, higher is more urgent.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 2,
            Priority::Medium => 1,
            Priority::Low => 0,
        }
    }
}

/// Progress state of a task. Only clients move a task past `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
}

/// A single unit of cleaning work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub estimated_minutes: i64,
    pub priority: Priority,
    pub area: String,
    pub status: TaskStatus,
    pub completed: bool,
}

impl Task {
    /// Create a pending task.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        estimated_minutes: i64,
        priority: Priority,
        area: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            estimated_minutes,
            priority,
            area: area.into(),
            status: TaskStatus::Pending,
            completed: false,
        }
    }
}

/// Concatenate the text of a prediction's `output`.
///
/// Language models on Replicate stream their output as an array of string
/// chunks; some return a single string. Non-string chunks are skipped.
pub fn output_text(output: &Value) -> Option<String> {
    match output {
        Value::String(s) => Some(s.clone()),
        Value::Array(chunks) => Some(
            chunks
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .concat(),
        ),
        _ => None,
    }
}

/// Run the whole pipeline over a prediction's output.
///
/// Returns `None` when no JSON could be recovered from the text.
pub fn build_plan(output: &Value, tier: &str) -> Option<Vec<Task>> {
    let text = output_text(output)?;
    let extracted = extract_json_array(&text)?;
    let tasks = sanitize_tasks(&Value::Array(extracted));
    let budget = TimeBudget::ceiling_for(tier);
    let selected = enforce_budget(&tasks, budget);
    tracing::debug!(
        "Built plan: {} extracted, {} within {} minute budget",
        tasks.len(),
        selected.len(),
        budget
    );
    Some(selected)
}

/// A plan as presented to the user and stored on the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningPlan {
    pub id: Uuid,
    pub time_budget: TimeBudget,
    pub tasks: Vec<Task>,
    pub total_estimated_minutes: i64,
    pub created_at: DateTime<Utc>,
}

impl CleaningPlan {
    pub fn new(time_budget: TimeBudget, tasks: Vec<Task>) -> Self {
        let total_estimated_minutes = tasks
            .iter()
            .fold(0i64, |total, t| total.saturating_add(t.estimated_minutes));
        Self {
            id: Uuid::new_v4(),
            time_budget,
            tasks,
            total_estimated_minutes,
            created_at: Utc::now(),
        }
    }

    /// `(completed, total)` task counts.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.tasks.iter().filter(|t| t.completed).count();
        (done, self.tasks.len())
    }

    /// Plain-text summary suitable for the share sheet.
    pub fn share_summary(&self) -> String {
        let (done, total) = self.progress();
        let mut out = String::from("My Klear Cleaning Plan\n\n");
        out.push_str(&format!("Progress: {}/{} tasks done\n", done, total));
        out.push_str(&format!(
            "Estimated time: {}\n\nTasks:\n",
            format_minutes(self.total_estimated_minutes)
        ));
        for task in &self.tasks {
            let mark = if task.completed { "[x]" } else { "[ ]" };
            out.push_str(&format!("{} {}\n", mark, task.title));
        }
        out
    }
}
