//! Coerce loosely shaped model output into well-formed tasks.

use serde_json::{Map, Value};

use super::{Priority, Task};

pub const DEFAULT_TITLE: &str = "Untitled task";
pub const DEFAULT_AREA: &str = "General";
pub const DEFAULT_MINUTES: i64 = 5;

/// Largest estimate, in either direction, taken from the model. Anything
/// beyond a day is noise and falls back to [`DEFAULT_MINUTES`].
pub const MAX_TASK_MINUTES: i64 = 24 * 60;

/// Convert arbitrary JSON into tasks, defaulting every missing or mistyped
/// field. A non-array input is treated as a single entry; `null` entries are
/// dropped. Never fails.
pub fn sanitize_tasks(input: &Value) -> Vec<Task> {
    let entries: Vec<&Value> = match input {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    entries
        .into_iter()
        .filter(|entry| !entry.is_null())
        .enumerate()
        .map(|(index, entry)| sanitize_entry(entry, index + 1))
        .collect()
}

fn sanitize_entry(entry: &Value, position: usize) -> Task {
    match entry {
        Value::Object(record) => from_record(record, position),
        other => Task::new(
            position.to_string(),
            scalar_title(other),
            "",
            DEFAULT_MINUTES,
            Priority::default(),
            DEFAULT_AREA,
        ),
    }
}

fn from_record(record: &Map<String, Value>, position: usize) -> Task {
    let id = match record.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        _ => position.to_string(),
    };

    let title = non_empty_str(record.get("title")).unwrap_or(DEFAULT_TITLE);
    let description = record
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("");
    let area = non_empty_str(record.get("area")).unwrap_or(DEFAULT_AREA);

    let priority = record
        .get("priority")
        .and_then(Value::as_str)
        .and_then(Priority::parse)
        .unwrap_or_default();

    let minutes = record
        .get("estimatedMinutes")
        .and_then(parse_minutes)
        .unwrap_or(DEFAULT_MINUTES);

    Task::new(id, title, description, minutes, priority, area)
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Read a duration in minutes. Zero, non-numeric and out-of-range values
/// are `None`. A non-zero fraction never rounds down to zero.
fn parse_minutes(value: &Value) -> Option<i64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if raw == 0.0 || !raw.is_finite() || raw.abs() > MAX_TASK_MINUTES as f64 {
        return None;
    }
    let minutes = raw.round() as i64;
    Some(if minutes == 0 { raw.signum() as i64 } else { minutes })
}

fn scalar_title(value: &Value) -> String {
    match value {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::String(_) => DEFAULT_TITLE.to_string(),
        other => other.to_string(),
    }
}
