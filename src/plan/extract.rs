//! Recover a JSON array from conversational model output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```json").expect("valid fence regex"));

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([\]}])").expect("valid trailing comma regex"));

/// Longest slice of raw output quoted in diagnostics.
const PREVIEW_CHARS: usize = 500;

/// Extract the task array embedded in `text`.
///
/// Tries, in order: the outermost `[...]` span, the same span with trailing
/// commas removed, and finally the outermost `{...}` span as a single
/// record. Returns `None` when nothing parses.
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    let cleaned = strip_fences(text);
    if cleaned.is_empty() {
        return None;
    }

    match (cleaned.find('['), cleaned.rfind(']')) {
        (Some(start), Some(end)) if end > start => {
            if let Some(value) = parse_lenient(&cleaned[start..=end]) {
                return Some(match value {
                    Value::Array(items) => items,
                    other => vec![other],
                });
            }
            tracing::warn!("Array span in model output did not parse, trying object fallback");
        }
        _ => {}
    }

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => {
            if let Some(value) = parse_lenient(&cleaned[start..=end]) {
                return Some(vec![value]);
            }
        }
        _ => {}
    }

    tracing::warn!(
        "No JSON task list found in model output: {}",
        preview(&cleaned)
    );
    None
}

fn strip_fences(text: &str) -> String {
    let without_open = FENCE_OPEN.replace_all(text, "");
    without_open.replace("```", "").trim().to_string()
}

/// Parse `slice`, retrying once with trailing commas removed.
fn parse_lenient(slice: &str) -> Option<Value> {
    match serde_json::from_str(slice) {
        Ok(value) => Some(value),
        Err(first) => {
            let repaired = TRAILING_COMMA.replace_all(slice, "$1");
            match serde_json::from_str(&repaired) {
                Ok(value) => {
                    tracing::debug!("Recovered model JSON after removing trailing commas");
                    Some(value)
                }
                Err(second) => {
                    tracing::debug!(
                        "Model JSON parse failed ({}; after repair: {})",
                        first,
                        second
                    );
                    None
                }
            }
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}
