//! Failures talking to Replicate, and which of them are worth retrying.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// First retry delay when Replicate gives no `Retry-After`.
const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Throttling clears slower than a flaky gateway does.
const THROTTLE_BACKOFF: Duration = Duration::from_secs(5);

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Longest upstream body kept in an error message.
const MAX_DETAIL_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum ReplicateError {
    /// HTTP 429.
    #[error("throttled by Replicate: {detail}")]
    Throttled {
        detail: String,
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx.
    #[error("Replicate unavailable (HTTP {status}): {detail}")]
    Unavailable { status: u16, detail: String },

    /// Bad token, unknown model version, invalid input, missing prediction.
    #[error("Replicate rejected the request (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("could not reach Replicate: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected prediction payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Replicate's problem body, e.g. `{"title": "Invalid version", "detail": "..."}`.
#[derive(Deserialize)]
struct Problem {
    title: Option<String>,
    detail: Option<String>,
}

fn problem_detail(body: &str) -> String {
    if let Ok(problem) = serde_json::from_str::<Problem>(body) {
        if let Some(text) = problem.detail.or(problem.title) {
            return text;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no details".to_string()
    } else {
        trimmed.chars().take(MAX_DETAIL_CHARS).collect()
    }
}

impl ReplicateError {
    /// Map a non-success response onto an error.
    pub fn from_response(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let detail = problem_detail(body);
        match status {
            429 => ReplicateError::Throttled {
                detail,
                retry_after,
            },
            500..=599 => ReplicateError::Unavailable { status, detail },
            _ => ReplicateError::Rejected { status, detail },
        }
    }

    /// Human-readable reason, without the classification prefix.
    pub fn detail(&self) -> String {
        match self {
            ReplicateError::Throttled { detail, .. }
            | ReplicateError::Unavailable { detail, .. }
            | ReplicateError::Rejected { detail, .. } => detail.clone(),
            ReplicateError::Transport(e) => e.to_string(),
            ReplicateError::Payload(e) => e.to_string(),
        }
    }

    /// Whether the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReplicateError::Throttled { .. }
                | ReplicateError::Unavailable { .. }
                | ReplicateError::Transport(_)
        )
    }

    /// Delay before retry number `attempt` (0-based). `Retry-After` wins;
    /// otherwise the delay doubles per attempt up to 30 seconds.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = match self {
            ReplicateError::Throttled {
                retry_after: Some(delay),
                ..
            } => return *delay,
            ReplicateError::Throttled { .. } => THROTTLE_BACKOFF,
            _ => BASE_BACKOFF,
        };
        base.saturating_mul(1u32 << attempt.min(5)).min(MAX_BACKOFF)
    }
}

/// Bounds on retrying one Replicate call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Total time budget across all attempts
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, error: &ReplicateError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient()
    }
}
