//! Request gating: shared API key and per-device rate limiting.
//!
//! - Clients send the shared key in `x-klear-api-key`.
//! - When `KLEAR_API_KEY` is not configured every protected route answers
//!   401 (fail closed), unless `DEV_MODE` is on.
//! - Prediction-creating routes are also rate limited per `x-device-id`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::routes::AppState;
use super::types::{api_error, API_KEY_HEADER, DEVICE_ID_HEADER};

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.len() != b_bytes.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for i in 0..a_bytes.len() {
        diff |= a_bytes[i] ^ b_bytes[i];
    }
    diff == 0
}

fn header_str<'a>(req: &'a Request<Body>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|h| h.to_str().ok())
}

pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.auth_required() {
        return next.run(req).await;
    }

    let expected = match state.config.api_key.as_deref() {
        Some(key) => key,
        None => {
            tracing::error!("Rejecting {}: KLEAR_API_KEY not configured", req.uri().path());
            return api_error(StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    let provided = header_str(&req, API_KEY_HEADER).unwrap_or("");
    if provided.is_empty() || !constant_time_eq(provided, expected) {
        tracing::warn!("Rejecting {}: invalid or missing API key", req.uri().path());
        return api_error(StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    next.run(req).await
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let device_id = header_str(&req, DEVICE_ID_HEADER)
        .filter(|id| !id.is_empty())
        .unwrap_or("unknown")
        .to_string();

    let limits = &state.config.rate_limit;
    let allowed = state
        .rate_limiter
        .increment_and_check(&device_id, limits.window, limits.max_requests)
        .await;

    if !allowed {
        tracing::warn!("Rate limit exceeded for device {}", device_id);
        return api_error(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Please try again later.",
        )
        .into_response();
    }

    next.run(req).await
}
