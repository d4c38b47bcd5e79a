//! HTTP routing, shared state and server startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::mask::MAX_IMAGE_BYTES;
use crate::plan::TimeBudget;
use crate::rate_limit::{InMemoryRateLimitStore, RateLimitStore};
use crate::replicate::{PredictionClient, ReplicateClient};

use super::auth;
use super::inpaint;
use super::plan;
use super::types::*;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Replicate client; `None` when no token is configured
    pub predictions: Option<Arc<dyn PredictionClient>>,
    /// Per-device request counters
    pub rate_limiter: Arc<dyn RateLimitStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        predictions: Option<Arc<dyn PredictionClient>>,
        rate_limiter: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self {
            config,
            predictions,
            rate_limiter,
        }
    }

    /// The Replicate client, or the error returned when none is configured.
    pub fn prediction_client(&self) -> Result<Arc<dyn PredictionClient>, ApiError> {
        self.predictions.clone().ok_or_else(|| {
            tracing::error!("Replicate API key not configured");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Replicate API key not configured",
            )
        })
    }
}

/// Validate a prediction id taken from the query string.
///
/// Replicate ids are lowercase alphanumeric; anything else would end up in
/// the upstream URL path.
pub fn prediction_id(raw: Option<&str>) -> Result<&str, ApiError> {
    match raw.map(str::trim) {
        Some(id) if !id.is_empty() => {
            if id.chars().all(|c| c.is_ascii_alphanumeric()) {
                Ok(id)
            } else {
                Err(api_error(StatusCode::BAD_REQUEST, "Invalid prediction ID"))
            }
        }
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Prediction ID is required",
        )),
    }
}

/// Two base64-encoded images plus JSON framing.
const REQUEST_BODY_LIMIT: usize = 3 * MAX_IMAGE_BYTES;

/// Build the router for the given state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/api/health", get(health));

    // Only prediction-creating calls count against the device quota; status
    // polling would exhaust it within seconds.
    let creation_routes = Router::new()
        .route("/api/inpaint", post(inpaint::start_inpainting))
        .route("/api/plan", post(plan::start_plan))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::rate_limit,
        ));

    let protected_routes = Router::new()
        .merge(creation_routes)
        .route("/api/inpaint/status", get(inpaint::inpaint_status))
        .route("/api/plan/status", get(plan::plan_status))
        .route("/api/budgets", get(list_budgets))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_api_key,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(REQUEST_BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let predictions: Option<Arc<dyn PredictionClient>> =
        match config.replicate.api_token.as_deref() {
            Some(token) => Some(Arc::new(ReplicateClient::new(
                config.replicate.api_url.clone(),
                token,
            ))),
            None => {
                tracing::warn!("REPLICATE_API_TOKEN not set; AI endpoints will return 500");
                None
            }
        };

    if config.api_key.is_none() && config.auth_required() {
        tracing::warn!("KLEAR_API_KEY not set; all protected endpoints will return 401");
    }

    let rate_limiter = Arc::new(InMemoryRateLimitStore::new());
    Arc::clone(&rate_limiter).start_cleanup_task(Duration::from_secs(10 * 60));

    let state = Arc::new(AppState::new(config.clone(), predictions, rate_limiter));
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGTERM/SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        auth_required: state.config.auth_required(),
        replicate_configured: state.predictions.is_some(),
    })
}

/// List the selectable time budgets.
async fn list_budgets() -> Json<Vec<BudgetInfo>> {
    Json(TimeBudget::ALL.into_iter().map(BudgetInfo::from).collect())
}
