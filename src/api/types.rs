//! API request and response types.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::{Task, TimeBudget};
use crate::replicate::PredictionStatus;

/// Header carrying the shared client key.
pub const API_KEY_HEADER: &str = "x-klear-api-key";

/// Header identifying the calling device for rate limiting.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error half of a handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Request to start an inpainting prediction.
#[derive(Debug, Clone, Deserialize)]
pub struct InpaintRequest {
    /// Room photo (data URL or base64)
    #[serde(default)]
    pub image: Option<String>,

    /// Clutter mask, white where objects should be removed
    #[serde(default)]
    pub mask: Option<String>,

    /// How far the model may depart from the original (0.0 - 1.0)
    #[serde(default = "default_strength")]
    pub strength: f64,

    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
}

fn default_strength() -> f64 {
    0.85
}

fn default_guidance_scale() -> f64 {
    7.5
}

/// Request to start a plan prediction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    #[serde(default)]
    pub image: Option<String>,

    /// Budget tier name (`15min`, `1hr`, `weekend`)
    #[serde(default)]
    pub time_budget: Option<String>,
}

/// Response after starting a prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionCreated {
    pub prediction_id: String,
}

/// Query for the status endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusQuery {
    pub id: Option<String>,

    /// Budget tier applied to plan output
    #[serde(default, alias = "timeBudget")]
    pub budget: Option<String>,
}

/// Inpainting progress, with the upstream output passed through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InpaintStatusResponse {
    pub status: PredictionStatus,
    pub output: Value,
    pub error: Option<String>,
}

/// Plan progress. `tasks` is null until the prediction succeeds, and stays
/// null if no plan could be recovered from the model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStatusResponse {
    pub status: PredictionStatus,
    pub tasks: Option<Vec<Task>>,
    pub error: Option<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub auth_required: bool,
    pub replicate_configured: bool,
}

/// A selectable time budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetInfo {
    pub id: TimeBudget,
    pub label: String,
    pub description: String,
    pub icon: String,
    pub ceiling_minutes: i64,
    pub max_tasks: usize,
}

impl From<TimeBudget> for BudgetInfo {
    fn from(budget: TimeBudget) -> Self {
        Self {
            id: budget,
            label: budget.label().to_string(),
            description: budget.description().to_string(),
            icon: budget.icon().to_string(),
            ceiling_minutes: budget.ceiling_minutes(),
            max_tasks: budget.max_tasks(),
        }
    }
}
