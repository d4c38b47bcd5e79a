//! Plan endpoints: ask the vision model for a cleaning plan and turn its
//! answer into a budgeted task list.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::routes::AppState;
use super::types::*;
use crate::plan::{build_plan, output_text, TimeBudget};
use crate::replicate::{CreatePrediction, PredictionStatus};
use crate::util::request_id;

/// Prompt asking the model for a JSON task array sized to `tier`.
pub fn plan_prompt(tier: &str) -> String {
    let ceiling = TimeBudget::ceiling_for(tier);
    format!(
        r#"Analyze this messy room and create a structured cleaning plan for a {tier} session (about {ceiling} minutes in total).
Return ONLY a JSON array of tasks. Each task must have:
- id: string (unique)
- title: string (short, actionable)
- description: string (detailed instructions)
- estimatedMinutes: number
- priority: "high" | "medium" | "low"
- area: string (e.g. "Desk", "Floor", "Shelves")

Example format:
[
  {{"id": "1", "title": "Clear surface", "description": "Remove clutter from table", "estimatedMinutes": 5, "priority": "high", "area": "Desk"}}
]"#
    )
}

/// Start a plan prediction for a room photo.
pub async fn start_plan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<PredictionCreated>, ApiError> {
    let id = request_id();

    let image = match req.image {
        Some(image) if !image.is_empty() => image,
        _ => return Err(api_error(StatusCode::BAD_REQUEST, "Image is required")),
    };
    let tier = req
        .time_budget
        .unwrap_or_else(|| TimeBudget::default().as_str().to_string());

    let client = state.prediction_client()?;
    tracing::info!("[{}] Plan request | TimeBudget: {}", id, tier);

    let request = CreatePrediction {
        version: state.config.replicate.plan_version.clone(),
        input: json!({
            "image": image,
            "prompt": plan_prompt(&tier),
        }),
    };

    let prediction = client.create_prediction(&request).await.map_err(|e| {
        tracing::error!("[{}] Replicate error: {}", id, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to start analysis")
    })?;

    tracing::info!("[{}] Plan started | PredictionID: {}", id, prediction.id);
    Ok(Json(PredictionCreated {
        prediction_id: prediction.id,
    }))
}

/// Report plan progress; on success, return the budgeted task list.
pub async fn plan_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<PlanStatusResponse>, ApiError> {
    let prediction_id = super::routes::prediction_id(query.id.as_deref())?;
    let client = state.prediction_client()?;

    let prediction = client.get_prediction(prediction_id).await.map_err(|e| {
        tracing::error!("Plan status check for {} failed: {}", prediction_id, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch status")
    })?;

    let tasks = if prediction.status == PredictionStatus::Succeeded {
        let tier = query.budget.as_deref().unwrap_or("");
        let tasks = build_plan(&prediction.output, tier);
        if tasks.is_none() {
            tracing::error!(
                "Failed to parse tasks from vision output for {}. Raw output: {}",
                prediction_id,
                output_text(&prediction.output).unwrap_or_default()
            );
        }
        tasks
    } else {
        None
    };

    Ok(Json(PlanStatusResponse {
        status: prediction.status,
        tasks,
        error: prediction.error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_tier_and_ceiling() {
        let prompt = plan_prompt("15min");
        assert!(prompt.contains("for a 15min session (about 20 minutes in total)"));
        assert!(prompt.contains("Return ONLY a JSON array"));
        assert!(prompt.contains(r#""estimatedMinutes": 5"#));
    }

    #[test]
    fn prompt_tolerates_unknown_tier() {
        assert!(plan_prompt("someday").contains("about 60 minutes"));
    }
}
