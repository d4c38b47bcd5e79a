//! Inpainting endpoints: start a "cleaned room" render and poll for it.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::routes::AppState;
use super::types::*;
use crate::mask::{dilate_mask, png_data_url, ImagePayload};
use crate::replicate::CreatePrediction;
use crate::util::request_id;

pub const INPAINTING_PROMPT: &str = "A clean, organized, and tidy version of this room. Remove clutter, organize items neatly, clear surfaces. Photorealistic, same lighting and perspective.";

pub const NEGATIVE_PROMPT: &str = "cluttered, messy, dirty, disorganized, blurry, distorted";

const INFERENCE_STEPS: u32 = 30;

/// Validate the image/mask pair and return the dilated mask as a data URL.
fn prepare_mask(id: &str, image: &str, mask: &str) -> Result<String, ApiError> {
    let bad_request = |e: crate::mask::MaskError| {
        tracing::warn!("[{}] Rejected inpaint input: {}", id, e);
        api_error(StatusCode::BAD_REQUEST, e.to_string())
    };

    let image_payload = ImagePayload::from_data_url(image).map_err(bad_request)?;
    let mask_payload = ImagePayload::from_data_url(mask).map_err(bad_request)?;
    let (image_w, image_h) = image_payload.dimensions().map_err(bad_request)?;
    let (mask_w, mask_h) = mask_payload.dimensions().map_err(bad_request)?;

    tracing::info!(
        "[{}] Inpaint request | Img: {}x{} {} ({}b) | Mask: {}x{} ({}b)",
        id,
        image_w,
        image_h,
        image_payload.mime.as_deref().unwrap_or("raw base64"),
        image.len(),
        mask_w,
        mask_h,
        mask.len()
    );

    if (image_w, image_h) != (mask_w, mask_h) {
        tracing::error!(
            "[{}] Dimension mismatch: Img {}x{} vs Mask {}x{}",
            id,
            image_w,
            image_h,
            mask_w,
            mask_h
        );
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Image and mask dimensions must match exactly",
        ));
    }

    let png = dilate_mask(&mask_payload).map_err(|e| {
        tracing::error!("[{}] Mask dilation failed: {}", id, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    })?;
    Ok(png_data_url(&png))
}

/// Start an inpainting prediction.
pub async fn start_inpainting(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InpaintRequest>,
) -> Result<Json<PredictionCreated>, ApiError> {
    let id = request_id();
    let started = Instant::now();

    let (image, mask) = match (req.image, req.mask) {
        (Some(image), Some(mask)) if !image.is_empty() && !mask.is_empty() => (image, mask),
        _ => {
            tracing::warn!("[{}] Missing image or mask", id);
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Image and mask are required",
            ));
        }
    };

    // Decoding and dilation are CPU-bound.
    let prepared = {
        let id = id.clone();
        let image = image.clone();
        tokio::task::spawn_blocking(move || prepare_mask(&id, &image, &mask)).await
    };
    let mask_url = match prepared {
        Ok(result) => result?,
        Err(e) => {
            tracing::error!("[{}] Mask preparation task failed: {}", id, e);
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ));
        }
    };

    let client = state.prediction_client()?;
    let request = CreatePrediction {
        version: state.config.replicate.inpaint_version.clone(),
        input: json!({
            "image": image,
            "mask": mask_url,
            "prompt": INPAINTING_PROMPT,
            "negative_prompt": NEGATIVE_PROMPT,
            "num_inference_steps": INFERENCE_STEPS,
            "guidance_scale": req.guidance_scale,
            "strength": req.strength,
        }),
    };

    tracing::info!(
        "[{}] Strength: {} | Guidance: {}",
        id,
        req.strength,
        req.guidance_scale
    );

    match client.create_prediction(&request).await {
        Ok(prediction) => {
            tracing::info!(
                "[{}] Inpaint started | PredictionID: {} | Duration: {:?}",
                id,
                prediction.id,
                started.elapsed()
            );
            Ok(Json(PredictionCreated {
                prediction_id: prediction.id,
            }))
        }
        Err(e) => {
            tracing::error!(
                "[{}] Replicate error after {:?}: {}",
                id,
                started.elapsed(),
                e
            );
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Inpainting failed: {}", e.detail()),
            ))
        }
    }
}

/// Report the status of an inpainting prediction.
pub async fn inpaint_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<InpaintStatusResponse>, ApiError> {
    let prediction_id = super::routes::prediction_id(query.id.as_deref())?;
    let client = state.prediction_client()?;

    let prediction = client.get_prediction(prediction_id).await.map_err(|e| {
        tracing::error!("Inpaint status check for {} failed: {}", prediction_id, e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch prediction status",
        )
    })?;

    Ok(Json(InpaintStatusResponse {
        status: prediction.status,
        output: prediction.output,
        error: prediction.error,
    }))
}
