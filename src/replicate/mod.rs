//! Replicate predictions API.
//!
//! Both the inpainting model and the vision-language model run as
//! asynchronous "predictions": a create call returns an id immediately and
//! the caller polls until the prediction reaches a terminal status.

mod client;
mod error;

pub use client::ReplicateClient;
pub use error::{ReplicateError, RetryPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded | PredictionStatus::Failed | PredictionStatus::Canceled
        )
    }
}

/// A prediction as returned by Replicate (fields we use).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    /// String, array of strings (URLs or text chunks), or null
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// Input for a new prediction.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePrediction {
    pub version: String,
    pub input: Value,
}

/// Anything that can run predictions.
#[async_trait]
pub trait PredictionClient: Send + Sync {
    /// Start a prediction and return it in its initial state.
    async fn create_prediction(&self, request: &CreatePrediction)
        -> Result<Prediction, ReplicateError>;

    /// Fetch the current state of a prediction.
    async fn get_prediction(&self, id: &str) -> Result<Prediction, ReplicateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_parses_streamed_output() {
        let body = r#"{
            "id": "abc123",
            "status": "succeeded",
            "output": ["[{\"title\":", " \"Dust\"}]"],
            "error": null,
            "metrics": {"predict_time": 4.2}
        }"#;
        let prediction: Prediction = serde_json::from_str(body).unwrap();
        assert_eq!(prediction.id, "abc123");
        assert_eq!(prediction.status, PredictionStatus::Succeeded);
        assert!(prediction.output.is_array());
        assert!(prediction.error.is_none());
    }

    #[test]
    fn starting_prediction_has_null_output() {
        let prediction: Prediction =
            serde_json::from_str(r#"{"id": "x", "status": "starting"}"#).unwrap();
        assert!(prediction.output.is_null());
        assert!(!prediction.status.is_terminal());
        assert!(PredictionStatus::Canceled.is_terminal());
    }
}
