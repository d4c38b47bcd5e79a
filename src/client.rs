//! HTTP client for the Klear API, plus the status polling loop shared by the
//! inpainting and plan flows.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::api::{
    ErrorResponse, InpaintStatusResponse, PlanStatusResponse, PredictionCreated, API_KEY_HEADER,
    DEVICE_ID_HEADER,
};
use crate::plan::{Task, TimeBudget};
use crate::replicate::PredictionStatus;

/// Default server address when `KLEAR_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("prediction failed: {0}")]
    Failed(String),

    #[error("prediction was canceled")]
    Canceled,

    #[error("timed out after {0} status checks")]
    Timeout(u32),

    #[error("prediction succeeded without output")]
    NoOutput,

    #[error("no plan could be recovered from the model output")]
    NoPlan,
}

/// Client for a running Klear server.
pub struct KlearClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    device_id: String,
}

impl KlearClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            device_id: device_id.into(),
        }
    }

    /// Build a client from `KLEAR_API_URL` and `KLEAR_API_KEY`.
    pub fn from_env(device_id: impl Into<String>) -> Self {
        let base_url =
            std::env::var("KLEAR_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_key = std::env::var("KLEAR_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        Self::new(base_url, api_key, device_id)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(DEVICE_ID_HEADER, &self.device_id);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(self.request(reqwest::Method::POST, path).json(body))
            .await
    }

    /// Start an inpainting prediction. Returns the prediction id.
    pub async fn start_inpainting(&self, image: &str, mask: &str) -> Result<String, ClientError> {
        let created: PredictionCreated = self
            .post("/api/inpaint", &json!({ "image": image, "mask": mask }))
            .await?;
        Ok(created.prediction_id)
    }

    pub async fn inpaint_status(&self, id: &str) -> Result<InpaintStatusResponse, ClientError> {
        self.send(
            self.request(reqwest::Method::GET, "/api/inpaint/status")
                .query(&[("id", id)]),
        )
        .await
    }

    /// Start a plan prediction for `image` at the given budget tier.
    pub async fn generate_plan(
        &self,
        image: &str,
        budget: TimeBudget,
    ) -> Result<String, ClientError> {
        let created: PredictionCreated = self
            .post(
                "/api/plan",
                &json!({ "image": image, "timeBudget": budget.as_str() }),
            )
            .await?;
        Ok(created.prediction_id)
    }

    pub async fn plan_status(
        &self,
        id: &str,
        budget: TimeBudget,
    ) -> Result<PlanStatusResponse, ClientError> {
        self.send(
            self.request(reqwest::Method::GET, "/api/plan/status")
                .query(&[("id", id), ("budget", budget.as_str())]),
        )
        .await
    }
}

/// Where the poll loop gets prediction status from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn inpaint_status(&self, id: &str) -> Result<InpaintStatusResponse, ClientError>;

    async fn plan_status(
        &self,
        id: &str,
        budget: TimeBudget,
    ) -> Result<PlanStatusResponse, ClientError>;
}

#[async_trait]
impl StatusSource for KlearClient {
    async fn inpaint_status(&self, id: &str) -> Result<InpaintStatusResponse, ClientError> {
        KlearClient::inpaint_status(self, id).await
    }

    async fn plan_status(
        &self,
        id: &str,
        budget: TimeBudget,
    ) -> Result<PlanStatusResponse, ClientError> {
        KlearClient::plan_status(self, id, budget).await
    }
}

/// Poll loop limits.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(2),
        }
    }
}

/// Called with each observed status.
pub type ProgressFn<'a> = &'a (dyn Fn(PredictionStatus) + Send + Sync);

/// First string in an inpainting output (a URL or a list of URLs).
fn first_output(output: &Value) -> Option<String> {
    match output {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    }
}

fn failure(error: Option<String>) -> ClientError {
    ClientError::Failed(error.unwrap_or_else(|| "unknown error".to_string()))
}

/// Poll an inpainting prediction until it finishes. Returns the output URL.
pub async fn poll_for_completion(
    source: &dyn StatusSource,
    id: &str,
    config: PollConfig,
    on_progress: Option<ProgressFn<'_>>,
) -> Result<String, ClientError> {
    for attempt in 1..=config.max_attempts {
        let response = source.inpaint_status(id).await?;
        if let Some(report) = on_progress {
            report(response.status);
        }

        if response.status.is_terminal() {
            return match response.status {
                PredictionStatus::Succeeded => {
                    first_output(&response.output).ok_or(ClientError::NoOutput)
                }
                PredictionStatus::Failed => Err(failure(response.error)),
                _ => Err(ClientError::Canceled),
            };
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    tracing::warn!("Prediction {} still pending after {} checks", id, config.max_attempts);
    Err(ClientError::Timeout(config.max_attempts))
}

/// Poll a plan prediction until it finishes. Returns the budgeted tasks.
pub async fn poll_for_plan(
    source: &dyn StatusSource,
    id: &str,
    budget: TimeBudget,
    config: PollConfig,
    on_progress: Option<ProgressFn<'_>>,
) -> Result<Vec<Task>, ClientError> {
    for attempt in 1..=config.max_attempts {
        let response = source.plan_status(id, budget).await?;
        if let Some(report) = on_progress {
            report(response.status);
        }

        if response.status.is_terminal() {
            return match response.status {
                PredictionStatus::Succeeded => response.tasks.ok_or(ClientError::NoPlan),
                PredictionStatus::Failed => Err(failure(response.error)),
                _ => Err(ClientError::Canceled),
            };
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    tracing::warn!("Plan {} still pending after {} checks", id, config.max_attempts);
    Err(ClientError::Timeout(config.max_attempts))
}
