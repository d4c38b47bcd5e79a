//! Replicate API client with automatic retry for transient errors.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use super::error::{ReplicateError, RetryPolicy};
use super::{CreatePrediction, Prediction, PredictionClient};

/// Replicate predictions client.
pub struct ReplicateClient {
    client: Client,
    api_url: String,
    api_token: String,
    retry_policy: RetryPolicy,
}

impl ReplicateClient {
    /// Create a new client with the default retry policy.
    pub fn new(api_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self::with_retry_policy(api_url, api_token, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        api_url: impl Into<String>,
        api_token: impl Into<String>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            retry_policy,
        }
    }

    fn predictions_url(&self) -> String {
        format!("{}/predictions", self.api_url)
    }

    fn prediction_url(&self, id: &str) -> String {
        format!("{}/predictions/{}", self.api_url, id)
    }

    /// Parse Retry-After header if present.
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Read a prediction out of a response, mapping HTTP failures.
    async fn read_prediction(response: reqwest::Response) -> Result<Prediction, ReplicateError> {
        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ReplicateError::from_response(
                status.as_u16(),
                &body,
                retry_after,
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::debug!("Unparseable prediction body: {}", body);
            ReplicateError::from(e)
        })
    }

    async fn send_create(&self, request: &CreatePrediction) -> Result<Prediction, ReplicateError> {
        let response = self
            .client
            .post(self.predictions_url())
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await?;
        Self::read_prediction(response).await
    }

    async fn send_get(&self, id: &str) -> Result<Prediction, ReplicateError> {
        let response = self
            .client
            .get(self.prediction_url(id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        Self::read_prediction(response).await
    }

    /// Run `op`, retrying transient failures within the retry budget.
    async fn with_retry<F, Fut>(&self, what: &str, mut op: F) -> Result<Prediction, ReplicateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Prediction, ReplicateError>>,
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            let error = match op().await {
                Ok(prediction) => {
                    if attempt > 0 {
                        tracing::info!(
                            "{} succeeded after {} retries (total time: {:?})",
                            what,
                            attempt,
                            start.elapsed()
                        );
                    }
                    return Ok(prediction);
                }
                Err(error) => error,
            };

            if !self.retry_policy.should_retry(&error, attempt) {
                if attempt > 0 {
                    tracing::error!(
                        "{} failed after {} retries (total time: {:?}): {}",
                        what,
                        attempt,
                        start.elapsed(),
                        error
                    );
                } else {
                    tracing::error!("{} failed (non-retryable): {}", what, error);
                }
                return Err(error);
            }

            let remaining = self
                .retry_policy
                .max_elapsed
                .saturating_sub(start.elapsed());
            let delay = error.backoff(attempt).min(remaining);
            if delay.is_zero() {
                tracing::warn!("{} attempt {} failed, no time remaining: {}", what, attempt + 1, error);
                return Err(error);
            }

            tracing::warn!(
                "{} attempt {} failed ({}), retrying in {:?}",
                what,
                attempt + 1,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl PredictionClient for ReplicateClient {
    async fn create_prediction(
        &self,
        request: &CreatePrediction,
    ) -> Result<Prediction, ReplicateError> {
        self.with_retry("Create prediction", || self.send_create(request))
            .await
    }

    async fn get_prediction(&self, id: &str) -> Result<Prediction, ReplicateError> {
        self.with_retry("Get prediction", || self.send_get(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_ignore_trailing_slash() {
        let client = ReplicateClient::new("https://api.replicate.com/v1/", "token");
        assert_eq!(
            client.predictions_url(),
            "https://api.replicate.com/v1/predictions"
        );
        assert_eq!(
            client.prediction_url("abc"),
            "https://api.replicate.com/v1/predictions/abc"
        );
    }

    #[test]
    fn retry_after_header_is_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("retry-after", "12".parse().unwrap());
        assert_eq!(
            ReplicateClient::parse_retry_after(&headers),
            Some(Duration::from_secs(12))
        );
        headers.insert("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(ReplicateClient::parse_retry_after(&headers), None);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let client = ReplicateClient::new("http://unused", "token");
        let mut calls = 0;
        let result = client
            .with_retry("test", || {
                calls += 1;
                async { Err(ReplicateError::from_response(422, "bad input", None)) }
            })
            .await;
        assert!(matches!(
            result.unwrap_err(),
            ReplicateError::Rejected { status: 422, .. }
        ));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let client = ReplicateClient::with_retry_policy(
            "http://unused",
            "token",
            RetryPolicy {
                max_retries: 2,
                max_elapsed: Duration::from_secs(5),
            },
        );
        let mut calls = 0;
        let result = client
            .with_retry("test", || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 2 {
                        Err(ReplicateError::from_response(
                            429,
                            "slow down",
                            Some(Duration::from_millis(1)),
                        ))
                    } else {
                        Ok(Prediction {
                            id: "p1".to_string(),
                            status: crate::replicate::PredictionStatus::Starting,
                            output: serde_json::Value::Null,
                            error: None,
                        })
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap().id, "p1");
        assert_eq!(calls, 2);
    }
}
