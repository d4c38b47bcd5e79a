//! Router tests: auth, rate limiting, validation and the plan status flow,
//! driven in-process against a fake prediction backend.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use http_body_util::BodyExt;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot`

use klear::api::{build_router, AppState, API_KEY_HEADER, DEVICE_ID_HEADER};
use klear::config::Config;
use klear::rate_limit::InMemoryRateLimitStore;
use klear::replicate::{
    CreatePrediction, Prediction, PredictionClient, PredictionStatus, ReplicateError,
};

const KEY: &str = "test-key";

/// Records created predictions and answers every status check with a fixed
/// prediction.
struct FakeReplicate {
    created: Mutex<Vec<CreatePrediction>>,
    status: Prediction,
}

impl FakeReplicate {
    fn new(status: Prediction) -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            status,
        }
    }
}

#[async_trait]
impl PredictionClient for FakeReplicate {
    async fn create_prediction(
        &self,
        request: &CreatePrediction,
    ) -> Result<Prediction, ReplicateError> {
        self.created.lock().unwrap().push(request.clone());
        Ok(Prediction {
            id: "pred123".to_string(),
            status: PredictionStatus::Starting,
            output: Value::Null,
            error: None,
        })
    }

    async fn get_prediction(&self, id: &str) -> Result<Prediction, ReplicateError> {
        Ok(Prediction {
            id: id.to_string(),
            ..self.status.clone()
        })
    }
}

fn processing() -> Prediction {
    Prediction {
        id: String::new(),
        status: PredictionStatus::Processing,
        output: Value::Null,
        error: None,
    }
}

fn app_with(config: Config, fake: Option<Arc<FakeReplicate>>) -> Router {
    let predictions = fake.map(|f| f as Arc<dyn PredictionClient>);
    let state = AppState::new(config, predictions, Arc::new(InMemoryRateLimitStore::new()));
    build_router(Arc::new(state))
}

fn app(fake: Arc<FakeReplicate>) -> Router {
    app_with(
        Config::new(Some(KEY.to_string()), Some("token".to_string())),
        Some(fake),
    )
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(API_KEY_HEADER, KEY)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(API_KEY_HEADER, KEY)
        .header(DEVICE_ID_HEADER, "device-1")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn png_data_url(width: u32, height: u32) -> String {
    let mut png = Vec::new();
    DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255])))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png)
    )
}

#[tokio::test]
async fn health_is_public() {
    let app = app_with(Config::new(None, None), None);
    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["auth_required"], true);
    assert_eq!(body["replicate_configured"], false);
}

#[tokio::test]
async fn missing_or_wrong_key_is_unauthorized() {
    let app = app(Arc::new(FakeReplicate::new(processing())));

    let no_key = Request::builder()
        .uri("/api/budgets")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(no_key).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Unauthorized");

    let wrong_key = Request::builder()
        .uri("/api/budgets")
        .header(API_KEY_HEADER, "nope")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(wrong_key).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unset_server_key_fails_closed() {
    let app = app_with(Config::new(None, Some("token".to_string())), None);
    let response = app.oneshot(get("/api/budgets")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dev_mode_skips_key_check() {
    let mut config = Config::new(None, None);
    config.dev_mode = true;
    let app = app_with(config, None);

    let request = Request::builder()
        .uri("/api/budgets")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["15min", "1hr", "weekend"]);
    assert_eq!(body[0]["ceilingMinutes"], 20);
    assert_eq!(body[0]["icon"], "⚡");
    assert_eq!(body[2]["label"], "Weekend");
}

#[tokio::test]
async fn plan_without_image_is_bad_request() {
    let app = app(Arc::new(FakeReplicate::new(processing())));
    let response = app
        .oneshot(post_json("/api/plan", json!({ "timeBudget": "1hr" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Image is required");
}

#[tokio::test]
async fn plan_start_embeds_tier_in_prompt() {
    let fake = Arc::new(FakeReplicate::new(processing()));
    let app = app(Arc::clone(&fake));

    let response = app
        .oneshot(post_json(
            "/api/plan",
            json!({ "image": "data:image/jpeg;base64,AAAA", "timeBudget": "weekend" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["predictionId"], "pred123");

    let created = fake.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    let prompt = created[0].input["prompt"].as_str().unwrap();
    assert!(prompt.contains("weekend session"));
    assert!(prompt.contains("240 minutes"));
}

#[tokio::test]
async fn plan_status_returns_budgeted_tasks() {
    let output = json!([
        "Here is your plan:\n```json\n[",
        r#"{"title": "Dust", "estimatedMinutes": 10, "priority": "low"},"#,
        r#"{"title": "Clear desk", "estimatedMinutes": 15, "priority": "high"},"#,
        r#"{"title": "Vacuum", "estimatedMinutes": 10, "priority": "medium"},"#,
        "]\n```"
    ]);
    let fake = Arc::new(FakeReplicate::new(Prediction {
        id: String::new(),
        status: PredictionStatus::Succeeded,
        output,
        error: None,
    }));
    let app = app(fake);

    let response = app
        .oneshot(get("/api/plan/status?id=pred123&budget=15min"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "succeeded");
    let titles: Vec<&str> = body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    // High priority first; neither 10 minute task fits in the remaining 5.
    assert_eq!(titles, vec!["Clear desk"]);
    assert_eq!(body["tasks"][0]["estimatedMinutes"], 15);
    assert_eq!(body["tasks"][0]["id"], "2");
}

#[tokio::test]
async fn plan_status_with_unusable_output_has_null_tasks() {
    let fake = Arc::new(FakeReplicate::new(Prediction {
        id: String::new(),
        status: PredictionStatus::Succeeded,
        output: json!("Sorry, I can't help with that."),
        error: None,
    }));
    let response = app(fake)
        .oneshot(get("/api/plan/status?id=pred123"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "succeeded");
    assert!(body["tasks"].is_null());
}

#[tokio::test]
async fn status_requires_prediction_id() {
    let app = app(Arc::new(FakeReplicate::new(processing())));
    let response = app.oneshot(get("/api/inpaint/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Prediction ID is required");
}

#[tokio::test]
async fn inpaint_status_passes_prediction_through() {
    let fake = Arc::new(FakeReplicate::new(Prediction {
        id: String::new(),
        status: PredictionStatus::Succeeded,
        output: json!(["https://cdn.example/clean.png"]),
        error: None,
    }));
    let response = app(fake)
        .oneshot(get("/api/inpaint/status?id=pred123"))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["output"][0], "https://cdn.example/clean.png");
}

#[tokio::test]
async fn inpaint_rejects_mismatched_dimensions() {
    let fake = Arc::new(FakeReplicate::new(processing()));
    let app = app(Arc::clone(&fake));

    let response = app
        .oneshot(post_json(
            "/api/inpaint",
            json!({ "image": png_data_url(8, 8), "mask": png_data_url(4, 8) }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "Image and mask dimensions must match exactly"
    );
    assert!(fake.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn inpaint_sends_dilated_mask() {
    let fake = Arc::new(FakeReplicate::new(processing()));
    let app = app(Arc::clone(&fake));

    let response = app
        .oneshot(post_json(
            "/api/inpaint",
            json!({ "image": png_data_url(8, 8), "mask": png_data_url(8, 8), "strength": 0.6 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let created = fake.created.lock().unwrap();
    let input = &created[0].input;
    assert!(input["mask"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert_eq!(input["strength"], 0.6);
    assert_eq!(input["guidance_scale"], 7.5);
    assert_eq!(input["num_inference_steps"], 30);
}

#[tokio::test]
async fn missing_replicate_token_is_server_error() {
    let app = app_with(Config::new(Some(KEY.to_string()), None), None);
    let response = app
        .oneshot(post_json(
            "/api/plan",
            json!({ "image": "data:image/jpeg;base64,AAAA" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await["error"],
        "Replicate API key not configured"
    );
}

#[tokio::test]
async fn creation_routes_are_rate_limited_per_device() {
    let mut config = Config::new(Some(KEY.to_string()), Some("token".to_string()));
    config.rate_limit.max_requests = 2;
    config.rate_limit.window = Duration::from_secs(3600);
    let app = app_with(config, Some(Arc::new(FakeReplicate::new(processing()))));

    let body = json!({ "image": "data:image/jpeg;base64,AAAA" });
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json("/api/plan", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(post_json("/api/plan", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        json_body(response).await["error"],
        "Rate limit exceeded. Please try again later."
    );

    // Status polling is not counted.
    let response = app
        .oneshot(get("/api/plan/status?id=pred123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
