use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use super::types::*;
use super::AppState;
use crate::error::{InferenceError, Result};
use crate::generation::KeywordGenerator;
use crate::prompt::{build_prompt, PersonalityPayload};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/generate", post(generate))
        .with_state(state)
}

impl IntoResponse for InferenceError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                success: false,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<GenerateResponse>> {
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    let result = generate_keywords(state, &headers, &body).await;
    match &result {
        Ok(response) => info!(
            %request_id,
            personality = %response.personality,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Keywords generated"
        ),
        Err(e) => error!(%request_id, "Generation error: {}", e),
    }
    result.map(Json)
}

async fn generate_keywords(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<GenerateResponse> {
    require_json(headers)?;
    let payload = parse_payload(body)?;
    let prompt = build_prompt(&payload);
    info!(
        "Generating keywords for {:?} (prompt_len={})",
        payload.name(),
        prompt.len()
    );

    let worker_prompt = prompt.clone();
    let output = tokio::task::spawn_blocking(move || {
        let mut model = state.model.blocking_lock();
        let mut generator =
            KeywordGenerator::new(model.as_mut(), state.tokenizer.as_ref(), &state.device);
        generator.generate(&worker_prompt, &state.generation)
    })
    .await
    .map_err(|e| InferenceError::Inference(format!("generation worker failed: {}", e)))??;

    Ok(GenerateResponse::new(output.text, payload.name(), &prompt))
}

/// Accepts `application/json` and `application/*+json`, parameters ignored.
fn require_json(headers: &HeaderMap) -> Result<()> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let is_json = mime == "application/json"
        || (mime.starts_with("application/") && mime.ends_with("+json"));
    if is_json {
        Ok(())
    } else {
        Err(InferenceError::InvalidRequest(format!(
            "expected a JSON content type, got {:?}",
            content_type
        )))
    }
}

/// The body must be a JSON object.
fn parse_payload(body: &[u8]) -> Result<PersonalityPayload> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| InferenceError::InvalidRequest(format!("malformed JSON body: {}", e)))?;
    if !value.is_object() {
        return Err(InferenceError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| InferenceError::InvalidRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::generation::tests::{tokenizer, ScriptedModel};
    use crate::model::Seq2SeqModel;
    use axum::body::Body;
    use axum::http::Request;
    use candle_core::Device;
    use http_body_util::BodyExt;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    fn app() -> Router {
        let model: Box<dyn Seq2SeqModel> =
            Box::new(ScriptedModel::new(&["golden", "serpent", "crown"]));
        let state = Arc::new(AppState {
            model: Arc::new(Mutex::new(model)),
            tokenizer: Arc::new(tokenizer()),
            device: Device::Cpu,
            model_id: "test/scripted".to_string(),
            generation: GenerationConfig {
                seed: Some(11),
                ..GenerationConfig::default()
            },
        });
        create_router(state)
    }

    async fn post_generate(body: &str) -> (StatusCode, Value) {
        post_generate_as(Some("application/json"), body).await
    }

    async fn post_generate_as(content_type: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut request = Request::builder().method("POST").uri("/generate");
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }
        let request = request.body(Body::from(body.to_string())).unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn cleopatra_end_to_end() {
        let (status, json) = post_generate(
            r#"{"personality_name": "Cleopatra", "culture": "Egyptian", "role": "Pharaoh"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["personality"], "Cleopatra");
        assert_eq!(json["keywords"], "golden serpent crown");
        assert_eq!(
            json["prompt_used"],
            "Generate Pinterest keywords for Cleopatra - Culture: Egyptian | Role: Pharaoh - \
             Keywords should be v..."
        );
        assert_eq!(json["prompt_used"].as_str().unwrap().chars().count(), 103);
    }

    #[tokio::test]
    async fn missing_name_reports_empty_personality() {
        let (status, json) = post_generate(r#"{"culture": "Norse"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["personality"], "");
        assert!(json["prompt_used"]
            .as_str()
            .unwrap()
            .starts_with("Generate Pinterest keywords for  - Culture: Norse - "));
    }

    #[tokio::test]
    async fn malformed_json_is_a_server_error() {
        let (status, json) = post_generate("{not json").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert!(!json["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_body_is_a_server_error() {
        let (status, json) = post_generate("").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn non_object_body_is_a_server_error() {
        let (status, json) = post_generate(r#"["Cleopatra"]"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("JSON object"));
    }

    #[tokio::test]
    async fn wrongly_typed_field_is_a_server_error() {
        let (status, json) = post_generate(r#"{"personality_name": "Ada", "bio": 42}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn non_json_content_type_is_a_server_error() {
        let body = r#"{"personality_name": "Cleopatra"}"#;

        let (status, json) = post_generate_as(Some("text/plain"), body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("text/plain"));

        let (status, json) = post_generate_as(None, body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn json_content_type_variants_are_accepted() {
        let body = r#"{"personality_name": "Cleopatra"}"#;
        for content_type in ["application/json; charset=utf-8", "application/ld+json"] {
            let (status, json) = post_generate_as(Some(content_type), body).await;
            assert_eq!(status, StatusCode::OK, "{}", content_type);
            assert_eq!(json["success"], true);
        }
    }

    #[tokio::test]
    async fn get_generate_is_not_routed() {
        let request = Request::builder()
            .uri("/generate")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
