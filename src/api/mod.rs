// HTTP API
// Routes, handlers and error mapping for the detection service

use crate::models::{DetectRequest, DetectResponse, ErrorBody, HealthResponse, LoadState, RootResponse};
use crate::services::config_store::CorsConfig;
use crate::services::detection::{DetectError, Detector};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub detector: Detector,
    pub model_name: Arc<str>,
}

impl AppState {
    pub fn new(detector: Detector, model_name: impl Into<Arc<str>>) -> Self {
        Self {
            detector,
            model_name: model_name.into(),
        }
    }
}

pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/detect", post(detect))
        // Text of any length is accepted; the tokenizer truncates it
        .layer(DefaultBodyLimit::disable())
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `"*"` opens everything up; otherwise only the listed origins are allowed.
pub fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if cors.allows_any() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "cors.invalid_origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse::default())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state.detector.state(),
        model: state.model_name.to_string(),
    })
}

async fn detect(
    State(state): State<AppState>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> Result<Json<DetectResponse>, DetectError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("detect", %request_id);

    async move {
        // Readiness is reported ahead of body validation
        if state.detector.state() == LoadState::Loading {
            return Err(DetectError::ServiceNotReady);
        }
        let Json(request) = payload.map_err(|rejection| DetectError::InvalidInput(rejection.body_text()))?;

        info!(chars = request.text.chars().count(), "detect.request");
        let response = state.detector.detect(request.text).await?;
        info!(
            ai_score = response.ai_score,
            confidence = %response.confidence,
            "detect.response"
        );
        Ok(Json(response))
    }
    .instrument(span)
    .await
}

impl DetectError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ServiceNotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InferenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::ServiceNotReady => info!("detect.rejected_loading"),
            Self::InvalidInput(reason) => warn!(reason = %reason, "detect.invalid_input"),
            Self::InferenceFailure(reason) => error!(reason = %reason, "detect.inference_failed"),
        }
        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}
