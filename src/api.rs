//! # HTTP API
//!
//! - `POST /food/analyze`: multipart upload (field `file` or `image`), returns
//!   an [`AnalysisReport`]
//! - `GET /health`: service status and vocabulary facts
//!
//! Batch failures of the pipeline answer 422 with a distinct `error_code`
//! and whatever was detected before the failure. Bad uploads answer 400 or
//! 413, an unavailable OCR engine 503. Messages follow `Accept-Language`.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};

use crate::errors::{error_logging, AnalysisError, PipelineError};
use crate::localization::LocalizationManager;
use crate::observability::{self, ReadinessState};
use crate::ocr_errors::OcrError;
use crate::pipeline::{AnalysisReport, FoodRecognitionPipeline};

/// Multipart field names accepted for the image
const IMAGE_FIELDS: &[&str] = &["file", "image"];

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<FoodRecognitionPipeline>,
    pub localization: Arc<LocalizationManager>,
    pub readiness: Arc<ReadinessState>,
    pub max_upload_bytes: usize,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/food/analyze", post(analyze_food))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
}

/// A JSON error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    fn new(status: StatusCode, error_code: &str, message: String) -> Self {
        Self {
            status,
            body: json!({ "error_code": error_code, "error": message }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Localizes messages for one request
struct Messages<'a> {
    manager: &'a LocalizationManager,
    language: String,
}

impl Messages<'_> {
    fn get(&self, key: &str) -> String {
        self.manager.get_message_in_language(key, &self.language, None)
    }

    fn with_arg(&self, key: &str, name: &str, value: String) -> String {
        self.manager
            .get_message_with_args_in_language(key, &self.language, &[(name, value)])
    }
}

async fn analyze_food(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisReport>, ApiError> {
    let start = Instant::now();
    let messages = Messages {
        manager: &state.localization,
        language: state.localization.detect_language(
            headers
                .get(axum::http::header::ACCEPT_LANGUAGE)
                .and_then(|v| v.to_str().ok()),
        ),
    };

    let result = async {
        let image = read_image(multipart, &messages, state.max_upload_bytes).await?;
        info!(size_bytes = %image.len(), "Received menu image");
        state
            .pipeline
            .analyze(&image)
            .await
            .map_err(|e| analysis_error_response(e, &messages))
    }
    .instrument(observability::api_span("POST", "/food/analyze"))
    .await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status(),
    };
    observability::record_request_metrics("POST", "/food/analyze", status.as_u16(), start.elapsed());

    result.map(Json)
}

async fn read_image(
    multipart: Result<Multipart, MultipartRejection>,
    messages: &Messages<'_>,
    max_upload_bytes: usize,
) -> Result<Vec<u8>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_upload",
            messages.with_arg("error-invalid-upload", "reason", e.body_text()),
        )
    })?;

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, messages, max_upload_bytes))?;

        let Some(field) = field else {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "missing_file",
                messages.get("error-missing-file"),
            ));
        };

        let is_image = field
            .name()
            .is_some_and(|name| IMAGE_FIELDS.contains(&name));
        if !is_image {
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, messages, max_upload_bytes))?;
        if bytes.is_empty() {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "missing_file",
                messages.get("error-missing-file"),
            ));
        }
        return Ok(bytes.to_vec());
    }
}

fn multipart_error(
    err: axum::extract::multipart::MultipartError,
    messages: &Messages<'_>,
    max_upload_bytes: usize,
) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "image_too_large",
            messages.with_arg(
                "error-image-too-large",
                "max_mb",
                (max_upload_bytes / (1024 * 1024)).to_string(),
            ),
        );
    }
    ApiError::new(
        StatusCode::BAD_REQUEST,
        "invalid_upload",
        messages.with_arg("error-invalid-upload", "reason", err.body_text()),
    )
}

/// Map an analysis failure to its HTTP response
fn analysis_error_response(err: AnalysisError, messages: &Messages<'_>) -> ApiError {
    match err {
        AnalysisError::Ocr(ocr_err) => ocr_error_response(ocr_err, messages),
        AnalysisError::Pipeline(pipeline_err) => {
            let code = pipeline_err.code();
            warn!(error_code = %code, "Menu analysis produced no result");
            let (key, detected, filtered) = match pipeline_err {
                PipelineError::NoTextDetected => ("error-no-text-detected", json!([]), json!([])),
                PipelineError::NoConfidentText { detected } => {
                    ("error-no-confident-text", json!(detected), json!([]))
                }
                PipelineError::NoNutritionMatch { detected, filtered } => {
                    let any_match = filtered.iter().any(|f| f.matched_name.is_some());
                    let key = if any_match {
                        "error-no-nutrition-match"
                    } else {
                        "error-no-menu-match"
                    };
                    (key, json!(detected), json!(filtered))
                }
            };
            ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({
                    "error_code": code,
                    "error": messages.get(key),
                    "detected_texts": detected,
                    "filtered_texts": filtered,
                }),
            }
        }
    }
}

fn ocr_error_response(err: OcrError, messages: &Messages<'_>) -> ApiError {
    match &err {
        OcrError::Validation(reason) | OcrError::ImageLoad(reason) => ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_image",
            messages.with_arg("error-invalid-image", "reason", reason.clone()),
        ),
        OcrError::Unavailable(_) | OcrError::Timeout(_) | OcrError::Initialization(_) => {
            ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "ocr_unavailable",
                messages.get("error-ocr-unavailable"),
            )
        }
        OcrError::Extraction(_) => {
            error_logging::log_internal_error(&err, "api", "analyze_food");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ocr_failed",
                messages.get("error-ocr-failed"),
            )
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let vocabulary = state.pipeline.matcher().vocabulary();
    Json(json!({
        "status": if state.readiness.is_started() { "healthy" } else { "starting" },
        "version": env!("CARGO_PKG_VERSION"),
        "ocr_engine": state.pipeline.ocr_engine_name(),
        "vocabulary_entries": vocabulary.len(),
        "vocabulary_source": format!("{:?}", vocabulary.source()),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
