//! # Application Error Types
//!
//! This module defines common error types used throughout the menu nutrition service.
//! It separates component failures (`AppError`) from the whole-batch outcomes of an
//! analysis request (`PipelineError`) and the per-candidate failures that are logged
//! and dropped (`CandidateFailure`).

use std::fmt;

use crate::pipeline::{DetectedText, FilteredText};

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Reference dataset / vocabulary errors
    Vocabulary(String),
    /// OCR processing errors
    Ocr(String),
    /// Nutrition service answered with an error
    Nutrition(String),
    /// Network/communication errors
    Network(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Vocabulary(msg) => write!(f, "[VOCABULARY] {}", msg),
            AppError::Ocr(msg) => write!(f, "[OCR] {}", msg),
            AppError::Nutrition(msg) => write!(f, "[NUTRITION] {}", msg),
            AppError::Network(msg) => write!(f, "[NETWORK] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Vocabulary(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<crate::ocr_errors::OcrError> for AppError {
    fn from(err: crate::ocr_errors::OcrError) -> Self {
        AppError::Ocr(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Whole-batch failures of an analysis request.
///
/// Only these propagate to the caller. Each variant carries whatever the
/// pipeline had already produced so the API can echo it back.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// OCR returned zero spans
    NoTextDetected,
    /// Every span was rejected by the confidence floor
    NoConfidentText { detected: Vec<DetectedText> },
    /// Candidates existed but none resolved to a menu with nutrition data
    NoNutritionMatch {
        detected: Vec<DetectedText>,
        filtered: Vec<FilteredText>,
    },
}

impl PipelineError {
    /// Stable machine-readable code used in API responses and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NoTextDetected => "no_text_detected",
            PipelineError::NoConfidentText { .. } => "no_confident_text",
            PipelineError::NoNutritionMatch { .. } => "no_nutrition_match",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NoTextDetected => write!(f, "[PIPELINE] No text detected in image"),
            PipelineError::NoConfidentText { detected } => write!(
                f,
                "[PIPELINE] No confident text among {} detected spans",
                detected.len()
            ),
            PipelineError::NoNutritionMatch { filtered, .. } => write!(
                f,
                "[PIPELINE] No nutrition match for {} menu candidates",
                filtered.len()
            ),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Everything an analysis request can fail with
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The OCR boundary rejected the upload or failed
    Ocr(crate::ocr_errors::OcrError),
    /// A whole-batch outcome of the pipeline
    Pipeline(PipelineError),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Ocr(err) => write!(f, "{}", err),
            AnalysisError::Pipeline(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<crate::ocr_errors::OcrError> for AnalysisError {
    fn from(err: crate::ocr_errors::OcrError) -> Self {
        AnalysisError::Ocr(err)
    }
}

impl From<PipelineError> for AnalysisError {
    fn from(err: PipelineError) -> Self {
        AnalysisError::Pipeline(err)
    }
}

/// Per-candidate failures. Never fatal to the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateFailure {
    /// The matching cascade was exhausted without a vocabulary hit
    NoMatchFound { text: String },
    /// The matched menu has no nutrition entry in any source
    NutritionLookupFailed { menu: String, reason: String },
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateFailure::NoMatchFound { text } => {
                write!(f, "[NO_MATCH] '{}' matched no menu entry", text)
            }
            CandidateFailure::NutritionLookupFailed { menu, reason } => {
                write!(f, "[NUTRITION_MISS] '{}': {}", menu, reason)
            }
        }
    }
}

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::{error, warn};

    /// Log OCR processing errors with image and processing context
    pub fn log_ocr_error(
        error: &impl std::fmt::Display,
        operation: &str,
        image_size: Option<u64>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            image_size_bytes = ?image_size,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "OCR processing failed"
        );
    }

    /// Log network/communication errors with connection context
    pub fn log_network_error(
        error: &impl std::fmt::Display,
        operation: &str,
        endpoint: Option<&str>,
        attempt_count: Option<u32>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            attempt_count = ?attempt_count,
            "Network operation failed"
        );
    }

    /// Log a dropped candidate. These are expected outcomes, so they go out at warn.
    pub fn log_candidate_failure(failure: &super::CandidateFailure, candidate_index: usize) {
        warn!(
            failure = %failure,
            candidate_index = %candidate_index,
            "Candidate excluded from results"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }

    /// Log internal application errors with component context
    pub fn log_internal_error(error: &impl std::fmt::Display, component: &str, operation: &str) {
        error!(
            error = %error,
            component = %component,
            operation = %operation,
            "Internal application error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display_tags() {
        assert_eq!(
            AppError::Config("bad threshold".to_string()).to_string(),
            "[CONFIG] bad threshold"
        );
        assert_eq!(
            AppError::Vocabulary("missing".to_string()).to_string(),
            "[VOCABULARY] missing"
        );
        assert_eq!(
            AppError::Nutrition("HTTP 500".to_string()).to_string(),
            "[NUTRITION] HTTP 500"
        );
    }

    #[test]
    fn test_pipeline_error_codes_are_distinct() {
        let codes = [
            PipelineError::NoTextDetected.code(),
            PipelineError::NoConfidentText { detected: vec![] }.code(),
            PipelineError::NoNutritionMatch {
                detected: vec![],
                filtered: vec![],
            }
            .code(),
        ];
        assert_eq!(codes, ["no_text_detected", "no_confident_text", "no_nutrition_match"]);
    }

    #[test]
    fn test_ocr_error_converts_to_app_error() {
        let err: AppError = crate::ocr_errors::OcrError::Timeout("30s".to_string()).into();
        assert!(matches!(err, AppError::Ocr(_)));
    }
}
