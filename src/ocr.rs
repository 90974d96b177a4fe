//! # OCR Processing Module
//!
//! The OCR engine is a black box to the rest of the crate: image bytes go in,
//! a list of [`ExtractedSpan`]s (text, confidence, bounding polygon) comes out.
//! Any engine producing that shape can implement [`OcrEngine`].
//!
//! [`TesseractEngine`] is the bundled implementation. It validates uploads
//! against per-format size limits, runs Tesseract through a reused instance,
//! and turns the hOCR output into one span per detected text line.
//!
//! ## Dependencies
//!
//! - `leptess`: Rust bindings for Tesseract OCR and Leptonica
//! - `image`: upload format detection
//! - `regex`: hOCR parsing

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn, Instrument};

pub use crate::circuit_breaker::CircuitBreaker;
use crate::errors::error_logging;
pub use crate::instance_manager::OcrInstanceManager;
use crate::observability;
pub use crate::ocr_config::{OcrConfig, RecoveryConfig};
pub use crate::ocr_errors::OcrError;

/// A point of a bounding polygon, in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Four-point bounding polygon (top-left, top-right, bottom-right, bottom-left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox(pub [Point; 4]);

impl BoundingBox {
    /// Build an axis-aligned polygon from a `x0 y0 x1 y1` rectangle
    pub fn from_rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        BoundingBox([
            Point { x: x0, y: y0 },
            Point { x: x1, y: y0 },
            Point { x: x1, y: y1 },
            Point { x: x0, y: y1 },
        ])
    }
}

/// One OCR-detected text region. Produced once per engine call and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSpan {
    pub text: String,
    /// Engine confidence in `[0, 1]`
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl ExtractedSpan {
    pub fn new(text: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
        }
    }
}

/// OCR engine boundary
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name for logs and metrics
    fn name(&self) -> &str;

    /// Recognize text regions in raw image bytes
    async fn extract(&self, image: &[u8]) -> Result<Vec<ExtractedSpan>, OcrError>;
}

/// Validate uploaded image bytes and return the detected format
///
/// Checks, in order: non-empty, general size limit, format detectable from the
/// header, format accepted by Tesseract, format-specific size limit.
pub fn validate_image_bytes(
    bytes: &[u8],
    config: &OcrConfig,
) -> Result<image::ImageFormat, OcrError> {
    let size = bytes.len() as u64;
    if size == 0 {
        return Err(OcrError::Validation("uploaded image is empty".to_string()));
    }
    if size > config.max_file_size {
        return Err(OcrError::Validation(format!(
            "image too large ({} bytes, maximum allowed: {} bytes)",
            size, config.max_file_size
        )));
    }
    if bytes.len() < config.min_format_bytes {
        return Err(OcrError::Validation(format!(
            "not enough bytes to detect image format ({} < {})",
            bytes.len(),
            config.min_format_bytes
        )));
    }

    let header = &bytes[..bytes.len().min(config.buffer_size)];
    let format = image::guess_format(header)
        .map_err(|e| OcrError::Validation(format!("unrecognized image format: {}", e)))?;

    let limit = config.format_limits.limit_for(format).ok_or_else(|| {
        OcrError::Validation(format!("unsupported image format: {:?}", format))
    })?;

    if size > limit {
        return Err(OcrError::Validation(format!(
            "image too large for {:?} format: {} bytes (maximum allowed: {} bytes)",
            format, size, limit
        )));
    }

    debug!(format = ?format, size_bytes = %size, "Upload validated");
    Ok(format)
}

lazy_static! {
    static ref HOCR_ELEMENT: Regex = Regex::new(
        r#"(?s)<span class=['"](?P<line>ocr_line|ocr_caption|ocr_header|ocr_textfloat)['"][^>]*?title=['"]bbox (?P<lx0>\d+) (?P<ly0>\d+) (?P<lx1>\d+) (?P<ly1>\d+)|<span class=['"]ocrx_word['"][^>]*?title=['"]bbox \d+ \d+ \d+ \d+; x_wconf (?P<conf>\d+)['"][^>]*>(?P<word>.*?)</span>"#
    )
    .expect("hOCR pattern should be valid");
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]+>").expect("tag pattern should be valid");
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

struct LineAccumulator {
    bbox: BoundingBox,
    words: Vec<String>,
    confidences: Vec<f32>,
}

impl LineAccumulator {
    fn into_span(self) -> Option<ExtractedSpan> {
        if self.words.is_empty() {
            return None;
        }
        let text = self.words.join(" ");
        if !text.chars().any(char::is_alphanumeric) {
            return None;
        }
        let mean = self.confidences.iter().sum::<f32>() / self.confidences.len() as f32;
        let rounded = (mean * 100.0).round() / 100.0;
        Some(ExtractedSpan::new(text, rounded, self.bbox))
    }
}

/// Parse Tesseract hOCR output into one span per text line
///
/// Line confidence is the mean of its word confidences (`x_wconf / 100`).
/// Lines whose text has no letters or digits are dropped.
pub fn parse_hocr(hocr: &str) -> Vec<ExtractedSpan> {
    let mut spans = Vec::new();
    let mut current: Option<LineAccumulator> = None;

    for caps in HOCR_ELEMENT.captures_iter(hocr) {
        if caps.name("line").is_some() {
            if let Some(line) = current.take().and_then(LineAccumulator::into_span) {
                spans.push(line);
            }
            let coord = |name: &str| {
                caps.name(name)
                    .and_then(|m| m.as_str().parse::<f32>().ok())
                    .unwrap_or(0.0)
            };
            current = Some(LineAccumulator {
                bbox: BoundingBox::from_rect(coord("lx0"), coord("ly0"), coord("lx1"), coord("ly1")),
                words: Vec::new(),
                confidences: Vec::new(),
            });
            continue;
        }

        let word = caps
            .name("word")
            .map(|m| decode_entities(&HTML_TAG.replace_all(m.as_str(), "")))
            .unwrap_or_default();
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        let confidence = caps
            .name("conf")
            .and_then(|m| m.as_str().parse::<f32>().ok())
            .unwrap_or(0.0)
            / 100.0;

        if let Some(line) = current.as_mut() {
            line.words.push(word.to_string());
            line.confidences.push(confidence);
        } else {
            trace!(word = %word, "hOCR word outside any line element ignored");
        }
    }

    if let Some(line) = current.take().and_then(LineAccumulator::into_span) {
        spans.push(line);
    }
    spans
}

/// Calculate retry delay with exponential backoff and jitter
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay)
/// final_delay = delay + random(0..=delay/4)
/// ```
///
/// # Examples
///
/// ```rust
/// use menu_nutrition::ocr::{calculate_retry_delay, RecoveryConfig};
///
/// let config = RecoveryConfig::default();
/// let delay = calculate_retry_delay(1, &config);
/// assert!(delay >= 500 && delay <= 625);
/// ```
pub fn calculate_retry_delay(attempt: u32, recovery: &RecoveryConfig) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = recovery
        .base_retry_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(recovery.max_retry_delay_ms);

    let jitter = rand::random_range(0..=delay / 4);
    delay + jitter
}

/// Tesseract-backed [`OcrEngine`]
pub struct TesseractEngine {
    config: OcrConfig,
    instances: OcrInstanceManager,
    circuit_breaker: CircuitBreaker,
}

impl TesseractEngine {
    pub fn new(config: OcrConfig) -> Self {
        let circuit_breaker = CircuitBreaker::new("ocr", &config.recovery);
        Self {
            config,
            instances: OcrInstanceManager::new(),
            circuit_breaker,
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Check that Tesseract can be initialized with the configured languages
    pub fn warm_up(&self) -> Result<(), OcrError> {
        self.instances
            .get_instance(&self.config)
            .map(|_| ())
            .map_err(|e| OcrError::Initialization(e.to_string()))
    }

    /// One recognition attempt, run on the blocking pool under the operation timeout
    async fn perform_recognition(
        &self,
        image: &[u8],
    ) -> Result<(Vec<ExtractedSpan>, Duration), OcrError> {
        let ocr_start_time = Instant::now();
        let instance = self
            .instances
            .get_instance(&self.config)
            .map_err(|e| OcrError::Initialization(e.to_string()))?;

        let bytes = image.to_vec();
        let timeout_duration = Duration::from_secs(self.config.recovery.operation_timeout_secs);

        let task = tokio::task::spawn_blocking(move || -> Result<String, OcrError> {
            let mut tess = instance.lock();
            tess.set_image_from_mem(&bytes).map_err(|e| {
                OcrError::ImageLoad(format!("Failed to load image for OCR: {:?}", e))
            })?;
            tess.get_hocr_text(0).map_err(|e| {
                OcrError::Extraction(format!("Failed to extract text from image: {:?}", e))
            })
        });

        // On timeout the blocking task is detached, not cancelled, and keeps the
        // instance locked until Tesseract returns. Later requests queue behind it.
        let result = tokio::time::timeout(timeout_duration, task).await;
        let ocr_duration = ocr_start_time.elapsed();

        match result {
            Ok(Ok(Ok(hocr))) => {
                let spans = parse_hocr(&hocr);
                info!(
                    duration_ms = %ocr_duration.as_millis(),
                    span_count = %spans.len(),
                    "OCR recognition completed"
                );
                Ok((spans, ocr_duration))
            }
            Ok(Ok(Err(e))) => {
                warn!("OCR recognition failed after {}ms: {}", ocr_duration.as_millis(), e);
                Err(e)
            }
            Ok(Err(join_error)) => Err(OcrError::Extraction(format!(
                "OCR worker terminated abnormally: {}",
                join_error
            ))),
            Err(_) => Err(OcrError::Timeout(format!(
                "OCR operation timed out after {} seconds",
                self.config.recovery.operation_timeout_secs
            ))),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn extract(&self, image: &[u8]) -> Result<Vec<ExtractedSpan>, OcrError> {
        self.extract_with_recovery(image)
            .instrument(observability::ocr_span("extract_spans"))
            .await
    }
}

impl TesseractEngine {
    /// Breaker check, validation, then recognition with retries
    async fn extract_with_recovery(&self, image: &[u8]) -> Result<Vec<ExtractedSpan>, OcrError> {
        let start_time = Instant::now();
        let image_size = image.len() as u64;

        if self.circuit_breaker.is_open() {
            warn!("Circuit breaker is open, rejecting OCR request");
            observability::update_circuit_breaker_state(self.circuit_breaker.name(), true);
            return Err(OcrError::Unavailable(
                "OCR service is temporarily unavailable due to repeated failures".to_string(),
            ));
        }
        observability::update_circuit_breaker_state(self.circuit_breaker.name(), false);

        validate_image_bytes(image, &self.config)?;

        let max_attempts = self.config.recovery.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.perform_recognition(image).await {
                Ok((spans, ocr_duration)) => {
                    self.circuit_breaker.record_success();
                    observability::record_ocr_metrics(observability::OcrMetricsParams {
                        success: true,
                        total_duration: start_time.elapsed(),
                        ocr_duration,
                        image_size,
                        attempt_count: attempt,
                        span_count: spans.len(),
                    });
                    return Ok(spans);
                }
                Err(err) => {
                    if attempt >= max_attempts || !err.is_retryable() {
                        let total_duration = start_time.elapsed();
                        self.circuit_breaker.record_failure();
                        observability::update_circuit_breaker_state(
                            self.circuit_breaker.name(),
                            self.circuit_breaker.is_open(),
                        );
                        observability::record_ocr_metrics(observability::OcrMetricsParams {
                            success: false,
                            total_duration,
                            ocr_duration: Duration::ZERO,
                            image_size,
                            attempt_count: attempt,
                            span_count: 0,
                        });
                        error_logging::log_ocr_error(
                            &err,
                            "ocr_extraction",
                            Some(image_size),
                            Some(total_duration),
                        );
                        return Err(err);
                    }

                    let delay_ms = calculate_retry_delay(attempt, &self.config.recovery);
                    warn!("OCR attempt {attempt} failed: {err}. Retrying in {delay_ms}ms");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }
}
