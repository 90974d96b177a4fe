//! # OCR Error Types Module
//!
//! Errors raised at the OCR engine boundary.

/// Custom error types for OCR operations
#[derive(Debug, Clone, PartialEq)]
pub enum OcrError {
    /// Upload validation errors (format, size)
    Validation(String),
    /// OCR engine initialization errors
    Initialization(String),
    /// Image loading errors
    ImageLoad(String),
    /// Text extraction errors
    Extraction(String),
    /// Timeout errors
    Timeout(String),
    /// Circuit breaker is open
    Unavailable(String),
}

impl OcrError {
    /// Whether a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OcrError::Extraction(_) | OcrError::Timeout(_) | OcrError::Initialization(_)
        )
    }
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::Validation(msg) => write!(f, "[VALIDATION] Image validation failed: {}", msg),
            OcrError::Initialization(msg) => write!(f, "[OCR_INIT] OCR engine initialization failed: {}", msg),
            OcrError::ImageLoad(msg) => write!(f, "[IMAGE_LOAD] Failed to load image for OCR processing: {}", msg),
            OcrError::Extraction(msg) => write!(f, "[OCR_EXTRACT] Text extraction from image failed: {}", msg),
            OcrError::Timeout(msg) => write!(f, "[OCR_TIMEOUT] OCR processing timed out: {}", msg),
            OcrError::Unavailable(msg) => write!(f, "[OCR_UNAVAILABLE] OCR service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for OcrError {}

impl From<anyhow::Error> for OcrError {
    fn from(err: anyhow::Error) -> Self {
        OcrError::Extraction(err.to_string())
    }
}
