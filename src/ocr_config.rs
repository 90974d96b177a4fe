//! # OCR Configuration Module
//!
//! This module defines configuration structures for OCR processing,
//! including recovery settings, upload format limits, and Tesseract parameters.

use crate::errors::{AppError, AppResult};

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "kor+eng";
pub const FORMAT_DETECTION_BUFFER_SIZE: usize = 32;
pub const MIN_FORMAT_BYTES: usize = 8;
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit for uploads

/// Recovery configuration for error handling
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single operation in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            // Menu photos are single-shot; a failed read is reported rather than retried.
            max_retries: 0,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
            operation_timeout_secs: 30,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60,
        }
    }
}

impl RecoveryConfig {
    /// Validate recovery configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.base_retry_delay_ms == 0 {
            return Err(AppError::Config(
                "base_retry_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(AppError::Config(format!(
                "max_retry_delay_ms ({}) must be >= base_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }
        if self.operation_timeout_secs == 0 {
            return Err(AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(AppError::Config(
                "circuit_breaker_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker_reset_secs == 0 {
            return Err(AppError::Config(
                "circuit_breaker_reset_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Format-specific size limits for uploaded images
#[derive(Debug, Clone)]
pub struct FormatSizeLimits {
    /// PNG format limit
    pub png_max: u64,
    /// JPEG format limit (phone photos of menus are mostly JPEG)
    pub jpeg_max: u64,
    /// BMP format limit
    pub bmp_max: u64,
    /// TIFF format limit
    pub tiff_max: u64,
}

impl Default for FormatSizeLimits {
    fn default() -> Self {
        Self {
            png_max: 15 * 1024 * 1024,
            jpeg_max: 10 * 1024 * 1024,
            bmp_max: 5 * 1024 * 1024,
            tiff_max: 15 * 1024 * 1024,
        }
    }
}

impl FormatSizeLimits {
    /// Validate format size limits
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("png_max", self.png_max),
            ("jpeg_max", self.jpeg_max),
            ("bmp_max", self.bmp_max),
            ("tiff_max", self.tiff_max),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }

    /// Size limit for a detected format, `None` when the format is not accepted
    pub fn limit_for(&self, format: image::ImageFormat) -> Option<u64> {
        match format {
            image::ImageFormat::Png => Some(self.png_max),
            image::ImageFormat::Jpeg => Some(self.jpeg_max),
            image::ImageFormat::Bmp => Some(self.bmp_max),
            image::ImageFormat::Tiff => Some(self.tiff_max),
            _ => None,
        }
    }
}

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    Auto = 3,
    /// Assume a single column of text
    SingleColumn = 4,
    /// Assume a single uniform block of text
    SingleBlock = 6,
    /// Find as much text as possible in no particular order.
    /// Menus and receipts are scattered text, so this is the default.
    #[default]
    SparseText = 11,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SparseText => "11",
        }
    }

    /// Parse a numeric PSM value as accepted by `OCR_PSM`
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "3" => Some(PageSegMode::Auto),
            "4" => Some(PageSegMode::SingleColumn),
            "6" => Some(PageSegMode::SingleBlock),
            "11" => Some(PageSegMode::SparseText),
            _ => None,
        }
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "kor", "kor+eng")
    pub languages: String,
    /// Optional tessdata directory; Tesseract's default search path when `None`
    pub tessdata_path: Option<String>,
    /// Buffer size for format detection in bytes
    pub buffer_size: usize,
    /// Minimum bytes required for format detection
    pub min_format_bytes: usize,
    /// Maximum allowed upload size in bytes (general limit)
    pub max_file_size: u64,
    /// Format-specific size limits
    pub format_limits: FormatSizeLimits,
    /// Recovery and error handling configuration
    pub recovery: RecoveryConfig,
    /// Default page segmentation mode for OCR
    pub psm_mode: PageSegMode,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            tessdata_path: None,
            buffer_size: FORMAT_DETECTION_BUFFER_SIZE,
            min_format_bytes: MIN_FORMAT_BYTES,
            max_file_size: MAX_FILE_SIZE,
            format_limits: FormatSizeLimits::default(),
            recovery: RecoveryConfig::default(),
            psm_mode: PageSegMode::default(),
        }
    }
}

impl OcrConfig {
    /// Validate OCR configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(AppError::Config("languages cannot be empty".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(AppError::Config(
                "buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.min_format_bytes == 0 {
            return Err(AppError::Config(
                "min_format_bytes must be greater than 0".to_string(),
            ));
        }
        if self.min_format_bytes > self.buffer_size {
            return Err(AppError::Config(format!(
                "min_format_bytes ({}) cannot exceed buffer_size ({})",
                self.min_format_bytes, self.buffer_size
            )));
        }
        if self.max_file_size == 0 {
            return Err(AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        self.format_limits.validate()?;
        self.recovery.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(unused_assignments)]
    fn test_recovery_config_validation() {
        let mut config = RecoveryConfig::default();
        assert!(config.validate().is_ok());

        // Zero retries is a valid single-attempt policy
        config.max_retries = 0;
        assert!(config.validate().is_ok());

        config.base_retry_delay_ms = 0;
        assert!(config.validate().is_err());
        config.base_retry_delay_ms = 500;

        config.max_retry_delay_ms = 100;
        assert!(config.validate().is_err());
        config.max_retry_delay_ms = 5000;

        config.operation_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.operation_timeout_secs = 30;

        config.circuit_breaker_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_limits() {
        let limits = FormatSizeLimits::default();
        assert!(limits.validate().is_ok());
        assert_eq!(limits.limit_for(image::ImageFormat::Jpeg), Some(10 * 1024 * 1024));
        assert_eq!(limits.limit_for(image::ImageFormat::Gif), None);

        let broken = FormatSizeLimits {
            png_max: 0,
            ..Default::default()
        };
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_psm_roundtrip_codes() {
        assert_eq!(PageSegMode::default(), PageSegMode::SparseText);
        assert_eq!(PageSegMode::from_code("6"), Some(PageSegMode::SingleBlock));
        assert_eq!(PageSegMode::from_code("99"), None);
        assert_eq!(PageSegMode::Auto.as_str(), "3");
    }

    #[test]
    fn test_ocr_config_defaults_are_korean() {
        let config = OcrConfig::default();
        assert_eq!(config.languages, "kor+eng");
        assert!(config.validate().is_ok());

        let empty = OcrConfig {
            languages: "  ".to_string(),
            ..Default::default()
        };
        assert!(empty.validate().is_err());
    }
}
