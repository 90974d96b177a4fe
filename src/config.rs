//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all application settings into a single, structured configuration object.
//! Every value can be overridden from the environment; nothing downstream
//! hard-codes a threshold.

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::{OcrConfig, PageSegMode};
use crate::reference_data::ReferenceColumns;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Read an env var, falling back to `default`, and parse it
fn env_or<T: FromStr>(key: &str, default: &str) -> AppResult<T> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a valid value", key)))
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn check_unit_interval(name: &str, value: f64) -> AppResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AppError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// HTTP API and metrics server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API bind host
    pub api_host: String,
    /// API port
    pub api_port: u16,
    /// Metrics / health server port
    pub metrics_port: u16,
    /// Maximum accepted request body in bytes
    pub max_upload_bytes: usize,
    /// Whether to allow privileged ports (< 1024)
    pub allow_privileged_ports: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,
            metrics_port: 9090,
            max_upload_bytes: 12 * 1024 * 1024,
            allow_privileged_ports: false,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.api_host.trim().is_empty() {
            return Err(AppError::Config("API host cannot be empty".to_string()));
        }

        if !self.allow_privileged_ports {
            if self.api_port < 1024 {
                return Err(AppError::Config(format!(
                    "API port {} is privileged. Set allow_privileged_ports=true or use port >= 1024",
                    self.api_port
                )));
            }
            if self.metrics_port < 1024 {
                return Err(AppError::Config(format!(
                    "Metrics port {} is privileged. Set allow_privileged_ports=true or use port >= 1024",
                    self.metrics_port
                )));
            }
        }

        if self.api_port == self.metrics_port {
            return Err(AppError::Config(
                "API port and metrics port cannot be the same".to_string(),
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(AppError::Config(
                "Max upload size cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Thresholds and weights of the recognition pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// OCR confidence floor for admission
    pub min_ocr_confidence: f64,
    /// Similarity above which a span is admitted even below the confidence floor
    pub low_confidence_similarity: f64,
    /// OCR confidence above which the raw text is tried before normalization
    pub high_confidence_bypass: f64,
    /// Minimum match similarity for a candidate to be kept
    pub min_menu_similarity: f64,
    /// Weight of OCR confidence in the combined score
    pub confidence_weight: f64,
    /// Weight of match similarity in the combined score
    pub similarity_weight: f64,
    /// Largest edit-distance/length ratio accepted by fuzzy nutrition lookups
    pub max_fuzzy_dissimilarity: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_ocr_confidence: 0.2,
            low_confidence_similarity: 0.9,
            high_confidence_bypass: 0.9,
            min_menu_similarity: 0.6,
            confidence_weight: 0.4,
            similarity_weight: 0.6,
            max_fuzzy_dissimilarity: 0.5,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            min_ocr_confidence: env_or("MIN_OCR_CONFIDENCE", "0.2")?,
            low_confidence_similarity: env_or("LOW_CONFIDENCE_SIMILARITY", "0.9")?,
            high_confidence_bypass: env_or("HIGH_CONFIDENCE_BYPASS", "0.9")?,
            min_menu_similarity: env_or("MIN_MENU_SIMILARITY", "0.6")?,
            confidence_weight: env_or("CONFIDENCE_WEIGHT", "0.4")?,
            similarity_weight: env_or("SIMILARITY_WEIGHT", "0.6")?,
            max_fuzzy_dissimilarity: env_or("MAX_FUZZY_DISSIMILARITY", "0.5")?,
        })
    }

    /// Validate pipeline thresholds
    pub fn validate(&self) -> AppResult<()> {
        check_unit_interval("min_ocr_confidence", self.min_ocr_confidence)?;
        check_unit_interval("low_confidence_similarity", self.low_confidence_similarity)?;
        check_unit_interval("high_confidence_bypass", self.high_confidence_bypass)?;
        check_unit_interval("min_menu_similarity", self.min_menu_similarity)?;
        check_unit_interval("confidence_weight", self.confidence_weight)?;
        check_unit_interval("similarity_weight", self.similarity_weight)?;
        check_unit_interval("max_fuzzy_dissimilarity", self.max_fuzzy_dissimilarity)?;

        if self.low_confidence_similarity < self.min_menu_similarity {
            return Err(AppError::Config(format!(
                "low_confidence_similarity ({}) must be >= min_menu_similarity ({})",
                self.low_confidence_similarity, self.min_menu_similarity
            )));
        }
        if self.high_confidence_bypass < self.min_ocr_confidence {
            return Err(AppError::Config(format!(
                "high_confidence_bypass ({}) must be >= min_ocr_confidence ({})",
                self.high_confidence_bypass, self.min_ocr_confidence
            )));
        }
        if self.confidence_weight + self.similarity_weight <= 0.0 {
            return Err(AppError::Config(
                "confidence_weight and similarity_weight cannot both be 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Weighted score used for deduplication and ranking
    pub fn combined_score(&self, confidence: f64, similarity: f64) -> f64 {
        confidence * self.confidence_weight + similarity * self.similarity_weight
    }
}

/// Reference data locations
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Nutrition reference CSV, also the vocabulary source
    pub reference_csv_path: String,
    /// CSV header names
    pub columns: ReferenceColumns,
    /// Correction table JSON; default search paths when `None`
    pub corrections_path: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            reference_csv_path: "data/nutrition_db.csv".to_string(),
            columns: ReferenceColumns::default(),
            corrections_path: None,
        }
    }
}

impl DataConfig {
    pub fn from_env() -> Self {
        let defaults = ReferenceColumns::default();
        Self {
            reference_csv_path: env::var("NUTRITION_DB_PATH")
                .unwrap_or_else(|_| "data/nutrition_db.csv".to_string()),
            columns: ReferenceColumns {
                name: env::var("REFERENCE_NAME_COLUMN").unwrap_or(defaults.name),
                energy: env::var("REFERENCE_ENERGY_COLUMN").unwrap_or(defaults.energy),
                carbohydrate: env::var("REFERENCE_CARBOHYDRATE_COLUMN")
                    .unwrap_or(defaults.carbohydrate),
                protein: env::var("REFERENCE_PROTEIN_COLUMN").unwrap_or(defaults.protein),
                fat: env::var("REFERENCE_FAT_COLUMN").unwrap_or(defaults.fat),
            },
            corrections_path: env_optional("OCR_CORRECTIONS_PATH"),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.reference_csv_path.trim().is_empty() {
            return Err(AppError::Config(
                "Reference dataset path cannot be empty".to_string(),
            ));
        }
        if self.columns.name.trim().is_empty() {
            return Err(AppError::Config(
                "Reference name column cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote nutrition API (food safety open data, service I2790)
#[derive(Debug, Clone)]
pub struct NutritionApiConfig {
    pub base_url: String,
    /// The remote source is disabled without a key
    pub api_key: Option<String>,
    pub service_id: String,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_secs: u64,
}

impl Default for NutritionApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://openapi.foodsafetykorea.go.kr/api".to_string(),
            api_key: None,
            service_id: "I2790".to_string(),
            timeout_secs: 10,
            cache_ttl_secs: 3600,
            cache_max_entries: 2048,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60,
        }
    }
}

impl NutritionApiConfig {
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            base_url: env::var("NUTRITION_API_BASE_URL").unwrap_or(defaults.base_url),
            api_key: env_optional("NUTRITION_API_KEY"),
            service_id: env::var("NUTRITION_API_SERVICE_ID").unwrap_or(defaults.service_id),
            timeout_secs: env_or("NUTRITION_API_TIMEOUT_SECS", "10")?,
            cache_ttl_secs: env_or("NUTRITION_CACHE_TTL_SECS", "3600")?,
            cache_max_entries: env_or("NUTRITION_CACHE_MAX_ENTRIES", "2048")?,
            circuit_breaker_threshold: env_or("NUTRITION_API_BREAKER_THRESHOLD", "5")?,
            circuit_breaker_reset_secs: env_or("NUTRITION_API_BREAKER_RESET_SECS", "60")?,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "Nutrition API base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.service_id.trim().is_empty() {
            return Err(AppError::Config(
                "Nutrition API service id cannot be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(AppError::Config(
                "Nutrition API timeout must be between 1 and 120 seconds".to_string(),
            ));
        }
        if self.cache_ttl_secs == 0 {
            return Err(AppError::Config("Nutrition cache TTL cannot be 0".to_string()));
        }
        if self.cache_max_entries == 0 {
            return Err(AppError::Config(
                "Nutrition cache size cannot be 0".to_string(),
            ));
        }
        if self.circuit_breaker_threshold == 0 || self.circuit_breaker_reset_secs == 0 {
            return Err(AppError::Config(
                "Nutrition API circuit breaker settings must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// OCR processing configuration
    pub ocr: OcrConfig,
    /// Recognition pipeline thresholds
    pub pipeline: PipelineConfig,
    /// Reference data locations
    pub data: DataConfig,
    /// Remote nutrition API
    pub nutrition_api: NutritionApiConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        // Server
        config.server.api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        config.server.api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?;
        config.server.metrics_port = env::var("METRICS_PORT")
            .unwrap_or_else(|_| "9090".to_string())
            .parse()
            .map_err(|_| {
                AppError::Config("METRICS_PORT must be a valid port number".to_string())
            })?;
        config.server.max_upload_bytes = env_or("MAX_UPLOAD_BYTES", "12582912")?;
        config.server.allow_privileged_ports = env::var("ALLOW_PRIVILEGED_PORTS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        // OCR
        config.ocr.languages = env::var("OCR_LANGUAGES").unwrap_or_else(|_| "kor+eng".to_string());
        config.ocr.tessdata_path = env_optional("TESSDATA_PATH");
        if let Some(code) = env_optional("OCR_PSM") {
            config.ocr.psm_mode = PageSegMode::from_code(&code).ok_or_else(|| {
                AppError::Config(format!("OCR_PSM '{}' is not a supported mode", code))
            })?;
        }
        config.ocr.max_file_size = env_or("OCR_MAX_FILE_SIZE", "10485760")?;
        config.ocr.recovery.max_retries = env_or("OCR_MAX_RETRIES", "0")?;
        config.ocr.recovery.operation_timeout_secs = env_or("OCR_TIMEOUT_SECS", "30")?;
        config.ocr.recovery.circuit_breaker_threshold = env_or("OCR_BREAKER_THRESHOLD", "5")?;
        config.ocr.recovery.circuit_breaker_reset_secs = env_or("OCR_BREAKER_RESET_SECS", "60")?;

        config.pipeline = PipelineConfig::from_env()?;
        config.data = DataConfig::from_env();
        config.nutrition_api = NutritionApiConfig::from_env()?;
        config.observability = ObservabilityConfig::from_env();
        config.observability.metrics_port = config.server.metrics_port;

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.server.validate()?;
        self.ocr.validate()?;
        self.pipeline.validate()?;
        self.data.validate()?;
        self.nutrition_api.validate()?;
        self.observability.validate().map_err(AppError::Config)?;

        if (self.server.max_upload_bytes as u64) < self.ocr.max_file_size {
            return Err(AppError::Config(format!(
                "MAX_UPLOAD_BYTES ({}) must be at least the OCR file size limit ({})",
                self.server.max_upload_bytes, self.ocr.max_file_size
            )));
        }
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: api={}:{}, metrics_port={}, ocr_languages={}, reference_csv={}, nutrition_api={}, min_ocr_confidence={}, min_menu_similarity={}",
            self.server.api_host,
            self.server.api_port,
            self.server.metrics_port,
            self.ocr.languages,
            self.data.reference_csv_path,
            if self.nutrition_api.is_enabled() { "enabled (key=[REDACTED])" } else { "disabled" },
            self.pipeline.min_ocr_confidence,
            self.pipeline.min_menu_similarity
        )
    }
}
