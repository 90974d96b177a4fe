//! # Menu Nutrition Service
//!
//! Reads Korean restaurant menu photos with OCR, repairs the recognized text,
//! matches it against a menu vocabulary and answers with per-serving
//! nutrition for the best candidate.

pub mod api;
pub mod cache;
pub mod circuit_breaker;
pub mod confidence_filter;
pub mod config;
pub mod error_correction;
pub mod errors;
pub mod hangul;
pub mod instance_manager;
pub mod localization;
pub mod matcher;
pub mod nutrition;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod pipeline;
pub mod reference_data;
pub mod serving_size;
pub mod text_normalizer;
pub mod vocabulary;

// Re-export types for easier access
pub use matcher::{MatchResult, MatchStage, MenuMatcher};
pub use nutrition::{NutritionFacts, NutritionResolver, NutritionSource};
pub use pipeline::{AnalysisReport, FoodRecognitionPipeline};
pub use text_normalizer::TextNormalizer;
