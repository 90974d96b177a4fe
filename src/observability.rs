//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Metrics collection and Prometheus export
//! - Distributed tracing with OpenTelemetry
//! - Structured logging with configurable levels
//! - Health check endpoints for monitoring

pub mod health_checks;
pub mod metrics;
pub mod tracing_mod;

use anyhow::Result;
use std::sync::Arc;

use crate::observability_config::ObservabilityConfig;

pub use health_checks::ReadinessState;
pub use metrics::{
    record_health_check_metrics, record_match_stage, record_nutrition_lookup, record_ocr_metrics,
    record_pipeline_outcome, record_request_metrics, record_span_counts, record_startup_metrics,
    update_circuit_breaker_state, OcrMetricsParams,
};
pub use tracing_mod::{api_span, nutrition_span, ocr_span, pipeline_span};

/// Initialize logging, optional trace export and the metrics server
///
/// The metrics server reports readiness from `readiness`, which the caller
/// updates as startup progresses.
pub async fn init_observability(
    config: &ObservabilityConfig,
    readiness: Arc<ReadinessState>,
) -> Result<()> {
    tracing_mod::init_tracing_with_config(config)?;
    tracing_mod::init_opentelemetry_tracing_with_config(config)?;

    if config.enable_metrics_export {
        let handle = metrics::init_metrics_with_config(config)?;
        metrics::start_metrics_server(handle, config.metrics_port, readiness).await?;
    } else {
        tracing::info!("Metrics export disabled");
    }

    tracing::info!(
        environment = %config.environment,
        production = %config.is_production(),
        "Observability initialized"
    );
    Ok(())
}
