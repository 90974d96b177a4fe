//! Tracing and logging setup module.
//!
//! This module provides:
//! - Structured logging configuration
//! - OpenTelemetry distributed tracing
//! - Tracing span creation utilities

use anyhow::Result;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::Sampler;
use opentelemetry_sdk::Resource;
use tracing_subscriber::prelude::*;

use crate::observability_config::ObservabilityConfig;

/// Build the log filter: `RUST_LOG` first, then the configured crate level
pub fn build_env_filter(config: &ObservabilityConfig) -> Result<tracing_subscriber::EnvFilter> {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("menu_nutrition={}", config.log_level).parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("h2=warn".parse()?);

    if let Ok(obs_log) = std::env::var("OBSERVABILITY_COMPONENT_LOG_LEVEL") {
        filter = filter.add_directive(format!("menu_nutrition::observability={}", obs_log).parse()?);
    }

    Ok(filter)
}

/// Initialize structured logging with tracing and configuration
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let filter = build_env_filter(config)?;

    if config.use_pretty_logs() {
        // Pretty formatting for development
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    } else {
        // JSON formatting for production (default)
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        pretty = %config.use_pretty_logs(),
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Initialize OpenTelemetry distributed tracing with configuration
pub fn init_opentelemetry_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let Some(endpoint) = &config.otlp_endpoint else {
        tracing::info!("OpenTelemetry tracing disabled (no OTLP endpoint configured)");
        return Ok(());
    };

    let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()?;

    let sampler = if config.enable_trace_sampling {
        Sampler::TraceIdRatioBased(config.trace_sampling_ratio)
    } else {
        Sampler::AlwaysOn
    };

    let resource = Resource::builder()
        .with_service_name("menu-nutrition")
        .with_attributes(
            config
                .tags
                .iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
        )
        .build();

    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(otlp_exporter)
        .with_sampler(sampler)
        .with_resource(resource)
        .build();

    global::set_tracer_provider(tracer_provider);

    tracing::info!(
        otlp_endpoint = %endpoint,
        trace_sampling_enabled = %config.enable_trace_sampling,
        trace_sampling_ratio = %config.trace_sampling_ratio,
        "OpenTelemetry tracing initialized with OTLP export"
    );
    Ok(())
}

/// Create a span for OCR operations
pub fn ocr_span(operation: &str) -> tracing::Span {
    tracing::info_span!("ocr_operation", operation = operation, component = "ocr")
}

/// Create a span for one analysis request
pub fn pipeline_span(operation: &str) -> tracing::Span {
    tracing::info_span!(
        "pipeline_operation",
        operation = operation,
        component = "pipeline"
    )
}

/// Create a span for nutrition lookups
pub fn nutrition_span(operation: &str, source: &str) -> tracing::Span {
    tracing::info_span!(
        "nutrition_operation",
        operation = operation,
        source = source,
        component = "nutrition"
    )
}

/// Create a span for HTTP API requests
pub fn api_span(method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "api_request",
        method = method,
        path = path,
        component = "api"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_builds_for_valid_level() {
        let config = ObservabilityConfig {
            log_level: "debug".to_string(),
            ..Default::default()
        };
        assert!(build_env_filter(&config).is_ok());
    }

    #[test]
    fn test_spans_can_be_created_without_subscriber() {
        let _ = ocr_span("test");
        let _ = pipeline_span("test");
        let _ = nutrition_span("test", "local_table");
        let _ = api_span("GET", "/health");
    }
}
