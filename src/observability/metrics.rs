//! Metrics collection and Prometheus export module.
//!
//! This module provides:
//! - Rate limiting for HTTP requests
//! - Authentication for metrics endpoints
//! - Prometheus metrics server setup
//! - Recording functions for OCR, matching, nutrition lookups and requests

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use super::health_checks::{perform_readiness_checks, ReadinessState};
use crate::observability_config::ObservabilityConfig;

/// Simple rate limiter for HTTP requests
#[derive(Debug)]
pub struct RateLimiter {
    requests: Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window_secs,
        }
    }

    /// Check if request is allowed for the given IP
    pub fn is_allowed(&self, ip: &str) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(self.window_secs);

        let mut requests = self.requests.lock();
        let client_requests = requests.entry(ip.to_string()).or_default();

        // Remove old requests outside the window
        client_requests.retain(|&time| now.duration_since(time) < window);

        if client_requests.len() >= self.max_requests as usize {
            return false;
        }

        client_requests.push(now);
        true
    }
}

/// Check a `Bearer` token against `METRICS_AUTH_TOKEN`; open when unset
pub fn check_auth<B>(req: &hyper::Request<B>) -> bool {
    let expected_token = match std::env::var("METRICS_AUTH_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => return true,
    };

    req.headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected_token)
}

/// Check request size limit
pub fn check_request_size<B>(req: &hyper::Request<B>) -> bool {
    const MAX_REQUEST_SIZE: u64 = 1024 * 1024; // 1MB limit

    match req.headers().get("content-length") {
        Some(content_length) => content_length
            .to_str()
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .is_some_and(|size| size <= MAX_REQUEST_SIZE),
        // No content-length header (GET requests)
        None => true,
    }
}

/// Initialize metrics collection with Prometheus exporter and configuration
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    tracing::info!(
        metrics_enabled = %config.enable_metrics_export,
        "Metrics collection initialized"
    );
    Ok(handle)
}

fn text_response(status: hyper::StatusCode, body: impl Into<String>) -> hyper::Response<String> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

/// Route one metrics-server request
async fn handle_metrics_request<B>(
    req: hyper::Request<B>,
    peer_ip: &str,
    metrics_handle: &PrometheusHandle,
    rate_limiter: &RateLimiter,
    readiness: &ReadinessState,
) -> hyper::Response<String> {
    if !rate_limiter.is_allowed(peer_ip) {
        return text_response(hyper::StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded");
    }

    if !check_request_size(&req) {
        return text_response(hyper::StatusCode::PAYLOAD_TOO_LARGE, "Request too large");
    }

    if !check_auth(&req) {
        let mut response = text_response(hyper::StatusCode::UNAUTHORIZED, "Unauthorized");
        response.headers_mut().insert(
            "www-authenticate",
            hyper::header::HeaderValue::from_static("Bearer"),
        );
        return response;
    }

    match (req.method(), req.uri().path()) {
        (&hyper::Method::GET, "/metrics") => {
            let mut response = hyper::Response::new(metrics_handle.render());
            response.headers_mut().insert(
                "content-type",
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            response
        }
        // Liveness probe - just check if the service is running
        (&hyper::Method::GET, "/health/live") => hyper::Response::new("OK".to_string()),
        (&hyper::Method::GET, "/health/ready") => match perform_readiness_checks(readiness).await {
            Ok(()) => hyper::Response::new("OK".to_string()),
            Err(e) => text_response(
                hyper::StatusCode::SERVICE_UNAVAILABLE,
                format!("NOT READY: {}", e),
            ),
        },
        _ => text_response(hyper::StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Start the metrics server with liveness and readiness probes
pub async fn start_metrics_server(
    metrics_handle: PrometheusHandle,
    port: u16,
    readiness: Arc<ReadinessState>,
) -> Result<()> {
    // Localhost for security unless explicitly configured
    let bind_all = std::env::var("METRICS_BIND_ALL_INTERFACES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let addr = if bind_all {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)
    } else {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    };

    // 60 requests per minute per IP
    let rate_limiter = Arc::new(RateLimiter::new(60, 60));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, bind_all = %bind_all, "Metrics server listening");

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let metrics_handle = metrics_handle.clone();
                    let rate_limiter = rate_limiter.clone();
                    let readiness = readiness.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                let rate_limiter = rate_limiter.clone();
                                let readiness = readiness.clone();
                                let peer_ip = peer_addr.ip().to_string();
                                async move {
                                    Ok::<_, std::convert::Infallible>(
                                        handle_metrics_request(
                                            req,
                                            &peer_ip,
                                            &metrics_handle,
                                            &rate_limiter,
                                            &readiness,
                                        )
                                        .await,
                                    )
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            crate::errors::error_logging::log_network_error(
                                &err,
                                "serve_http_connection",
                                Some(&peer_addr.to_string()),
                                None,
                            );
                        }
                    });
                }
                Err(e) => {
                    crate::errors::error_logging::log_network_error(
                        &e,
                        "accept_tcp_connection",
                        Some(&addr.to_string()),
                        None,
                    );
                }
            }
        }
    });

    Ok(())
}

/// Parameters for OCR metrics recording
#[derive(Debug, Clone)]
pub struct OcrMetricsParams {
    pub success: bool,
    pub total_duration: Duration,
    pub ocr_duration: Duration,
    pub image_size: u64,
    pub attempt_count: u32,
    pub span_count: usize,
}

/// Record OCR operation metrics
pub fn record_ocr_metrics(params: OcrMetricsParams) {
    let OcrMetricsParams {
        success,
        total_duration,
        ocr_duration,
        image_size,
        attempt_count,
        span_count,
    } = params;

    metrics::counter!("ocr_operations_total", "result" => if success { "success" } else { "failure" }).increment(1);
    metrics::histogram!("ocr_duration_seconds").record(total_duration.as_secs_f64());
    metrics::histogram!("ocr_processing_duration_seconds").record(ocr_duration.as_secs_f64());
    metrics::histogram!("ocr_overhead_duration_seconds")
        .record(total_duration.saturating_sub(ocr_duration).as_secs_f64());
    metrics::histogram!("ocr_image_size_bytes").record(image_size as f64);
    metrics::histogram!("ocr_retry_attempts").record(attempt_count as f64);
    if success {
        metrics::histogram!("ocr_spans_extracted").record(span_count as f64);
    }
}

/// Record which matcher stage answered and with what similarity
pub fn record_match_stage(stage: &str, similarity: f64) {
    let stage = stage.to_string();
    metrics::counter!("menu_match_total", "stage" => stage.clone()).increment(1);
    metrics::histogram!("menu_match_similarity", "stage" => stage).record(similarity);
}

/// Record span counts through the confidence filter for one request
pub fn record_span_counts(detected: usize, admitted: usize, candidates: usize) {
    metrics::histogram!("pipeline_spans_detected").record(detected as f64);
    metrics::histogram!("pipeline_spans_admitted").record(admitted as f64);
    metrics::histogram!("pipeline_menu_candidates").record(candidates as f64);
}

/// Record a nutrition lookup by source and outcome (hit, miss, cache, error, circuit_open)
pub fn record_nutrition_lookup(source: &str, outcome: &str) {
    let source = source.to_string();
    let outcome = outcome.to_string();
    metrics::counter!("nutrition_lookups_total", "source" => source, "outcome" => outcome)
        .increment(1);
}

/// Record the outcome of one analysis request
pub fn record_pipeline_outcome(outcome: &str, duration: Duration) {
    let outcome = outcome.to_string();
    metrics::counter!("pipeline_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("pipeline_duration_seconds").record(duration.as_secs_f64());
}

/// Record HTTP request metrics
pub fn record_request_metrics(method: &str, path: &str, status: u16, duration: Duration) {
    let method = method.to_string();
    let path = path.to_string();
    let status = status.to_string();
    metrics::counter!("requests_total", "method" => method, "path" => path, "status" => status)
        .increment(1);
    metrics::histogram!("request_duration_seconds").record(duration.as_secs_f64());
}

/// Record health check metrics
pub fn record_health_check_metrics(check_type: &str, success: bool, duration: Duration) {
    let check_type = check_type.to_string();
    metrics::counter!("health_checks_total", "type" => check_type.clone(), "result" => if success { "success" } else { "failure" }).increment(1);
    metrics::histogram!("health_check_duration_seconds", "type" => check_type.clone())
        .record(duration.as_secs_f64());
    metrics::gauge!("health_check_status", "type" => check_type).set(if success { 1.0 } else { 0.0 });
}

/// Record application startup metrics
pub fn record_startup_metrics(duration: Duration, vocabulary_entries: usize) {
    metrics::histogram!("application_startup_duration_seconds").record(duration.as_secs_f64());
    metrics::counter!("application_starts_total").increment(1);
    metrics::gauge!("menu_vocabulary_entries").set(vocabulary_entries as f64);
}

/// Update circuit breaker state metrics
pub fn update_circuit_breaker_state(breaker: &str, is_open: bool) {
    let breaker = breaker.to_string();
    metrics::gauge!("circuit_breaker_state", "breaker" => breaker).set(if is_open { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_window() {
        let limiter = RateLimiter::new(2, 60);
        assert!(limiter.is_allowed("127.0.0.1"));
        assert!(limiter.is_allowed("127.0.0.1"));
        assert!(!limiter.is_allowed("127.0.0.1"));
        // Separate budget per client
        assert!(limiter.is_allowed("10.0.0.1"));
    }

    #[test]
    fn test_request_size_check() {
        let small = hyper::Request::builder()
            .header("content-length", "512")
            .body(())
            .unwrap();
        assert!(check_request_size(&small));

        let large = hyper::Request::builder()
            .header("content-length", "10485760")
            .body(())
            .unwrap();
        assert!(!check_request_size(&large));

        let invalid = hyper::Request::builder()
            .header("content-length", "lots")
            .body(())
            .unwrap();
        assert!(!check_request_size(&invalid));

        let none = hyper::Request::builder().body(()).unwrap();
        assert!(check_request_size(&none));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_match_stage("exact", 1.0);
        record_nutrition_lookup("local_table", "hit");
        record_pipeline_outcome("success", Duration::from_millis(5));
        update_circuit_breaker_state("ocr", false);
    }
}
