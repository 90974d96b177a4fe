//! # Observability Configuration
//!
//! Environment-specific configuration for logging, tracing export and metrics.

use std::env;

/// Observability configuration for different environments
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Environment name (development, staging, production)
    pub environment: String,
    /// OTLP endpoint for trace export
    pub otlp_endpoint: Option<String>,
    /// Prometheus metrics endpoint port
    pub metrics_port: u16,
    /// Log level for this crate's targets
    pub log_level: String,
    /// Log output format override ("pretty" or "json")
    pub log_format: Option<String>,
    /// Whether to enable trace sampling
    pub enable_trace_sampling: bool,
    /// Trace sampling ratio (0.0-1.0)
    pub trace_sampling_ratio: f64,
    /// Whether to serve the Prometheus endpoint
    pub enable_metrics_export: bool,
    /// Resource attributes attached to exported traces
    pub tags: Vec<(String, String)>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            otlp_endpoint: None,
            metrics_port: 9090,
            log_level: "info".to_string(),
            log_format: None,
            enable_trace_sampling: false,
            trace_sampling_ratio: 1.0,
            enable_metrics_export: true,
            tags: Vec::new(),
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|e| !e.trim().is_empty()),
            metrics_port: env::var("METRICS_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .unwrap_or(9090),
            log_level: env::var("OBSERVABILITY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").ok().map(|f| f.to_lowercase()),
            enable_trace_sampling: env::var("ENABLE_TRACE_SAMPLING")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            trace_sampling_ratio: env::var("TRACE_SAMPLING_RATIO")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()
                .unwrap_or(1.0),
            enable_metrics_export: env::var("ENABLE_METRICS_EXPORT")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            tags: env::var("OBSERVABILITY_TAGS")
                .map(|t| parse_tags(&t))
                .unwrap_or_default(),
        };
        config.add_default_tags();
        config
    }

    fn add_default_tags(&mut self) {
        self.tags.push(("environment".to_string(), self.environment.clone()));
        self.tags.push(("service".to_string(), "menu-nutrition".to_string()));

        if let Ok(version) = env::var("SERVICE_VERSION") {
            self.tags.push(("version".to_string(), version));
        }
        if let Ok(hostname) = env::var("HOSTNAME") {
            self.tags.push(("hostname".to_string(), hostname));
        }
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Human-readable logs in development or when explicitly requested
    pub fn use_pretty_logs(&self) -> bool {
        match self.log_format.as_deref() {
            Some("pretty") => true,
            Some("json") => false,
            _ => self.is_development(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(endpoint) = &self.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Invalid OTLP endpoint format: {}", endpoint));
            }
        }

        if !(0.0..=1.0).contains(&self.trace_sampling_ratio) {
            return Err(format!(
                "Invalid trace sampling ratio: {}",
                self.trace_sampling_ratio
            ));
        }

        if self.metrics_port == 0 {
            return Err(format!("Invalid metrics port: {}", self.metrics_port));
        }

        if let Some(format) = &self.log_format {
            if format != "pretty" && format != "json" {
                return Err(format!("Invalid LOG_FORMAT '{}', expected pretty or json", format));
            }
        }

        Ok(())
    }
}

/// Parse tags from environment variable string
/// Format: "key1=value1,key2=value2,key3=value3"
fn parse_tags(tags_str: &str) -> Vec<(String, String)> {
    tags_str
        .split(',')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(key), Some(value)) if !key.trim().is_empty() => {
                    Some((key.trim().to_string(), value.trim().to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.enable_trace_sampling);
        assert_eq!(config.trace_sampling_ratio, 1.0);
        assert!(config.enable_metrics_export);
        assert!(config.use_pretty_logs());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ObservabilityConfig::default();
        assert!(config.validate().is_ok());

        config.otlp_endpoint = Some("invalid-endpoint".to_string());
        assert!(config.validate().is_err());

        config.otlp_endpoint = None;
        config.trace_sampling_ratio = 1.5;
        assert!(config.validate().is_err());

        config.trace_sampling_ratio = 1.0;
        config.metrics_port = 0;
        assert!(config.validate().is_err());

        config.metrics_port = 9090;
        config.log_format = Some("xml".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_override() {
        let mut config = ObservabilityConfig {
            environment: "production".to_string(),
            ..Default::default()
        };
        assert!(!config.use_pretty_logs());

        config.log_format = Some("pretty".to_string());
        assert!(config.use_pretty_logs());
    }

    #[test]
    fn test_tag_parsing() {
        let tags = parse_tags("env=prod, version=1.2.3,broken,=x");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0], ("env".to_string(), "prod".to_string()));
        assert_eq!(tags[1], ("version".to_string(), "1.2.3".to_string()));
    }
}
