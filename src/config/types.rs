// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub service: ServiceConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub max_body_size: u64,
}

/// Identity backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Base URL of the auth service, e.g. `https://project.example.co`
    pub url: String,
    /// Public (anon) API key sent as the `apikey` header
    pub anon_key: String,
    /// Timeout for a single user lookup
    pub timeout_secs: u64,
    /// Turn identity lookup failures into 500 responses instead of
    /// treating the caller as anonymous
    #[serde(default)]
    pub strict_identity: bool,
}

/// Settings the request handler is constructed with.
///
/// Built from [`Config`] once at startup so the handler never reads the
/// process environment itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub service_url: String,
    pub service_api_key: String,
    pub strict_identity: bool,
    pub max_body_size: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            service_api_key: String::new(),
            strict_identity: false,
            max_body_size: 1_048_576,
        }
    }
}
