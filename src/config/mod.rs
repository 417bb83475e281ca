// Configuration module entry point
// Layered loading: config file, SERVER__* overrides, SERVICE_* variables, defaults

mod types;

use std::net::SocketAddr;
use std::time::Duration;

pub use types::{Config, HandlerConfig};

/// Environment variable holding the identity backend base URL
pub const SERVICE_URL_VAR: &str = "SERVICE_URL";
/// Environment variable holding the identity backend public key
pub const SERVICE_ANON_KEY_VAR: &str = "SERVICE_ANON_KEY";

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::load_with_service_env(
            config_path,
            std::env::var(SERVICE_URL_VAR).ok(),
            std::env::var(SERVICE_ANON_KEY_VAR).ok(),
        )
    }

    fn load_with_service_env(
        config_path: &str,
        service_url: Option<String>,
        service_anon_key: Option<String>,
    ) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("SERVER").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.max_body_size", 1_048_576)? // 1MB
            .set_default("service.url", "")?
            .set_default("service.anon_key", "")?
            .set_default("service.timeout_secs", 10)?
            .set_default("service.strict_identity", false)?
            .set_override_option("service.url", service_url)?
            .set_override_option("service.anon_key", service_anon_key)?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Connection lifetime bound, the larger of the read and write timeouts
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(std::cmp::max(
            self.performance.read_timeout,
            self.performance.write_timeout,
        ))
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_secs)
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            service_url: self.service.url.clone(),
            service_api_key: self.service.anon_key.clone(),
            strict_identity: self.service.strict_identity,
            max_body_size: self.http.max_body_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING: &str = "definitely-not-a-config-file";

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load_with_service_env(MISSING, None, None).unwrap();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert_eq!(cfg.http.max_body_size, 1_048_576);
        assert_eq!(cfg.service.url, "");
        assert_eq!(cfg.service.anon_key, "");
        assert!(!cfg.service.strict_identity);
        assert_eq!(cfg.get_socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_service_env_overrides() {
        let cfg = Config::load_with_service_env(
            MISSING,
            Some("https://auth.example.com".to_string()),
            Some("anon-123".to_string()),
        )
        .unwrap();

        let handler = cfg.handler_config();
        assert_eq!(handler.service_url, "https://auth.example.com");
        assert_eq!(handler.service_api_key, "anon-123");
        assert_eq!(handler.max_body_size, cfg.http.max_body_size);
    }

    #[test]
    fn test_connection_timeout_uses_larger_value() {
        let mut cfg = Config::load_with_service_env(MISSING, None, None).unwrap();
        cfg.performance.read_timeout = 5;
        cfg.performance.write_timeout = 12;
        assert_eq!(cfg.connection_timeout(), Duration::from_secs(12));
    }
}
