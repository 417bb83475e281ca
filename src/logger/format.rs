//! Access log format module
//!
//! Supported formats:
//! - `combined` (Apache/Nginx combined format)
//! - `common` (Common Log Format - CLF)
//! - `json` (one JSON object per line)
//! - Custom patterns with `$variable` substitution

use chrono::{DateTime, Local};
use serde::Serialize;

const CLF_TIME: &str = "%d/%b/%Y:%H:%M:%S %z";

/// One handled request, as written to the access log
#[derive(Debug, Clone, Serialize)]
pub struct AccessLogEntry {
    pub remote_addr: String,
    /// Caller identity resolved from the bearer token, when known
    pub remote_user: Option<String>,
    pub time: DateTime<Local>,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub http_version: String,
    pub status: u16,
    pub body_bytes: usize,
    pub user_agent: Option<String>,
    /// Request processing time in microseconds
    pub request_time_us: u64,
}

impl AccessLogEntry {
    /// Create a new access log entry stamped with the current time
    pub fn new(remote_addr: String, method: String, path: String) -> Self {
        Self {
            remote_addr,
            remote_user: None,
            time: Local::now(),
            method,
            path,
            query: None,
            http_version: "1.1".to_string(),
            status: 200,
            body_bytes: 0,
            user_agent: None,
            request_time_us: 0,
        }
    }

    /// Format the log entry according to the specified format
    pub fn format(&self, format: &str) -> String {
        match format {
            "combined" => format!(
                "{} \"-\" \"{}\"",
                self.format_common(),
                self.user_agent.as_deref().unwrap_or("-")
            ),
            "common" => self.format_common(),
            "json" => serde_json::to_string(self).unwrap_or_else(|_| self.format_common()),
            custom => self.format_custom(custom),
        }
    }

    fn request_uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    /// `$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent`
    fn format_common(&self) -> String {
        format!(
            "{} - {} [{}] \"{} {} HTTP/{}\" {} {}",
            self.remote_addr,
            self.remote_user.as_deref().unwrap_or("-"),
            self.time.format(CLF_TIME),
            self.method,
            self.request_uri(),
            self.http_version,
            self.status,
            self.body_bytes,
        )
    }

    /// Custom format with variable substitution
    ///
    /// Supported variables: `$remote_addr`, `$remote_user`, `$time_local`,
    /// `$time_iso8601`, `$request`, `$request_method`, `$request_uri`,
    /// `$request_time` (seconds, 3 decimals), `$status`, `$body_bytes_sent`,
    /// `$http_user_agent`.
    fn format_custom(&self, pattern: &str) -> String {
        let request_uri = self.request_uri();
        let request_line = format!("{} {request_uri} HTTP/{}", self.method, self.http_version);
        #[allow(clippy::cast_precision_loss)]
        let request_time = self.request_time_us as f64 / 1_000_000.0;

        // Longer names first: $request_time and $request_method before $request
        pattern
            .replace("$remote_addr", &self.remote_addr)
            .replace("$remote_user", self.remote_user.as_deref().unwrap_or("-"))
            .replace("$time_local", &self.time.format(CLF_TIME).to_string())
            .replace("$time_iso8601", &self.time.to_rfc3339())
            .replace("$request_time", &format!("{request_time:.3}"))
            .replace("$request_method", &self.method)
            .replace("$request_uri", &request_uri)
            .replace("$request", &request_line)
            .replace("$status", &self.status.to_string())
            .replace("$body_bytes_sent", &self.body_bytes.to_string())
            .replace("$http_user_agent", self.user_agent.as_deref().unwrap_or("-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_entry() -> AccessLogEntry {
        let mut entry = AccessLogEntry::new(
            "192.168.1.1".to_string(),
            "POST".to_string(),
            "/functions/v1/hello".to_string(),
        );
        entry.remote_user = Some("a@b.com".to_string());
        entry.query = Some("debug=1".to_string());
        entry.body_bytes = 87;
        entry.user_agent = Some("curl/8.5.0".to_string());
        entry.request_time_us = 12_000;
        entry
    }

    #[test]
    fn test_format_combined() {
        let log = create_test_entry().format("combined");
        assert!(log.starts_with("192.168.1.1 - a@b.com ["));
        assert!(log.contains("\"POST /functions/v1/hello?debug=1 HTTP/1.1\" 200 87"));
        assert!(log.ends_with("\"-\" \"curl/8.5.0\""));
    }

    #[test]
    fn test_format_common_anonymous() {
        let mut entry = create_test_entry();
        entry.remote_user = None;
        let log = entry.format("common");
        assert!(log.starts_with("192.168.1.1 - - ["));
        assert!(!log.contains("curl/8.5.0"));
    }

    #[test]
    fn test_format_json() {
        let log = create_test_entry().format("json");
        let value: serde_json::Value = serde_json::from_str(&log).unwrap();
        assert_eq!(value["remote_user"], "a@b.com");
        assert_eq!(value["method"], "POST");
        assert_eq!(value["status"], 200);
        assert_eq!(value["body_bytes"], 87);
    }

    #[test]
    fn test_format_custom() {
        let log = create_test_entry().format("$request_method $remote_user $status $request_time");
        assert_eq!(log, "POST a@b.com 200 0.012");
    }
}
