// Response payloads of the edge function

use serde::Serialize;
use serde_json::Value;

pub const GREETING_MESSAGE: &str = "Hello from Edge Functions!";
pub const RECEIPT_MESSAGE: &str = "Data received successfully";
pub const ANONYMOUS: &str = "anonymous";

/// GET response
#[derive(Debug, Serialize)]
pub struct Greeting<'a> {
    pub message: &'static str,
    pub user: &'a str,
    /// RFC 3339 UTC time, millisecond precision
    pub timestamp: String,
}

/// POST response, echoing the parsed body back
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt<'a> {
    pub message: &'static str,
    pub received_data: Value,
    pub user: &'a str,
}
