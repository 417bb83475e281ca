//! HTTP response building module
//!
//! Every response the edge function produces goes through here so the CORS
//! header set is attached uniformly.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::http::response::Builder;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::logger;

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Body used when serialization itself fails
const SERIALIZE_FAILED_BODY: &str = r#"{"error":"Failed to serialize response"}"#;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn with_cors(builder: Builder) -> Builder {
    builder
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, CORS_ALLOW_ORIGIN)
        .header(ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS)
}

/// Fallback used when the builder rejects a response; keeps the CORS
/// headers so browsers can still read the failure
fn fallback(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    response
}

fn raw_json(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    with_cors(Response::builder().status(status))
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .body(Full::new(body.clone()))
        .unwrap_or_else(|e| {
            log_build_error(status, &e);
            fallback(status, body)
        })
}

/// Build a JSON response with CORS headers
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => raw_json(status, Bytes::from(json)),
        Err(e) => {
            logger::log_error(&format!("Failed to serialize response: {e}"));
            raw_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(SERIALIZE_FAILED_BODY.as_bytes()),
            )
        }
    }
}

/// Build a `{"error": message}` response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { error: message })
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<Full<Bytes>> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Build the CORS preflight response: headers only, no body, no content type
pub fn build_preflight_response() -> Response<Full<Bytes>> {
    with_cors(Response::builder().status(StatusCode::OK))
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error(StatusCode::OK, &e);
            fallback(StatusCode::OK, Bytes::new())
        })
}

fn log_build_error(status: StatusCode, error: &hyper::http::Error) {
    logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn assert_cors(response: &Response<Full<Bytes>>) {
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_HEADERS],
            "authorization, x-client-info, apikey, content-type"
        );
    }

    #[tokio::test]
    async fn test_405_body_is_exact() {
        let response = build_405_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_cors(&response);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_string(response).await, r#"{"error":"Method not allowed"}"#);
    }

    #[tokio::test]
    async fn test_preflight_has_no_content_type_or_body() {
        let response = build_preflight_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
        assert!(body_string(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_json_response_serializes_body() {
        let response = json_response(StatusCode::OK, &serde_json::json!({"ok": true}));
        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(&response);
        assert_eq!(body_string(response).await, r#"{"ok":true}"#);
    }
}
