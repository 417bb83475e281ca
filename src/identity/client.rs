// Auth service client
// Looks up the user behind a bearer token via GET {url}/auth/v1/user

use std::time::Duration;

use async_trait::async_trait;
use hyper::StatusCode;
use reqwest::header::{HeaderValue, AUTHORIZATION};

use super::{bearer_token, IdentityError, IdentityProvider, User};

const USER_ENDPOINT: &str = "/auth/v1/user";

/// Longest prefix of an error body kept in `IdentityError::Upstream`
const UPSTREAM_BODY_LIMIT: usize = 256;

/// HTTP client for a GoTrue-compatible auth service.
///
/// Holds no per-caller state: the caller's `Authorization` value is
/// forwarded on every lookup, so one instance serves all requests.
#[derive(Clone)]
pub struct AuthServiceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AuthServiceClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Misconfigured(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_http_client(http, base_url, api_key))
    }

    /// Use a preconfigured `reqwest::Client` (proxy, TLS, pool settings)
    pub fn with_http_client(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn user_url(&self) -> String {
        format!("{}{USER_ENDPOINT}", self.base_url)
    }
}

#[async_trait]
impl IdentityProvider for AuthServiceClient {
    async fn get_user(&self, authorization: Option<&str>) -> Result<Option<User>, IdentityError> {
        let Some(authorization) = authorization.filter(|value| bearer_token(value).is_some())
        else {
            return Ok(None);
        };

        if self.base_url.is_empty() {
            return Err(IdentityError::Misconfigured(
                "service URL is required".to_string(),
            ));
        }

        let forwarded = HeaderValue::from_str(authorization).map_err(|e| {
            IdentityError::Misconfigured(format!("Authorization header is not forwardable: {e}"))
        })?;

        let response = self
            .http
            .get(self.user_url())
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, forwarded)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            let body = body_prefix(response, UPSTREAM_BODY_LIMIT).await;
            return Err(IdentityError::Upstream { status, body });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice::<User>(&bytes)
            .map(Some)
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))
    }
}

/// Read at most `limit` bytes of the body; the rest is never buffered
async fn body_prefix(mut response: reqwest::Response, limit: usize) -> String {
    let mut prefix = Vec::new();
    while prefix.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => prefix.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    prefix.truncate(limit);
    String::from_utf8_lossy(&prefix).into_owned()
}
