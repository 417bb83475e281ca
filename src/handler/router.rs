//! Request dispatch module
//!
//! Entry point for edge function requests: preflight short-circuit, caller
//! identity resolution, method dispatch and uniform error shaping.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{AUTHORIZATION, CONTENT_LENGTH};
use hyper::http::request::Parts;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use serde_json::Value;

use super::error::HandlerError;
use super::types::{Greeting, Receipt, ANONYMOUS, GREETING_MESSAGE, RECEIPT_MESSAGE};
use crate::config::HandlerConfig;
use crate::http;
use crate::identity::{AuthServiceClient, IdentityError, IdentityProvider};
use crate::logger;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of one request: the response plus the caller label it was
/// produced for (`None` when no lookup happened)
pub struct Handled {
    pub response: Response<Full<Bytes>>,
    pub user: Option<String>,
}

/// Stateless request handler.
///
/// Holds only read-only settings and the identity provider, so one instance
/// is shared by every connection.
pub struct RequestHandler {
    config: HandlerConfig,
    identity: Arc<dyn IdentityProvider>,
}

impl RequestHandler {
    pub fn new(config: HandlerConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { config, identity }
    }

    /// Handler backed by the auth service named in `config`
    pub fn with_auth_service(config: HandlerConfig, timeout: Duration) -> Result<Self, IdentityError> {
        let client = AuthServiceClient::new(&config.service_url, &config.service_api_key, timeout)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    /// Produce the response for one request
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        self.handle_request(req).await.response
    }

    /// Produce the response for one request, along with the resolved caller
    pub async fn handle_request<B>(&self, req: Request<B>) -> Handled
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        if req.method() == Method::OPTIONS {
            return Handled {
                response: http::build_preflight_response(),
                user: None,
            };
        }

        let (parts, body) = req.into_parts();

        let user = match self.resolve_user(&parts.headers).await {
            Ok(user) => user,
            Err(e) => {
                return Handled {
                    response: failure_response(&e),
                    user: None,
                }
            }
        };

        let response = match self.dispatch(&parts, body, &user).await {
            Ok(response) => response,
            Err(e) => failure_response(&e),
        };

        Handled {
            response,
            user: Some(user),
        }
    }

    /// Caller label: the user's email, or `"anonymous"`
    async fn resolve_user(&self, headers: &HeaderMap) -> Result<String, HandlerError> {
        let authorization = headers.get(AUTHORIZATION).and_then(|v| match v.to_str() {
            Ok(value) => Some(value),
            Err(_) => {
                logger::log_debug("Ignoring non-ASCII Authorization header");
                None
            }
        });

        match self.identity.get_user(authorization).await {
            Ok(user) => Ok(user
                .as_ref()
                .and_then(|u| u.display_email())
                .unwrap_or(ANONYMOUS)
                .to_string()),
            Err(e) if self.config.strict_identity => Err(e.into()),
            Err(e) => {
                logger::log_warning(&format!("Identity lookup failed, continuing as anonymous: {e}"));
                Ok(ANONYMOUS.to_string())
            }
        }
    }

    async fn dispatch<B>(
        &self,
        parts: &Parts,
        body: B,
        user: &str,
    ) -> Result<Response<Full<Bytes>>, HandlerError>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        match parts.method {
            Method::GET => Ok(http::json_response(
                StatusCode::OK,
                &Greeting {
                    message: GREETING_MESSAGE,
                    user,
                    timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                },
            )),
            Method::POST => {
                let received_data = self.read_json(&parts.headers, body).await?;
                Ok(http::json_response(
                    StatusCode::OK,
                    &Receipt {
                        message: RECEIPT_MESSAGE,
                        received_data,
                        user,
                    },
                ))
            }
            _ => {
                logger::log_debug(&format!("Method not allowed: {}", parts.method));
                Ok(http::build_405_response())
            }
        }
    }

    /// Collect the body within `max_body_size` and parse it as JSON
    async fn read_json<B>(&self, headers: &HeaderMap, body: B) -> Result<Value, HandlerError>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let limit = self.config.max_body_size;
        check_content_length(headers, limit)?;

        let bytes = Limited::new(body, usize::try_from(limit).unwrap_or(usize::MAX))
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    HandlerError::BodyTooLarge { limit }
                } else {
                    HandlerError::BodyRead(e.to_string())
                }
            })?
            .to_bytes();

        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Reject early when the declared length is already over the limit
fn check_content_length(headers: &HeaderMap, limit: u64) -> Result<(), HandlerError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match declared {
        Some(size) if size > limit => Err(HandlerError::BodyTooLarge { limit }),
        _ => Ok(()),
    }
}

fn failure_response(error: &HandlerError) -> Response<Full<Bytes>> {
    logger::log_error(&error.to_string());
    http::error_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
}
