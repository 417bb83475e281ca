//! Caller identity resolution
//!
//! The handler only needs "who is calling, if anyone". [`IdentityProvider`]
//! is that seam; [`AuthServiceClient`] implements it against a
//! GoTrue-compatible auth API.

mod client;

pub use client::AuthServiceClient;

use async_trait::async_trait;
use hyper::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// User record returned by the identity backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl User {
    /// Email used to label the caller; an empty email counts as none
    pub fn display_email(&self) -> Option<&str> {
        self.email.as_deref().filter(|email| !email.is_empty())
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity backend misconfigured: {0}")]
    Misconfigured(String),

    #[error("identity backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity backend returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("identity backend returned an invalid user record: {0}")]
    InvalidResponse(String),
}

/// Resolves the caller behind an `Authorization` header value
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means the caller is anonymous: no token, or a token the
    /// backend does not accept.
    async fn get_user(&self, authorization: Option<&str>) -> Result<Option<User>, IdentityError>;
}

/// Extract the token from a `Bearer <token>` header value
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
