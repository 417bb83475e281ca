use thiserror::Error;

use crate::identity::IdentityError;

/// Failures that end a request with a 500 `{"error": ...}` response.
///
/// The `Display` text is what the caller sees in the `error` field.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error(transparent)]
    Identity(#[from] IdentityError),
}
