//! Error types for the webhook handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Reasons a webhook delivery is refused.
///
/// Only transport authorization refuses a delivery. Parse and processing
/// failures are acknowledged with 200 so providers do not retry forever.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    /// No secret or credentials configured for this provider.
    #[error("webhook not configured")]
    NotConfigured,

    /// The signature header is missing.
    #[error("missing signature header")]
    MissingSignature,

    /// The signature header is not valid hex.
    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    /// HMAC verification failed.
    #[error("invalid signature")]
    InvalidSignature,

    /// Basic credentials are missing or wrong.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The caller's address is not on the allowlist.
    #[error("address not allowed: {0}")]
    AddressNotAllowed(String),
}

impl WebhookError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        // Never say which check failed.
        (self.status_code(), "Unauthorized").into_response()
    }
}
