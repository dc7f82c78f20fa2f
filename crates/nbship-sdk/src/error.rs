//! Error types for the Nbship SDK

use serde::Deserialize;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

/// Main error type for the Nbship SDK
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure: no usable response was received
    /// (timeout, DNS, connection reset). Never triggers a token refresh.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Missing authentication (no credential stored)
    #[error("Authentication required: {message}")]
    MissingAuthentication { message: String },

    /// Authentication error (token rejected even after refresh)
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// The refresh token itself was rejected; the session is over
    #[error("Session expired: {message}")]
    SessionExpired { message: String },

    /// Authorization error (authenticated but not allowed)
    #[error("Authorization error: {message}")]
    Authorization { message: String },

    /// Response body failed structural validation
    #[error("Invalid response body: {message}")]
    Validation { message: String },

    /// Not found
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Bad request with message
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Invalid client-side request construction
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Error envelope returned by the Nbship API
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error payload inside an [`ErrorResponse`]
#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
