//! Error types for the Gmail provider

use core_auth::AuthError;
use thiserror::Error;

/// Gmail provider errors
#[derive(Error, Debug)]
pub enum GmailError {
    /// No usable credentials, or refreshing them failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The API rejected the access token
    #[error("Gmail rejected the access token (status {status_code})")]
    Unauthorized { status_code: u16 },

    /// API request returned an error
    #[error("Gmail API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Message not found
    #[error("Message not found: {message_id}")]
    NotFound { message_id: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A single API request exceeded its time budget
    #[error("Gmail API request timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl GmailError {
    /// Stable machine-readable code surfaced to collaborators.
    pub fn code(&self) -> &'static str {
        match self {
            GmailError::Auth(e) => e.code(),
            GmailError::Unauthorized { .. } => "token_rejected",
            GmailError::ApiError { .. } => "api_error",
            GmailError::NotFound { .. } => "not_found",
            GmailError::ParseError(_) => "parse_error",
            GmailError::NetworkError(_) => "network",
            GmailError::Timeout(_) => "timeout",
            GmailError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<bridge_traits::error::BridgeError> for GmailError {
    fn from(error: bridge_traits::error::BridgeError) -> Self {
        if error.is_network() {
            GmailError::NetworkError(error.to_string())
        } else {
            GmailError::ApiError {
                status_code: 0,
                message: error.to_string(),
            }
        }
    }
}

/// Result type for Gmail operations
pub type Result<T> = std::result::Result<T, GmailError>;
