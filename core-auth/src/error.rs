use thiserror::Error;

/// Sub-reason for a failed code-for-token exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeFailure {
    /// The provider rejected the code (bad, expired or already used).
    InvalidGrant,
    /// The token endpoint could not be reached.
    Network,
    /// Any other non-success status or a malformed response body.
    ProviderError,
}

impl ExchangeFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeFailure::InvalidGrant => "invalid_grant",
            ExchangeFailure::Network => "network",
            ExchangeFailure::ProviderError => "provider_error",
        }
    }
}

impl std::fmt::Display for ExchangeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind callback listener on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("An authorization flow is already in progress")]
    AlreadyInProgress,

    #[error("Authorization denied: {error}{}", parenthesized(.description))]
    AuthDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Token exchange failed ({reason}): {message}")]
    Exchange {
        reason: ExchangeFailure,
        message: String,
    },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Secure storage unavailable: {0}")]
    Storage(String),

    #[error("Stored credentials are corrupted: {0}")]
    TokenCorrupted(String),

    #[error("Not authorized: no stored credentials")]
    NotAuthorized,

    #[error("Timed out after {0}s waiting for the authorization callback")]
    CallbackTimeout(u64),

    #[error("Authorization was cancelled")]
    Cancelled,

    #[error("State parameter mismatch in authorization callback")]
    StateMismatch,

    #[error("Failed to open authorization page: {0}")]
    BrowserLaunch(String),
}

impl AuthError {
    pub(crate) fn exchange(reason: ExchangeFailure, message: impl Into<String>) -> Self {
        AuthError::Exchange {
            reason,
            message: message.into(),
        }
    }

    /// Stable machine-readable code surfaced to collaborators.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Config(_) => "config_error",
            AuthError::Bind { .. } => "bind_error",
            AuthError::AlreadyInProgress => "already_in_progress",
            AuthError::AuthDenied { .. } => "auth_denied",
            AuthError::Exchange { reason, .. } => reason.as_str(),
            AuthError::TokenRefreshFailed(_) => "token_refresh_failed",
            AuthError::Storage(_) => "storage_error",
            AuthError::TokenCorrupted(_) => "token_corrupted",
            AuthError::NotAuthorized => "not_authorized",
            AuthError::CallbackTimeout(_) => "callback_timeout",
            AuthError::Cancelled => "cancelled",
            AuthError::StateMismatch => "state_mismatch",
            AuthError::BrowserLaunch(_) => "browser_launch_failed",
        }
    }

    /// Whether starting a new flow can clear the error without a config change.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AuthError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

fn parenthesized(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_codes() {
        let err = AuthError::exchange(ExchangeFailure::InvalidGrant, "Bad Request");
        assert_eq!(err.code(), "invalid_grant");
        assert_eq!(
            err.to_string(),
            "Token exchange failed (invalid_grant): Bad Request"
        );

        assert_eq!(
            AuthError::exchange(ExchangeFailure::Network, "refused").code(),
            "network"
        );
        assert_eq!(
            AuthError::exchange(ExchangeFailure::ProviderError, "500").code(),
            "provider_error"
        );
    }

    #[test]
    fn test_denied_display() {
        let err = AuthError::AuthDenied {
            error: "access_denied".to_string(),
            description: Some("User declined".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Authorization denied: access_denied (User declined)"
        );

        let err = AuthError::AuthDenied {
            error: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(err.to_string(), "Authorization denied: access_denied");
    }

    #[test]
    fn test_recoverability() {
        assert!(!AuthError::Config("missing client id".to_string()).is_recoverable());
        assert!(AuthError::CallbackTimeout(120).is_recoverable());
        assert!(AuthError::AlreadyInProgress.is_recoverable());
    }
}
