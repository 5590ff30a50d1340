use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds before the real expiry at which an access token is treated as
/// expired.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 300;

pub const DEFAULT_CREDENTIAL_SERVICE: &str = "maildesk";
pub const DEFAULT_CREDENTIAL_ACCOUNT: &str = "gmail-oauth-token";

/// Address of the stored token set in the secure store.
///
/// Exactly one account is stored, so a single fixed key is used for the
/// lifetime of the application.
///
/// # Examples
///
/// ```
/// use core_auth::CredentialKey;
///
/// let key = CredentialKey::default();
/// assert_eq!(key.service, "maildesk");
/// assert_eq!(key.account, "gmail-oauth-token");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
    pub service: String,
    pub account: String,
}

impl CredentialKey {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl Default for CredentialKey {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIAL_SERVICE, DEFAULT_CREDENTIAL_ACCOUNT)
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.account)
    }
}

/// OAuth 2.0 token set.
///
/// Produced by a successful code exchange or refresh and persisted as a
/// single versioned record.
///
/// # Security
///
/// Tokens should be stored securely and never logged. The `Debug` implementation
/// redacts sensitive information.
///
/// # Examples
///
/// ```
/// use core_auth::TokenSet;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let tokens = TokenSet::new("ya29.a0...", Some("1//0g...".to_string()), Some(3600), now);
///
/// assert!(!tokens.is_expired_at(now));
/// assert!(tokens.is_expired_at(now + Duration::minutes(56)));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// The access token used for API requests
    pub access_token: String,
    /// Google only returns one when `access_type=offline` and consent was shown
    pub refresh_token: Option<String>,
    /// When the access token expires (UTC), in whole seconds
    pub expires_at: Option<DateTime<Utc>>,
    /// Space-separated scopes actually granted
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

impl TokenSet {
    /// Create a token set from an endpoint response.
    ///
    /// `expires_in` is relative to `issued_at`; the absolute instant is what
    /// gets stored. It is truncated to whole seconds, the precision of the
    /// stored record.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in
                .map(|secs| (issued_at + Duration::seconds(secs)).trunc_subsecs(0)),
            scope: None,
            token_type: None,
        }
    }

    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_token_type(mut self, token_type: Option<String>) -> Self {
        self.token_type = token_type;
        self
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Expired, or expiring within the default buffer, as of `now`.
    ///
    /// A token set without an expiry is never considered expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_expired_with_buffer(now, DEFAULT_EXPIRY_BUFFER_SECS)
    }

    pub fn is_expired_with_buffer(&self, now: DateTime<Utc>, buffer_seconds: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at - Duration::seconds(buffer_seconds),
            None => false,
        }
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Outcome captured from the provider's redirect to the loopback listener.
#[derive(Clone, PartialEq, Eq)]
pub enum CallbackResult {
    /// The user approved; carries the one-time authorization code.
    Code { code: String, state: Option<String> },
    /// The provider redirected with `error=...`.
    Denied {
        error: String,
        description: Option<String>,
        state: Option<String>,
    },
}

impl CallbackResult {
    pub fn state(&self) -> Option<&str> {
        match self {
            CallbackResult::Code { state, .. } | CallbackResult::Denied { state, .. } => {
                state.as_deref()
            }
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, CallbackResult::Code { .. })
    }
}

impl fmt::Debug for CallbackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackResult::Code { state, .. } => f
                .debug_struct("Code")
                .field("code", &"[REDACTED]")
                .field("state", state)
                .finish(),
            CallbackResult::Denied {
                error,
                description,
                state,
            } => f
                .debug_struct("Denied")
                .field("error", error)
                .field("description", description)
                .field("state", state)
                .finish(),
        }
    }
}
