//! OAuth client configuration.
//!
//! Describes the provider endpoints, client credentials and the loopback
//! redirect the authorization flow listens on. Defaults target Google's
//! OAuth 2.0 endpoints with the read-only Gmail scope.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{AuthError, Result};
use crate::types::CredentialKey;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

pub const DEFAULT_LOOPBACK_HOST: &str = "127.0.0.1";
pub const DEFAULT_LOOPBACK_PORT: u16 = 8080;
pub const DEFAULT_CALLBACK_PATH: &str = "/";

/// Default time to wait for the browser redirect.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

pub const ENV_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";
pub const ENV_LOOPBACK_PORT: &str = "MAILDESK_LOOPBACK_PORT";
pub const ENV_CALLBACK_TIMEOUT_SECS: &str = "MAILDESK_CALLBACK_TIMEOUT_SECS";

/// OAuth 2.0 provider configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Provider label used in logs and events.
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token endpoint URL
    pub token_url: String,
    pub scopes: Vec<String>,
    pub loopback_host: String,
    /// Fixed loopback port. `0` asks the OS for a free port.
    pub loopback_port: u16,
    pub callback_path: String,
    pub callback_timeout: Duration,
    /// Where the single token set is persisted.
    pub credential_key: CredentialKey,
    /// Send and verify a CSRF `state` parameter.
    pub require_state: bool,
    /// Refresh expired access tokens before mailbox calls.
    pub refresh_on_expiry: bool,
}

impl OAuthConfig {
    /// Google configuration with the given client credentials and defaults
    /// for everything else.
    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            provider: "google".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            scopes: vec![GMAIL_READONLY_SCOPE.to_string()],
            loopback_host: DEFAULT_LOOPBACK_HOST.to_string(),
            loopback_port: DEFAULT_LOOPBACK_PORT,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            credential_key: CredentialKey::default(),
            require_state: false,
            refresh_on_expiry: true,
        }
    }

    /// Build the Google configuration from the process environment.
    ///
    /// Reads `GOOGLE_CLIENT_ID` and `GOOGLE_CLIENT_SECRET`, plus optional
    /// `MAILDESK_LOOPBACK_PORT` and `MAILDESK_CALLBACK_TIMEOUT_SECS`. Missing
    /// credentials are left empty so [`validate`](Self::validate) reports them
    /// when a flow starts.
    pub fn from_env() -> Result<Self> {
        let client_id = env::var(ENV_CLIENT_ID).unwrap_or_default();
        let client_secret = env::var(ENV_CLIENT_SECRET).unwrap_or_default();
        let mut config = Self::google(client_id, client_secret);

        if let Ok(port) = env::var(ENV_LOOPBACK_PORT) {
            config.loopback_port = port.trim().parse().map_err(|_| {
                AuthError::Config(format!("{} must be a port number, got '{}'", ENV_LOOPBACK_PORT, port))
            })?;
        }

        if let Ok(secs) = env::var(ENV_CALLBACK_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                AuthError::Config(format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_CALLBACK_TIMEOUT_SECS, secs
                ))
            })?;
            config.callback_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_loopback_port(mut self, port: u16) -> Self {
        self.loopback_port = port;
        self
    }

    pub fn with_endpoints(mut self, auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn with_credential_key(mut self, key: CredentialKey) -> Self {
        self.credential_key = key;
        self
    }

    pub fn with_state(mut self, require_state: bool) -> Self {
        self.require_state = require_state;
        self
    }

    pub fn with_refresh_on_expiry(mut self, refresh: bool) -> Self {
        self.refresh_on_expiry = refresh;
        self
    }

    /// Redirect URI for a listener bound to `port`.
    pub fn redirect_uri_for_port(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.loopback_host, port, self.callback_path)
    }

    /// Redirect URI for the configured port.
    pub fn redirect_uri(&self) -> String {
        self.redirect_uri_for_port(self.loopback_port)
    }

    /// Fail fast on anything that would make the flow unusable.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Config(format!(
                "Missing OAuth client id. Set {} or configure it explicitly.",
                ENV_CLIENT_ID
            )));
        }

        if self.client_secret.trim().is_empty() {
            return Err(AuthError::Config(format!(
                "Missing OAuth client secret. Set {} or configure it explicitly.",
                ENV_CLIENT_SECRET
            )));
        }

        for (name, value) in [("auth_url", &self.auth_url), ("token_url", &self.token_url)] {
            url::Url::parse(value)
                .map_err(|e| AuthError::Config(format!("Invalid {}: {}", name, e)))?;
        }

        if self.scopes.is_empty() {
            return Err(AuthError::Config("At least one scope is required".to_string()));
        }

        if !self.callback_path.starts_with('/') {
            return Err(AuthError::Config(format!(
                "Callback path must start with '/', got '{}'",
                self.callback_path
            )));
        }

        if self.callback_timeout.is_zero() {
            return Err(AuthError::Config(
                "Callback timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri())
            .field("callback_timeout", &self.callback_timeout)
            .field("credential_key", &self.credential_key)
            .field("require_state", &self.require_state)
            .field("refresh_on_expiry", &self.refresh_on_expiry)
            .finish()
    }
}
