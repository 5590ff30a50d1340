//! OAuth 2.0 Authorization Code Grant (RFC 6749 §4.1) against a loopback
//! redirect.
//!
//! # Overview
//!
//! [`TokenExchangeClient`] handles:
//! - Building the consent URL the user is sent to
//! - Exchanging the captured authorization code for a [`TokenSet`]
//! - Refreshing an expired access token
//!
//! Every token endpoint call is a single attempt. Failures are reported to
//! the caller, who decides whether to start over.
//!
//! # Security
//!
//! - Never logs sensitive values (tokens, codes, client secret)
//! - Optional `state` parameter for CSRF protection
//!
//! # Example
//!
//! ```no_run
//! use core_auth::{OAuthConfig, TokenExchangeClient};
//! use std::sync::Arc;
//!
//! # async fn example(http_client: Arc<dyn bridge_traits::HttpClient>) -> core_auth::Result<()> {
//! let config = OAuthConfig::google("client-id", "client-secret");
//! let client = TokenExchangeClient::new(config.clone(), http_client);
//!
//! let auth_url = client.build_authorization_url(&config.redirect_uri(), None)?;
//! // Open auth_url, capture `code` on the loopback listener...
//! # let code = "4/0A...";
//! let tokens = client.exchange(code, &config.redirect_uri()).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::OAuthConfig;
use crate::error::{AuthError, ExchangeFailure, Result};
use crate::types::TokenSet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::time::{Clock, SystemClock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Generate a random URL-safe `state` value (16 bytes of entropy).
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; 16];
    rand::thread_rng().fill(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// Client for the provider's authorization and token endpoints.
pub struct TokenExchangeClient {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
}

#[derive(Serialize)]
struct AuthorizationCodeRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
}

#[derive(Serialize)]
struct RefreshTokenRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Token response from the OAuth provider.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// RFC 6749 §5.2 error body.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenExchangeClient {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_clock(config, http_client, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: OAuthConfig,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            http_client,
            clock,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the consent page URL.
    ///
    /// Always requests offline access with a forced consent prompt so Google
    /// issues a refresh token on every sign-in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the authorization endpoint is not a
    /// valid URL.
    #[instrument(skip(self, state), fields(provider = %self.config.provider))]
    pub fn build_authorization_url(&self, redirect_uri: &str, state: Option<&str>) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Config(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("access_type", "offline");
            query.append_pair("prompt", "consent");
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }

        debug!(redirect_uri, with_state = state.is_some(), "Built authorization URL");

        Ok(url.to_string())
    }

    /// Exchange an authorization code for a token set.
    ///
    /// Sends exactly one form POST to the token endpoint.
    ///
    /// # Errors
    ///
    /// `AuthError::Exchange` with reason:
    /// - `InvalidGrant` when the provider rejects the code
    /// - `Network` when the endpoint cannot be reached
    /// - `ProviderError` for any other error status or an unreadable body
    #[instrument(skip(self, code), fields(provider = %self.config.provider))]
    pub async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<TokenSet> {
        let form = AuthorizationCodeRequest {
            grant_type: "authorization_code",
            code,
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            redirect_uri,
        };

        debug!("Exchanging authorization code for tokens");

        let response = self.post_form(&form).await.map_err(|e| {
            warn!(error = %e, "Token endpoint request failed");
            let reason = if e.is_network() {
                ExchangeFailure::Network
            } else {
                ExchangeFailure::ProviderError
            };
            AuthError::exchange(reason, e.to_string())
        })?;

        if !response.is_success() {
            let (reason, message) = classify_error_response(&response);
            warn!(
                status = response.status,
                reason = %reason,
                "Token exchange rejected by provider"
            );
            return Err(AuthError::exchange(reason, message));
        }

        let tokens = self.parse_token_response(&response).map_err(|message| {
            warn!(error = %message, "Malformed token response");
            AuthError::exchange(ExchangeFailure::ProviderError, message)
        })?;

        info!(
            has_refresh_token = tokens.has_refresh_token(),
            expires_at = ?tokens.expires_at,
            "Exchanged authorization code for tokens"
        );

        Ok(tokens)
    }

    /// Obtain a fresh access token with a refresh token.
    ///
    /// Single attempt. When the provider does not rotate the refresh token,
    /// the one passed in is carried over into the returned set.
    #[instrument(skip(self, refresh_token), fields(provider = %self.config.provider))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let form = RefreshTokenRequest {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
        };

        debug!("Refreshing access token");

        let response = self
            .post_form(&form)
            .await
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

        if !response.is_success() {
            let (_, message) = classify_error_response(&response);
            warn!(status = response.status, "Token refresh rejected by provider");
            return Err(AuthError::TokenRefreshFailed(message));
        }

        let mut tokens = self
            .parse_token_response(&response)
            .map_err(AuthError::TokenRefreshFailed)?;

        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }

        info!(expires_at = ?tokens.expires_at, "Refreshed access token");

        Ok(tokens)
    }

    async fn post_form<T: Serialize>(
        &self,
        form: &T,
    ) -> std::result::Result<HttpResponse, BridgeError> {
        let request = HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
            .header("Accept", "application/json")
            .form(form)?;

        self.http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
    }

    fn parse_token_response(&self, response: &HttpResponse) -> std::result::Result<TokenSet, String> {
        let body: TokenResponse = response
            .json()
            .map_err(|e| format!("Failed to parse token response: {}", e))?;

        if body.access_token.is_empty() {
            return Err("Token response carried an empty access token".to_string());
        }

        Ok(TokenSet::new(
            body.access_token,
            body.refresh_token,
            body.expires_in,
            self.clock.now(),
        )
        .with_scope(body.scope)
        .with_token_type(body.token_type))
    }
}

fn classify_error_response(response: &HttpResponse) -> (ExchangeFailure, String) {
    match response.json::<OAuthErrorResponse>() {
        Ok(body) => {
            let reason = if body.error == "invalid_grant" {
                ExchangeFailure::InvalidGrant
            } else {
                ExchangeFailure::ProviderError
            };
            let message = match body.error_description {
                Some(description) => format!(
                    "Token endpoint returned {}: {} ({})",
                    response.status, body.error, description
                ),
                None => format!("Token endpoint returned {}: {}", response.status, body.error),
            };
            (reason, message)
        }
        Err(_) => (
            ExchangeFailure::ProviderError,
            format!("Token endpoint returned {}", response.status),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bytes::Bytes;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_with_retry(
                &self,
                request: HttpRequest,
                policy: RetryPolicy,
            ) -> BridgeResult<HttpResponse>;
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn test_config() -> OAuthConfig {
        OAuthConfig::google("test-client", "test-secret")
            .with_endpoints("https://provider.test/auth", "https://provider.test/token")
    }

    fn client_with(mock: MockHttpClient) -> TokenExchangeClient {
        TokenExchangeClient::with_clock(
            test_config(),
            Arc::new(mock),
            Arc::new(FixedClock(issued_at())),
        )
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn form_fields(request: &HttpRequest) -> HashMap<String, String> {
        let body = request.body.clone().unwrap_or_default();
        serde_urlencoded::from_bytes(&body).unwrap()
    }

    #[test]
    fn test_build_authorization_url() {
        let client = client_with(MockHttpClient::new());
        let url = client
            .build_authorization_url("http://127.0.0.1:8080/", None)
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

        assert_eq!(parsed.host_str(), Some("provider.test"));
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "test-client");
        assert_eq!(query["redirect_uri"], "http://127.0.0.1:8080/");
        assert_eq!(
            query["scope"],
            "https://www.googleapis.com/auth/gmail.readonly"
        );
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["prompt"], "consent");
        assert!(!query.contains_key("state"));
        assert!(!url.contains("test-secret"));
    }

    #[test]
    fn test_build_authorization_url_joins_scopes_and_state() {
        let config = test_config().with_scopes(vec!["scope1".to_string(), "scope2".to_string()]);
        let client = TokenExchangeClient::new(config, Arc::new(MockHttpClient::new()));

        let url = client
            .build_authorization_url("http://127.0.0.1:8080/", Some("abc"))
            .unwrap();

        // URL encoding can use either + or %20 for spaces
        assert!(url.contains("scope=scope1+scope2") || url.contains("scope=scope1%20scope2"));
        assert!(url.contains("state=abc"));
    }

    #[test]
    fn test_build_authorization_url_invalid_endpoint() {
        let config = test_config().with_endpoints("not a valid url", "https://provider.test/token");
        let client = TokenExchangeClient::new(config, Arc::new(MockHttpClient::new()));

        let err = client
            .build_authorization_url("http://127.0.0.1:8080/", None)
            .unwrap_err();
        assert_eq!(err.code(), "config_error");
    }

    #[test]
    fn test_generate_state_is_random() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 22);
        assert!(!a.contains('=') && !a.contains('+') && !a.contains('/'));
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry()
            .times(1)
            .withf(|request, policy| {
                let fields = form_fields(request);
                policy.max_attempts == 1
                    && request.method == HttpMethod::Post
                    && request.url == "https://provider.test/token"
                    && request.headers.get("Content-Type").map(String::as_str)
                        == Some("application/x-www-form-urlencoded")
                    && fields["grant_type"] == "authorization_code"
                    && fields["code"] == "abc123"
                    && fields["client_id"] == "test-client"
                    && fields["client_secret"] == "test-secret"
                    && fields["redirect_uri"] == "http://127.0.0.1:8080/"
            })
            .returning(|_, _| {
                Ok(response(
                    200,
                    r#"{"access_token":"ya29.token","refresh_token":"1//refresh","expires_in":3599,"scope":"https://www.googleapis.com/auth/gmail.readonly","token_type":"Bearer"}"#,
                ))
            });

        let tokens = client_with(mock)
            .exchange("abc123", "http://127.0.0.1:8080/")
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "ya29.token");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(tokens.expires_at, Some(issued_at() + Duration::seconds(3599)));
        assert_eq!(tokens.token_type.as_deref(), Some("Bearer"));
    }

    #[tokio::test]
    async fn test_exchange_invalid_grant() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry().times(1).returning(|_, _| {
            Ok(response(
                400,
                r#"{"error":"invalid_grant","error_description":"Bad Request"}"#,
            ))
        });

        let err = client_with(mock)
            .exchange("bad", "http://127.0.0.1:8080/")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthError::Exchange {
                reason: ExchangeFailure::InvalidGrant,
                ..
            }
        ));
        assert!(err.to_string().contains("Bad Request"));
    }

    #[tokio::test]
    async fn test_exchange_other_oauth_error_is_provider_error() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry()
            .times(1)
            .returning(|_, _| Ok(response(401, r#"{"error":"invalid_client"}"#)));

        let err = client_with(mock)
            .exchange("abc", "http://127.0.0.1:8080/")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "provider_error");
    }

    #[tokio::test]
    async fn test_exchange_server_error_is_not_retried() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry()
            .times(1)
            .returning(|_, _| Ok(response(503, "<html>unavailable</html>")));

        let err = client_with(mock)
            .exchange("abc", "http://127.0.0.1:8080/")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "provider_error");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_exchange_network_failure() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry()
            .times(1)
            .returning(|_, _| Err(BridgeError::Network("connection refused".to_string())));

        let err = client_with(mock)
            .exchange("abc", "http://127.0.0.1:8080/")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "network");
    }

    #[tokio::test]
    async fn test_exchange_malformed_success_body() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry()
            .times(1)
            .returning(|_, _| Ok(response(200, r#"{"token":"nope"}"#)));

        let err = client_with(mock)
            .exchange("abc", "http://127.0.0.1:8080/")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "provider_error");
    }

    #[tokio::test]
    async fn test_refresh_keeps_existing_refresh_token() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry()
            .times(1)
            .withf(|request, policy| {
                let fields = form_fields(request);
                policy.max_attempts == 1
                    && fields["grant_type"] == "refresh_token"
                    && fields["refresh_token"] == "1//refresh"
            })
            .returning(|_, _| {
                Ok(response(
                    200,
                    r#"{"access_token":"ya29.new","expires_in":3599,"token_type":"Bearer"}"#,
                ))
            });

        let tokens = client_with(mock).refresh("1//refresh").await.unwrap();

        assert_eq!(tokens.access_token, "ya29.new");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute_with_retry().times(1).returning(|_, _| {
            Ok(response(
                400,
                r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
            ))
        });

        let err = client_with(mock).refresh("1//revoked").await.unwrap_err();
        assert_eq!(err.code(), "token_refresh_failed");
        assert!(err.to_string().contains("revoked"));
    }
}
