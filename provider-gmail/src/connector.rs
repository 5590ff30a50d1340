//! Gmail API connector implementation
//!
//! Lists the newest messages of the signed-in mailbox and resolves each one
//! to a [`ResourceSummary`] through the Gmail REST API v1.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_auth::TokenProvider;
use core_runtime::config::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_FETCHES};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{GmailError, Result};
use crate::types::{GmailMessage, MessageListResponse, ResourceSummary, SUMMARY_HEADERS};

/// Gmail API base URL
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Upper bound for `maxResults` accepted by `users.messages.list`
pub const MAX_RESULTS_LIMIT: u32 = 500;

/// Gmail API connector
///
/// # Features
///
/// - One index request, then per-message metadata requests fanned out with
///   a concurrency cap
/// - Results keep the order of the index response
/// - The first failing request fails the whole listing; the remaining
///   requests are dropped
/// - Every request is sent once and bounded by its own timeout
///
/// # Example
///
/// ```ignore
/// use provider_gmail::GmailConnector;
///
/// let connector = GmailConnector::new(http_client, coordinator);
/// let inbox = connector.list_messages(10).await?;
/// ```
pub struct GmailConnector {
    http_client: Arc<dyn HttpClient>,
    token_provider: Arc<dyn TokenProvider>,
    api_base: String,
    max_concurrent: usize,
    fetch_timeout: Duration,
}

impl GmailConnector {
    /// Create a connector with the default fan-out width and request timeout.
    pub fn new(http_client: Arc<dyn HttpClient>, token_provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            http_client,
            token_provider,
            api_base: GMAIL_API_BASE.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Override the fan-out width (at least 1) and per-request timeout.
    pub fn with_limits(mut self, max_concurrent: usize, fetch_timeout: Duration) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Point the connector at a different API root (tests, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// List up to `max_results` of the newest messages.
    ///
    /// `0` returns an empty list without touching credentials or the
    /// network. Values above [`MAX_RESULTS_LIMIT`] are clamped.
    ///
    /// # Errors
    ///
    /// - `Auth(NotAuthorized)` when no credentials are stored
    /// - `Unauthorized` when Gmail rejects the access token
    /// - `Timeout`, `NetworkError`, `ApiError`, `ParseError` from any request
    #[instrument(skip(self))]
    pub async fn list_messages(&self, max_results: u32) -> Result<Vec<ResourceSummary>> {
        if max_results == 0 {
            debug!("Zero messages requested, skipping API calls");
            return Ok(Vec::new());
        }

        let limit = max_results.min(MAX_RESULTS_LIMIT);
        if limit < max_results {
            debug!(requested = max_results, limit, "Clamping maxResults");
        }

        let tokens = self.token_provider.current_tokens().await?;
        let access_token = tokens.access_token.as_str();

        let mut url = self.messages_url(&[])?;
        url.query_pairs_mut()
            .append_pair("maxResults", &limit.to_string());

        let response = self.send(url, access_token, None).await?;
        let index: MessageListResponse = parse_json(&response)?;

        let mut refs = index.messages;
        refs.truncate(limit as usize);
        debug!(count = refs.len(), "Fetching message metadata");

        let summaries: Vec<ResourceSummary> = stream::iter(refs)
            .map(|message| self.fetch_summary(access_token, message.id))
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        info!(returned = summaries.len(), "Listed messages");
        Ok(summaries)
    }

    /// Fetch one message summary by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when Gmail answers 404, otherwise the same errors
    /// as [`list_messages`](Self::list_messages).
    #[instrument(skip(self))]
    pub async fn get_message(&self, message_id: &str) -> Result<ResourceSummary> {
        if message_id.trim().is_empty() {
            return Err(GmailError::InvalidRequest(
                "message id must not be empty".to_string(),
            ));
        }

        let tokens = self.token_provider.current_tokens().await?;
        self.fetch_summary(&tokens.access_token, message_id.to_string())
            .await
    }

    async fn fetch_summary(&self, access_token: &str, message_id: String) -> Result<ResourceSummary> {
        let mut url = self.messages_url(&[message_id.as_str()])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("format", "metadata");
            for header in SUMMARY_HEADERS {
                query.append_pair("metadataHeaders", header);
            }
        }

        let response = self.send(url, access_token, Some(&message_id)).await?;
        let message: GmailMessage = parse_json(&response)?;
        Ok(ResourceSummary::from(message))
    }

    /// `<api_base>/users/me/messages[/<segment>...]`
    fn messages_url(&self, extra_segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/users/me/messages", self.api_base))
            .map_err(|e| GmailError::InvalidRequest(format!("invalid API base: {}", e)))?;

        if !extra_segments.is_empty() {
            url.path_segments_mut()
                .map_err(|_| GmailError::InvalidRequest("API base cannot hold a path".to_string()))?
                .extend(extra_segments);
        }

        Ok(url)
    }

    /// Send a single GET and map non-2xx statuses.
    ///
    /// `message_id` turns a 404 into `NotFound`.
    async fn send(
        &self,
        url: Url,
        access_token: &str,
        message_id: Option<&str>,
    ) -> Result<HttpResponse> {
        let request = HttpRequest::new(HttpMethod::Get, url.as_str())
            .bearer_token(access_token)
            .header("Accept", "application/json")
            .timeout(self.fetch_timeout);

        let response = tokio::time::timeout(
            self.fetch_timeout,
            self.http_client
                .execute_with_retry(request, RetryPolicy::no_retry()),
        )
        .await
        .map_err(|_| {
            warn!(path = url.path(), "Gmail API request timed out");
            GmailError::Timeout(self.fetch_timeout.as_secs())
        })??;

        match response.status {
            status if (200..300).contains(&status) => Ok(response),
            401 | 403 => {
                warn!(status = response.status, "Gmail rejected the access token");
                Err(GmailError::Unauthorized {
                    status_code: response.status,
                })
            }
            404 => match message_id {
                Some(id) => Err(GmailError::NotFound {
                    message_id: id.to_string(),
                }),
                None => Err(api_error(&response)),
            },
            _ => {
                warn!(status = response.status, "Gmail API request failed");
                Err(api_error(&response))
            }
        }
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| GmailError::ParseError(e.to_string()))
}

/// Prefer Google's `error.message`, fall back to the raw body.
fn api_error(response: &HttpResponse) -> GmailError {
    let message = serde_json::from_slice::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|body| {
            body.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(&response.body).into_owned());

    GmailError::ApiError {
        status_code: response.status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bytes::Bytes;
    use core_auth::{AuthError, Result as AuthResult, TokenSet};
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

    mock! {
        Tokens {}

        #[async_trait]
        impl TokenProvider for Tokens {
            async fn current_tokens(&self) -> AuthResult<TokenSet>;
        }
    }

    fn signed_in() -> Arc<MockTokens> {
        let mut tokens = MockTokens::new();
        tokens.expect_current_tokens().returning(|| {
            Ok(TokenSet {
                access_token: "ya29.test".to_string(),
                refresh_token: None,
                expires_at: None,
                scope: None,
                token_type: Some("Bearer".to_string()),
            })
        });
        Arc::new(tokens)
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn message_body(id: &str) -> String {
        format!(
            r#"{{"id":"{id}","snippet":"snippet {id}","payload":{{"headers":[
                {{"name":"From","value":"{id}@example.com"}},
                {{"name":"X-Spam","value":"no"}}
            ]}}}}"#
        )
    }

    #[tokio::test]
    async fn test_zero_results_skips_everything() {
        let http = MockHttpClient::new();
        let tokens = MockTokens::new();
        let connector = GmailConnector::new(Arc::new(http), Arc::new(tokens));

        let messages = connector.list_messages(0).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_not_authorized_makes_no_request() {
        let http = MockHttpClient::new();
        let mut tokens = MockTokens::new();
        tokens
            .expect_current_tokens()
            .times(1)
            .returning(|| Err(AuthError::NotAuthorized));

        let connector = GmailConnector::new(Arc::new(http), Arc::new(tokens));
        let err = connector.list_messages(5).await.unwrap_err();

        assert_eq!(err.code(), "not_authorized");
    }

    #[tokio::test]
    async fn test_list_messages_success() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .withf(|req, policy| {
                req.url.contains("/users/me/messages?maxResults=2")
                    && req.headers.get("Authorization") == Some(&"Bearer ya29.test".to_string())
                    && policy.max_attempts == 1
            })
            .times(1)
            .returning(|_, _| {
                Ok(json_response(
                    200,
                    r#"{"messages":[{"id":"a","threadId":"a"},{"id":"b","threadId":"b"}],"resultSizeEstimate":2}"#,
                ))
            });
        http.expect_execute_with_retry()
            .withf(|req, _| {
                req.url.contains("/users/me/messages/a?")
                    && req.url.contains("format=metadata")
                    && req.url.contains("metadataHeaders=From")
                    && req.url.contains("metadataHeaders=Subject")
                    && req.url.contains("metadataHeaders=Date")
            })
            .times(1)
            .returning(|_, _| Ok(json_response(200, &message_body("a"))));
        http.expect_execute_with_retry()
            .withf(|req, _| req.url.contains("/users/me/messages/b?"))
            .times(1)
            .returning(|_, _| Ok(json_response(200, &message_body("b"))));

        let connector = GmailConnector::new(Arc::new(http), signed_in());
        let messages = connector.list_messages(2).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "a");
        assert_eq!(messages[1].id, "b");
        assert_eq!(messages[0].snippet, "snippet a");
        assert_eq!(messages[0].headers.len(), 1);
        assert_eq!(messages[0].header("From"), Some("a@example.com"));
    }

    #[tokio::test]
    async fn test_max_results_is_clamped() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .withf(|req, _| req.url.ends_with("maxResults=500"))
            .times(1)
            .returning(|_, _| Ok(json_response(200, r#"{"resultSizeEstimate":0}"#)));

        let connector = GmailConnector::new(Arc::new(http), signed_in());
        let messages = connector.list_messages(5000).await.unwrap();

        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .times(1)
            .returning(|_, _| Ok(json_response(401, r#"{"error":{"code":401}}"#)));

        let connector = GmailConnector::new(Arc::new(http), signed_in());
        let err = connector.list_messages(3).await.unwrap_err();

        assert!(matches!(err, GmailError::Unauthorized { status_code: 401 }));
        assert_eq!(err.code(), "token_rejected");
    }

    #[tokio::test]
    async fn test_api_error_uses_google_message() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().times(1).returning(|_, _| {
            Ok(json_response(
                429,
                r#"{"error":{"code":429,"message":"Quota exceeded"}}"#,
            ))
        });

        let connector = GmailConnector::new(Arc::new(http), signed_in());
        let err = connector.list_messages(3).await.unwrap_err();

        match err {
            GmailError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 429);
                assert_eq!(message, "Quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_one_failed_fetch_fails_listing() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .withf(|req, _| req.url.contains("maxResults"))
            .returning(|_, _| {
                Ok(json_response(200, r#"{"messages":[{"id":"a"},{"id":"b"}]}"#))
            });
        http.expect_execute_with_retry()
            .withf(|req, _| req.url.contains("/messages/a?"))
            .returning(|_, _| Ok(json_response(200, &message_body("a"))));
        http.expect_execute_with_retry()
            .withf(|req, _| req.url.contains("/messages/b?"))
            .returning(|_, _| Err(BridgeError::Network("connection reset".to_string())));

        let connector = GmailConnector::new(Arc::new(http), signed_in());
        let err = connector.list_messages(2).await.unwrap_err();

        assert_eq!(err.code(), "network");
    }

    #[tokio::test]
    async fn test_malformed_index_is_parse_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| Ok(json_response(200, "<html>")));

        let connector = GmailConnector::new(Arc::new(http), signed_in());
        let err = connector.list_messages(1).await.unwrap_err();

        assert_eq!(err.code(), "parse_error");
    }

    #[tokio::test]
    async fn test_get_message_not_found() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .withf(|req, _| req.url.contains("/users/me/messages/missing?"))
            .returning(|_, _| Ok(json_response(404, r#"{"error":{"code":404}}"#)));

        let connector = GmailConnector::new(Arc::new(http), signed_in());
        let err = connector.get_message("missing").await.unwrap_err();

        assert!(matches!(err, GmailError::NotFound { ref message_id } if message_id == "missing"));
    }

    #[tokio::test]
    async fn test_get_message_escapes_id() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .withf(|req, _| req.url.contains("/users/me/messages/a%2Fb?"))
            .returning(|_, _| Ok(json_response(200, &message_body("a/b"))));

        let connector = GmailConnector::new(Arc::new(http), signed_in());
        let summary = connector.get_message("a/b").await.unwrap();

        assert_eq!(summary.id, "a/b");
    }

    #[tokio::test]
    async fn test_get_message_rejects_empty_id() {
        let connector = GmailConnector::new(Arc::new(MockHttpClient::new()), signed_in());
        let err = connector.get_message("  ").await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn test_limits_and_base() {
        let connector = GmailConnector::new(Arc::new(MockHttpClient::new()), signed_in())
            .with_limits(0, Duration::from_secs(5))
            .with_api_base("http://127.0.0.1:9999/gmail/v1/");

        assert_eq!(connector.max_concurrent(), 1);
        assert_eq!(connector.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(
            connector.messages_url(&["x"]).unwrap().as_str(),
            "http://127.0.0.1:9999/gmail/v1/users/me/messages/x"
        );
    }
}
