//! Fan-out behaviour of message listing: concurrency cap, ordering,
//! per-request timeouts and cancellation of outstanding requests.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_auth::{Result as AuthResult, TokenProvider, TokenSet};
use provider_gmail::{GmailConnector, GmailError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct StaticTokens;

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn current_tokens(&self) -> AuthResult<TokenSet> {
        Ok(TokenSet {
            access_token: "ya29.static".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: None,
            scope: None,
            token_type: Some("Bearer".to_string()),
        })
    }
}

/// Serves an index of `count` messages and delays each metadata request.
///
/// Message `m{i}` is delayed by `delay_for(i)` and in-flight metadata
/// requests are counted.
struct ScriptedGmail {
    count: usize,
    delay_for: fn(usize) -> Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl ScriptedGmail {
    fn new(count: usize, delay_for: fn(usize) -> Duration) -> Self {
        Self {
            count,
            delay_for,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }
}

fn ok(body: String) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: HashMap::new(),
        body: Bytes::from(body),
    }
}

#[async_trait]
impl HttpClient for ScriptedGmail {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        if request.url.contains("maxResults=") {
            let refs: Vec<String> = (0..self.count)
                .map(|i| format!(r#"{{"id":"m{i}","threadId":"t{i}"}}"#))
                .collect();
            return Ok(ok(format!(r#"{{"messages":[{}]}}"#, refs.join(","))));
        }

        let id = request
            .url
            .split("/messages/")
            .nth(1)
            .and_then(|rest| rest.split('?').next())
            .unwrap_or_default()
            .to_string();
        let index: usize = id.trim_start_matches('m').parse().unwrap_or(0);

        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep((self.delay_for)(index)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);

        Ok(ok(format!(
            r#"{{"id":"{id}","snippet":"","payload":{{"headers":[{{"name":"Subject","value":"Subject {index}"}}]}}}}"#
        )))
    }
}

#[tokio::test]
async fn test_fan_out_respects_concurrency_cap() {
    let gmail = Arc::new(ScriptedGmail::new(12, |_| Duration::from_millis(20)));
    let connector = GmailConnector::new(gmail.clone(), Arc::new(StaticTokens))
        .with_limits(3, Duration::from_secs(5));

    let messages = connector.list_messages(12).await.unwrap();

    assert_eq!(messages.len(), 12);
    assert!(gmail.peak.load(Ordering::SeqCst) <= 3);
    assert!(gmail.peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_results_keep_index_order() {
    // Earlier messages answer last
    let gmail = Arc::new(ScriptedGmail::new(5, |i| {
        Duration::from_millis(10 * (5 - i as u64))
    }));
    let connector = GmailConnector::new(gmail, Arc::new(StaticTokens));

    let messages = connector.list_messages(5).await.unwrap();

    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4"]);
    assert_eq!(messages[3].header("Subject"), Some("Subject 3"));
}

#[tokio::test]
async fn test_index_shorter_than_request() {
    let gmail = Arc::new(ScriptedGmail::new(2, |_| Duration::ZERO));
    let connector = GmailConnector::new(gmail, Arc::new(StaticTokens));

    let messages = connector.list_messages(25).await.unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn test_oversize_index_is_truncated_before_fetching() {
    // The index ignores maxResults and returns more ids than asked for
    let gmail = Arc::new(ScriptedGmail::new(8, |_| Duration::ZERO));
    let connector = GmailConnector::new(gmail.clone(), Arc::new(StaticTokens));

    let messages = connector.list_messages(3).await.unwrap();

    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m0", "m1", "m2"]);
    assert_eq!(gmail.started.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_slow_fetch_times_out_whole_listing() {
    let gmail = Arc::new(ScriptedGmail::new(4, |i| {
        if i == 2 {
            Duration::from_secs(10)
        } else {
            Duration::from_millis(5)
        }
    }));
    let connector = GmailConnector::new(gmail, Arc::new(StaticTokens))
        .with_limits(4, Duration::from_millis(200));

    let started = tokio::time::Instant::now();
    let err = connector.list_messages(4).await.unwrap_err();

    assert!(matches!(err, GmailError::Timeout(_)));
    assert_eq!(err.code(), "timeout");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_dropping_listing_cancels_outstanding_fetches() {
    let gmail = Arc::new(ScriptedGmail::new(6, |_| Duration::from_secs(5)));
    let connector = GmailConnector::new(gmail.clone(), Arc::new(StaticTokens))
        .with_limits(2, Duration::from_secs(30));

    let outcome =
        tokio::time::timeout(Duration::from_millis(100), connector.list_messages(6)).await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gmail.started.load(Ordering::SeqCst), 2);
    assert_eq!(gmail.finished.load(Ordering::SeqCst), 0);
}
