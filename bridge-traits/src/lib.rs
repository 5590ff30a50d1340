//! # Host Bridge Traits
//!
//! Capabilities the authorization core needs from the host but does not
//! implement itself.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Token endpoint and mailbox API calls
//! - [`SecureStore`](storage::SecureStore) - OS secret storage keyed by `(service, account)`
//! - [`UrlLauncher`](launcher::UrlLauncher) - Hands the consent URL to the system browser
//! - [`Clock`](time::Clock) - Time source for token expiry
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! Desktop adapters for all of them live in `bridge-desktop`. Tests use
//! in-memory or `mockall` doubles.
//!
//! ## Fail-Fast Strategy
//!
//! The service layer refuses to start when a required capability is missing:
//!
//! ```ignore
//! let http_client = config.http_client
//!     .ok_or_else(|| CoreError::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client implementation provided. \
//!                  Enable the desktop-shims feature or inject an adapter.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! Every trait returns [`BridgeError`](error::BridgeError). Transport failures
//! map to `BridgeError::Network` so callers can classify them.

pub mod error;
pub mod http;
pub mod launcher;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use launcher::UrlLauncher;
pub use storage::SecureStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
