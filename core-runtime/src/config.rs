//! # Core Configuration Module
//!
//! Holds the host bridges the authorization core runs on, plus the knobs for
//! the mailbox client. Provider credentials and endpoints live in
//! `core_auth::OAuthConfig`.
//!
//! ## Dependencies
//!
//! - `HttpClient` - token endpoint and mailbox API (desktop default: reqwest)
//! - `SecureStore` - credential persistence (desktop default: OS keyring)
//! - `UrlLauncher` - opens the consent page (desktop default: system browser)
//! - `Clock` - token expiry (default: system clock)
//!
//! With the `desktop-shims` feature, missing bridges are filled with the
//! desktop adapters. Without it, `build()` fails fast with
//! `Error::CapabilityMissing`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .secure_store(Arc::new(MySecureStore))
//!     .max_concurrent_fetches(5)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, SecureStore, SystemClock, UrlLauncher};
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound on concurrent per-message fetches.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 10;

/// Default timeout for a single mailbox API request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default listing size when the caller does not pass one.
pub const DEFAULT_MAX_RESULTS: u32 = 25;

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub url_launcher: Arc<dyn UrlLauncher>,
    pub clock: Arc<dyn Clock>,

    /// Maximum in-flight per-message metadata fetches.
    pub max_concurrent_fetches: usize,

    /// Timeout applied to each mailbox API request.
    pub fetch_timeout: Duration,

    /// Listing size used when a collaborator omits `maxResults`.
    pub default_max_results: u32,

    /// Broadcast buffer for the event bus.
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("url_launcher", &"UrlLauncher { ... }")
            .field("max_concurrent_fetches", &self.max_concurrent_fetches)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("default_max_results", &self.default_max_results)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config(
                "max_concurrent_fetches must be greater than 0".to_string(),
            ));
        }

        if self.fetch_timeout.is_zero() {
            return Err(Error::Config(
                "fetch_timeout must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: ensure the 'desktop-shims' feature is enabled to use the default adapter. \
             Other hosts: inject a platform-native implementation.",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient", "token exchange and mailbox requests"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Ok(Arc::new(bridge_desktop::KeyringSecureStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(capability_missing("SecureStore", "credential persistence"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_url_launcher() -> Result<Arc<dyn UrlLauncher>> {
    Ok(Arc::new(bridge_desktop::SystemUrlLauncher::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_url_launcher() -> Result<Arc<dyn UrlLauncher>> {
    Err(capability_missing("UrlLauncher", "opening the consent page"))
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    url_launcher: Option<Arc<dyn UrlLauncher>>,
    clock: Option<Arc<dyn Clock>>,
    max_concurrent_fetches: Option<usize>,
    fetch_timeout: Option<Duration>,
    default_max_results: Option<u32>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn url_launcher(mut self, launcher: Arc<dyn UrlLauncher>) -> Self {
        self.url_launcher = Some(launcher);
        self
    }

    /// Overrides the time source, mainly for tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = Some(limit);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn default_max_results(mut self, max_results: u32) -> Self {
        self.default_max_results = Some(max_results);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::CapabilityMissing` when a bridge is absent and no desktop
    ///   default is compiled in
    /// - `Error::Config` when a numeric setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let url_launcher = match self.url_launcher {
            Some(launcher) => launcher,
            None => provide_default_url_launcher()?,
        };

        let config = CoreConfig {
            http_client,
            secure_store,
            url_launcher,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            max_concurrent_fetches: self
                .max_concurrent_fetches
                .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES),
            fetch_timeout: self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            default_max_results: self.default_max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpRequest, HttpResponse};

    struct NullHttpClient;

    #[async_trait]
    impl HttpClient for NullHttpClient {
        async fn execute(&self, _request: HttpRequest) -> std::result::Result<HttpResponse, BridgeError> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    struct NullSecureStore;

    #[async_trait]
    impl SecureStore for NullSecureStore {
        async fn set_secret(
            &self,
            _service: &str,
            _account: &str,
            _value: &[u8],
        ) -> std::result::Result<(), BridgeError> {
            Ok(())
        }

        async fn get_secret(
            &self,
            _service: &str,
            _account: &str,
        ) -> std::result::Result<Option<Vec<u8>>, BridgeError> {
            Ok(None)
        }

        async fn delete_secret(
            &self,
            _service: &str,
            _account: &str,
        ) -> std::result::Result<(), BridgeError> {
            Ok(())
        }
    }

    struct NullLauncher;

    #[async_trait]
    impl UrlLauncher for NullLauncher {
        async fn open(&self, _url: &str) -> std::result::Result<(), BridgeError> {
            Ok(())
        }
    }

    fn explicit_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(NullHttpClient))
            .secure_store(Arc::new(NullSecureStore))
            .url_launcher(Arc::new(NullLauncher))
    }

    #[test]
    fn test_build_with_explicit_bridges_uses_defaults() {
        let config = explicit_builder().build().unwrap();

        assert_eq!(config.max_concurrent_fetches, DEFAULT_MAX_CONCURRENT_FETCHES);
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.default_max_results, 25);
        assert_eq!(
            config.event_buffer_size,
            crate::events::DEFAULT_EVENT_BUFFER_SIZE
        );
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = explicit_builder()
            .max_concurrent_fetches(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = explicit_builder()
            .fetch_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("fetch_timeout"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_secure_store_fails_fast() {
        let err = CoreConfig::builder()
            .http_client(Arc::new(NullHttpClient))
            .url_launcher(Arc::new(NullLauncher))
            .build()
            .unwrap_err();

        match err {
            Error::CapabilityMissing { capability, .. } => assert_eq!(capability, "SecureStore"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_fill_missing_bridges() {
        let config = CoreConfig::builder().build().unwrap();
        assert!(format!("{:?}", config).contains("SecureStore"));
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = explicit_builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("max_concurrent_fetches: 10"));
        assert!(debug.contains("HttpClient { ... }"));
    }
}
