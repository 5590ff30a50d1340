//! # Authorization Coordinator
//!
//! Drives the loopback Authorization Code Grant end to end and owns the
//! stored credential lifecycle.
//!
//! ## Flow
//!
//! 1. Validate configuration and take the single-flight guard
//! 2. Bind the loopback listener (before the browser is opened, so the
//!    redirect can never race the bind)
//! 3. Open the consent page through the host's `UrlLauncher`
//! 4. Wait for the redirect, bounded by `callback_timeout`
//! 5. Exchange the code and persist the token set
//! 6. Shut the listener down, on every exit path
//!
//! Progress and failures are broadcast on the [`EventBus`]; emit errors
//! (no subscribers) are ignored.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthorizationCoordinator, OAuthConfig, TokenStore};
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//! # use bridge_traits::{HttpClient, SecureStore, UrlLauncher};
//! # async fn example(
//! #     http_client: Arc<dyn HttpClient>,
//! #     secure_store: Arc<dyn SecureStore>,
//! #     launcher: Arc<dyn UrlLauncher>,
//! # ) -> core_auth::Result<()> {
//! let coordinator = AuthorizationCoordinator::new(
//!     OAuthConfig::from_env()?,
//!     http_client,
//!     TokenStore::new(secure_store),
//!     launcher,
//!     EventBus::new(100),
//! );
//!
//! coordinator.begin_authorization().await?;
//! assert!(coordinator.check_authorization().await?);
//! # Ok(())
//! # }
//! ```

use crate::config::OAuthConfig;
use crate::error::{AuthError, Result};
use crate::loopback::LoopbackCallbackServer;
use crate::oauth::{generate_state, TokenExchangeClient};
use crate::token_store::TokenStore;
use crate::types::{CallbackResult, TokenSet};
use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use bridge_traits::time::{Clock, SystemClock};
use bridge_traits::UrlLauncher;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Source of a usable token set for API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token set, refreshed if the implementation supports it.
    ///
    /// Fails with `AuthError::NotAuthorized` when nothing is stored.
    async fn current_tokens(&self) -> Result<TokenSet>;
}

/// Holds the in-progress flag for the lifetime of one flow.
struct FlowGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlowGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Orchestrates authorization and the stored token lifecycle.
pub struct AuthorizationCoordinator {
    config: OAuthConfig,
    exchange_client: TokenExchangeClient,
    token_store: TokenStore,
    url_launcher: Arc<dyn UrlLauncher>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    in_progress: AtomicBool,
    active_flow: Mutex<Option<CancellationToken>>,
    refresh_lock: Mutex<()>,
}

impl AuthorizationCoordinator {
    pub fn new(
        config: OAuthConfig,
        http_client: Arc<dyn HttpClient>,
        token_store: TokenStore,
        url_launcher: Arc<dyn UrlLauncher>,
        event_bus: EventBus,
    ) -> Self {
        Self::with_clock(
            config,
            http_client,
            token_store,
            url_launcher,
            event_bus,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        config: OAuthConfig,
        http_client: Arc<dyn HttpClient>,
        token_store: TokenStore,
        url_launcher: Arc<dyn UrlLauncher>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let exchange_client =
            TokenExchangeClient::with_clock(config.clone(), http_client, Arc::clone(&clock));

        Self {
            config,
            exchange_client,
            token_store,
            url_launcher,
            event_bus,
            clock,
            in_progress: AtomicBool::new(false),
            active_flow: Mutex::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.token_store
    }

    /// Whether a flow currently holds the single-flight guard.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run the full authorization flow and persist the resulting tokens.
    ///
    /// # Errors
    ///
    /// - `Config` for missing or invalid client configuration
    /// - `AlreadyInProgress` when another flow holds the guard (no side effects)
    /// - `Bind` when the loopback port is unavailable
    /// - `BrowserLaunch` when the consent page cannot be opened
    /// - `CallbackTimeout`, `Cancelled`, `AuthDenied`, `StateMismatch`
    /// - `Exchange` with `invalid_grant`, `network` or `provider_error`
    /// - `Storage` when the tokens cannot be persisted
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub async fn begin_authorization(&self) -> Result<TokenSet> {
        if let Err(e) = self.config.validate() {
            error!(error = %e, "Refusing to start authorization");
            self.emit_failure(&e);
            return Err(e);
        }

        // The guard and the cancel token change together under the
        // `active_flow` lock, so `cancel()` sees every flow that
        // `is_in_progress()` reports.
        let cancel = CancellationToken::new();
        let guard = {
            let mut active = self.active_flow.lock().await;
            let Some(guard) = FlowGuard::acquire(&self.in_progress) else {
                warn!("Authorization already in progress");
                return Err(AuthError::AlreadyInProgress);
            };
            *active = Some(cancel.clone());
            guard
        };

        let mut server = LoopbackCallbackServer::from_config(&self.config);
        let result = self.run_flow(&mut server, &cancel).await;
        server.shutdown().await;

        {
            let mut active = self.active_flow.lock().await;
            *active = None;
            drop(guard);
        }

        match &result {
            Ok(tokens) => {
                info!(
                    has_refresh_token = tokens.has_refresh_token(),
                    "Authorization completed"
                );
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedIn {
                    provider: self.config.provider.clone(),
                    has_refresh_token: tokens.has_refresh_token(),
                }));
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "Authorization failed");
                self.emit_failure(e);
            }
        }

        result
    }

    async fn run_flow(
        &self,
        server: &mut LoopbackCallbackServer,
        cancel: &CancellationToken,
    ) -> Result<TokenSet> {
        let addr = server.start().await?;
        let redirect_uri = self.config.redirect_uri_for_port(addr.port());

        let expected_state = self.config.require_state.then(generate_state);
        let auth_url = self
            .exchange_client
            .build_authorization_url(&redirect_uri, expected_state.as_deref())?;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SigningIn {
            provider: self.config.provider.clone(),
            redirect_uri: redirect_uri.clone(),
        }));

        self.url_launcher
            .open(&auth_url)
            .await
            .map_err(|e| AuthError::BrowserLaunch(e.to_string()))?;

        debug!(
            timeout_secs = self.config.callback_timeout.as_secs(),
            "Waiting for authorization callback"
        );

        let callback = tokio::select! {
            result = server.wait_for_callback(self.config.callback_timeout) => result?,
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
        };

        match callback {
            CallbackResult::Denied {
                error, description, ..
            } => Err(AuthError::AuthDenied { error, description }),
            CallbackResult::Code { code, state } => {
                if let Some(expected) = expected_state.as_deref() {
                    if state.as_deref() != Some(expected) {
                        return Err(AuthError::StateMismatch);
                    }
                }

                let tokens = self.exchange_client.exchange(&code, &redirect_uri).await?;
                self.token_store
                    .put(&self.config.credential_key, &tokens)
                    .await?;
                Ok(tokens)
            }
        }
    }

    /// Abandon the in-flight flow, if any. It resolves with `Cancelled`.
    pub async fn cancel(&self) -> bool {
        match self.active_flow.lock().await.as_ref() {
            Some(token) => {
                info!("Cancelling authorization flow");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a token set is stored. Expiry is not checked.
    #[instrument(skip(self))]
    pub async fn check_authorization(&self) -> Result<bool> {
        self.token_store.contains(&self.config.credential_key).await
    }

    /// Remove the stored token set. Succeeds when nothing is stored.
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub async fn sign_out(&self) -> Result<()> {
        self.token_store.delete(&self.config.credential_key).await?;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedOut {
            provider: self.config.provider.clone(),
        }));

        info!("Signed out");
        Ok(())
    }

    /// Stored token set, refreshed first when it is expired and refresh is
    /// enabled.
    ///
    /// A token set that is expired but has no refresh token is returned as
    /// is; the API call it is used for will be rejected.
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub async fn valid_tokens(&self) -> Result<TokenSet> {
        let _refresh = self.refresh_lock.lock().await;

        let tokens = self
            .token_store
            .get(&self.config.credential_key)
            .await?
            .ok_or(AuthError::NotAuthorized)?;

        if !self.config.refresh_on_expiry || !tokens.is_expired_at(self.clock.now()) {
            return Ok(tokens);
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            warn!("Access token expired and no refresh token is stored");
            return Ok(tokens);
        };

        info!("Access token expired or expiring soon, refreshing");

        let refreshed = match self.exchange_client.refresh(refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                error!(error = %e, "Token refresh failed");
                self.emit_failure(&e);
                return Err(e);
            }
        };

        self.token_store
            .put(&self.config.credential_key, &refreshed)
            .await?;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
            provider: self.config.provider.clone(),
            expires_at: refreshed.expires_at.map(|at| at.timestamp()),
        }));

        Ok(refreshed)
    }

    fn emit_failure(&self, err: &AuthError) {
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
            provider: self.config.provider.clone(),
            code: err.code().to_string(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }));
    }
}

#[async_trait]
impl TokenProvider for AuthorizationCoordinator {
    async fn current_tokens(&self) -> Result<TokenSet> {
        self.valid_tokens().await
    }
}
