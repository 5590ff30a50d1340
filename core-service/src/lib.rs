//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges (HTTP, secure storage, URL
//! launcher) into the authorization core and the Gmail client, and exposes
//! the operations collaborators call: `beginAuthorization`,
//! `checkAuthorization`, `listResources`, `getResource` and `signOut`.
//! Each returns a serializable response instead of an error. Desktop apps
//! enable the `desktop-shims` feature (the default) to get `bridge-desktop`
//! adapters for any bridge they do not inject.

pub mod error;
pub mod responses;

pub use core_auth::OAuthConfig;
pub use core_runtime::config::CoreConfig;
pub use core_runtime::events::{CoreEvent, EventStream};
pub use error::{CoreError, Result};
pub use provider_gmail::{MessageHeader, ResourceSummary};
pub use responses::{
    AuthorizationResponse, AuthorizationStatus, GetResourceResponse, ListResourcesResponse,
    SignOutResponse,
};

use core_auth::{AuthorizationCoordinator, TokenStore};
use core_runtime::events::{EventBus, MailboxEvent};
use provider_gmail::GmailConnector;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct MailDeskService {
    coordinator: Arc<AuthorizationCoordinator>,
    gmail: Arc<GmailConnector>,
    event_bus: EventBus,
    default_max_results: u32,
}

impl MailDeskService {
    /// Create a service from explicit bridges and provider settings.
    pub fn new(config: CoreConfig, oauth: OAuthConfig) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);

        let coordinator = Arc::new(AuthorizationCoordinator::with_clock(
            oauth,
            Arc::clone(&config.http_client),
            TokenStore::new(Arc::clone(&config.secure_store)),
            Arc::clone(&config.url_launcher),
            event_bus.clone(),
            Arc::clone(&config.clock),
        ));

        let gmail = GmailConnector::new(Arc::clone(&config.http_client), coordinator.clone())
            .with_limits(config.max_concurrent_fetches, config.fetch_timeout);

        Self {
            coordinator,
            gmail: Arc::new(gmail),
            event_bus,
            default_max_results: config.default_max_results,
        }
    }

    /// Build with default bridges and the given provider settings.
    ///
    /// # Errors
    ///
    /// Returns `CapabilityMissing` when a bridge has no default (the
    /// `desktop-shims` feature is off).
    pub fn bootstrap(oauth: OAuthConfig) -> Result<Self> {
        let config = CoreConfig::builder().build()?;
        Ok(Self::new(config, oauth))
    }

    /// Like [`bootstrap`](Self::bootstrap), reading client credentials from
    /// the environment (see `OAuthConfig::from_env`).
    pub fn from_env() -> Result<Self> {
        Self::bootstrap(OAuthConfig::from_env()?)
    }

    pub fn coordinator(&self) -> &Arc<AuthorizationCoordinator> {
        &self.coordinator
    }

    pub fn gmail(&self) -> &GmailConnector {
        &self.gmail
    }

    /// Subscribe to authorization and mailbox events.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Run the authorization flow. Resolves once tokens are stored or the
    /// flow failed.
    #[instrument(skip(self))]
    pub async fn begin_authorization(&self) -> AuthorizationResponse {
        match self.coordinator.begin_authorization().await {
            Ok(_) => AuthorizationResponse::succeeded("Authorization successful"),
            Err(e) => CoreError::from(e).into(),
        }
    }

    /// Whether credentials are stored. Expiry is not checked.
    ///
    /// A storage failure reads as not authorized.
    #[instrument(skip(self))]
    pub async fn check_authorization(&self) -> AuthorizationStatus {
        let authorized = match self.coordinator.check_authorization().await {
            Ok(authorized) => authorized,
            Err(e) => {
                warn!(code = e.code(), error = %e, "Could not read stored credentials");
                false
            }
        };

        AuthorizationStatus { authorized }
    }

    /// List up to `max_results` messages, or the configured default.
    #[instrument(skip(self))]
    pub async fn list_resources(&self, max_results: Option<u32>) -> ListResourcesResponse {
        let requested = max_results.unwrap_or(self.default_max_results);

        match self.gmail.list_messages(requested).await {
            Ok(items) => {
                let _ = self.event_bus.emit(CoreEvent::Mailbox(MailboxEvent::Listed {
                    requested,
                    returned: items.len(),
                }));
                ListResourcesResponse::succeeded(items)
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "Listing messages failed");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Mailbox(MailboxEvent::FetchFailed {
                        message: e.to_string(),
                    }));
                CoreError::from(e).into()
            }
        }
    }

    /// Fetch a single message summary by id.
    #[instrument(skip(self))]
    pub async fn get_resource(&self, id: &str) -> GetResourceResponse {
        match self.gmail.get_message(id).await {
            Ok(item) => GetResourceResponse::succeeded(item),
            Err(e) => CoreError::from(e).into(),
        }
    }

    /// Remove stored credentials. Succeeds when nothing is stored.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> SignOutResponse {
        match self.coordinator.sign_out().await {
            Ok(()) => SignOutResponse::succeeded(),
            Err(e) => CoreError::from(e).into(),
        }
    }

    /// Abandon the in-flight authorization flow. Returns whether one was
    /// running.
    pub async fn cancel_authorization(&self) -> bool {
        let cancelled = self.coordinator.cancel().await;
        if cancelled {
            info!("Authorization cancelled by caller");
        }
        cancelled
    }
}
