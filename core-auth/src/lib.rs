//! # Authorization Module
//!
//! OAuth 2.0 Authorization Code Grant with a loopback redirect, plus the
//! lifecycle of the single stored credential.
//!
//! ## Overview
//!
//! - [`TokenStore`] persists the token set through the host `SecureStore`
//! - [`TokenExchangeClient`] builds the consent URL and talks to the token
//!   endpoint
//! - [`LoopbackCallbackServer`] captures the provider's redirect on
//!   `127.0.0.1`
//! - [`AuthorizationCoordinator`] drives the flow end to end and hands out
//!   usable tokens to API clients through [`TokenProvider`]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod loopback;
pub mod oauth;
pub mod token_store;
pub mod types;

pub use config::OAuthConfig;
pub use coordinator::{AuthorizationCoordinator, TokenProvider};
pub use error::{AuthError, ExchangeFailure, Result};
pub use loopback::{ListenerState, LoopbackCallbackServer};
pub use oauth::{generate_state, TokenExchangeClient};
pub use token_store::TokenStore;
pub use types::{CallbackResult, CredentialKey, TokenSet};
