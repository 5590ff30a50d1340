//! Secure Token Storage
//!
//! Persists the single OAuth token set through the platform `SecureStore`
//! (Keychain, Credential Manager, Secret Service).
//!
//! ## Record format
//!
//! Token sets are written as a versioned JSON record:
//!
//! ```json
//! {"version":1,"access_token":"...","refresh_token":"...","expires_at":1700000000,"scope":"...","token_type":"Bearer"}
//! ```
//!
//! `expires_at` is a Unix timestamp in seconds. Records written by earlier
//! builds stored Google's raw token response instead (`expiry_date` in epoch
//! milliseconds, no `version`); those are still read and are rewritten in
//! the current format on the next save.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{CredentialKey, TokenSet, TokenStore};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(secure_store);
//! let key = CredentialKey::default();
//!
//! let tokens = TokenSet::new("access", Some("refresh".to_string()), Some(3600), chrono::Utc::now());
//! token_store.put(&key, &tokens).await?;
//!
//! let retrieved = token_store.get(&key).await?;
//! token_store.delete(&key).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{CredentialKey, TokenSet};
use bridge_traits::storage::SecureStore;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Current on-disk record version.
pub const TOKEN_RECORD_VERSION: u32 = 1;

/// Secure storage for the OAuth token set.
///
/// No locking is layered on top of the backend: concurrent writers race and
/// the last write wins.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTokens {
    version: u32,
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
}

/// Google token response as stored verbatim by older builds.
#[derive(Debug, Deserialize)]
struct LegacyStoredTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Epoch milliseconds.
    #[serde(default)]
    expiry_date: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Versioned(StoredTokens),
    Legacy(LegacyStoredTokens),
}

impl From<&TokenSet> for StoredTokens {
    fn from(tokens: &TokenSet) -> Self {
        Self {
            version: TOKEN_RECORD_VERSION,
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at.map(|at| at.timestamp()),
            scope: tokens.scope.clone(),
            token_type: tokens.token_type.clone(),
        }
    }
}

fn timestamp_from_secs(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

impl StoredRecord {
    fn into_token_set(self) -> std::result::Result<TokenSet, String> {
        match self {
            StoredRecord::Versioned(stored) => {
                if stored.version != TOKEN_RECORD_VERSION {
                    return Err(format!("unsupported record version {}", stored.version));
                }
                Ok(TokenSet {
                    access_token: stored.access_token,
                    refresh_token: stored.refresh_token,
                    expires_at: stored.expires_at.and_then(timestamp_from_secs),
                    scope: stored.scope,
                    token_type: stored.token_type,
                })
            }
            StoredRecord::Legacy(legacy) => Ok(TokenSet {
                access_token: legacy.access_token,
                refresh_token: legacy.refresh_token,
                expires_at: legacy.expiry_date.and_then(timestamp_from_millis),
                scope: legacy.scope,
                token_type: legacy.token_type,
            }),
        }
    }
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        debug!("Initializing TokenStore");
        Self { secure_store }
    }

    /// Store the token set, overwriting whatever is stored under `key`.
    pub async fn put(&self, key: &CredentialKey, tokens: &TokenSet) -> Result<()> {
        let stored = StoredTokens::from(tokens);

        let json = serde_json::to_vec(&stored).map_err(|e| {
            warn!(key = %key, error = %e, "Failed to serialize tokens");
            AuthError::Storage(format!("token serialization failed: {}", e))
        })?;

        self.secure_store
            .set_secret(&key.service, &key.account, &json)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Failed to store tokens in secure storage");
                AuthError::Storage(e.to_string())
            })?;

        info!(
            key = %key,
            has_refresh_token = stored.refresh_token.is_some(),
            "Tokens stored securely"
        );

        Ok(())
    }

    /// Retrieve the stored token set.
    ///
    /// Returns:
    /// - `Ok(Some(tokens))` if a readable record exists
    /// - `Ok(None)` if nothing is stored
    /// - `Err(TokenCorrupted)` if the record cannot be decoded; it is removed
    /// - `Err(Storage)` if the secure store is unavailable
    pub async fn get(&self, key: &CredentialKey) -> Result<Option<TokenSet>> {
        let data = self
            .secure_store
            .get_secret(&key.service, &key.account)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Failed to retrieve tokens from secure storage");
                AuthError::Storage(e.to_string())
            })?;

        let Some(data) = data else {
            debug!(key = %key, "No tokens found in storage");
            return Ok(None);
        };

        let decoded = serde_json::from_slice::<StoredRecord>(&data)
            .map_err(|e| e.to_string())
            .and_then(StoredRecord::into_token_set);

        let tokens = match decoded {
            Ok(tokens) => tokens,
            Err(reason) => {
                warn!(
                    key = %key,
                    error = %reason,
                    "Failed to decode stored tokens, they may be corrupted"
                );

                if let Err(delete_err) = self
                    .secure_store
                    .delete_secret(&key.service, &key.account)
                    .await
                {
                    warn!(
                        key = %key,
                        error = %delete_err,
                        "Failed to delete corrupted token data"
                    );
                }

                return Err(AuthError::TokenCorrupted(reason));
            }
        };

        debug!(
            key = %key,
            has_refresh_token = tokens.has_refresh_token(),
            expires_at = ?tokens.expires_at,
            "Tokens retrieved"
        );

        Ok(Some(tokens))
    }

    /// Remove the stored token set. Succeeds when nothing is stored.
    pub async fn delete(&self, key: &CredentialKey) -> Result<()> {
        self.secure_store
            .delete_secret(&key.service, &key.account)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Failed to delete tokens from secure storage");
                AuthError::Storage(e.to_string())
            })?;

        info!(key = %key, "Tokens deleted");

        Ok(())
    }

    /// Check for a stored record without decoding it.
    pub async fn contains(&self, key: &CredentialKey) -> Result<bool> {
        self.secure_store
            .has_secret(&key.service, &key.account)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Failed to check token existence in secure storage");
                AuthError::Storage(e.to_string())
            })
    }
}
