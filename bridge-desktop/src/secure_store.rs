//! Secure Credential Storage using OS Keychain

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use tracing::debug;

/// Keyring-based secure storage implementation
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service, cached in the kernel keyutils
///
/// Each `(service, account)` pair maps to one keyring entry. Secrets are
/// written as raw bytes, so blobs saved as passwords by other tools for the
/// same pair remain readable.
#[derive(Debug, Default, Clone)]
pub struct KeyringSecureStore;

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, account: &str) -> Result<Entry> {
        Entry::new(service, account).map_err(Self::map_keyring_error)
    }

    /// Convert keyring error to BridgeError
    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        match e {
            keyring::Error::NoStorageAccess(inner) => {
                BridgeError::AccessDenied(format!("Keyring access denied: {}", inner))
            }
            keyring::Error::PlatformFailure(inner) => {
                BridgeError::NotAvailable(format!("Keyring unavailable: {}", inner))
            }
            other => BridgeError::OperationFailed(format!("Keyring error: {}", other)),
        }
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, service: &str, account: &str, value: &[u8]) -> Result<()> {
        let entry = Self::entry(service, account)?;

        entry.set_secret(value).map_err(Self::map_keyring_error)?;

        debug!(service, account, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>> {
        let entry = Self::entry(service, account)?;

        match entry.get_secret() {
            Ok(secret) => {
                debug!(service, account, "Retrieved secret from keyring");
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(service, account, "Secret not found in keyring");
                Ok(None)
            }
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn delete_secret(&self, service: &str, account: &str) -> Result<()> {
        let entry = Self::entry(service, account)?;

        match entry.delete_credential() {
            Ok(_) => {
                debug!(service, account, "Deleted secret from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!(service, account, "Secret not found (already deleted)");
                Ok(())
            }
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn has_secret(&self, service: &str, account: &str) -> Result<bool> {
        let entry = Self::entry(service, account)?;

        match entry.get_secret() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }
}
