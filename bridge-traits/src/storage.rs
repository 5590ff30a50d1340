//! Secure Storage Abstraction
//!
//! Credentials live in the OS secret store, addressed by a
//! `(service, account)` pair the same way Keychain, Credential Manager and
//! Secret Service address them.

use async_trait::async_trait;

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service, cached in the kernel keyutils
///
/// Writes replace any previous value for the same pair. Atomicity is whatever
/// the backend guarantees; callers add no locking of their own.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_token(store: &dyn SecureStore, token: &str) -> Result<()> {
///     store.set_secret("maildesk", "gmail-oauth-token", token.as_bytes()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, overwriting any existing one.
    async fn set_secret(&self, service: &str, account: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if nothing is stored for the pair.
    ///
    /// # Security
    ///
    /// Returned data should be handled securely and not logged.
    async fn get_secret(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing entry succeeds.
    async fn delete_secret(&self, service: &str, account: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, service: &str, account: &str) -> Result<bool> {
        Ok(self.get_secret(service, account).await?.is_some())
    }
}
