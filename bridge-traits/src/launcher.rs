//! External URL navigation.

use async_trait::async_trait;

use crate::error::Result;

/// Opens a URL outside the process, normally in the user's default browser.
///
/// The call returns once the handoff to the host succeeded; it does not wait
/// for the page to load.
#[async_trait]
pub trait UrlLauncher: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
}
