//! Authentication strategy trait definition.

use async_trait::async_trait;
use russh::client;

use crate::remote::error::RemoteResult;
use crate::remote::session::SshClientHandler;

/// Trait for SSH authentication strategies.
///
/// Each strategy represents one authentication method (password or key file).
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Authentication succeeded
    /// * `Ok(false)` - Credentials rejected by the server
    /// * `Err(_)` - Error during the authentication attempt
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> RemoteResult<bool>;

    /// Name of the strategy, for logging.
    fn name(&self) -> &'static str;
}
