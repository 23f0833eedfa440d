//! SSH session handler and the transport seams of the remote core.
//!
//! # Architecture
//!
//! - `SshClientHandler`: A russh client handler that accepts all host keys (similar to
//!   `StrictHostKeyChecking=no` in OpenSSH).
//! - [`Connector`]: opens one authenticated session to a server. The session pool is
//!   generic over it so pooling can be exercised without a network.
//! - [`RemoteSession`]: anything the pool can hold and close.
//! - [`RemoteFs`]: the file operations the transfer client needs from a session.

use std::path::Path;

use async_trait::async_trait;
use russh::{client, keys};

use crate::remote::error::RemoteResult;
use crate::remote::types::{RemoteEntry, RemoteStat, ServerDescriptor};

/// Client handler for russh that accepts all host keys.
///
/// # Security Note
///
/// Host keys are not verified against known_hosts.
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all host keys (similar to StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// An open, authenticated session that can be shared and closed.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Close the session. Closing twice is harmless.
    async fn close(&self) -> RemoteResult<()>;
}

/// Opens new sessions. One call equals one network connect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: RemoteSession;

    async fn connect(&self, server: &ServerDescriptor) -> RemoteResult<Self::Session>;
}

/// File operations over a remote session. Paths are POSIX-style remote paths.
#[async_trait]
pub trait RemoteFs: RemoteSession {
    async fn stat(&self, path: &str) -> RemoteResult<RemoteStat>;

    /// Entries of a directory, excluding `.` and `..`.
    async fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    /// Create `path` and any missing parents.
    async fn mkdir_all(&self, path: &str) -> RemoteResult<()>;

    /// Stream a remote file into a local file, creating or truncating it.
    async fn get(&self, remote_path: &str, local_path: &Path) -> RemoteResult<()>;

    /// Stream a local file to a remote path, creating or truncating it.
    async fn put(&self, local_path: &Path, remote_path: &str) -> RemoteResult<()>;
}
