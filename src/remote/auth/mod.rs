//! Authentication strategies for SSH connections.
//!
//! A server descriptor carries at most one usable credential. Resolution
//! order is fixed:
//!
//! 1. A private key path that is non-empty and can be opened for reading
//! 2. A non-empty password
//!
//! If neither is usable, connecting fails with
//! [`RemoteError::AuthConfigMissing`] before any network traffic.
//!
//! # Example
//!
//! ```ignore
//! let credentials = resolve_credentials(&server)?;
//! let strategy = credentials.strategy();
//! let accepted = strategy.authenticate(&mut handle, &server.username).await?;
//! ```

mod key;
mod password;
mod traits;

use std::fs::File;
use std::path::PathBuf;

use tracing::debug;

use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::types::ServerDescriptor;

pub use key::KeyAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;

/// The credential selected for a connect attempt.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    PrivateKey(PathBuf),
    Password(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::PrivateKey(path) => f.debug_tuple("PrivateKey").field(path).finish(),
            Credentials::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

impl Credentials {
    /// Build the authentication strategy for this credential.
    pub fn strategy(&self) -> Box<dyn AuthStrategy> {
        match self {
            Credentials::PrivateKey(path) => Box::new(KeyAuth::new(path.clone())),
            Credentials::Password(password) => Box::new(PasswordAuth::new(password.clone())),
        }
    }
}

/// Pick the credential to authenticate `server` with.
pub fn resolve_credentials(server: &ServerDescriptor) -> RemoteResult<Credentials> {
    if let Some(path) = server
        .private_key_path
        .as_ref()
        .filter(|path| !path.as_os_str().is_empty())
    {
        match File::open(path) {
            Ok(_) => return Ok(Credentials::PrivateKey(path.clone())),
            Err(e) => debug!(
                "Private key {} for {} is not readable: {}",
                path.display(),
                server.identity(),
                e
            ),
        }
    }

    if let Some(password) = server.password.as_ref().filter(|p| !p.is_empty()) {
        return Ok(Credentials::Password(password.clone()));
    }

    Err(RemoteError::AuthConfigMissing {
        server: server.identity().to_string(),
    })
}
