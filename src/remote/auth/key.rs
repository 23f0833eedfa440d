use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client;
use russh::keys::{self, PrivateKeyWithHashAlg};
use tracing::debug;

use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Public key login from a key file. Encrypted keys are not supported.
pub struct KeyAuth {
    key_file: PathBuf,
}

impl KeyAuth {
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
        }
    }

    fn load(&self) -> RemoteResult<keys::PrivateKey> {
        keys::load_secret_key(&self.key_file, None).map_err(|e| {
            RemoteError::connect(format!(
                "Failed to load private key from {}: {}",
                self.key_file.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> RemoteResult<bool> {
        let key = Arc::new(self.load()?);

        // None for non-RSA keys or servers without rsa-sha2 support.
        let rsa_hash = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!(
            "Key login as '{}' with {} (rsa hash {:?})",
            username,
            self.key_file.display(),
            rsa_hash
        );

        handle
            .authenticate_publickey(username, PrivateKeyWithHashAlg::new(key, rsa_hash))
            .await
            .map(|outcome| outcome.success())
            .map_err(|e| RemoteError::connect(format!("Key login as '{}' failed: {}", username, e)))
    }

    fn name(&self) -> &'static str {
        "key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_key_strategy() {
        assert_eq!(KeyAuth::new("/root/.ssh/id_ed25519").name(), "key");
    }

    #[test]
    fn test_garbage_key_file_is_connect_failure() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not a private key").unwrap();

        let err = KeyAuth::new(file.path())
            .load()
            .err()
            .expect("garbage key must not load");
        assert!(matches!(err, RemoteError::ConnectFailure(_)));
        assert!(err.to_string().contains("Failed to load private key"));
    }
}
