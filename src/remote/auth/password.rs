use async_trait::async_trait;
use russh::client;

use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::session::SshClientHandler;

use super::traits::AuthStrategy;

pub struct PasswordAuth {
    secret: String,
}

impl PasswordAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> RemoteResult<bool> {
        handle
            .authenticate_password(username, &self.secret)
            .await
            .map(|outcome| outcome.success())
            .map_err(|e| {
                RemoteError::connect(format!("Password login as '{}' failed: {}", username, e))
            })
    }

    fn name(&self) -> &'static str {
        "password"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_password_strategy() {
        assert_eq!(PasswordAuth::new("hunter2").name(), "password");
    }

    #[test]
    fn test_keeps_secret_verbatim() {
        let auth = PasswordAuth::new(" spaced secret ");
        assert_eq!(auth.secret, " spaced secret ");
    }
}
