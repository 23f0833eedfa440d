//! SSH client connection and authentication.
//!
//! ## Connection Lifecycle
//!
//! 1. **Credentials**: resolved from the descriptor before any network traffic
//!    (see [`crate::remote::auth`]). A descriptor without usable credentials
//!    fails immediately.
//! 2. **Client Configuration**: no inactivity timeout (sessions are pooled and
//!    reaped by the pool), keepalive every 30 seconds with max 3 misses.
//! 3. **Connection + Authentication**: both bounded by a single connect timeout.
//!
//! Nothing here retries. A failed connect is reported once to the caller.

use std::sync::Arc;
use std::time::Duration;

use russh::{Disconnect, client};
use tracing::{debug, info, warn};

use crate::remote::auth::resolve_credentials;
use crate::remote::error::{RemoteError, RemoteResult, is_auth_rejection};
use crate::remote::session::SshClientHandler;
use crate::remote::types::ServerDescriptor;

/// Keepalive interval for every session.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Unanswered keepalives before russh drops the session.
const KEEPALIVE_MAX: usize = 3;

/// Build russh client configuration.
///
/// Sessions stay open until closed explicitly, so there is no inactivity timeout.
pub(crate) fn build_client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(KEEPALIVE_INTERVAL),
        keepalive_max: KEEPALIVE_MAX,
        ..Default::default()
    })
}

/// Establish an SSH connection to `server` and authenticate.
///
/// Connect and authentication together must finish within `timeout`.
pub(crate) async fn connect_authenticated(
    server: &ServerDescriptor,
    timeout: Duration,
) -> RemoteResult<client::Handle<SshClientHandler>> {
    let credentials = resolve_credentials(server)?;
    let identity = server.identity();

    let attempt = async {
        let connect_future = client::connect(
            build_client_config(),
            (server.host.as_str(), server.port),
            SshClientHandler,
        );
        let mut handle = connect_future
            .await
            .map_err(|e| {
                RemoteError::connect(format!("Failed to connect to {}: {}", identity, e))
            })?;

        let strategy = credentials.strategy();
        let accepted = strategy.authenticate(&mut handle, &server.username).await?;
        if !accepted {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
            {
                debug!("Ignoring disconnect error after rejected auth: {}", e);
            }
            return Err(RemoteError::connect(format!(
                "Authentication failed for {} using {} credentials",
                identity,
                strategy.name()
            )));
        }

        Ok::<_, RemoteError>(handle)
    };

    let result = tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| {
            RemoteError::connect(format!(
                "Connection to {} timed out after {:?}",
                identity, timeout
            ))
        })
        .and_then(|inner| inner);

    match &result {
        Ok(_) => info!("SSH connection established to {}", identity),
        Err(RemoteError::ConnectFailure(msg)) if is_auth_rejection(msg) => {
            warn!("SSH credentials rejected by {}: {}", identity, msg)
        }
        Err(e) => warn!("SSH connection to {} failed: {}", identity, e),
    }

    result
}
