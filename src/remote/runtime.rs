//! Process-wide state, created once at startup and torn down at exit.
//!
//! The session pool and the execution slot are the only shared mutable state
//! of the subsystem. [`Runtime`] owns both and is passed by reference to every
//! consumer; nothing is reached through globals.

use std::sync::Arc;

use tracing::info;

use crate::remote::config::{PoolSettings, RemoteTestConfig, resolve_config_path};
use crate::remote::exec::{CommandExecutor, ExecutionSlot};
use crate::remote::pool::SessionPool;
use crate::remote::sftp::SftpConnector;
use crate::remote::transfer::FileTransferClient;
use crate::remote::types::ServerDescriptor;

pub struct Runtime {
    pub config: Arc<RemoteTestConfig>,
    pub pool: Arc<SessionPool<SftpConnector>>,
    pub executor: Arc<CommandExecutor>,
}

impl Runtime {
    /// Build the pool (with its idle sweep running) and the executor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(settings: PoolSettings, config: RemoteTestConfig) -> Self {
        let config = Arc::new(config);
        let pool = SessionPool::new(SftpConnector::new(settings.connect_timeout), settings);
        pool.start_idle_sweep();

        let executor = Arc::new(CommandExecutor::new(
            ExecutionSlot::new(),
            config.clone(),
            settings.connect_timeout,
        ));

        info!(
            "Remote runtime ready: {} project(s), pool capacity {}, idle timeout {:?}",
            config.projects.len(),
            settings.capacity,
            settings.idle_timeout
        );

        Self {
            config,
            pool,
            executor,
        }
    }

    /// [`init`](Self::init) with settings and project configuration from the environment.
    pub fn from_env() -> Self {
        let path = resolve_config_path(None);
        Self::init(
            PoolSettings::from_env(),
            RemoteTestConfig::load_or_default(&path),
        )
    }

    /// A pooled transfer client for `server` (or the default server).
    pub fn transfer_client(
        &self,
        server: Option<ServerDescriptor>,
    ) -> FileTransferClient<SftpConnector> {
        FileTransferClient::pooled(self.pool.clone(), server, self.config.clone())
    }

    /// Stop the idle sweep and close every pooled session.
    pub async fn shutdown(&self) {
        info!("Shutting down remote runtime");
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_and_shutdown() {
        let runtime = Runtime::init(PoolSettings::default(), RemoteTestConfig::default());
        assert!(runtime.pool.is_empty());
        assert!(!runtime.executor.is_executing());
        assert_eq!(runtime.pool.settings().capacity, 10);

        runtime.shutdown().await;
        assert_eq!(runtime.pool.stats().total_connections, 0);
    }

    #[tokio::test]
    async fn test_transfer_client_without_server_is_config_error() {
        let runtime = Runtime::init(PoolSettings::default(), RemoteTestConfig::default());
        let client = runtime.transfer_client(None);
        let err = client.list_directory("/tmp").await.unwrap_err();
        assert!(matches!(err, crate::remote::error::RemoteError::Config(_)));
        runtime.shutdown().await;
    }
}
