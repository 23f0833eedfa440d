//! One-shot shell client: one authenticated session per command invocation.
//!
//! An exec channel carries exactly one command, and the execution pipeline
//! needs full control over teardown, so these sessions are never pooled.
//!
//! # Stream Events
//!
//! [`RemoteShell::exec`] returns a receiver of [`ExecEvent`]s fed by a
//! background reader task:
//!
//! - `Stdout` / `Stderr` chunks in arrival order per stream
//! - exactly one final `Closed`, carrying the exit status when the remote sent one

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::remote::client::connect_authenticated;
use crate::remote::config::ConfigProvider;
use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::session::SshClientHandler;
use crate::remote::types::ServerDescriptor;

/// Buffered stream events between the reader task and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// SSH extended data type code for stderr.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Output of a running remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// The channel closed. `exit_code` is `None` if the remote never reported one.
    Closed { exit_code: Option<i32> },
}

/// A connectable shell that runs one command per exec channel.
#[async_trait]
pub trait RemoteShell: Send {
    /// Connect if not already connected.
    async fn connect(&mut self) -> RemoteResult<()>;

    /// Start `command` and stream its output.
    async fn exec(&mut self, command: &str) -> RemoteResult<mpsc::Receiver<ExecEvent>>;

    /// End the session. Safe to call repeatedly.
    async fn disconnect(&mut self);

    /// Last known connection state; not a live probe.
    fn is_connected(&self) -> bool;
}

/// russh-backed [`RemoteShell`].
pub struct ShellClient {
    server: Option<ServerDescriptor>,
    config: Arc<dyn ConfigProvider>,
    connect_timeout: Duration,
    handle: Option<client::Handle<SshClientHandler>>,
}

impl ShellClient {
    /// Create a client for `server`, or for the configured default server when `None`.
    pub fn new(
        server: Option<ServerDescriptor>,
        config: Arc<dyn ConfigProvider>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            server,
            config,
            connect_timeout,
            handle: None,
        }
    }

    /// The server this client targets.
    pub fn resolve_server(&self) -> RemoteResult<ServerDescriptor> {
        match &self.server {
            Some(server) => Ok(server.clone()),
            None => self.config.default_server().ok_or_else(|| {
                RemoteError::config("No server configured and no enabled default project")
            }),
        }
    }
}

#[async_trait]
impl RemoteShell for ShellClient {
    async fn connect(&mut self) -> RemoteResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let server = self.resolve_server()?;
        let handle = connect_authenticated(&server, self.connect_timeout).await?;
        self.handle = Some(handle);
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> RemoteResult<mpsc::Receiver<ExecEvent>> {
        let handle = self
            .handle
            .as_ref()
            .filter(|handle| !handle.is_closed())
            .ok_or_else(|| RemoteError::exec("Shell is not connected"))?;

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| RemoteError::exec(format!("Failed to open channel: {}", e)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| RemoteError::exec(format!("Failed to execute command: {}", e)))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut exit_code: Option<i32> = None;
            loop {
                let event = match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => ExecEvent::Stdout(data.to_vec()),
                    Some(ChannelMsg::ExtendedData { data, ext }) => {
                        if ext != SSH_EXTENDED_DATA_STDERR {
                            continue;
                        }
                        ExecEvent::Stderr(data.to_vec())
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        exit_code = Some(exit_status as i32);
                        continue;
                    }
                    Some(ChannelMsg::Eof) => {
                        // Continue to wait for exit status if not received yet
                        if exit_code.is_some() {
                            break;
                        }
                        continue;
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => continue,
                };
                if tx.send(event).await.is_err() {
                    debug!("Exec output receiver dropped, stopping reader");
                    break;
                }
            }

            if let Err(e) = channel.close().await {
                debug!("Ignoring exec channel close error: {}", e);
            }
            let _ = tx.send(ExecEvent::Closed { exit_code }).await;
        });

        Ok(rx)
    }

    async fn disconnect(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            // The session may already be gone; nothing to recover.
            debug!("Ignoring shell disconnect error: {}", e);
        }
    }

    fn is_connected(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_closed())
    }
}

impl Drop for ShellClient {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!("Shell client dropped while connected; session closes with the handle");
        }
    }
}
