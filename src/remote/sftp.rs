//! SFTP sessions over russh, the production [`Connector`] for the session pool.
//!
//! The remote sshd must have the sftp subsystem enabled, e.g.
//! `Subsystem sftp internal-sftp` in sshd_config.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use russh::{Disconnect, client};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::remote::client::connect_authenticated;
use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::session::{Connector, RemoteFs, RemoteSession, SshClientHandler};
use crate::remote::transfer::join_remote;
use crate::remote::types::{RemoteEntry, RemoteStat, ServerDescriptor};

/// Opens an authenticated SSH connection and starts the sftp subsystem on it.
#[derive(Debug, Clone)]
pub struct SftpConnector {
    connect_timeout: Duration,
}

impl SftpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn open(&self, server: &ServerDescriptor) -> RemoteResult<SftpSessionHandle> {
        let handle = connect_authenticated(server, self.connect_timeout).await?;

        match open_sftp(&handle).await {
            Ok(sftp) => {
                debug!("SFTP subsystem ready on {}", server.identity());
                Ok(SftpSessionHandle {
                    handle,
                    sftp,
                    server_key: server.key(),
                })
            }
            Err(e) => {
                if let Err(close_err) = handle
                    .disconnect(Disconnect::ByApplication, "", "en")
                    .await
                {
                    debug!("Ignoring disconnect error after SFTP setup failure: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Connector for SftpConnector {
    type Session = SftpSessionHandle;

    /// Connect, authenticate and start sftp, all within the connect timeout.
    async fn connect(&self, server: &ServerDescriptor) -> RemoteResult<SftpSessionHandle> {
        tokio::time::timeout(self.connect_timeout, self.open(server))
            .await
            .map_err(|_| {
                RemoteError::connect(format!(
                    "SFTP session to {} not ready after {:?}",
                    server.identity(),
                    self.connect_timeout
                ))
            })
            .and_then(|inner| inner)
    }
}

async fn open_sftp(handle: &client::Handle<SshClientHandler>) -> RemoteResult<SftpSession> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| RemoteError::connect(format!("Failed to open SFTP channel: {}", e)))?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| RemoteError::connect(format!("Failed to request sftp subsystem: {}", e)))?;
    SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| RemoteError::connect(format!("Failed to start SFTP session: {}", e)))
}

/// An SSH connection with an active SFTP session.
pub struct SftpSessionHandle {
    handle: client::Handle<SshClientHandler>,
    sftp: SftpSession,
    server_key: String,
}

impl SftpSessionHandle {
    pub fn server_key(&self) -> &str {
        &self.server_key
    }
}

#[async_trait]
impl RemoteSession for SftpSessionHandle {
    async fn close(&self) -> RemoteResult<()> {
        if let Err(e) = self.sftp.close().await {
            debug!("SFTP close for {} failed: {}", self.server_key, e);
        }
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| RemoteError::connect(format!("Failed to disconnect: {}", e)))
    }
}

#[async_trait]
impl RemoteFs for SftpSessionHandle {
    async fn stat(&self, path: &str) -> RemoteResult<RemoteStat> {
        let metadata = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| RemoteError::transfer(format!("stat {}: {}", path, e)))?;
        Ok(RemoteStat {
            is_directory: metadata.file_type().is_dir(),
            size: metadata.size.unwrap_or(0),
        })
    }

    async fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| RemoteError::transfer(format!("list {}: {}", path, e)))?;

        Ok(entries
            .filter(|entry| entry.file_name() != "." && entry.file_name() != "..")
            .map(|entry| {
                let name = entry.file_name();
                let metadata = entry.metadata();
                RemoteEntry {
                    path: join_remote(path, &name),
                    size: metadata.size.unwrap_or(0),
                    modified_time: metadata.mtime.and_then(format_mtime),
                    is_directory: metadata.file_type().is_dir(),
                    name,
                }
            })
            .collect())
    }

    async fn mkdir_all(&self, path: &str) -> RemoteResult<()> {
        let absolute = path.starts_with('/');
        let mut current = String::new();
        for part in path.split('/').filter(|part| !part.is_empty()) {
            if absolute || !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);

            if let Ok(metadata) = self.sftp.metadata(current.as_str()).await
                && metadata.file_type().is_dir()
            {
                continue;
            }
            if let Err(e) = self.sftp.create_dir(current.as_str()).await {
                // Lost a creation race; fine as long as it is a directory now.
                let exists = self
                    .sftp
                    .metadata(current.as_str())
                    .await
                    .map(|metadata| metadata.file_type().is_dir())
                    .unwrap_or(false);
                if !exists {
                    return Err(RemoteError::transfer(format!("mkdir {}: {}", current, e)));
                }
            }
        }
        Ok(())
    }

    async fn get(&self, remote_path: &str, local_path: &Path) -> RemoteResult<()> {
        let mut remote = self
            .sftp
            .open_with_flags(remote_path, OpenFlags::READ)
            .await
            .map_err(|e| RemoteError::transfer(format!("open {}: {}", remote_path, e)))?;
        let mut local = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| RemoteError::transfer(format!("create {}: {}", local_path.display(), e)))?;

        let bytes = tokio::io::copy(&mut remote, &mut local)
            .await
            .map_err(|e| RemoteError::transfer(format!("download {}: {}", remote_path, e)))?;
        local
            .flush()
            .await
            .map_err(|e| RemoteError::transfer(format!("flush {}: {}", local_path.display(), e)))?;

        debug!("Downloaded {} ({} bytes)", remote_path, bytes);
        Ok(())
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> RemoteResult<()> {
        let mut local = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| RemoteError::transfer(format!("open {}: {}", local_path.display(), e)))?;
        let mut remote = self
            .sftp
            .open_with_flags(
                remote_path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| RemoteError::transfer(format!("create {}: {}", remote_path, e)))?;

        let bytes = tokio::io::copy(&mut local, &mut remote)
            .await
            .map_err(|e| RemoteError::transfer(format!("upload {}: {}", remote_path, e)))?;
        remote
            .shutdown()
            .await
            .map_err(|e| RemoteError::transfer(format!("close {}: {}", remote_path, e)))?;

        debug!("Uploaded {} ({} bytes)", remote_path, bytes);
        Ok(())
    }
}

/// Render an SFTP modification time (seconds since the epoch) as RFC 3339.
fn format_mtime(mtime: u32) -> Option<String> {
    DateTime::from_timestamp(i64::from(mtime), 0).map(|time| time.to_rfc3339())
}
