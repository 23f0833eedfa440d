//! Core data model and serializable response types.
//!
//! Server descriptors and command configs deserialize from the project
//! configuration file (camelCase JSON). Result types also implement
//! `JsonSchema` so the MCP tools can return them as structured content.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default SSH port used when a descriptor omits one.
pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// The `(host, port, username)` tuple that identifies a poolable session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerIdentity {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl ServerIdentity {
    /// Pool lookup key in `host:port:username` form.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.host, self.port, self.username)
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Everything needed to reach and authenticate against a remote host.
///
/// Credentials are only consulted at connect time; two descriptors with the
/// same identity share one pooled session regardless of credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    pub host: String,
    #[serde(default = "default_port")]
    #[schemars(schema_with = "crate::remote::schema::uint")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    /// Remote working directory; commands run inside it and uploads land in it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_directory: Option<String>,
}

impl ServerDescriptor {
    /// Create a descriptor without credentials.
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            ..Default::default()
        }
    }

    /// Set the password credential.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the private key credential.
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Set the remote working directory.
    pub fn with_remote_directory(mut self, dir: impl Into<String>) -> Self {
        self.remote_directory = Some(dir.into());
        self
    }

    pub fn identity(&self) -> ServerIdentity {
        ServerIdentity {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
        }
    }

    /// Shorthand for `identity().key()`.
    pub fn key(&self) -> String {
        self.identity().key()
    }

    /// The configured remote directory, treating an empty string as unset.
    pub fn remote_directory(&self) -> Option<&str> {
        self.remote_directory
            .as_deref()
            .filter(|dir| !dir.trim().is_empty())
    }
}

// Manual Debug keeps the password out of logs.
impl fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field("remote_directory", &self.remote_directory)
            .finish()
    }
}

/// How a command's output is presented. Empty pattern lists mean no filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandConfig {
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Ask the output sink to clear earlier output before the command header.
    #[serde(default)]
    pub clear_output_before_run: bool,
}

impl CommandConfig {
    pub fn new(include_patterns: Vec<String>, exclude_patterns: Vec<String>) -> Self {
        Self {
            include_patterns,
            exclude_patterns,
            clear_output_before_run: false,
        }
    }

    pub fn with_clear_output(mut self, clear: bool) -> Self {
        self.clear_output_before_run = clear;
        self
    }
}

/// Aggregate outcome of one remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    /// Full stdout as received.
    pub stdout: String,
    /// Full stderr as received.
    pub stderr: String,
    /// Remote exit status, -1 when the channel closed without one.
    pub exit_code: i32,
    /// `stdout` passed line by line through the include/exclude filter.
    pub filtered_output: String,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    #[schemars(schema_with = "crate::remote::schema::uint")]
    pub size: u64,
    /// Modification time (RFC3339 format), when the server reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    pub is_directory: bool,
}

/// Result of a remote `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub is_directory: bool,
    pub size: u64,
}

/// Snapshot of one pooled session for observability.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PooledConnectionInfo {
    pub server_key: String,
    /// Last borrow time (RFC3339 format)
    pub last_used: String,
}

/// Read-only pool snapshot returned by `SessionPool::stats`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    #[schemars(schema_with = "crate::remote::schema::uint")]
    pub total_connections: usize,
    pub connections: Vec<PooledConnectionInfo>,
}

/// Response from remote_upload_file
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub local_path: String,
    pub remote_path: String,
}

/// Response from remote_download
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub remote_path: String,
    pub local_path: String,
}

/// Response from remote_list_directory
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub path: String,
    pub entries: Vec<RemoteEntry>,
    #[schemars(schema_with = "crate::remote::schema::uint")]
    pub count: usize,
}

/// Response from remote_run_project_command
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCommandResponse {
    /// The command after variable substitution.
    pub command: String,
    /// Remote path of the uploaded file, when one was uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_to: Option<String>,
    pub result: ExecuteResult,
}
