//! Configuration for the remote execution subsystem.
//!
//! Two layers live here:
//!
//! 1. **Tunables** (timeouts, pool sizing) resolved with a three-tier priority:
//!    explicit parameter, then environment variable, then built-in default.
//! 2. **Project configuration**: a JSON file listing projects, each with the
//!    server it deploys to, its runnable commands and its log directories.
//!    [`ConfigProvider`] is the narrow view of it the core consumes.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `REMOTE_CONNECT_TIMEOUT` | 30s | Connect + authenticate timeout in seconds |
//! | `REMOTE_POOL_CAPACITY` | 10 | Maximum pooled sessions |
//! | `REMOTE_POOL_IDLE_TIMEOUT` | 60s | Idle time before a pooled session is evicted |
//! | `REMOTE_POOL_SWEEP_INTERVAL` | 30s | Interval of the idle sweep |
//! | `REMOTE_TEST_CONFIG` | `autotest-config.json` | Project configuration file |

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::types::{CommandConfig, ServerDescriptor};

/// Default connect timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of pooled sessions
pub(crate) const DEFAULT_POOL_CAPACITY: usize = 10;

/// Default idle time in seconds before a pooled session is evicted
pub(crate) const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 60;

/// Default idle sweep interval in seconds
pub(crate) const DEFAULT_POOL_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default project configuration file name
pub(crate) const DEFAULT_CONFIG_PATH: &str = "autotest-config.json";

/// Environment variable name for the connect timeout
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "REMOTE_CONNECT_TIMEOUT";

/// Environment variable name for the pool capacity
pub(crate) const POOL_CAPACITY_ENV_VAR: &str = "REMOTE_POOL_CAPACITY";

/// Environment variable name for the pool idle timeout
pub(crate) const POOL_IDLE_TIMEOUT_ENV_VAR: &str = "REMOTE_POOL_IDLE_TIMEOUT";

/// Environment variable name for the pool sweep interval
pub(crate) const POOL_SWEEP_INTERVAL_ENV_VAR: &str = "REMOTE_POOL_SWEEP_INTERVAL";

/// Environment variable name for the project configuration path
pub(crate) const CONFIG_PATH_ENV_VAR: &str = "REMOTE_TEST_CONFIG";

/// Resolve a value with priority: parameter -> env var -> default.
///
/// Unparseable environment values are ignored.
fn resolve_from_env<T: FromStr>(param: Option<T>, env_var: &str, default: T) -> T {
    if let Some(value) = param {
        return value;
    }

    if let Ok(raw) = env::var(env_var)
        && let Ok(value) = raw.trim().parse::<T>()
    {
        return value;
    }

    default
}

/// Resolve the connect timeout with priority: parameter -> env var -> default
pub fn resolve_connect_timeout(timeout_secs: Option<u64>) -> Duration {
    Duration::from_secs(resolve_from_env(
        timeout_secs,
        CONNECT_TIMEOUT_ENV_VAR,
        DEFAULT_CONNECT_TIMEOUT_SECS,
    ))
}

/// Resolve the pool capacity with priority: parameter -> env var -> default.
///
/// A capacity of zero is raised to one.
pub fn resolve_pool_capacity(capacity: Option<usize>) -> usize {
    resolve_from_env(capacity, POOL_CAPACITY_ENV_VAR, DEFAULT_POOL_CAPACITY).max(1)
}

/// Resolve the pool idle timeout with priority: parameter -> env var -> default
pub fn resolve_pool_idle_timeout(timeout_secs: Option<u64>) -> Duration {
    Duration::from_secs(resolve_from_env(
        timeout_secs,
        POOL_IDLE_TIMEOUT_ENV_VAR,
        DEFAULT_POOL_IDLE_TIMEOUT_SECS,
    ))
}

/// Resolve the idle sweep interval with priority: parameter -> env var -> default.
///
/// A zero interval is raised to one second.
pub fn resolve_pool_sweep_interval(interval_secs: Option<u64>) -> Duration {
    Duration::from_secs(
        resolve_from_env(
            interval_secs,
            POOL_SWEEP_INTERVAL_ENV_VAR,
            DEFAULT_POOL_SWEEP_INTERVAL_SECS,
        )
        .max(1),
    )
}

/// Resolve the project configuration path with priority: parameter -> env var -> default
pub fn resolve_config_path(path: Option<PathBuf>) -> PathBuf {
    resolve_from_env(
        path,
        CONFIG_PATH_ENV_VAR,
        PathBuf::from(DEFAULT_CONFIG_PATH),
    )
}

/// Sizing and timing of the session pool and its connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub capacity: usize,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_POOL_SWEEP_INTERVAL_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl PoolSettings {
    /// Resolve every setting from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            capacity: resolve_pool_capacity(None),
            idle_timeout: resolve_pool_idle_timeout(None),
            sweep_interval: resolve_pool_sweep_interval(None),
            connect_timeout: resolve_connect_timeout(None),
        }
    }
}

/// The view of configuration the remote core depends on.
pub trait ConfigProvider: Send + Sync {
    /// Server used when a caller does not name one explicitly.
    fn default_server(&self) -> Option<ServerDescriptor>;

    /// Local directory that downloads land in when no local path is given.
    fn download_directory(&self) -> Option<PathBuf>;
}

/// A named, runnable command of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCommand {
    pub name: String,
    /// Command template; may contain `{filePath}`-style variables.
    pub execute_command: String,
    /// Output filters and presentation, inlined into the command object.
    #[serde(flatten)]
    pub output: CommandConfig,
}

/// A remote log directory browsable for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDirectory {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLogs {
    #[serde(default)]
    pub directories: Vec<LogDirectory>,
    #[serde(default)]
    pub download_path: Option<PathBuf>,
}

/// One project: a local tree, the server it runs on, and what to run there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    /// Projects are enabled unless explicitly disabled.
    #[serde(default)]
    pub enabled: Option<bool>,
    pub server: ServerDescriptor,
    #[serde(default)]
    pub commands: Vec<ProjectCommand>,
    #[serde(default)]
    pub logs: Option<ProjectLogs>,
}

impl ProjectConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }

    /// Find a command by name.
    pub fn command(&self, name: &str) -> Option<&ProjectCommand> {
        self.commands.iter().find(|command| command.name == name)
    }

    fn download_path(&self) -> Option<&Path> {
        self.logs
            .as_ref()
            .and_then(|logs| logs.download_path.as_deref())
            .filter(|path| !path.as_os_str().is_empty())
    }
}

/// Top-level project configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTestConfig {
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

impl RemoteTestConfig {
    /// Parse a configuration document.
    pub fn from_json_str(json: &str) -> RemoteResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| RemoteError::config(format!("Invalid configuration: {}", e)))
    }

    /// Read and parse the configuration file at `path`.
    pub fn load(path: &Path) -> RemoteResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RemoteError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&raw)?;
        debug!(
            "Loaded {} project(s) from {}",
            config.projects.len(),
            path.display()
        );
        Ok(config)
    }

    /// Load the configuration, or start empty when the file is absent or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; starting without configured projects", e);
                Self::default()
            }
        }
    }

    /// Find an enabled project by name.
    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects
            .iter()
            .find(|project| project.name == name && project.is_enabled())
    }

    /// Find a command of an enabled project.
    pub fn command(&self, project: &str, name: &str) -> Option<&ProjectCommand> {
        self.project(project)
            .and_then(|project| project.command(name))
    }

    /// Server of the named project, or the default server when no name is given.
    pub fn server_for(&self, project: Option<&str>) -> RemoteResult<ServerDescriptor> {
        match project {
            Some(name) => self
                .project(name)
                .map(|project| project.server.clone())
                .ok_or_else(|| RemoteError::config(format!("No enabled project named '{}'", name))),
            None => self
                .default_server()
                .ok_or_else(|| RemoteError::config("No server configured")),
        }
    }
}

impl ConfigProvider for RemoteTestConfig {
    fn default_server(&self) -> Option<ServerDescriptor> {
        self.projects
            .first()
            .filter(|project| project.is_enabled())
            .map(|project| project.server.clone())
    }

    fn download_directory(&self) -> Option<PathBuf> {
        self.projects
            .iter()
            .filter(|project| project.is_enabled())
            .find_map(|project| project.download_path().map(Path::to_path_buf))
    }
}
