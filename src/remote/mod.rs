//! Remote connection and execution subsystem.
//!
//! This module is organized into the following submodules:
//!
//! - `types`: Server descriptors, command filters and serializable results
//! - `config`: Tunables with environment variable support and the project configuration file
//! - `error`: Error kinds and their caller-facing categories
//! - `auth`: Credential resolution and authentication strategies
//! - `session`: russh client handler and the transport traits
//! - `client`: SSH connect + authenticate with a single timeout
//! - `pool`: Session pool with LRU capacity eviction and idle sweep
//! - `sftp`: SFTP-backed sessions for the pool
//! - `shell`: One-shot exec sessions
//! - `filter`: ANSI stripping, include/exclude filtering, partial line buffering
//! - `exec`: Execution slot, output sinks and the command pipeline
//! - `transfer`: Upload, download and directory listing
//! - `variables`: Command template substitution
//! - `runtime`: Process-wide state with init/shutdown hooks
//! - `tools`: MCP tool implementations

pub mod auth;
pub(crate) mod client;
pub mod config;
pub mod error;
pub mod exec;
pub mod filter;
pub mod pool;
pub mod runtime;
pub(crate) mod schema;
pub mod session;
pub mod sftp;
pub mod shell;
#[cfg(test)]
pub(crate) mod testing;
pub mod tools;
pub mod transfer;
pub mod types;
pub mod variables;

pub use runtime::Runtime;
pub use tools::RemoteTestTools;
