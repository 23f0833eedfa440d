//! Pooled SSH sessions, streamed remote command execution and SFTP transfer.

pub mod remote;
