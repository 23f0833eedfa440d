//! Error kinds for the remote connection and execution subsystem.
//!
//! Every public operation fails with a [`RemoteError`]. Callers distinguish
//! "busy, try again" from "hard failure" from "misconfiguration" through
//! [`RemoteError::category`] rather than by parsing messages.
//!
//! # Retry Policy
//!
//! Nothing in this crate retries a network operation. A failure is surfaced to
//! the immediate caller with a message derived from the transport error, and
//! the caller decides what to do with it.
//!
//! # Examples
//!
//! ```rust,ignore
//! use remote_exec::remote::error::{ErrorCategory, RemoteError};
//!
//! let err = RemoteError::AlreadyExecuting;
//! assert_eq!(err.category(), ErrorCategory::Busy);
//! ```

use thiserror::Error;

/// Errors produced by the session pool, command pipeline and transfer client.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Neither a password nor a readable private key is configured.
    #[error("No SSH authentication configured for {server}: set a password or a readable private key")]
    AuthConfigMissing { server: String },

    /// Network failure, handshake failure, timeout, or credentials rejected by the remote.
    #[error("SSH connection failed: {0}")]
    ConnectFailure(String),

    /// The remote refused to open or run the exec channel.
    #[error("Command execution failed: {0}")]
    ExecChannelFailure(String),

    /// Another command currently holds the execution slot.
    #[error("A remote command is already executing, wait for it to finish and try again")]
    AlreadyExecuting,

    /// A stat on the remote path failed during a file-or-directory download.
    #[error("Remote path not found: {0}")]
    RemotePathNotFound(String),

    /// Upload or download I/O failed. Partially written local files are left in place.
    #[error("File transfer failed: {0}")]
    TransferFailure(String),

    /// Required configuration is missing or unreadable.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using [`RemoteError`].
pub type RemoteResult<T> = Result<T, RemoteError>;

/// How a caller should react to a [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient contention, worth waiting and retrying.
    Busy,
    /// The configuration needs fixing before anything can succeed.
    Misconfiguration,
    /// Anything else; show the details.
    Failure,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Busy => write!(f, "busy"),
            ErrorCategory::Misconfiguration => write!(f, "misconfiguration"),
            ErrorCategory::Failure => write!(f, "error"),
        }
    }
}

impl RemoteError {
    /// Create a connect failure from any displayable message.
    pub fn connect(msg: impl Into<String>) -> Self {
        RemoteError::ConnectFailure(msg.into())
    }

    /// Create an exec channel failure from any displayable message.
    pub fn exec(msg: impl Into<String>) -> Self {
        RemoteError::ExecChannelFailure(msg.into())
    }

    /// Create a transfer failure from any displayable message.
    pub fn transfer(msg: impl Into<String>) -> Self {
        RemoteError::TransferFailure(msg.into())
    }

    /// Create a configuration error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        RemoteError::Config(msg.into())
    }

    /// Classify this error for the caller's UX.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RemoteError::AlreadyExecuting => ErrorCategory::Busy,
            RemoteError::AuthConfigMissing { .. } | RemoteError::Config(_) => {
                ErrorCategory::Misconfiguration
            }
            RemoteError::ConnectFailure(_)
            | RemoteError::ExecChannelFailure(_)
            | RemoteError::RemotePathNotFound(_)
            | RemoteError::TransferFailure(_) => ErrorCategory::Failure,
        }
    }

    /// Whether this is lock contention rather than a real failure.
    pub fn is_busy(&self) -> bool {
        matches!(self, RemoteError::AlreadyExecuting)
    }

    /// Render the error prefixed with its category, e.g. `busy: ...`.
    pub fn to_categorized_string(&self) -> String {
        format!("{}: {}", self.category(), self)
    }
}

/// Message fragments that indicate the remote rejected the credentials.
///
/// Used to make connect failures readable in logs. These never drive retries.
const AUTH_REJECTION_PATTERNS: &[&str] = &[
    "authentication failed",
    "authentication rejected",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
    "failed to load private key",
];

/// Whether a connect error message describes rejected credentials rather
/// than a network problem.
pub(crate) fn is_auth_rejection(error: &str) -> bool {
    let error_lower = error.to_lowercase();
    AUTH_REJECTION_PATTERNS
        .iter()
        .any(|pattern| error_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod categories {
        use super::*;

        #[test]
        fn test_already_executing_is_busy() {
            let err = RemoteError::AlreadyExecuting;
            assert_eq!(err.category(), ErrorCategory::Busy);
            assert!(err.is_busy());
        }

        #[test]
        fn test_missing_auth_is_misconfiguration() {
            let err = RemoteError::AuthConfigMissing {
                server: "root@10.0.0.1:22".to_string(),
            };
            assert_eq!(err.category(), ErrorCategory::Misconfiguration);
            assert!(!err.is_busy());
        }

        #[test]
        fn test_config_is_misconfiguration() {
            let err = RemoteError::config("no server configured");
            assert_eq!(err.category(), ErrorCategory::Misconfiguration);
        }

        #[test]
        fn test_transport_errors_are_failures() {
            assert_eq!(
                RemoteError::connect("refused").category(),
                ErrorCategory::Failure
            );
            assert_eq!(
                RemoteError::exec("channel refused").category(),
                ErrorCategory::Failure
            );
            assert_eq!(
                RemoteError::RemotePathNotFound("/var/log/x".into()).category(),
                ErrorCategory::Failure
            );
            assert_eq!(
                RemoteError::transfer("broken pipe").category(),
                ErrorCategory::Failure
            );
        }
    }

    mod display {
        use super::*;

        #[test]
        fn test_connect_failure_message() {
            let err = RemoteError::connect("Connection refused");
            assert_eq!(err.to_string(), "SSH connection failed: Connection refused");
        }

        #[test]
        fn test_remote_path_not_found_names_path() {
            let err = RemoteError::RemotePathNotFound("/tmp/missing".to_string());
            assert!(err.to_string().contains("/tmp/missing"));
        }

        #[test]
        fn test_auth_config_missing_names_server() {
            let err = RemoteError::AuthConfigMissing {
                server: "deploy@build01:2222".to_string(),
            };
            assert!(err.to_string().contains("deploy@build01:2222"));
        }

        #[test]
        fn test_categorized_string() {
            assert!(
                RemoteError::AlreadyExecuting
                    .to_categorized_string()
                    .starts_with("busy: ")
            );
            assert!(
                RemoteError::config("x")
                    .to_categorized_string()
                    .starts_with("misconfiguration: ")
            );
            assert!(
                RemoteError::transfer("x")
                    .to_categorized_string()
                    .starts_with("error: ")
            );
        }
    }

    mod auth_rejection {
        use super::*;

        #[test]
        fn test_detects_rejected_credentials() {
            assert!(is_auth_rejection("Authentication failed"));
            assert!(is_auth_rejection("PERMISSION DENIED (publickey)"));
            assert!(is_auth_rejection(
                "Authentication rejected for root@10.0.0.1:22"
            ));
        }

        #[test]
        fn test_network_errors_are_not_rejections() {
            assert!(!is_auth_rejection("Connection refused"));
            assert!(!is_auth_rejection("Connection timed out after 30s"));
            assert!(!is_auth_rejection(""));
        }
    }
}
