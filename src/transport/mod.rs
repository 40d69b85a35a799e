//! Remote command execution.
//!
//! Every probe in the collector talks to its host through a [`CommandExecutor`]:
//! one shell command in, its standard output back. The trait is the seam
//! between the discovery core and the actual transport, so tests drive the
//! collector with in-memory executors while the binary uses [`SshExecutor`].

pub mod ssh;

pub use ssh::{expand_home, AuthType, SshExecutor, SshSettings};

use async_trait::async_trait;

/// Exit status a POSIX shell reports when a command is not installed.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Errors raised by a transport while executing a remote command
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecError {
    /// Host unreachable, authentication refused or the session dropped mid-call
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    /// No response within the transport's own time limit
    #[error("command on {host} timed out after {seconds}s")]
    Timeout { host: String, seconds: u64 },

    /// The command ran but exited non-zero
    #[error("command exited with status {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },
}

impl ExecError {
    /// True when the remote shell could not find the requested tool
    pub fn is_command_missing(&self) -> bool {
        matches!(self, ExecError::CommandFailed { exit_code, .. } if *exit_code == EXIT_COMMAND_NOT_FOUND)
    }

    /// True when the failure means the host itself cannot be talked to
    pub fn is_host_level(&self) -> bool {
        matches!(self, ExecError::Connection { .. } | ExecError::Timeout { .. })
    }
}

/// Capability to run shell commands on one host.
///
/// Implementations must be cancel-safe: dropping the returned future aborts
/// the remote call. Implementations never retry on their own.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` through the remote shell and return its standard output
    async fn execute(&self, command: &str) -> Result<String, ExecError>;
}
