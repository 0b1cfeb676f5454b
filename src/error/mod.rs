//! Error types for boxsh
//!
//! Every failure the core can surface maps onto one variant of [`ShellError`],
//! and every variant maps onto a stable process exit code.

use thiserror::Error;

/// Errors surfaced by the container lifecycle and session layers
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Container runtime unreachable: {0}")]
    Connection(#[source] bollard::errors::Error),

    #[error("Container lookup failed: {0}")]
    Lookup(#[source] bollard::errors::Error),

    #[error("Container provisioning failed: {0}")]
    Provision(String),

    #[error("Could not acquire container lock: {0}")]
    Lock(#[source] std::io::Error),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Failures of an attached exec session
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Session exited with status {0}")]
    NonZeroExit(i64),

    #[error("Session cancelled by signal")]
    Cancelled,

    #[error("Could not run session: {0}")]
    Invocation(String),
}

/// Soft failures of the orphan cleanup step. Logged, never returned to callers.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Cleanup did not finish within {0} seconds")]
    Timeout(u64),

    #[error("Cleanup command failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, ShellError>;

impl ShellError {
    /// Build a provisioning error from any displayable cause
    pub fn provision(err: impl std::fmt::Display) -> Self {
        ShellError::Provision(err.to_string())
    }

    /// Stable process exit code for this error.
    ///
    /// A remote non-zero status is passed through as the process status, the
    /// way a login shell reports its last command. Those statuses share the
    /// 1..=255 range with boxsh's own codes (78, 69, 70, 73, 75, 126, 129), so
    /// a remote `exit 126` is indistinguishable from [`ExecError::Invocation`]
    /// by status alone. The message printed to stderr tells them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellError::Config(_) => 78,
            ShellError::Connection(_) => 69,
            ShellError::Lookup(_) => 70,
            ShellError::Provision(_) => 73,
            ShellError::Lock(_) => 75,
            ShellError::Exec(e) => e.exit_code(),
        }
    }
}

impl ExecError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::NonZeroExit(status) => (*status).clamp(1, 255) as i32,
            ExecError::Cancelled => 129,
            ExecError::Invocation(_) => 126,
        }
    }
}
