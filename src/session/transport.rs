//! Session transport abstraction
//!
//! The bridge and the cleanup protocol only describe *what* to run; a
//! transport decides *how* it reaches the container (external client binary
//! or the runtime's exec API).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExecError;

/// One command to run inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub container_id: String,

    /// Program and arguments
    pub argv: Vec<String>,

    /// `uid:gid`
    pub user: String,

    pub working_dir: String,

    /// `KEY=VALUE` assignments, passed one by one
    pub env: Vec<String>,

    /// Allocate a pseudo-terminal
    pub tty: bool,

    /// Attach our stdin
    pub attach_stdin: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Run `request` wired straight to our stdin, stdout and stderr and return
    /// its exit status. Returns [`ExecError::Cancelled`] promptly once `cancel`
    /// fires.
    async fn run_attached(
        &self,
        request: &ExecRequest,
        cancel: CancellationToken,
    ) -> Result<i64, ExecError>;

    /// Run `request` with no terminal and no stdio and return its exit status.
    /// Dropping the returned future abandons the command.
    async fn run_detached(&self, request: &ExecRequest) -> Result<i64, ExecError>;
}
