//! Session transport through the external `docker` client

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ExecError, Result, ShellError};

use super::transport::{ExecRequest, SessionTransport};

/// Runs sessions with `docker exec`, which gives full terminal fidelity
/// (raw mode, window resizes, escape sequences) for free
pub struct CliTransport {
    docker_binary: PathBuf,
}

impl CliTransport {
    /// Use `explicit` if given, otherwise find `docker` on PATH
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        let docker_binary = match explicit {
            Some(path) => path.to_path_buf(),
            None => which::which("docker")
                .map_err(|e| ShellError::Config(format!("docker client not found: {}", e)))?,
        };

        debug!(binary = %docker_binary.display(), "Using docker client");
        Ok(Self { docker_binary })
    }

    /// `docker exec` arguments for `request`
    pub fn build_args(request: &ExecRequest) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "--user".to_string(),
            request.user.clone(),
            "--workdir".to_string(),
            request.working_dir.clone(),
        ];

        for assignment in &request.env {
            args.push("-e".to_string());
            args.push(assignment.clone());
        }

        if request.tty {
            args.push("--tty".to_string());
        }
        if request.attach_stdin {
            args.push("--interactive".to_string());
        }

        args.push(request.container_id.clone());
        args.extend(request.argv.iter().cloned());
        args
    }

    fn command(&self, request: &ExecRequest) -> Command {
        let mut cmd = Command::new(&self.docker_binary);
        cmd.args(Self::build_args(request)).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SessionTransport for CliTransport {
    async fn run_attached(
        &self,
        request: &ExecRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<i64, ExecError> {
        let mut cmd = self.command(request);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!(args = ?Self::build_args(request), "Running command and waiting for it to finish");
        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Invocation(format!("failed to spawn docker client: {}", e)))?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| ExecError::Invocation(e.to_string()))?;
                debug!(status = %status, "Command finished");
                Ok(status_code(status))
            }
            _ = cancel.cancelled() => {
                debug!("Session cancelled, killing docker client");
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(ExecError::Cancelled)
            }
        }
    }

    async fn run_detached(&self, request: &ExecRequest) -> std::result::Result<i64, ExecError> {
        let mut cmd = self.command(request);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(args = ?Self::build_args(request), "Running detached command");
        let output = cmd
            .output()
            .await
            .map_err(|e| ExecError::Invocation(format!("failed to run docker client: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(status = %output.status, stderr = %stderr.trim(), "Detached command failed");
        }

        Ok(status_code(output.status))
    }
}

/// Exit code, or the shell convention `128 + signal` when killed
fn status_code(status: ExitStatus) -> i64 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code as i64,
        (None, Some(signal)) => 128 + signal as i64,
        (None, None) => -1,
    }
}
