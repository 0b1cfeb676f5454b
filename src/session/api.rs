//! Session transport through the runtime's exec API

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecResults};
use bollard::Docker;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ExecError;

use super::terminal::{RawModeGuard, ResizeWatcher, TerminalSize};
use super::transport::{ExecRequest, SessionTransport};

/// Streams sessions over the API connection, no client binary needed
pub struct ApiTransport {
    docker: Docker,
}

impl ApiTransport {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    async fn create(&self, request: &ExecRequest, attach_stdin: bool) -> Result<String, ExecError> {
        let exec = self
            .docker
            .create_exec(&request.container_id, exec_options(request, attach_stdin))
            .await
            .map_err(invocation)?;

        debug!(exec_id = %exec.id, "Exec instance created");
        Ok(exec.id)
    }

    async fn exit_code(&self, exec_id: &str) -> Result<i64, ExecError> {
        let inspect = self.docker.inspect_exec(exec_id).await.map_err(invocation)?;
        Ok(inspect.exit_code.unwrap_or(-1))
    }

    /// Size the remote tty now, then follow local window changes until aborted
    fn spawn_resize_forwarder(&self, exec_id: &str) -> JoinHandle<()> {
        let docker = self.docker.clone();
        let exec_id = exec_id.to_string();

        tokio::spawn(async move {
            if let Some(size) = TerminalSize::current() {
                resize(&docker, &exec_id, size).await;
            }

            let mut watcher = match ResizeWatcher::new() {
                Ok(watcher) => watcher,
                Err(e) => {
                    warn!(error = %e, "Could not watch for window changes");
                    return;
                }
            };
            while let Some(size) = watcher.recv().await {
                resize(&docker, &exec_id, size).await;
            }
        })
    }
}

async fn resize(docker: &Docker, exec_id: &str, size: TerminalSize) {
    debug!(cols = size.cols, rows = size.rows, "Resizing remote terminal");
    if let Err(e) = docker.resize_exec(exec_id, resize_options(size)).await {
        debug!(error = %e, "Could not size remote terminal");
    }
}

/// Exec creation options for `request`
pub(crate) fn exec_options(request: &ExecRequest, attach_stdin: bool) -> CreateExecOptions<String> {
    CreateExecOptions {
        attach_stdin: Some(attach_stdin),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(request.tty),
        env: Some(request.env.clone()),
        cmd: Some(request.argv.clone()),
        user: Some(request.user.clone()),
        working_dir: Some(request.working_dir.clone()),
        ..Default::default()
    }
}

fn resize_options(size: TerminalSize) -> ResizeExecOptions {
    ResizeExecOptions {
        height: size.rows,
        width: size.cols,
    }
}

#[async_trait]
impl SessionTransport for ApiTransport {
    async fn run_attached(
        &self,
        request: &ExecRequest,
        cancel: CancellationToken,
    ) -> Result<i64, ExecError> {
        let exec_id = self.create(request, request.attach_stdin).await?;
        let _raw = if request.tty { RawModeGuard::enter() } else { None };

        let (mut output, mut input) = match self.docker.start_exec(&exec_id, None).await.map_err(invocation)? {
            StartExecResults::Attached { output, input } => (output, input),
            StartExecResults::Detached => {
                return Err(ExecError::Invocation("exec started detached".to_string()))
            }
        };

        let resizer = request.tty.then(|| self.spawn_resize_forwarder(&exec_id));

        let stdin_pump = request.attach_stdin.then(|| {
            tokio::spawn(async move {
                let mut stdin = tokio::io::stdin();
                if let Err(e) = tokio::io::copy(&mut stdin, &mut input).await {
                    debug!(error = %e, "stdin forwarding stopped");
                }
                let _ = input.shutdown().await;
            })
        });

        let output_pump = async {
            let mut stdout = tokio::io::stdout();
            let mut stderr = tokio::io::stderr();
            while let Some(chunk) = output.next().await {
                match chunk.map_err(invocation)? {
                    LogOutput::StdErr { message } => {
                        stderr.write_all(&message).await.map_err(invocation)?;
                        stderr.flush().await.map_err(invocation)?;
                    }
                    other => {
                        stdout.write_all(&other.into_bytes()).await.map_err(invocation)?;
                        stdout.flush().await.map_err(invocation)?;
                    }
                }
            }
            Ok::<(), ExecError>(())
        };

        let result = tokio::select! {
            r = output_pump => r,
            _ = cancel.cancelled() => Err(ExecError::Cancelled),
        };

        if let Some(pump) = stdin_pump {
            pump.abort();
        }
        if let Some(resizer) = resizer {
            resizer.abort();
        }
        result?;

        self.exit_code(&exec_id).await
    }

    async fn run_detached(&self, request: &ExecRequest) -> Result<i64, ExecError> {
        let exec_id = self.create(request, false).await?;

        match self.docker.start_exec(&exec_id, None).await.map_err(invocation)? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(LogOutput::StdErr { message }) => {
                            debug!(stderr = %String::from_utf8_lossy(&message).trim(), "Detached command output")
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "Detached command stream failed");
                            return Err(invocation(e));
                        }
                    }
                }
            }
            StartExecResults::Detached => {}
        }

        self.exit_code(&exec_id).await
    }
}

fn invocation(err: impl std::fmt::Display) -> ExecError {
    ExecError::Invocation(err.to_string())
}
