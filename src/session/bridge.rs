//! Attaching the invoking terminal to the user's container

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ShellConfig;
use crate::error::ExecError;

use super::cleanup::OrphanCleanup;
use super::invocation::Invocation;
use super::pidfile::PidFile;
use super::signals::spawn_signal_listener;
use super::transport::{ExecRequest, SessionTransport};

/// What kind of session is started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    /// One-shot `shell -c <command>`
    Command(String),
    /// Login shell, optionally forced interactive
    Login { interactive: bool },
}

/// A fully decided session: what runs, and which pid-file it may leave behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub mode: SessionMode,
    pub request: ExecRequest,
    pub pid_file: PidFile,
}

impl SessionPlan {
    pub fn build(container_id: &str, config: &ShellConfig, invocation: &Invocation) -> Self {
        let pid_file = PidFile::for_process(&config.pid_file_dir, invocation.pid);

        let (mode, argv) = match &invocation.command {
            Some(command) => (
                SessionMode::Command(command.clone()),
                vec![config.shell.clone(), "-c".to_string(), command.clone()],
            ),
            None => {
                let interactive = invocation.interactive_prompt;
                let mut argv = vec![config.shell.clone(), "--login".to_string()];
                if interactive {
                    argv.push("-i".to_string());
                }
                argv.push("-c".to_string());
                argv.push(pid_file.bootstrap_script(&config.shell));
                (SessionMode::Login { interactive }, argv)
            }
        };

        let request = ExecRequest {
            container_id: container_id.to_string(),
            argv,
            user: config.user_spec(),
            working_dir: config.user_cwd.clone(),
            env: config.env.clone(),
            tty: invocation.stdout_is_tty,
            attach_stdin: true,
        };

        Self {
            mode,
            request,
            pid_file,
        }
    }
}

/// Runs one session and its cleanup
pub struct ExecSessionBridge {
    transport: Arc<dyn SessionTransport>,
    cleanup: OrphanCleanup,
}

impl ExecSessionBridge {
    pub fn new(transport: Arc<dyn SessionTransport>, cleanup_timeout: Duration) -> Self {
        let cleanup = OrphanCleanup::new(transport.clone(), cleanup_timeout);
        Self { transport, cleanup }
    }

    /// Run the session until it ends or a termination signal arrives, then
    /// run the orphan cleanup. Cleanup happens exactly once on every path and
    /// never changes the returned outcome.
    pub async fn run(
        &self,
        container_id: &str,
        config: &ShellConfig,
        invocation: &Invocation,
    ) -> Result<(), ExecError> {
        let plan = SessionPlan::build(container_id, config, invocation);
        debug!(
            mode = ?plan.mode,
            tty = plan.request.tty,
            pid_file = %plan.pid_file,
            "Exec into the container"
        );

        let cancel = CancellationToken::new();
        let listener = match spawn_signal_listener(cancel.clone()) {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!(error = %e, "Could not install signal handlers");
                None
            }
        };

        let outcome = self.transport.run_attached(&plan.request, cancel.clone()).await;

        // Stop listening before cleanup so a late signal cannot cancel anything else
        cancel.cancel();
        if let Some(listener) = listener {
            listener.abort();
        }

        self.cleanup.run(container_id, config, &plan.pid_file).await;

        match outcome {
            Ok(0) => {
                info!(container_id = %container_id, "Session finished");
                Ok(())
            }
            Ok(status) => Err(ExecError::NonZeroExit(status)),
            Err(e) => Err(e),
        }
    }
}
