//! Orphan process cleanup
//!
//! Processes started through an exec session keep running when the attached
//! client goes away (for example when an ssh connection drops). After every
//! session one more command is run in the container: if the session's
//! pid-file exists, the whole process group it names gets a hangup and the
//! file is removed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ShellConfig;
use crate::error::CleanupError;

use super::pidfile::PidFile;
use super::transport::{ExecRequest, SessionTransport};

/// Best-effort, time-bounded removal of a session's leftover processes
pub struct OrphanCleanup {
    transport: Arc<dyn SessionTransport>,
    timeout: Duration,
}

impl OrphanCleanup {
    pub fn new(transport: Arc<dyn SessionTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// The command run inside the container
    pub fn request(container_id: &str, config: &ShellConfig, pid_file: &PidFile) -> ExecRequest {
        ExecRequest {
            container_id: container_id.to_string(),
            argv: vec![
                config.shell.clone(),
                "-c".to_string(),
                pid_file.cleanup_script(),
            ],
            user: config.user_spec(),
            working_dir: "/".to_string(),
            env: Vec::new(),
            tty: false,
            attach_stdin: false,
        }
    }

    /// Run the cleanup command. If it does not finish within the timeout it
    /// is abandoned (its future dropped) and [`CleanupError::Timeout`] returned.
    pub async fn cleanup(
        &self,
        container_id: &str,
        config: &ShellConfig,
        pid_file: &PidFile,
    ) -> Result<(), CleanupError> {
        let request = Self::request(container_id, config, pid_file);
        debug!(container_id = %container_id, pid_file = %pid_file, "Running exec cleanup");

        match tokio::time::timeout(self.timeout, self.transport.run_detached(&request)).await {
            Ok(Ok(0)) => {
                debug!("Exec cleanup finished");
                Ok(())
            }
            Ok(Ok(status)) => Err(CleanupError::Failed(format!("exit status {}", status))),
            Ok(Err(e)) => Err(CleanupError::Failed(e.to_string())),
            Err(_) => Err(CleanupError::Timeout(self.timeout.as_secs())),
        }
    }

    /// [`Self::cleanup`], with every failure logged and swallowed
    pub async fn run(&self, container_id: &str, config: &ShellConfig, pid_file: &PidFile) {
        if let Err(e) = self.cleanup(container_id, config, pid_file).await {
            warn!(container_id = %container_id, pid_file = %pid_file, error = %e, "Exec cleanup failed");
        }
    }
}
