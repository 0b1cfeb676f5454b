//! End-to-end flow of one boxsh invocation

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{ExecTransportKind, ShellConfig};
use crate::container::{ContainerLocator, ContainerProvisioner, ContainerRuntime, DockerRuntime};
use crate::error::Result;
use crate::session::{ApiTransport, CliTransport, ExecSessionBridge, Invocation, SessionTransport};

/// Locate-or-recreate the user's container, then bridge one session into it
pub struct Shell {
    config: ShellConfig,
    locator: ContainerLocator,
    provisioner: ContainerProvisioner,
    bridge: ExecSessionBridge,
}

impl Shell {
    pub fn new(
        config: ShellConfig,
        runtime: Arc<dyn ContainerRuntime>,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        let cleanup_timeout = Duration::from_secs(config.cleanup_timeout_secs);
        Self {
            locator: ContainerLocator::new(runtime.clone()),
            provisioner: ContainerProvisioner::new(runtime),
            bridge: ExecSessionBridge::new(transport, cleanup_timeout),
            config,
        }
    }

    /// Connect to the local runtime and pick the configured transport
    pub async fn connect(config: ShellConfig) -> Result<Self> {
        let runtime = DockerRuntime::connect().await?;
        let transport: Arc<dyn SessionTransport> = match config.exec_transport {
            ExecTransportKind::Cli => Arc::new(CliTransport::new(config.docker_binary.as_deref())?),
            ExecTransportKind::Api => Arc::new(ApiTransport::new(runtime.client())),
        };
        Ok(Self::new(config, Arc::new(runtime), transport))
    }

    /// Make sure the container runs, returning its id. Lookup and provisioning
    /// errors are returned before any session starts.
    pub async fn prepare(&self) -> Result<String> {
        let name = &self.config.container_name;
        debug!(name = %name, "Checking for container");

        let id = match self.locator.find_running(name).await? {
            Some(handle) => {
                debug!(id = %handle.id, "Container running");
                handle.id
            }
            None => {
                debug!("Container is not running, starting it");
                self.provisioner.reuse_or_replace(&self.config).await?.id
            }
        };

        debug!(id = %id, "Container ID");
        Ok(id)
    }

    /// Full invocation: prepare the container, then run the session and its cleanup
    pub async fn run(&self, invocation: &Invocation) -> Result<()> {
        let id = self.prepare().await?;
        self.bridge.run(&id, &self.config, invocation).await?;
        Ok(())
    }
}
