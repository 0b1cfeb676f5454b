//! Container runtime control API

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error;
use bollard::models::ContainerSummary;
use bollard::Docker;
use tracing::{debug, info};

use crate::error::{Result as ShellResult, ShellError};

/// The lifecycle calls boxsh needs from a container runtime.
///
/// Every call is attempted exactly once; implementations must not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers whose name is `name`, optionally including stopped ones
    async fn list_by_name(&self, name: &str, all: bool) -> Result<Vec<ContainerSummary>, Error>;

    /// Create a container named `name`, returning its id
    async fn create(&self, name: &str, config: Config<String>) -> Result<String, Error>;

    async fn start(&self, id: &str) -> Result<(), Error>;

    /// Force-remove a container in any state
    async fn remove(&self, id: &str) -> Result<(), Error>;
}

/// Docker/Podman API backed runtime
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the local defaults (`DOCKER_HOST` or the default socket)
    /// and verify the runtime answers
    pub async fn connect() -> ShellResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(ShellError::Connection)?;
        docker.ping().await.map_err(ShellError::Connection)?;

        if let Ok(version) = docker.version().await {
            info!(
                version = version.version.as_deref().unwrap_or("unknown"),
                api_version = version.api_version.as_deref().unwrap_or("unknown"),
                "Container runtime connected"
            );
        }

        Ok(Self { docker })
    }

    /// Underlying API client
    pub fn client(&self) -> Docker {
        self.docker.clone()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_by_name(&self, name: &str, all: bool) -> Result<Vec<ContainerSummary>, Error> {
        // The name filter matches substrings, so anchor it
        let pattern = format!("^/{}$", name.replace('.', "\\."));
        let filters = HashMap::from([("name".to_string(), vec![pattern])]);

        debug!(name = %name, all, "Listing containers");
        self.docker
            .list_containers(Some(ListContainersOptions::<String> {
                all,
                filters,
                ..Default::default()
            }))
            .await
    }

    async fn create(&self, name: &str, config: Config<String>) -> Result<String, Error> {
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    platform: None,
                }),
                config,
            )
            .await?;

        for warning in &response.warnings {
            debug!(warning = %warning, "Runtime warning on create");
        }

        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), Error> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn remove(&self, id: &str) -> Result<(), Error> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
    }
}
