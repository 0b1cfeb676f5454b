//! Exact-name container lookup

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, ShellError};

use super::handle::{has_exact_name, ContainerHandle};
use super::runtime::ContainerRuntime;

/// Finds the user's container by exact name
#[derive(Clone)]
pub struct ContainerLocator {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerLocator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Find a running container named `name`
    pub async fn find_running(&self, name: &str) -> Result<Option<ContainerHandle>> {
        self.find(name, false).await
    }

    /// Find a container named `name` in any state
    pub async fn find_any(&self, name: &str) -> Result<Option<ContainerHandle>> {
        self.find(name, true).await
    }

    async fn find(&self, name: &str, all: bool) -> Result<Option<ContainerHandle>> {
        let containers = self
            .runtime
            .list_by_name(name, all)
            .await
            .map_err(classify_list_error)?;

        let mut matches = containers
            .iter()
            .filter(|c| has_exact_name(c, name))
            .filter_map(ContainerHandle::from_summary);

        let first = matches.next();
        let extra = matches.count();
        if extra > 0 {
            // Not expected, but nothing stops it; the runtime's first entry wins
            warn!(name = %name, count = extra + 1, "Multiple containers share one name");
        }

        debug!(name = %name, all, found = ?first, "Container lookup finished");
        Ok(first)
    }
}

/// A server response means the runtime answered and the listing itself failed;
/// anything else means it could not be reached
fn classify_list_error(err: bollard::errors::Error) -> ShellError {
    match err {
        bollard::errors::Error::DockerResponseServerError { .. } => ShellError::Lookup(err),
        other => ShellError::Connection(other),
    }
}
