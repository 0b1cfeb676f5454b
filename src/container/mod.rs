//! Container management module for boxsh
//!
//! Handles all interactions with the container runtime:
//! - Locating the user's container by exact name
//! - Recreating and starting it with a hardened configuration
//! - Serializing concurrent recreation of the same container name

mod handle;
mod locator;
mod lock;
mod provisioner;
mod runtime;

pub use handle::{ContainerHandle, ContainerState};
pub use locator::ContainerLocator;
pub use lock::NameLock;
pub use provisioner::{container_config, ContainerProvisioner, DROPPED_CAPABILITIES, SCREEN_STATE_DIR};
pub use runtime::{ContainerRuntime, DockerRuntime};

#[cfg(test)]
pub use runtime::MockContainerRuntime;
