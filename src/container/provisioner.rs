//! Container (re)creation

use std::collections::HashMap;
use std::sync::Arc;

use bollard::container::Config;
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use tracing::{debug, error, info, warn};

use crate::config::ShellConfig;
use crate::error::{Result, ShellError};

use super::handle::ContainerHandle;
use super::locator::ContainerLocator;
use super::lock::NameLock;
use super::runtime::ContainerRuntime;

/// Capabilities every container loses
pub const DROPPED_CAPABILITIES: [&str; 4] = ["SETUID", "SETGID", "NET_RAW", "MKNOD"];

/// Private writable volume for terminal multiplexer state
pub const SCREEN_STATE_DIR: &str = "/var/run/screen";

/// Where the control socket appears inside the container
const CONTAINER_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Guarantees exactly one running container carries the configured name
pub struct ContainerProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
    locator: ContainerLocator,
}

impl ContainerProvisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        let locator = ContainerLocator::new(runtime.clone());
        Self { runtime, locator }
    }

    /// Remove any container with the configured name, then create and start a
    /// fresh one. Nothing is retried.
    pub async fn ensure_running(&self, config: &ShellConfig) -> Result<ContainerHandle> {
        let _lock = self.lock(config).await?;
        self.replace(config).await
    }

    /// Reuse a running container with the configured name, otherwise
    /// [`Self::ensure_running`]. The running check and the replacement happen
    /// under one lock, so a concurrent login never removes a container another
    /// login just started.
    pub async fn reuse_or_replace(&self, config: &ShellConfig) -> Result<ContainerHandle> {
        let _lock = self.lock(config).await?;

        if let Some(running) = self.locator.find_running(&config.container_name).await? {
            debug!(id = %running.id, "Container started by a concurrent login");
            return Ok(running);
        }

        self.replace(config).await
    }

    async fn lock(&self, config: &ShellConfig) -> Result<NameLock> {
        let lock = NameLock::acquire(&config.lock_dir, &config.container_name)
            .await
            .map_err(ShellError::Lock)?;
        debug!(path = %lock.path().display(), "Holding container lock");
        Ok(lock)
    }

    /// Remove-then-create. Callers hold the name lock.
    async fn replace(&self, config: &ShellConfig) -> Result<ContainerHandle> {
        let name = &config.container_name;

        if let Some(existing) = self.locator.find_any(name).await? {
            debug!(name = %name, id = %existing.id, state = ?existing.state, "Removing existing container");
            self.runtime
                .remove(&existing.id)
                .await
                .map_err(ShellError::provision)?;
        }

        let container = container_config(config);
        debug!(name = %name, image = %config.image_name, "Creating container");
        let id = self
            .runtime
            .create(name, container)
            .await
            .map_err(ShellError::provision)?;

        if let Err(e) = self.runtime.start(&id).await {
            error!(name = %name, id = %id, error = %e, "Container start failed");
            // Do not leave a created-but-unstarted instance behind
            match self.runtime.remove(&id).await {
                Ok(()) => debug!(id = %id, "Removed unstarted container"),
                Err(remove_err) => {
                    warn!(id = %id, error = %remove_err, "Could not remove unstarted container")
                }
            }
            return Err(ShellError::provision(e));
        }

        info!(name = %name, id = %id, "Container started");
        Ok(ContainerHandle::running(id))
    }
}

/// Full create-time configuration for the user's container
pub fn container_config(config: &ShellConfig) -> Config<String> {
    let entrypoint = config.entrypoint.as_ref().map(|e| vec![e.clone()]);
    debug!(entrypoint = ?entrypoint, "Entry point");

    Config {
        hostname: config.container_hostname(),
        user: Some(config.user_spec()),
        env: Some(config.env.clone()),
        image: Some(config.image_name.clone()),
        working_dir: Some(config.user_cwd.clone()),
        entrypoint,
        cmd: (!config.command.is_empty()).then(|| config.command.clone()),
        labels: Some(HashMap::from([(
            "user".to_string(),
            config.container_username.clone(),
        )])),
        shell: Some(vec![config.shell.clone()]),
        tty: Some(false),
        open_stdin: Some(false),
        host_config: Some(HostConfig {
            binds: Some(bind_mounts(config)),
            auto_remove: Some(true),
            cap_add: None,
            cap_drop: Some(DROPPED_CAPABILITIES.iter().map(|c| c.to_string()).collect()),
            privileged: Some(false),
            publish_all_ports: Some(false),
            readonly_rootfs: Some(true),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            memory: (config.memory_quota > 0).then_some(config.memory_quota),
            mounts: Some(vec![Mount {
                target: Some(SCREEN_STATE_DIR.to_string()),
                typ: Some(MountTypeEnum::VOLUME),
                read_only: Some(false),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn bind_mounts(config: &ShellConfig) -> Vec<String> {
    let mut binds = vec![
        "/etc/passwd:/etc/passwd:ro".to_string(),
        "/etc/group:/etc/group:ro".to_string(),
    ];

    if config.mount_tmp {
        debug!("Bind mounting /tmp");
        binds.push("/tmp:/tmp:rw".to_string());
    }
    if config.mount_home {
        let home = format!("{}:{}:rw", config.mount_home_from, config.mount_home_to);
        debug!(bind = %home, "Bind mounting home");
        binds.push(home);
    }
    if config.mount_docker_socket {
        debug!(socket = %config.docker_socket, "Bind mounting control socket");
        binds.push(format!("{}:{}", config.docker_socket, CONTAINER_DOCKER_SOCKET));
    }

    binds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerState, MockContainerRuntime};
    use crate::testing::{test_config, FakeRuntime};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hardening_is_unconditional() {
        let (_dir, config) = test_config("devbox");
        let container = container_config(&config);
        let host = container.host_config.unwrap();

        assert_eq!(host.auto_remove, Some(true));
        assert_eq!(host.readonly_rootfs, Some(true));
        assert_eq!(host.privileged, Some(false));
        assert_eq!(host.publish_all_ports, Some(false));
        assert_eq!(host.cap_add, None);
        assert_eq!(
            host.cap_drop.unwrap(),
            vec!["SETUID", "SETGID", "NET_RAW", "MKNOD"]
        );
        assert_eq!(host.security_opt.unwrap(), vec!["no-new-privileges"]);
        assert!(host.port_bindings.is_none());

        let mounts = host.mounts.unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].target.as_deref(), Some(SCREEN_STATE_DIR));
        assert_eq!(mounts[0].typ, Some(MountTypeEnum::VOLUME));
    }

    #[test]
    fn test_identity_and_hostname() {
        let (_dir, mut config) = test_config("devbox");
        config.hostname = Some("build-host".to_string());
        config.container_username = "alice".to_string();

        let container = container_config(&config);
        assert_eq!(container.user.as_deref(), Some("1000:1000"));
        assert_eq!(container.hostname.as_deref(), Some("build-host"));
        assert_eq!(container.labels.unwrap()["user"], "alice");
        assert_eq!(container.working_dir.as_deref(), Some("/home/alice"));
    }

    #[test]
    fn test_default_binds_are_identity_files_only() {
        let (_dir, config) = test_config("devbox");
        assert_eq!(
            bind_mounts(&config),
            vec!["/etc/passwd:/etc/passwd:ro", "/etc/group:/etc/group:ro"]
        );
    }

    #[test]
    fn test_optional_binds() {
        let (_dir, mut config) = test_config("devbox");
        config.mount_tmp = true;
        config.mount_home = true;
        config.mount_home_from = "/srv/homes/alice".to_string();
        config.mount_home_to = "/home/alice".to_string();
        config.mount_docker_socket = true;
        config.docker_socket = "/run/user/1000/docker.sock".to_string();

        let binds = bind_mounts(&config);
        assert_eq!(
            &binds[2..],
            &[
                "/tmp:/tmp:rw".to_string(),
                "/srv/homes/alice:/home/alice:rw".to_string(),
                "/run/user/1000/docker.sock:/var/run/docker.sock".to_string(),
            ]
        );
    }

    #[test]
    fn test_memory_quota_and_entrypoint() {
        let (_dir, mut config) = test_config("devbox");
        let container = container_config(&config);
        assert_eq!(container.host_config.unwrap().memory, None);
        assert_eq!(container.entrypoint, None);

        config.memory_quota = 512 * 1024 * 1024;
        config.entrypoint = Some("/sbin/init".to_string());
        let container = container_config(&config);
        assert_eq!(container.host_config.unwrap().memory, Some(536_870_912));
        assert_eq!(container.entrypoint, Some(vec!["/sbin/init".to_string()]));
    }

    #[tokio::test]
    async fn test_scenario_a_creates_missing_container() {
        let (_dir, config) = test_config("devbox");
        let runtime = Arc::new(FakeRuntime::new());
        let provisioner = ContainerProvisioner::new(runtime.clone());

        let handle = provisioner.ensure_running(&config).await.unwrap();
        assert!(!handle.id.is_empty());
        assert_eq!(handle.state, ContainerState::Running);

        let locator = ContainerLocator::new(runtime.clone());
        let found = locator.find_running("devbox").await.unwrap().unwrap();
        assert_eq!(found.id, handle.id);
    }

    #[tokio::test]
    async fn test_scenario_b_replaces_stopped_container() {
        let (_dir, config) = test_config("devbox");
        let runtime = Arc::new(FakeRuntime::new());
        let stale = runtime.insert_stopped("devbox");
        let provisioner = ContainerProvisioner::new(runtime.clone());

        let handle = provisioner.ensure_running(&config).await.unwrap();
        assert_ne!(handle.id, stale);
        assert_eq!(runtime.count_named("devbox"), 1);
        assert!(!runtime.exists(&stale));
    }

    #[tokio::test]
    async fn test_running_container_is_also_replaced() {
        let (_dir, config) = test_config("devbox");
        let runtime = Arc::new(FakeRuntime::new());
        let old = runtime.insert_running("devbox");
        let provisioner = ContainerProvisioner::new(runtime.clone());

        let handle = provisioner.ensure_running(&config).await.unwrap();
        assert_ne!(handle.id, old);
        assert_eq!(runtime.count_named("devbox"), 1);
    }

    #[tokio::test]
    async fn test_repeated_calls_keep_name_unique() {
        let (_dir, config) = test_config("devbox");
        let runtime = Arc::new(FakeRuntime::new());
        let provisioner = ContainerProvisioner::new(runtime.clone());

        let first = provisioner.ensure_running(&config).await.unwrap();
        let second = provisioner.ensure_running(&config).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(runtime.count_named("devbox"), 1);
        assert!(runtime.is_running(&second.id));
    }

    #[tokio::test]
    async fn test_concurrent_replacements_keep_name_unique() {
        let (_dir, config) = test_config("devbox");
        let runtime = Arc::new(FakeRuntime::new());
        let a = ContainerProvisioner::new(runtime.clone());
        let b = ContainerProvisioner::new(runtime.clone());

        let (ra, rb) = tokio::join!(a.ensure_running(&config), b.ensure_running(&config));
        assert!(ra.is_ok());
        assert!(rb.is_ok());
        assert_eq!(runtime.count_named("devbox"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_live_container() {
        let (_dir, config) = test_config("devbox");
        let runtime = Arc::new(FakeRuntime::new());
        let stale = runtime.insert_stopped("devbox");
        let a = ContainerProvisioner::new(runtime.clone());
        let b = ContainerProvisioner::new(runtime.clone());

        let (ra, rb) = tokio::join!(a.reuse_or_replace(&config), b.reuse_or_replace(&config));
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        assert_eq!(ra.id, rb.id);
        assert_ne!(ra.id, stale);
        assert!(runtime.is_running(&ra.id));
        assert_eq!(runtime.count_named("devbox"), 1);
        assert_eq!(runtime.created_count(), 1);
    }

    #[tokio::test]
    async fn test_reuse_keeps_running_container() {
        let (_dir, config) = test_config("devbox");
        let runtime = Arc::new(FakeRuntime::new());
        let existing = runtime.insert_running("devbox");
        let provisioner = ContainerProvisioner::new(runtime.clone());

        let handle = provisioner.reuse_or_replace(&config).await.unwrap();
        assert_eq!(handle.id, existing);
        assert_eq!(runtime.created_count(), 0);
    }

    #[tokio::test]
    async fn test_start_failure_removes_created_container() {
        let (_dir, config) = test_config("devbox");
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_list_by_name().returning(|_, _| Ok(vec![]));
        runtime
            .expect_create()
            .times(1)
            .returning(|_, _| Ok("fresh".to_string()));
        runtime.expect_start().with(eq("fresh")).times(1).returning(|_| {
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                message: "no such image layer".to_string(),
            })
        });
        runtime
            .expect_remove()
            .with(eq("fresh"))
            .times(1)
            .returning(|_| Ok(()));

        let provisioner = ContainerProvisioner::new(Arc::new(runtime));
        let err = provisioner.ensure_running(&config).await.unwrap_err();
        assert!(matches!(err, ShellError::Provision(_)));
    }

    #[tokio::test]
    async fn test_create_failure_is_provision_error() {
        let (_dir, config) = test_config("devbox");
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_list_by_name().returning(|_, _| Ok(vec![]));
        runtime.expect_create().returning(|_, _| {
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message: "image not found".to_string(),
            })
        });
        runtime.expect_start().never();

        let provisioner = ContainerProvisioner::new(Arc::new(runtime));
        let err = provisioner.ensure_running(&config).await.unwrap_err();
        assert!(matches!(err, ShellError::Provision(_)));
    }

    #[tokio::test]
    async fn test_remove_failure_aborts_before_create() {
        let (_dir, config) = test_config("devbox");
        let runtime = Arc::new(FakeRuntime::new());
        runtime.insert_stopped("devbox");
        runtime.fail_remove(true);
        let provisioner = ContainerProvisioner::new(runtime.clone());

        let err = provisioner.ensure_running(&config).await.unwrap_err();
        assert!(matches!(err, ShellError::Provision(_)));
        assert_eq!(runtime.created_count(), 0);
    }
}
