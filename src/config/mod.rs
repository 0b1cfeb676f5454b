//! Configuration module for boxsh
//!
//! Supports configuration via:
//! - System-wide config file (`/etc/boxsh/config.{toml,yaml}`)
//! - Per-user config file (`~/.boxsh.{toml,yaml}`)
//! - Environment variables (with BOXSH__ prefix)
//!
//! The result is a single immutable [`ShellConfig`] built once in `main` and
//! passed by reference to every component.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How exec sessions reach the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecTransportKind {
    /// Spawn the external `docker` client with inherited stdio
    Cli,
    /// Stream through the runtime's exec API
    Api,
}

/// Per-user shell configuration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Name of the user's container (supports `%u`, `%h`, `%U`)
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Image the container is created from
    #[serde(default = "default_image_name")]
    pub image_name: String,

    /// Numeric user id the container and sessions run as
    #[serde(default = "default_user_id")]
    pub user_id: u32,

    /// Numeric group id the container and sessions run as
    #[serde(default = "default_group_id")]
    pub group_id: u32,

    /// Name of the invoking account, used for placeholder expansion
    #[serde(default = "default_username")]
    pub username: String,

    /// Home directory of the invoking account, used for placeholder expansion
    #[serde(default = "default_home")]
    pub home: String,

    /// Working directory inside the container
    #[serde(default = "default_user_cwd")]
    pub user_cwd: String,

    /// Ordered `KEY=VALUE` assignments injected into container and sessions
    #[serde(default)]
    pub env: Vec<String>,

    /// Shell started inside the container
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Optional entrypoint override for the container
    #[serde(default)]
    pub entrypoint: Option<String>,

    /// Command keeping the container alive between sessions (empty = image default)
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    /// Bind the host's /tmp into the container
    #[serde(default)]
    pub mount_tmp: bool,

    /// Bind a home directory into the container
    #[serde(default)]
    pub mount_home: bool,

    /// Host side of the home directory bind
    #[serde(default = "default_home_mount")]
    pub mount_home_from: String,

    /// Container side of the home directory bind
    #[serde(default = "default_home_mount")]
    pub mount_home_to: String,

    /// Expose the host's container-control socket inside the container
    #[serde(default)]
    pub mount_docker_socket: bool,

    /// Host path of the container-control socket
    #[serde(default = "default_docker_socket")]
    pub docker_socket: String,

    /// Advisory memory ceiling in bytes (0 = unlimited)
    #[serde(default)]
    pub memory_quota: i64,

    /// Value of the `user` label on the container
    #[serde(default = "default_username")]
    pub container_username: String,

    /// Hostname reported inside the container (defaults to the host's)
    #[serde(default)]
    pub hostname: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Exec session transport
    #[serde(default = "default_exec_transport")]
    pub exec_transport: ExecTransportKind,

    /// Explicit path to the docker client binary (cli transport)
    #[serde(default)]
    pub docker_binary: Option<PathBuf>,

    /// Directory inside the container holding session pid-files
    #[serde(default = "default_pid_file_dir")]
    pub pid_file_dir: String,

    /// Host directory holding per-container lock files
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// Upper bound on the orphan cleanup step, in seconds
    #[serde(default = "default_cleanup_timeout")]
    pub cleanup_timeout_secs: u64,
}

// Default value functions
fn default_container_name() -> String {
    "%u_boxsh".to_string()
}

fn default_image_name() -> String {
    "ubuntu:22.04".to_string()
}

fn default_user_id() -> u32 {
    // SAFETY: getuid never fails and touches no memory
    unsafe { libc::getuid() }
}

fn default_group_id() -> u32 {
    // SAFETY: getgid never fails and touches no memory
    unsafe { libc::getgid() }
}

fn default_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "nobody".to_string())
}

fn default_home() -> String {
    dirs::home_dir()
        .map(|home| home.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}

fn default_user_cwd() -> String {
    "%h".to_string()
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

fn default_command() -> Vec<String> {
    vec!["sleep".to_string(), "infinity".to_string()]
}

fn default_home_mount() -> String {
    "%h".to_string()
}

fn default_docker_socket() -> String {
    "/var/run/docker.sock".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_exec_transport() -> ExecTransportKind {
    ExecTransportKind::Cli
}

fn default_pid_file_dir() -> String {
    "/tmp".to_string()
}

/// Per-user: `$XDG_RUNTIME_DIR/boxsh`, else `~/.boxsh`. Never a shared
/// world-writable directory, where another user could squat the lock file.
fn default_lock_dir() -> PathBuf {
    dirs::runtime_dir()
        .map(|dir| dir.join("boxsh"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".boxsh")))
        .unwrap_or_else(|| PathBuf::from("/run/boxsh"))
}

fn default_cleanup_timeout() -> u64 {
    10
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            image_name: default_image_name(),
            user_id: default_user_id(),
            group_id: default_group_id(),
            username: default_username(),
            home: default_home(),
            user_cwd: default_user_cwd(),
            env: Vec::new(),
            shell: default_shell(),
            entrypoint: None,
            command: default_command(),
            mount_tmp: false,
            mount_home: false,
            mount_home_from: default_home_mount(),
            mount_home_to: default_home_mount(),
            mount_docker_socket: false,
            docker_socket: default_docker_socket(),
            memory_quota: 0,
            container_username: default_username(),
            hostname: None,
            log_level: default_log_level(),
            log_file: None,
            exec_transport: default_exec_transport(),
            docker_binary: None,
            pid_file_dir: default_pid_file_dir(),
            lock_dir: default_lock_dir(),
            cleanup_timeout_secs: default_cleanup_timeout(),
        }
    }
}

impl ShellConfig {
    /// Load configuration from the standard files and environment variables
    pub fn load() -> Result<Self> {
        let user_file = Path::new(&default_home()).join(".boxsh");
        Self::load_from(&[PathBuf::from("/etc/boxsh/config"), user_file])
    }

    /// Load configuration layering the given files (extension optional) over
    /// the defaults, then `BOXSH__*` environment variables over the files
    pub fn load_from(files: &[PathBuf]) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ShellConfig::default())?);

        for file in files {
            builder = builder.add_source(
                config::File::with_name(&file.to_string_lossy()).required(false),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("BOXSH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("env")
                    .with_list_parse_key("command"),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut shell_config: ShellConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        shell_config.expand_placeholders();
        shell_config.validate()?;

        Ok(shell_config)
    }

    /// Replace `%u`, `%h` and `%U` in the path-like fields
    pub fn expand_placeholders(&mut self) {
        let username = self.username.clone();
        let home = self.home.clone();
        let uid = self.user_id.to_string();
        let expand = |s: &str| {
            s.replace("%u", &username)
                .replace("%h", &home)
                .replace("%U", &uid)
        };

        self.container_name = expand(&self.container_name);
        self.image_name = expand(&self.image_name);
        self.user_cwd = expand(&self.user_cwd);
        self.mount_home_from = expand(&self.mount_home_from);
        self.mount_home_to = expand(&self.mount_home_to);
        self.env = self.env.iter().map(|e| expand(e)).collect();
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.container_name.is_empty() {
            anyhow::bail!("Container name cannot be empty");
        }

        if !is_valid_container_name(&self.container_name) {
            anyhow::bail!(
                "Container name '{}' must match [a-zA-Z0-9][a-zA-Z0-9_.-]*",
                self.container_name
            );
        }

        if self.image_name.is_empty() {
            anyhow::bail!("Image name cannot be empty");
        }

        if !self.shell.starts_with('/') {
            anyhow::bail!("Shell must be an absolute path");
        }

        if !self.user_cwd.starts_with('/') {
            anyhow::bail!("Working directory must be an absolute path");
        }

        for assignment in &self.env {
            match assignment.split_once('=') {
                Some((key, _)) if !key.is_empty() => {}
                _ => anyhow::bail!("Environment entry '{}' is not KEY=VALUE", assignment),
            }
        }

        if self.mount_home && (self.mount_home_from.is_empty() || self.mount_home_to.is_empty()) {
            anyhow::bail!("Home mount requires both mount_home_from and mount_home_to");
        }

        if self.memory_quota < 0 {
            anyhow::bail!("Memory quota cannot be negative");
        }

        if self.cleanup_timeout_secs == 0 {
            anyhow::bail!("Cleanup timeout cannot be 0");
        }

        Ok(())
    }

    /// The `uid:gid` pair containers and sessions run as
    pub fn user_spec(&self) -> String {
        format!("{}:{}", self.user_id, self.group_id)
    }

    /// Hostname reported inside the container
    pub fn container_hostname(&self) -> Option<String> {
        self.hostname.clone().or_else(host_hostname)
    }
}

fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn host_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
}
