//! In-memory runtime and transport used by unit tests

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::Config;
use bollard::errors::Error;
use bollard::models::ContainerSummary;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::ShellConfig;
use crate::container::ContainerRuntime;
use crate::error::ExecError;
use crate::session::{ExecRequest, SessionTransport};

/// Config for user `alice` (1000:1000) with its lock dir in a fresh tempdir
pub fn test_config(container_name: &str) -> (tempfile::TempDir, ShellConfig) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ShellConfig {
        username: "alice".to_string(),
        home: "/home/alice".to_string(),
        user_id: 1000,
        group_id: 1000,
        lock_dir: dir.path().to_path_buf(),
        ..ShellConfig::default()
    };
    config.expand_placeholders();
    config.container_name = container_name.to_string();
    (dir, config)
}

fn server_error(status_code: u16, message: &str) -> Error {
    Error::DockerResponseServerError {
        status_code,
        message: message.to_string(),
    }
}

#[derive(Debug)]
struct FakeContainer {
    id: String,
    name: String,
    running: bool,
}

#[derive(Default)]
struct RuntimeState {
    containers: Vec<FakeContainer>,
    next_id: u64,
    created: usize,
    fail_remove: bool,
}

/// Container runtime that keeps containers in memory
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, name: &str, running: bool) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            running,
        });
        id
    }

    pub fn insert_stopped(&self, name: &str) -> String {
        self.insert(name, false)
    }

    pub fn insert_running(&self, name: &str) -> String {
        self.insert(name, true)
    }

    pub fn fail_remove(&self, fail: bool) {
        self.state.lock().unwrap().fail_remove = fail;
    }

    pub fn count_named(&self, name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.containers.iter().filter(|c| c.name == name).count()
    }

    pub fn exists(&self, id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.containers.iter().any(|c| c.id == id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.containers.iter().any(|c| c.id == id && c.running)
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().unwrap().created
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_by_name(&self, name: &str, all: bool) -> Result<Vec<ContainerSummary>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| c.name == name && (all || c.running))
            .map(|c| ContainerSummary {
                id: Some(c.id.clone()),
                names: Some(vec![format!("/{}", c.name)]),
                state: Some(if c.running { "running" } else { "exited" }.to_string()),
                ..Default::default()
            })
            .collect())
    }

    async fn create(&self, name: &str, _config: Config<String>) -> Result<String, Error> {
        if self.count_named(name) > 0 {
            return Err(server_error(409, "name already in use"));
        }
        self.state.lock().unwrap().created += 1;
        Ok(self.insert(name, false))
    }

    async fn start(&self, id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        match state.containers.iter_mut().find(|c| c.id == id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(server_error(404, "no such container")),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_remove {
            return Err(server_error(500, "removal in progress"));
        }
        let before = state.containers.len();
        state.containers.retain(|c| c.id != id);
        if state.containers.len() == before {
            return Err(server_error(404, "no such container"));
        }
        Ok(())
    }
}

/// How an attached session ends
#[derive(Debug, Clone, Copy)]
pub enum SessionBehavior {
    Exit(i64),
    WaitForCancel,
}

struct TransportState {
    behavior: SessionBehavior,
    files: HashSet<String>,
    written: Vec<String>,
    hangups: Vec<String>,
    cleanup_runs: usize,
    detached_delay: Option<Duration>,
}

/// Session transport simulating the container's pid-file directory
pub struct FakeTransport {
    state: Mutex<TransportState>,
    attached: Notify,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TransportState {
                behavior: SessionBehavior::Exit(0),
                files: HashSet::new(),
                written: Vec::new(),
                hangups: Vec::new(),
                cleanup_runs: 0,
                detached_delay: None,
            }),
            attached: Notify::new(),
        }
    }

    pub fn set_behavior(&self, behavior: SessionBehavior) {
        self.state.lock().unwrap().behavior = behavior;
    }

    /// Make every detached command take `delay`
    pub fn hang_detached(&self, delay: Duration) {
        self.state.lock().unwrap().detached_delay = Some(delay);
    }

    pub async fn wait_attached(&self) {
        self.attached.notified().await;
    }

    pub fn pid_file_was_written(&self, path: &str) -> bool {
        self.state.lock().unwrap().written.iter().any(|p| p == path)
    }

    pub fn pid_file_exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().files.contains(path)
    }

    pub fn hangups(&self) -> Vec<String> {
        self.state.lock().unwrap().hangups.clone()
    }

    pub fn cleanup_runs(&self) -> usize {
        self.state.lock().unwrap().cleanup_runs
    }
}

/// First single-quoted word of a script
fn first_quoted(script: &str) -> Option<&str> {
    let start = script.find('\'')? + 1;
    let len = script[start..].find('\'')?;
    Some(&script[start..start + len])
}

#[async_trait]
impl SessionTransport for FakeTransport {
    async fn run_attached(
        &self,
        request: &ExecRequest,
        cancel: CancellationToken,
    ) -> Result<i64, ExecError> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            if let Some(script) = request.argv.last().filter(|s| s.starts_with("echo $$ > ")) {
                if let Some(path) = first_quoted(script) {
                    state.files.insert(path.to_string());
                    state.written.push(path.to_string());
                }
            }
            state.behavior
        };
        self.attached.notify_one();

        match behavior {
            SessionBehavior::Exit(code) => Ok(code),
            SessionBehavior::WaitForCancel => {
                cancel.cancelled().await;
                Err(ExecError::Cancelled)
            }
        }
    }

    async fn run_detached(&self, request: &ExecRequest) -> Result<i64, ExecError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.cleanup_runs += 1;
            state.detached_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(path) = request.argv.last().and_then(|s| first_quoted(s)) {
            if state.files.remove(path) {
                state.hangups.push(path.to_string());
            }
        }
        Ok(0)
    }
}
