//! Runtime-agnostic view of a container

use bollard::models::ContainerSummary;

/// Logical container state as seen by boxsh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

/// An identified container and the state it was last observed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub state: ContainerState,
}

impl ContainerHandle {
    pub fn running(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: ContainerState::Running,
        }
    }

    /// Build a handle from a runtime listing entry; entries without an id are skipped
    pub fn from_summary(summary: &ContainerSummary) -> Option<Self> {
        let id = summary.id.clone().filter(|id| !id.is_empty())?;
        let state = match summary.state.as_deref() {
            Some("running") => ContainerState::Running,
            _ => ContainerState::Stopped,
        };
        Some(Self { id, state })
    }
}

/// Whether a listing entry carries exactly `name` (the runtime prefixes names with `/`)
pub(crate) fn has_exact_name(summary: &ContainerSummary, name: &str) -> bool {
    summary
        .names
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|n| n.trim_start_matches('/') == name)
}
