//! Exec session module for boxsh
//!
//! Bridges the invoking terminal into the user's container and makes sure
//! nothing started by a login shell outlives the session:
//! - [`ExecSessionBridge`] plans and runs one attached session
//! - [`SessionTransport`] abstracts how the session reaches the container
//! - [`OrphanCleanup`] signals the leaked process group afterwards

mod api;
mod bridge;
mod cleanup;
mod cli;
mod invocation;
mod pidfile;
mod signals;
mod terminal;
mod transport;

pub use api::ApiTransport;
pub use bridge::{ExecSessionBridge, SessionMode, SessionPlan};
pub use cleanup::OrphanCleanup;
pub use cli::CliTransport;
pub use invocation::Invocation;
pub use pidfile::PidFile;
pub use signals::spawn_signal_listener;
pub use transport::{ExecRequest, SessionTransport};

#[cfg(test)]
pub use transport::MockSessionTransport;
