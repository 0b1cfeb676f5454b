//! boxsh library
//!
//! A login shell that keeps one sandboxed container per user, bridges the
//! user's session into it, and cleans up whatever the session leaves running.

pub mod config;
pub mod container;
pub mod error;
pub mod logging;
pub mod session;
pub mod shell;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ExecError, ShellError};
pub use shell::Shell;
