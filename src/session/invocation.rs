//! Facts about the invoking process that shape a session

use std::io::IsTerminal;

/// Snapshot of the invoking process, taken once in `main`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Explicit command from `-c`; `None` means a login shell
    pub command: Option<String>,

    /// Whether our stdout is a terminal
    pub stdout_is_tty: bool,

    /// Whether an interactive prompt (`PS1`) is set in our environment
    pub interactive_prompt: bool,

    /// Our own process id, used to name the pid-file
    pub pid: u32,
}

impl Invocation {
    pub fn from_process(command: Option<String>) -> Self {
        Self {
            command: command.filter(|c| !c.is_empty()),
            stdout_is_tty: std::io::stdout().is_terminal(),
            interactive_prompt: std::env::var_os("PS1").is_some_and(|v| !v.is_empty()),
            pid: std::process::id(),
        }
    }
}
