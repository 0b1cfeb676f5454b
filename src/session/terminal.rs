//! Local terminal handling for API-attached sessions

use std::io;

use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

/// Terminal size in columns and rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    /// Size of the controlling terminal, `None` without one
    pub fn current() -> Option<Self> {
        let (cols, rows) = terminal::size().ok()?;
        (cols > 0 && rows > 0).then_some(Self { cols, rows })
    }
}

/// Puts the terminal in raw mode, restoring it on drop
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    /// `None` when there is no terminal to switch
    pub fn enter() -> Option<Self> {
        match enable_raw_mode() {
            Ok(()) => {
                debug!("Terminal switched to raw mode");
                Some(Self { _private: () })
            }
            Err(e) => {
                debug!(error = %e, "Could not enable raw mode");
                None
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Yields the new terminal size after every window change signal
pub struct ResizeWatcher {
    sigwinch: Signal,
}

impl ResizeWatcher {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            sigwinch: signal(SignalKind::window_change())?,
        })
    }

    /// Next size change; sizes that cannot be read are skipped
    pub async fn recv(&mut self) -> Option<TerminalSize> {
        loop {
            self.sigwinch.recv().await?;
            if let Some(size) = TerminalSize::current() {
                return Some(size);
            }
        }
    }
}
