//! Termination signals as session cancellation

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Install handlers for hangup, interrupt, terminate and quit. The returned
/// task turns the first one received into a single cancellation of `token`,
/// then exits. It also exits quietly if `token` is cancelled elsewhere.
pub fn spawn_signal_listener(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = hangup.recv() => "SIGHUP",
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = quit.recv() => "SIGQUIT",
            _ = token.cancelled() => return,
        };

        debug!(signal = name, "Handling signal");
        token.cancel();
    }))
}
