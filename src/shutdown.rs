//! Process shutdown on Ctrl+C or SIGTERM.

use std::io;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Signal listeners bound to a cancellation token.
///
/// Handlers are installed by [`Shutdown::install`], so a signal arriving
/// before [`Shutdown::wait`] is polled is not lost.
pub struct Shutdown {
    stop: CancellationToken,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Shutdown {
    pub fn install(stop: CancellationToken) -> io::Result<Self> {
        Ok(Self {
            stop,
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    /// Resolve once a signal arrives (cancelling the token) or the token is
    /// cancelled elsewhere.
    pub async fn wait(mut self) {
        #[cfg(unix)]
        let terminate = self.terminate.recv();
        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received Ctrl+C, shutting down"),
            _ = terminate => info!("received terminate signal, shutting down"),
            _ = self.stop.cancelled() => return,
        }
        self.stop.cancel();
    }
}
