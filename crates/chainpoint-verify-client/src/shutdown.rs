//! Signal handling for the verifier CLI.

use chainpoint_anchor_verify::CancelHandle;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Cancels the verification scope on SIGTERM or SIGINT, so in-flight requests are dropped
/// and the verification fails with a cancellation error instead of a partial verdict
pub struct Shutdown {
    handle: CancelHandle,
}

impl Shutdown {
    pub fn new(handle: CancelHandle) -> Self {
        Self { handle }
    }

    pub async fn run(self) -> std::io::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, canceling verification..."),
            _ = sigint.recv() => info!("Received SIGINT, canceling verification..."),
        };

        self.handle.cancel();
        Ok(())
    }
}
