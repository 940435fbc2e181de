//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM or SIGINT
//! - Translate the first one into a shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe); the workers never see
//!   signals directly
//! - A second signal is not special: workers already force-close on the
//!   first

use std::io;

use crate::lifecycle::ShutdownToken;

/// Resolve when the process is asked to stop. Returns the signal name.
pub async fn wait_for_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT")
            }
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}

/// Wait for a stop signal, then trigger `shutdown`.
pub async fn shutdown_on_signal(shutdown: ShutdownToken) -> io::Result<()> {
    let signal = wait_for_signal().await?;
    tracing::info!(signal, "Received shutdown signal");
    shutdown.trigger();
    Ok(())
}
