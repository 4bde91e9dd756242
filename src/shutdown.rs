//! Shutdown trigger: SIGINT and SIGTERM.
//!
//! Handlers are registered by [`ShutdownSignal::install`], before the
//! listener is bound, so a signal that arrives during startup is queued
//! instead of killing the process with the default disposition.

use crate::error::ServerError;

/// Installed SIGINT/SIGTERM listeners. Consumed by [`recv`](Self::recv).
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Register the signal handlers.
    #[cfg(unix)]
    pub fn install() -> Result<Self, ServerError> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).map_err(ServerError::Signal)?,
            terminate: signal(SignalKind::terminate()).map_err(ServerError::Signal)?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self, ServerError> {
        Ok(Self {})
    }

    /// Wait for the first termination signal and return its name.
    #[cfg(unix)]
    pub async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl+C handler unavailable, waiting indefinitely");
                std::future::pending().await
            }
        }
    }
}
