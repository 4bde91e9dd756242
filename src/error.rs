//! Lifecycle errors for the HTTP server.
//!
//! Only failures that end the process live here. Per-request problems never
//! surface as a [`ServerError`]: they are answered (404, 408, 500) and logged
//! by the middleware stack in [`crate::api`].

use std::{io, net::SocketAddr};

/// A fatal server failure. Any variant ends the process with exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound (address in use, permission denied, ...).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The listener failed in a way that is not tied to a single connection.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The OS signal handlers could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}

impl ServerError {
    /// `true` if the server never started serving.
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Signal(_))
    }
}
