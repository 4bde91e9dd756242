//! Server configuration.
//!
//! The service runs with compiled-in defaults: listen on `:8080` (all
//! interfaces) with 5 second read, write and idle timeouts, and gives open
//! connections 10 seconds to drain on shutdown. Only the listen address can
//! be overridden, so tests and containers can pick a port; an invalid value
//! is rejected at startup rather than silently falling back to the default.
//!
//! | Variable              | Default | Example          |
//! |-----------------------|---------|------------------|
//! | `HEALTHZ_LISTEN_ADDR` | `:8080` | `127.0.0.1:9000` |

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::Context;

/// Environment variable overriding [`ServerConfig::listen_addr`].
pub const LISTEN_ADDR_ENV: &str = "HEALTHZ_LISTEN_ADDR";

/// Process-wide server settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,

    /// Maximum time a client may take to deliver a complete request head.
    pub read_timeout: Duration,

    /// Maximum time spent producing a response before the request is
    /// answered with `408 Request Timeout`.
    ///
    /// The clock stops once the handler hands back its response. Writing that
    /// response to the socket is not covered, so a client that reads slowly
    /// is only cut off by the connection-level timeouts. Every body this
    /// service sends is a few bytes written in one go.
    pub write_timeout: Duration,

    /// Maximum time a keep-alive connection may sit between requests.
    ///
    /// The connection's header-read timer starts as soon as it waits for the
    /// next request, so the effective idle bound is the smaller of this and
    /// [`read_timeout`](Self::read_timeout).
    pub idle_timeout: Duration,

    /// How long shutdown waits for in-flight requests before dropping
    /// the remaining connections. Not read from the environment.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: defaults::listen_addr(),
            read_timeout: defaults::io_timeout(),
            write_timeout: defaults::io_timeout(),
            idle_timeout: defaults::io_timeout(),
            shutdown_timeout: defaults::shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Unset or empty variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = var(LISTEN_ADDR_ENV) {
            config.listen_addr =
                parse_listen_addr(&addr).with_context(|| format!("invalid {LISTEN_ADDR_ENV}"))?;
        }

        Ok(config)
    }

    /// The effective idle bound for keep-alive connections.
    pub fn header_read_timeout(&self) -> Duration {
        self.read_timeout.min(self.idle_timeout)
    }
}

/// Parse a listen address.
///
/// Accepts a full `IP:PORT` socket address, or the `:PORT` shorthand which
/// binds every IPv4 interface.
pub fn parse_listen_addr(s: &str) -> anyhow::Result<SocketAddr> {
    let s = s.trim();
    if let Some(port) = s.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .with_context(|| format!("`{s}` has an invalid port"))?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    s.parse()
        .with_context(|| format!("`{s}` is not a socket address (expected IP:PORT or :PORT)"))
}

mod defaults {
    use std::{
        net::{IpAddr, Ipv4Addr, SocketAddr},
        time::Duration,
    };

    pub fn listen_addr() -> SocketAddr { SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080) }
    pub fn io_timeout() -> Duration { Duration::from_secs(5) }
    pub fn shutdown_timeout() -> Duration { Duration::from_secs(10) }
}
