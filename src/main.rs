use std::{
    io::IsTerminal,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    process::ExitCode,
    time::Duration,
};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod api;
mod config;
mod error;
mod server;
mod shutdown;

use config::ServerConfig;
use error::ServerError;
use server::Server;
use shutdown::ShutdownSignal;

#[tokio::main]
async fn main() -> ExitCode {
    // Check mode: query the already running instance instead of starting one.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck().await;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "healthz=info".into()),
        )
        .with_writer(std::io::stdout)
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    ExitCode::from(exit_status(run().await))
}

/// Log the outcome of [`run`] and map it to the process exit status.
///
/// A failure is a startup failure unless the server was already serving
/// when it happened.
fn exit_status(result: anyhow::Result<()>) -> u8 {
    let Err(e) = result else {
        return 0;
    };
    let startup = e
        .downcast_ref::<ServerError>()
        .map_or(true, ServerError::is_startup);
    if startup {
        error!(error = %format!("{e:#}"), "failed to start server");
    } else {
        error!(error = %format!("{e:#}"), "server error");
    }
    1
}

async fn run() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("loading configuration")?;

    // Installed before binding so a signal during startup is not lost.
    let signal = ShutdownSignal::install()?;
    let server = Server::bind(config.clone()).await?;
    info!(addr = %server.local_addr()?, "server starting");
    let state = server.state();

    let shutdown = CancellationToken::new();
    let app = api::router(config.write_timeout);
    let mut serving = tokio::spawn(server.serve(app, shutdown.clone()));

    tokio::select! {
        joined = &mut serving => {
            // The accept loop only returns on its own when it fails.
            joined.context("server task panicked")??;
            return Ok(());
        }
        name = signal.recv() => {
            info!(signal = name, "shutdown signal received");
        }
    }

    shutdown.cancel();
    serving.await.context("server task panicked")??;
    info!(state = %*state.borrow(), "server stopped");
    Ok(())
}

/// `healthz --healthcheck`: GET `/healthz` on the configured listener and
/// exit 0 on a 2xx response, 1 otherwise.
///
/// A listen address that does not parse fails the check instead of falling
/// back to a default port.
async fn healthcheck() -> ExitCode {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("healthcheck: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(_) => return ExitCode::FAILURE,
    };

    match client.get(healthcheck_url(config.listen_addr)).send().await {
        Ok(resp) if resp.status().is_success() => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

/// URL reaching the listener bound at `listen` from the same host.
///
/// A wildcard bind is reached over the loopback address of the same family.
fn healthcheck_url(listen: SocketAddr) -> String {
    let ip = match listen.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    format!("http://{}/healthz", SocketAddr::new(ip, listen.port()))
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::api::request_log::tests::CapturedLogs;

    // -----------------------------------------------------------------------
    // Exit status
    // -----------------------------------------------------------------------

    fn error_lines(logs: &CapturedLogs) -> Vec<String> {
        logs.contents()
            .lines()
            .filter(|l| l.contains("ERROR"))
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn clean_stop_exits_zero_without_error_records() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        assert_eq!(exit_status(Ok(())), 0);
        assert!(error_lines(&logs).is_empty(), "{}", logs.contents());
    }

    #[test]
    fn accept_failure_while_serving_is_logged_as_server_error() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let err = ServerError::Accept(io::Error::other("too many open files"));
        assert_eq!(exit_status(Err(err.into())), 1);

        let lines = error_lines(&logs);
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("server error"), "{}", lines[0]);
        assert!(lines[0].contains("too many open files"), "{}", lines[0]);
        assert!(!lines[0].contains("failed to start server"), "{}", lines[0]);
    }

    #[test]
    fn bind_failure_is_logged_as_startup_failure() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let err = ServerError::Bind {
            addr: "127.0.0.1:8080".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert_eq!(exit_status(Err(err.into())), 1);

        let lines = error_lines(&logs);
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("failed to start server"), "{}", lines[0]);
        assert!(lines[0].contains("127.0.0.1:8080"), "{}", lines[0]);
    }

    #[test]
    fn configuration_error_is_a_startup_failure() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let err = anyhow::anyhow!("`nope` is not a socket address").context("loading configuration");
        assert_eq!(exit_status(Err(err)), 1);
        assert!(logs.contents().contains("failed to start server"), "{}", logs.contents());
    }

    // -----------------------------------------------------------------------
    // Healthcheck target
    // -----------------------------------------------------------------------

    #[test]
    fn wildcard_ipv4_listener_is_checked_over_ipv4_loopback() {
        let url = healthcheck_url("0.0.0.0:8080".parse().unwrap());
        assert_eq!(url, "http://127.0.0.1:8080/healthz");
    }

    #[test]
    fn ipv6_listeners_are_checked_over_ipv6_loopback() {
        assert_eq!(
            healthcheck_url("[::]:9000".parse().unwrap()),
            "http://[::1]:9000/healthz"
        );
        assert_eq!(
            healthcheck_url("[::1]:9000".parse().unwrap()),
            "http://[::1]:9000/healthz"
        );
    }

    #[test]
    fn specific_address_is_checked_as_bound() {
        assert_eq!(
            healthcheck_url("127.0.0.1:3000".parse().unwrap()),
            "http://127.0.0.1:3000/healthz"
        );
        assert_eq!(
            healthcheck_url("10.1.2.3:3000".parse().unwrap()),
            "http://10.1.2.3:3000/healthz"
        );
    }
}
