#![forbid(unsafe_code)]

//! Relay server entry point.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use gdrelay::{
    config::{RuntimeOverrides, resolve_config},
    logging::init_logging,
    router::{AppState, build_router},
};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "gdrelay", version, about = "Relay Google Drive videos through gdplayer")]
struct RelayArgs {
    /// Address to listen on (GDRELAY_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (GDRELAY_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Upstream origin (GDRELAY_UPSTREAM)
    #[arg(long)]
    upstream: Option<String>,

    /// Env file with GDRELAY_* settings
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

impl RelayArgs {
    fn into_overrides(self) -> RuntimeOverrides {
        RuntimeOverrides {
            host: self.host,
            port: self.port,
            upstream: self.upstream,
            env_path: self.env_file,
        }
    }
}

fn parse_host(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/GDRELAY_HOST")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = RelayArgs::parse();
    init_logging()?;

    let config = resolve_config(args.into_overrides())?;
    let addr = SocketAddr::new(parse_host(&config.host)?, config.port);
    let app = build_router(AppState::new(&config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(%addr, upstream = %config.upstream, "relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running relay server")?;

    info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> RelayArgs {
        RelayArgs::try_parse_from(std::iter::once("gdrelay").chain(argv.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn no_arguments_means_no_overrides() {
        let overrides = parse(&[]).into_overrides();
        assert!(overrides.host.is_none());
        assert!(overrides.port.is_none());
        assert!(overrides.upstream.is_none());
        assert!(overrides.env_path.is_none());
    }

    #[test]
    fn flags_become_overrides() {
        let overrides = parse(&[
            "--host",
            "0.0.0.0",
            "--port=9000",
            "--upstream",
            "http://localhost:4000",
            "--env-file",
            "/etc/gdrelay.env",
        ])
        .into_overrides();
        assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.upstream.as_deref(), Some("http://localhost:4000"));
        assert_eq!(overrides.env_path, Some(PathBuf::from("/etc/gdrelay.env")));
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(RelayArgs::try_parse_from(["gdrelay", "--port", "70000"]).is_err());
        assert!(RelayArgs::try_parse_from(["gdrelay", "--verbose"]).is_err());
    }

    #[test]
    fn host_must_be_an_ip() {
        assert_eq!(
            parse_host("::1").unwrap(),
            "::1".parse::<IpAddr>().unwrap()
        );
        assert!(parse_host("localhost").is_err());
    }
}
