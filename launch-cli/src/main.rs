//! # iodemo-launch
//!
//! Launches an io-demo client and server on remote hosts, hands both the
//! address of a local rendezvous socket, waits for each to connect back
//! and then terminates them.
//!
//! ## Example
//!
//! ```bash
//! iodemo-launch \
//!     --client_host node1 --client_cmd "./io_demo -d 512 -i 100" \
//!     --server_host node2 --server_cmd "./io_demo -d 512"
//!
//! # Same pair on this machine, no pdsh required
//! iodemo-launch --local \
//!     --client_host localhost --client_cmd ./io_demo \
//!     --server_host localhost --server_cmd ./io_demo
//! ```
//!
//! Output of each side lands in `io_demo_client.out` / `io_demo_server.out`.

use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use launch_core::{Config, Coordinator, FanOut, FanOutLauncher, LaunchSpec};

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "iodemo_launch_core=info,iodemo_launch=info";

/// Launch an io-demo client/server pair and broker their rendezvous.
#[derive(Parser, Debug)]
#[command(name = "iodemo-launch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Host to run the client on
    #[arg(long = "client_host", visible_alias = "client-host")]
    client_host: String,

    /// Host to run the server on
    #[arg(long = "server_host", visible_alias = "server-host")]
    server_host: String,

    /// Client command line; `-f <ip:port>` is appended
    #[arg(long = "client_cmd", visible_alias = "client-cmd")]
    client_cmd: String,

    /// Server command line; `-f <ip:port>` is appended
    #[arg(long = "server_cmd", visible_alias = "server-cmd")]
    server_cmd: String,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rendezvous port [default: 9090]
    #[arg(long)]
    port: Option<u16>,

    /// IP to bind and advertise instead of resolving the hostname
    #[arg(long)]
    bind_ip: Option<IpAddr>,

    /// Give up on a peer after this many seconds (waits forever by default)
    #[arg(long, value_name = "SECS")]
    accept_timeout: Option<u64>,

    /// Pause after each launch, in milliseconds [default: 5000]
    #[arg(long, value_name = "MS")]
    settle_delay_ms: Option<u64>,

    /// Remote shell fan-out program [default: pdsh]
    #[arg(long, conflicts_with = "local")]
    fan_out: Option<String>,

    /// Run both sides on this machine through `sh -c`
    #[arg(long)]
    local: bool,

    /// Directory for env files, shared with the remote hosts; both sides run
    /// inside it and relative --client-log/--server-log paths resolve against it
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Only export this variable to the remote side (repeatable)
    #[arg(long = "env", value_name = "NAME")]
    env_allow: Vec<String>,

    /// Client output file, relative to --work-dir [default: io_demo_client.out]
    #[arg(long)]
    client_log: Option<PathBuf>,

    /// Server output file, relative to --work-dir [default: io_demo_server.out]
    #[arg(long)]
    server_log: Option<PathBuf>,
}

impl Cli {
    /// Load the config file (if any) and apply command-line overrides.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.rendezvous.port = port;
        }
        if let Some(ip) = self.bind_ip {
            config.rendezvous.bind_ip = Some(ip);
        }
        if let Some(secs) = self.accept_timeout {
            config.rendezvous.accept_timeout_secs = Some(secs);
        }
        if let Some(ms) = self.settle_delay_ms {
            config.launch.settle_delay_ms = ms;
        }
        if self.local {
            let local = FanOut::local();
            config.launch.fan_out = local.program;
            config.launch.host_args = local.host_args;
        } else if let Some(program) = &self.fan_out {
            config.launch.fan_out = program.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.launch.work_dir = Some(dir.clone());
        }
        if !self.env_allow.is_empty() {
            config.launch.env_allow = self.env_allow.clone();
        }
        if let Some(path) = &self.client_log {
            config.output.client_log = path.clone();
        }
        if let Some(path) = &self.server_log {
            config.output.server_log = path.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = cli.resolve_config()?;
    let launcher =
        FanOutLauncher::from_config(&config.launch).context("Failed to prepare launcher")?;
    let client = LaunchSpec::new(&cli.client_host, &cli.client_cmd, config.output.client_log.clone());
    let server = LaunchSpec::new(&cli.server_host, &cli.server_cmd, config.output.server_log.clone());

    let mut coordinator = Coordinator::bind(&config.rendezvous, launcher)
        .await
        .context("Failed to open rendezvous socket")?;
    let shutdown = shutdown_signal()?;
    println!("{}", coordinator.address());

    // Losing the race drops the run, which terminates whatever it launched
    // and removes the env files.
    let report = tokio::select! {
        result = coordinator.run(&client, &server) => {
            result.context("Rendezvous did not complete")?
        }
        signal = shutdown => {
            tracing::warn!(signal, "interrupted, terminating launched processes");
            anyhow::bail!("Interrupted by {signal}; launched processes were terminated");
        }
    };

    tracing::info!(
        client = %report.client_peer,
        server = %report.server_peer,
        "both peers connected, processes signaled"
    );
    Ok(())
}

/// Install SIGINT/SIGTERM handlers now and resolve with the name of the
/// first one received.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        "Ctrl+C"
    })
}

/// Install the stderr subscriber, filtered by `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
