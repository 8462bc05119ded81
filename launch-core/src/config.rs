//! Configuration loading for iodemo-launch.
//!
//! Every value has a default matching the legacy script; a TOML file can
//! override any of them and command-line flags override the file.

use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::address::DEFAULT_PORT;
use crate::remote::{FanOut, DEFAULT_ADDRESS_FLAG, HOST_PLACEHOLDER};
use crate::rendezvous::DEFAULT_BACKLOG;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Rendezvous socket configuration.
    #[serde(default)]
    pub rendezvous: RendezvousConfig,
    /// Remote launch configuration.
    #[serde(default)]
    pub launch: LaunchConfig,
    /// Output log locations.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Rendezvous socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RendezvousConfig {
    /// Port to listen on (default: 9090).
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP to bind and advertise. Resolved from the hostname when unset.
    #[serde(default)]
    pub bind_ip: Option<IpAddr>,
    /// Listen backlog (default: 2).
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Per-accept timeout in seconds. Waits forever when unset.
    #[serde(default)]
    pub accept_timeout_secs: Option<u64>,
}

/// Remote launch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchConfig {
    /// Fan-out program (default: `pdsh`).
    #[serde(default = "default_fan_out")]
    pub fan_out: String,
    /// Arguments selecting the target host; `{host}` is substituted
    /// (default: `["-w", "{host}"]`).
    #[serde(default = "default_host_args")]
    pub host_args: Vec<String>,
    /// Flag carrying the rendezvous address (default: `-f`).
    #[serde(default = "default_address_flag")]
    pub address_flag: String,
    /// Pause after each launch in milliseconds (default: 5000).
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Directory for env files, visible to the remote hosts. Both sides run
    /// inside it and relative output paths resolve against it. Current
    /// directory when unset.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Variables exported to the remote side. Empty exports everything.
    #[serde(default)]
    pub env_allow: Vec<String>,
}

/// Output log locations.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Client output file, relative to the work directory (default:
    /// `io_demo_client.out`).
    #[serde(default = "default_client_log")]
    pub client_log: PathBuf,
    /// Server output file, relative to the work directory (default:
    /// `io_demo_server.out`).
    #[serde(default = "default_server_log")]
    pub server_log: PathBuf,
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_fan_out() -> String {
    "pdsh".to_string()
}

fn default_host_args() -> Vec<String> {
    vec!["-w".to_string(), HOST_PLACEHOLDER.to_string()]
}

fn default_address_flag() -> String {
    DEFAULT_ADDRESS_FLAG.to_string()
}

fn default_settle_delay_ms() -> u64 {
    5000
}

fn default_client_log() -> PathBuf {
    PathBuf::from("io_demo_client.out")
}

fn default_server_log() -> PathBuf {
    PathBuf::from("io_demo_server.out")
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_ip: None,
            backlog: default_backlog(),
            accept_timeout_secs: None,
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            fan_out: default_fan_out(),
            host_args: default_host_args(),
            address_flag: default_address_flag(),
            settle_delay_ms: default_settle_delay_ms(),
            work_dir: None,
            env_allow: Vec::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            client_log: default_client_log(),
            server_log: default_server_log(),
        }
    }
}

impl RendezvousConfig {
    /// Accept timeout as a duration.
    pub fn accept_timeout(&self) -> Option<Duration> {
        self.accept_timeout_secs.map(Duration::from_secs)
    }
}

impl LaunchConfig {
    /// Fan-out invocation described by this config.
    pub fn fan_out(&self) -> FanOut {
        FanOut {
            program: self.fan_out.clone(),
            host_args: self.host_args.clone(),
        }
    }

    /// Settle delay as a duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
