//! Error types for iodemo-launch.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::address::Role;
use crate::config::ConfigError;
use crate::rendezvous::RendezvousState;

/// Errors that can abort a launch/rendezvous run.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local hostname could not be resolved to an IP address.
    #[error("failed to resolve local address for {host}: {reason}")]
    Resolve {
        /// Hostname that was looked up.
        host: String,
        /// Why resolution failed.
        reason: String,
    },

    /// Listening socket could not be bound.
    #[error("failed to bind rendezvous socket on {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `accept()` failed while waiting for a peer.
    #[error("accept failed while waiting for {role}: {source}")]
    Accept {
        /// Peer we were waiting for.
        role: Role,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No peer connected within the configured accept timeout.
    #[error("timed out after {after:?} waiting for {role} to connect")]
    AcceptTimeout {
        /// Peer we were waiting for.
        role: Role,
        /// Configured timeout.
        after: Duration,
    },

    /// The fan-out process could not be spawned.
    #[error("failed to spawn {role} launch `{command}`: {source}")]
    Spawn {
        /// Side being launched.
        role: Role,
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The per-launch environment file could not be written.
    #[error("failed to write environment file {path}: {source}")]
    EnvFile {
        /// Path of the env file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Sending the termination signal failed.
    #[error("failed to signal {role} process (pid {pid}): {reason}")]
    Signal {
        /// Side being terminated.
        role: Role,
        /// Process id.
        pid: u32,
        /// Why the signal could not be delivered.
        reason: String,
    },

    /// An operation was attempted out of order.
    #[error("invalid rendezvous state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: RendezvousState,
        /// State the coordinator is in.
        actual: RendezvousState,
    },

    /// A rendezvous address string did not parse.
    #[error("invalid rendezvous address: {0}")]
    InvalidAddress(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for launch operations.
pub type Result<T> = std::result::Result<T, LaunchError>;
