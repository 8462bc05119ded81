//! # iodemo-launch-core
//!
//! Launches an io-demo client and server on remote hosts and brokers their
//! rendezvous.
//!
//! ```text
//!                 pdsh -w <client host>
//!  launcher ─────────────────────────────► client  ─┐
//!     │                                             │ connect ip:port
//!     │  listen ip:9090  ◄──────────────────────────┤
//!     │                                             │
//!  launcher ─────────────────────────────► server  ─┘
//!                 pdsh -w <server host>
//! ```
//!
//! - [`Coordinator`] binds the rendezvous socket, launches each side and
//!   accepts its connection, client first
//! - [`FanOutLauncher`] renders a [`RemoteCommand`] and spawns it, passing
//!   a scoped environment through a per-launch [`EnvFile`]
//! - [`ProcessRegistry`] terminates every launched process on all exit
//!   paths
//! - [`Config`] loads the TOML configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod config;
pub mod coordinator;
pub mod env;
pub mod error;
pub mod launcher;
pub mod process;
pub mod remote;
pub mod rendezvous;

pub use address::{resolve_local_ip, RendezvousAddress, Role, DEFAULT_PORT};
pub use config::{Config, ConfigError, LaunchConfig, OutputConfig, RendezvousConfig};
pub use coordinator::{Coordinator, RendezvousReport};
pub use env::{EnvFile, EnvScope};
pub use error::{LaunchError, Result};
pub use launcher::{FanOutLauncher, LaunchSpec, ProcessLauncher};
pub use process::{LaunchedProcess, ProcessRegistry};
pub use remote::{shell_quote, FanOut, RemoteCommand};
pub use rendezvous::{PeerConnection, RendezvousListener, RendezvousState};
