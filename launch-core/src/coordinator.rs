//! Rendezvous coordinator: drives one full client/server run.
//!
//! ```text
//! resolve IP → bind → launch client → accept client
//!            → launch server → accept server → terminate both
//! ```
//!
//! Launched processes live in a [`ProcessRegistry`] for the whole run, so
//! any error after the first launch still terminates what was started.

use std::net::SocketAddr;
use std::time::Duration;

use crate::address::{resolve_local_ip, RendezvousAddress, Role};
use crate::config::RendezvousConfig;
use crate::error::{LaunchError, Result};
use crate::launcher::{LaunchSpec, ProcessLauncher};
use crate::process::ProcessRegistry;
use crate::rendezvous::{RendezvousListener, RendezvousState};

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousReport {
    /// Address advertised to both processes.
    pub address: RendezvousAddress,
    /// Peer of the first accepted connection.
    pub client_peer: SocketAddr,
    /// Peer of the second accepted connection.
    pub server_peer: SocketAddr,
}

/// Owns the listening socket and the launcher for one run.
pub struct Coordinator<L> {
    launcher: L,
    listener: RendezvousListener,
    accept_timeout: Option<Duration>,
    state: RendezvousState,
}

impl<L> std::fmt::Debug for Coordinator<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("address", &self.listener.address())
            .field("accept_timeout", &self.accept_timeout)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<L: ProcessLauncher> Coordinator<L> {
    /// Resolve the local IP (unless configured) and bind the rendezvous
    /// socket.
    pub async fn bind(config: &RendezvousConfig, launcher: L) -> Result<Self> {
        let ip = match config.bind_ip {
            Some(ip) => ip,
            None => resolve_local_ip().await?,
        };
        let listener = RendezvousListener::bind(SocketAddr::new(ip, config.port), config.backlog)?;

        let mut coordinator = Self {
            launcher,
            listener,
            accept_timeout: config.accept_timeout(),
            state: RendezvousState::Idle,
        };
        coordinator.advance();
        tracing::info!(address = %coordinator.address(), "rendezvous socket bound");
        Ok(coordinator)
    }

    /// Address both processes are told to connect to.
    pub fn address(&self) -> RendezvousAddress {
        self.listener.address()
    }

    /// Current position in the run.
    pub fn state(&self) -> RendezvousState {
        self.state
    }

    /// Launch the client, wait for it, launch the server, wait for it,
    /// then terminate both.
    ///
    /// Can only run once per bound coordinator.
    pub async fn run(&mut self, client: &LaunchSpec, server: &LaunchSpec) -> Result<RendezvousReport> {
        if self.state != RendezvousState::Bound {
            return Err(LaunchError::InvalidState {
                expected: RendezvousState::Bound,
                actual: self.state,
            });
        }
        let address = self.address();
        let mut registry = ProcessRegistry::new();

        self.advance();
        registry.register(self.launcher.launch(Role::Client, client, &address).await?);
        let client_conn = self.listener.accept_peer(Role::Client, self.accept_timeout).await?;
        self.advance();

        self.advance();
        registry.register(self.launcher.launch(Role::Server, server, &address).await?);
        let server_conn = self.listener.accept_peer(Role::Server, self.accept_timeout).await?;
        self.advance();

        let report = RendezvousReport {
            address,
            client_peer: client_conn.peer_addr(),
            server_peer: server_conn.peer_addr(),
        };

        self.advance();
        let terminated = registry.terminate_all();
        drop(client_conn);
        drop(server_conn);
        self.advance();

        terminated.map(|()| report)
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            tracing::debug!(from = %self.state, to = %next, "rendezvous state");
            self.state = next;
        }
    }
}
