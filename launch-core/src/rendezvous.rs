//! Rendezvous listener: the socket both launched processes connect back to.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::address::{RendezvousAddress, Role};
use crate::error::{LaunchError, Result};

/// Listen backlog; one slot per expected peer.
pub const DEFAULT_BACKLOG: u32 = 2;

/// Progress of a run, in the only order it can happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousState {
    /// Nothing bound yet.
    Idle,
    /// Listening socket bound.
    Bound,
    /// Client launched, waiting for its connection.
    AwaitingClient,
    /// Client connection accepted.
    ClientConnected,
    /// Server launched, waiting for its connection.
    AwaitingServer,
    /// Both peers accepted.
    BothConnected,
    /// Signaling launched processes.
    Terminating,
    /// Run complete.
    Done,
}

impl RendezvousState {
    /// The state that follows this one, `None` once done.
    pub fn next(self) -> Option<Self> {
        use RendezvousState::*;
        match self {
            Idle => Some(Bound),
            Bound => Some(AwaitingClient),
            AwaitingClient => Some(ClientConnected),
            ClientConnected => Some(AwaitingServer),
            AwaitingServer => Some(BothConnected),
            BothConnected => Some(Terminating),
            Terminating => Some(Done),
            Done => None,
        }
    }
}

impl fmt::Display for RendezvousState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An accepted connection, labeled by arrival order.
#[derive(Debug)]
pub struct PeerConnection {
    role: Role,
    peer: SocketAddr,
    _stream: TcpStream,
}

impl PeerConnection {
    /// Label assigned on accept.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Remote address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// Listening socket advertised to both processes.
#[derive(Debug)]
pub struct RendezvousListener {
    listener: TcpListener,
    address: RendezvousAddress,
}

impl RendezvousListener {
    /// Bind and listen on `addr`.
    ///
    /// The advertised address uses the port actually bound, so port 0
    /// picks an ephemeral port.
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self> {
        let bind_err = |source| LaunchError::Bind { addr, source };

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(backlog).map_err(bind_err)?;
        let address = RendezvousAddress::from(listener.local_addr().map_err(bind_err)?);

        tracing::debug!(%address, backlog, "rendezvous socket listening");
        Ok(Self { listener, address })
    }

    /// The `ip:port` handed to launched processes.
    pub fn address(&self) -> RendezvousAddress {
        self.address
    }

    /// Accept the next connection and label it `role`.
    ///
    /// With `timeout` unset this waits forever.
    pub async fn accept_peer(&self, role: Role, timeout: Option<Duration>) -> Result<PeerConnection> {
        let accepted = match timeout {
            None => self.listener.accept().await,
            Some(after) => tokio::time::timeout(after, self.listener.accept())
                .await
                .map_err(|_| LaunchError::AcceptTimeout { role, after })?,
        };
        let (stream, peer) = accepted.map_err(|source| LaunchError::Accept { role, source })?;

        tracing::info!("accepted connection from {} - {}", role, peer);
        Ok(PeerConnection {
            role,
            peer,
            _stream: stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback_any_port() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    async fn connect_from_fresh_port(to: SocketAddr) -> (TcpStream, SocketAddr) {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind(loopback_any_port()).unwrap();
        let local = socket.local_addr().unwrap();
        (socket.connect(to).await.unwrap(), local)
    }

    #[test]
    fn state_sequence_is_linear() {
        let mut seen = vec![RendezvousState::Idle];
        while let Some(next) = seen.last().unwrap().next() {
            seen.push(next);
        }
        assert_eq!(
            seen,
            vec![
                RendezvousState::Idle,
                RendezvousState::Bound,
                RendezvousState::AwaitingClient,
                RendezvousState::ClientConnected,
                RendezvousState::AwaitingServer,
                RendezvousState::BothConnected,
                RendezvousState::Terminating,
                RendezvousState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn advertises_bound_port() {
        let listener = RendezvousListener::bind(loopback_any_port(), DEFAULT_BACKLOG).unwrap();
        let address = listener.address();
        assert_eq!(address.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_ne!(address.port(), 0);
        assert_eq!(address.to_string(), format!("127.0.0.1:{}", address.port()));
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = RendezvousListener::bind(loopback_any_port(), DEFAULT_BACKLOG).unwrap();
        let taken = first.address().socket_addr();
        let err = RendezvousListener::bind(taken, DEFAULT_BACKLOG).unwrap_err();
        assert!(matches!(err, LaunchError::Bind { addr, .. } if addr == taken));
    }

    #[tokio::test]
    async fn labels_peers_in_arrival_order() {
        let listener = RendezvousListener::bind(loopback_any_port(), DEFAULT_BACKLOG).unwrap();
        let target = listener.address().socket_addr();

        let (_first, first_local) = connect_from_fresh_port(target).await;
        let (_second, second_local) = connect_from_fresh_port(target).await;

        let client = listener.accept_peer(Role::Client, None).await.unwrap();
        let server = listener.accept_peer(Role::Server, None).await.unwrap();

        assert_eq!(client.role(), Role::Client);
        assert_eq!(client.peer_addr(), first_local);
        assert_eq!(server.role(), Role::Server);
        assert_eq!(server.peer_addr(), second_local);
    }

    #[tokio::test]
    async fn accept_without_timeout_blocks() {
        let listener = RendezvousListener::bind(loopback_any_port(), DEFAULT_BACKLOG).unwrap();
        let outcome = tokio::time::timeout(
            Duration::from_millis(200),
            listener.accept_peer(Role::Client, None),
        )
        .await;
        assert!(outcome.is_err(), "accept returned without any peer");
    }

    #[tokio::test]
    async fn accept_with_timeout_reports_missing_peer() {
        let listener = RendezvousListener::bind(loopback_any_port(), DEFAULT_BACKLOG).unwrap();
        let err = listener
            .accept_peer(Role::Server, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LaunchError::AcceptTimeout { role: Role::Server, after } if after == Duration::from_millis(50)
        ));
    }
}
