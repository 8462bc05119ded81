//! Rendezvous address and peer roles.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{LaunchError, Result};

/// Port the rendezvous socket listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 9090;

/// Which side of the io-demo pair a process or connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// io-demo client, launched and accepted first.
    Client,
    /// io-demo server, launched and accepted second.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Address both launched processes receive via `-f`.
///
/// Displays as `ip:port`. IPv6 addresses are not bracketed, matching the
/// form io-demo expects on its command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendezvousAddress {
    ip: IpAddr,
    port: u16,
}

impl RendezvousAddress {
    /// Create an address from its parts.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Host IP.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Socket address for binding or connecting.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<SocketAddr> for RendezvousAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for RendezvousAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for RendezvousAddress {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| LaunchError::InvalidAddress(s.to_string()))?;
        let ip = ip
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map_err(|_| LaunchError::InvalidAddress(s.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| LaunchError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(ip, port))
    }
}

/// Resolve this machine's hostname to an IP address.
///
/// IPv4 results win over IPv6 so the advertised address matches what a
/// classic `gethostbyname` lookup would return.
pub async fn resolve_local_ip() -> Result<IpAddr> {
    let host = hostname::get()
        .map_err(|e| LaunchError::Resolve {
            host: "<local>".into(),
            reason: e.to_string(),
        })?
        .to_string_lossy()
        .into_owned();

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await
        .map_err(|e| LaunchError::Resolve {
            host: host.clone(),
            reason: e.to_string(),
        })?
        .collect();

    pick_preferred(&addrs).ok_or_else(|| LaunchError::Resolve {
        host,
        reason: "no addresses returned".into(),
    })
}

fn pick_preferred(addrs: &[SocketAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(SocketAddr::ip)
}
