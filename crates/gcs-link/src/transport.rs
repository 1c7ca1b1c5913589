use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use tokio::net::UdpSocket;
use tracing::info;

use crate::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Bind locally, reply to whoever spoke last (SITL pushes to us).
    Listen,
    /// Bind an ephemeral port, talk to a fixed peer.
    Connect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAddress {
    pub mode: LinkMode,
    pub addr: SocketAddr,
}

impl FromStr for LinkAddress {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LinkError::InvalidAddress(s.to_string());
        let (scheme, rest) = s.split_once(':').ok_or_else(invalid)?;
        let mode = match scheme {
            "udpin" | "udp" => LinkMode::Listen,
            "udpout" => LinkMode::Connect,
            _ => return Err(invalid()),
        };
        let addr = rest
            .to_socket_addrs()
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)?;
        Ok(Self { mode, addr })
    }
}

impl std::fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode {
            LinkMode::Listen => write!(f, "udpin:{}", self.addr),
            LinkMode::Connect => write!(f, "udpout:{}", self.addr),
        }
    }
}

/// Datagram endpoint towards the vehicle. Knows nothing about MAVLink.
pub struct UdpTransport {
    socket: UdpSocket,
    mode: LinkMode,
    peer: Mutex<Option<SocketAddr>>,
}

impl UdpTransport {
    pub async fn bind(addr: &LinkAddress) -> Result<Self, LinkError> {
        let (socket, peer) = match addr.mode {
            LinkMode::Listen => (UdpSocket::bind(addr.addr).await?, None),
            LinkMode::Connect => {
                let any: SocketAddr = if addr.addr.is_ipv4() {
                    ([0, 0, 0, 0], 0).into()
                } else {
                    ([0u16; 8], 0).into()
                };
                let socket = UdpSocket::bind(any).await?;
                // connected, so ICMP errors from the peer surface on recv
                socket.connect(addr.addr).await?;
                (socket, Some(addr.addr))
            }
        };
        info!("link: bound {} (local {})", addr, socket.local_addr()?);
        Ok(Self { socket, mode: addr.mode, peer: Mutex::new(peer) })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receives one datagram. In listen mode the sender becomes the peer.
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, from) = self.socket.recv_from(buf).await?;
        if self.mode == LinkMode::Listen {
            let mut peer = self.peer.lock().unwrap_or_else(PoisonError::into_inner);
            if *peer != Some(from) {
                info!("link: peer is now {}", from);
                *peer = Some(from);
            }
        }
        Ok(n)
    }

    pub async fn send(&self, datagram: &[u8]) -> Result<(), LinkError> {
        if self.mode == LinkMode::Connect {
            self.socket.send(datagram).await?;
            return Ok(());
        }
        let peer = self.peer().ok_or(LinkError::NoPeer)?;
        self.socket.send_to(datagram, peer).await?;
        Ok(())
    }
}
