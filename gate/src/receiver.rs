//! Inbound UDP receivers.
//!
//! Each configured `address:port` is resolved eagerly and every resolved
//! candidate gets its own bound datagram socket. Resolution or bind
//! failure is fatal at startup: a gateway that silently listens on half
//! its addresses is worse than one that refuses to start.

use std::{
  net::{SocketAddr, ToSocketAddrs},
  os::fd::{AsRawFd, RawFd},
};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
  #[error("failed to resolve {address}:{port}: {source}")]
  Resolve {
    address: String,
    port: u16,
    source: std::io::Error,
  },
  #[error("{address}:{port} resolved to no candidates")]
  NoCandidates { address: String, port: u16 },
  #[error("failed to bind {address}:{port} (candidate {candidate}): {source}")]
  Bind {
    address: String,
    port: u16,
    candidate: usize,
    source: std::io::Error,
  },
}

/// One bound inbound socket. Closed on drop.
pub struct Receiver {
  socket: Socket,
  local: SocketAddr,
}

impl Receiver {
  /// Resolves `address:port` and binds one receiver per candidate.
  /// IPv6 candidates are forced v6-only so no dual-stack socket sneaks
  /// in with mapped IPv4 addresses.
  pub fn bind_all(
    address: &str,
    port: u16,
  ) -> Result<Vec<Receiver>, ReceiverError> {
    let candidates =
      (address, port).to_socket_addrs().map_err(|source| {
        ReceiverError::Resolve { address: address.to_string(), port, source }
      })?;

    let mut receivers = Vec::new();
    for (candidate, addr) in candidates.enumerate() {
      let receiver = Self::bind_one(addr).map_err(|source| {
        ReceiverError::Bind {
          address: address.to_string(),
          port,
          candidate,
          source,
        }
      })?;
      info!(%addr, candidate, "inbound receiver bound");
      receivers.push(receiver);
    }

    if receivers.is_empty() {
      return Err(ReceiverError::NoCandidates {
        address: address.to_string(),
        port,
      });
    }
    Ok(receivers)
  }

  fn bind_one(addr: SocketAddr) -> std::io::Result<Receiver> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
      socket.set_only_v6(true)?;
    }
    socket.bind(&addr.into())?;
    let local = socket.local_addr()?.as_socket().ok_or_else(|| {
      std::io::Error::other("bound socket has a non-inet local address")
    })?;
    Ok(Receiver { socket, local })
  }

  pub fn local_addr(&self) -> SocketAddr {
    self.local
  }
}

impl AsRawFd for Receiver {
  fn as_raw_fd(&self) -> RawFd {
    self.socket.as_raw_fd()
  }
}
