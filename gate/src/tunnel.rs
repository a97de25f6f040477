//! The control channel: a local datagram socket peers send raw timestamp
//! payloads to.

use std::{
  os::fd::{AsRawFd, RawFd},
  os::unix::net::UnixDatagram,
  path::{Path, PathBuf},
};

use tracing::{error, info};

pub const DEFAULT_TUNNEL_PATH: &str = "/tmp/warp";

/// A bound unix datagram endpoint. The socket file is unlinked when the
/// tunnel is dropped.
pub struct Tunnel {
  socket: UnixDatagram,
  path: PathBuf,
}

impl Tunnel {
  pub fn bind(path: impl AsRef<Path>) -> std::io::Result<Self> {
    let path = path.as_ref().to_path_buf();
    let socket = UnixDatagram::bind(&path)?;
    info!(path = %path.display(), "tunnel ready");
    Ok(Self { socket, path })
  }

  /// Kernel receive buffer size in bytes, a sane upper bound for the
  /// read buffer fed to the engine.
  pub fn receive_buffer_size(&self) -> std::io::Result<usize> {
    let mut size: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: size/len point at properly sized stack locals.
    let ret = unsafe {
      libc::getsockopt(
        self.socket.as_raw_fd(),
        libc::SOL_SOCKET,
        libc::SO_RCVBUF,
        &mut size as *mut libc::c_int as *mut libc::c_void,
        &mut len,
      )
    };
    if ret == -1 {
      return Err(std::io::Error::last_os_error());
    }
    Ok(size as usize)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl AsRawFd for Tunnel {
  fn as_raw_fd(&self) -> RawFd {
    self.socket.as_raw_fd()
  }
}

impl Drop for Tunnel {
  fn drop(&mut self) {
    if let Err(err) = std::fs::remove_file(&self.path) {
      error!(path = %self.path.display(), %err, "failed to unlink tunnel socket");
    } else {
      info!(path = %self.path.display(), "tunnel closed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn binds_and_unlinks_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tunnel");

    {
      let tunnel = Tunnel::bind(&path).unwrap();
      assert!(path.exists());
      assert!(tunnel.receive_buffer_size().unwrap() > 0);
    }
    assert!(!path.exists());
  }

  #[test]
  fn peers_can_send_datagrams() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tunnel");
    let tunnel = Tunnel::bind(&path).unwrap();

    let client = UnixDatagram::unbound().unwrap();
    client.send_to(b"hello", tunnel.path()).unwrap();

    let mut buf = [0u8; 16];
    let n = tunnel.socket.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");
  }

  #[test]
  fn bind_fails_if_path_taken() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tunnel");
    let _tunnel = Tunnel::bind(&path).unwrap();
    assert!(Tunnel::bind(&path).is_err());
  }
}
