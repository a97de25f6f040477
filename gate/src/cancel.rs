//! Cancellation of the main loop.
//!
//! The signal path does exactly one thing: set the token. The loop owns
//! the decision to stop, checking the token once per iteration.

use std::{
  io,
  sync::atomic::{AtomicBool, Ordering},
};

static CANCELLED: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug)]
pub struct CancelToken {
  _private: (),
}

impl CancelToken {
  pub fn is_cancelled(&self) -> bool {
    CANCELLED.load(Ordering::Relaxed)
  }

  pub fn cancel(&self) {
    CANCELLED.store(true, Ordering::Relaxed);
  }
}

extern "C" fn on_sigint(_signal: libc::c_int) {
  CANCELLED.store(true, Ordering::Relaxed);
}

/// Installs the SIGINT handler and returns the token it sets.
pub fn install_sigint() -> io::Result<CancelToken> {
  // SAFETY: on_sigint is async-signal-safe: one relaxed atomic store.
  let previous = unsafe {
    libc::signal(libc::SIGINT, on_sigint as usize as libc::sighandler_t)
  };
  if previous == libc::SIG_ERR {
    return Err(io::Error::last_os_error());
  }
  Ok(CancelToken { _private: () })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_reflects_cancel() {
    let token = CancelToken { _private: () };
    assert!(!token.is_cancelled());
    token.cancel();
    assert!(token.is_cancelled());
    CANCELLED.store(false, Ordering::Relaxed);
  }
}
