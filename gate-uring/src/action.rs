//! Actions: the polymorphic description of one asynchronous operation.

use std::os::fd::RawFd;

use tracing::{error, warn};

use crate::sys::Sqe;

/// A delivered completion event.
#[derive(Debug, Clone, Copy)]
pub struct Completion {
  user_data: u64,
  res: i32,
  pub flags: u32,
}

impl Completion {
  pub(crate) fn new(user_data: u64, res: i32, flags: u32) -> Self {
    Self { user_data, res, flags }
  }

  pub fn is_ok(&self) -> bool {
    self.res >= 0
  }

  /// Bytes transferred, or a negative errno.
  pub fn result(&self) -> i32 {
    self.res
  }

  /// The correlation token the submission was stamped with.
  pub fn user_data(&self) -> u64 {
    self.user_data
  }
}

/// One in-flight (or repeating) asynchronous operation.
///
/// The engine stamps `user_data` on the generated descriptor itself; an
/// implementation never needs to set it. While registered, the action is
/// owned by the engine and addressed through its
/// [`ActionHandle`](crate::ActionHandle).
pub trait Action {
  /// Builds the submission descriptor from current state. Must not
  /// mutate the action.
  fn generate_submission(&self) -> Sqe;

  /// Consumes one completion event for this action.
  fn handle_completion(&mut self, completion: &Completion);

  /// Whether the engine should resubmit this action right after
  /// delivering a completion to it.
  fn requeue(&self) -> bool {
    false
  }

  /// Toggles automatic resubmission, for actions that support it.
  fn set_requeue(&mut self, _enabled: bool) {}
}

/// Reads into an owned buffer and hands the consumed byte range to a
/// callback. Size the buffer generously: a datagram that fills it to the
/// brim may have been truncated by the kernel.
pub struct ReadAction {
  fd: RawFd,
  buffer: Box<[u8]>,
  callback: Box<dyn FnMut(&[u8])>,
  requeue_on_completion: bool,
}

impl ReadAction {
  pub fn new(
    fd: RawFd,
    buffer_size: usize,
    callback: impl FnMut(&[u8]) + 'static,
  ) -> Self {
    Self {
      fd,
      buffer: vec![0u8; buffer_size].into_boxed_slice(),
      callback: Box::new(callback),
      requeue_on_completion: false,
    }
  }
}

impl Action for ReadAction {
  fn generate_submission(&self) -> Sqe {
    Sqe::read(self.fd, self.buffer.as_ptr(), self.buffer.len() as u32)
  }

  fn handle_completion(&mut self, completion: &Completion) {
    if !completion.is_ok() {
      error!(fd = self.fd, res = completion.result(), "read action failed");
      return;
    }

    let n = completion.result() as usize;
    if n >= self.buffer.len() {
      warn!(fd = self.fd, "buffer may not have been large enough for data");
    }
    (self.callback)(&self.buffer[..n]);
  }

  fn requeue(&self) -> bool {
    self.requeue_on_completion
  }

  fn set_requeue(&mut self, enabled: bool) {
    self.requeue_on_completion = enabled;
  }
}

/// Completes immediately without touching any fd. Useful for wakeups and
/// for exercising the rings in tests.
pub struct NoopAction {
  callback: Box<dyn FnMut()>,
}

impl NoopAction {
  pub fn new(callback: impl FnMut() + 'static) -> Self {
    Self { callback: Box::new(callback) }
  }
}

impl Action for NoopAction {
  fn generate_submission(&self) -> Sqe {
    Sqe::nop()
  }

  fn handle_completion(&mut self, completion: &Completion) {
    if !completion.is_ok() {
      error!(res = completion.result(), "noop action failed");
      return;
    }
    (self.callback)();
  }
}
