//! # gate-uring
//!
//! A minimal io_uring completion engine built directly on the kernel's
//! ring-buffer interface, without liburing. One thread owns an [`Engine`];
//! [`Action`]s describe the operations in flight and may ask to be
//! resubmitted automatically after each completion, which is how a
//! persistent read on a datagram socket is expressed.
//!
//! ```no_run
//! use gate_uring::{Engine, NoopAction};
//!
//! fn main() -> std::io::Result<()> {
//!   let mut engine = Engine::new(63)?;
//!   let handle = engine.register(Box::new(NoopAction::new(|| {
//!     println!("woken up");
//!   })));
//!   engine.submit(handle);
//!   engine.drain_completions(true);
//!   Ok(())
//! }
//! ```
//!
//! Linux only.

mod action;
mod arena;
mod engine;
mod ring;
mod sys;

pub use action::{Action, Completion, NoopAction, ReadAction};
pub use arena::ActionHandle;
pub use engine::Engine;
pub use sys::{IORING_OP_NOP, IORING_OP_READ, Sqe};

#[test]
fn engine_smoke() {
  use std::sync::mpsc;

  let mut engine = Engine::new(4).unwrap();

  let (sender, receiver) = mpsc::channel();
  let handle = engine.register(Box::new(NoopAction::new(move || {
    sender.send(()).unwrap();
  })));

  assert!(engine.submit(handle));
  let processed = engine.drain_completions(true);

  assert_eq!(processed, 1);
  receiver.try_recv().expect("noop callback should have run");
}
