//! The shared-memory ring protocol.
//!
//! Both rings of an io_uring instance are the same structure: a
//! monotonically increasing head owned by the consumer, a monotonically
//! increasing tail owned by the producer, and a power-of-two mask that
//! turns either index into a slot. The engine is the producer on the
//! submission ring and the consumer on the completion ring; the kernel
//! plays the opposite role on each. There are no locks: a written slot
//! must be published before the advanced index (release), and the index
//! must be observed (acquire) before the slot is read.

use std::sync::atomic::{AtomicU32, Ordering};

/// One side's view of a shared ring. Holds raw pointers into mapped
/// memory, so it is neither `Send` nor `Sync`; only the engine's owning
/// thread may touch it.
pub(crate) struct Ring {
  head: *const AtomicU32,
  tail: *const AtomicU32,
  mask: u32,
}

impl Ring {
  /// # Safety
  /// `head` and `tail` must point to `u32`s that stay valid and correctly
  /// aligned for the lifetime of the `Ring`, and `mask` must be one less
  /// than the power-of-two capacity of the backing array.
  pub unsafe fn from_raw(
    head: *const AtomicU32,
    tail: *const AtomicU32,
    mask: u32,
  ) -> Self {
    Self { head, tail, mask }
  }

  fn head(&self) -> &AtomicU32 {
    // SAFETY: valid for the lifetime of self per from_raw's contract.
    unsafe { &*self.head }
  }

  fn tail(&self) -> &AtomicU32 {
    // SAFETY: as above.
    unsafe { &*self.tail }
  }

  pub fn mask(&self) -> u32 {
    self.mask
  }

  /// Producer side: the tail to write at, or `None` if the ring is full.
  ///
  /// Tail is loaded relaxed (we are the only writer); head acquire, since
  /// the consumer may be advancing it concurrently. Nothing is mutated on
  /// the full path.
  pub fn try_reserve(&self) -> Option<u32> {
    let tail = self.tail().load(Ordering::Relaxed);
    let head = self.head().load(Ordering::Acquire);

    if ((tail.wrapping_add(1)) & self.mask) == (head & self.mask) {
      return None;
    }
    Some(tail)
  }

  /// Producer side: make the slot written at `tail` visible. The release
  /// store is what publishes the slot contents to the consumer.
  pub fn publish_tail(&self, tail: u32) {
    self.tail().store(tail.wrapping_add(1), Ordering::Release);
  }

  /// Consumer side: the `[head, tail)` range not yet consumed. Tail
  /// acquire pairs with the producer's release; head is ours, relaxed.
  pub fn unconsumed(&self) -> (u32, u32) {
    let tail = self.tail().load(Ordering::Acquire);
    let head = self.head().load(Ordering::Relaxed);
    (head, tail)
  }

  /// Consumer side: hand the consumed slots back to the producer.
  pub fn publish_head(&self, head: u32) {
    self.head().store(head, Ordering::Release);
  }
}
