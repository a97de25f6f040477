//! The ring engine: owns the io_uring fd, the mapped ring regions and the
//! action arena, and drives the submit / notify / drain cycle.

use std::{
  io, mem,
  os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
  sync::atomic::AtomicU32,
};

use tracing::{debug, error, info, warn};

use crate::{
  action::{Action, Completion},
  arena::{ActionHandle, Arena},
  ring::Ring,
  sys::{self, Cqe, IoUringParams, Sqe},
};

/// One mmap'd ring region. Unmapped on drop.
struct MappedRegion {
  ptr: *mut u8,
  len: usize,
}

impl MappedRegion {
  fn map(fd: RawFd, len: usize, offset: i64) -> io::Result<Self> {
    let ptr = sys::map_ring(fd, len, offset)?;
    Ok(Self { ptr, len })
  }

  /// # Safety
  /// `offset` plus the size of `T` must lie within the mapped length.
  unsafe fn offset_as<T>(&self, offset: u32) -> *mut T {
    debug_assert!(offset as usize + mem::size_of::<T>() <= self.len);
    // SAFETY: in-bounds per the caller's contract.
    unsafe { self.ptr.add(offset as usize).cast() }
  }
}

impl Drop for MappedRegion {
  fn drop(&mut self) {
    // SAFETY: ptr/len are exactly what mmap returned.
    if unsafe { libc::munmap(self.ptr.cast(), self.len) } == -1 {
      error!(err = %io::Error::last_os_error(), "munmap of ring region failed");
    }
  }
}

struct SubmissionQueue {
  ring: Ring,
  /// Index indirection: slot i of this array names which SQE the kernel
  /// should pick up for ring index i.
  array: *mut u32,
  sqes: *mut Sqe,
  _region: MappedRegion,
  _sqe_region: MappedRegion,
}

struct CompletionQueue {
  ring: Ring,
  cqes: *const Cqe,
  _region: MappedRegion,
}

/// A single-threaded io_uring completion engine.
///
/// Construct once with a fixed queue depth, [`register`](Engine::register)
/// actions, [`submit`](Engine::submit) them, and alternate
/// [`notify`](Engine::notify) / [`drain_completions`](Engine::drain_completions)
/// to run them. Only the owning thread may call any of these; the only
/// concurrency is with the kernel on the two shared rings.
pub struct Engine {
  fd: OwnedFd,
  sq: SubmissionQueue,
  cq: CompletionQueue,
  /// Entries staged in the submission ring but not yet passed to the
  /// kernel via `notify`.
  to_submit: u32,
  actions: Arena,
}

impl Engine {
  /// Opens an io_uring instance with room for `queue_depth` submissions
  /// and maps the three shared regions. Cooperative task running is
  /// requested; kernels that predate those setup flags get a plain ring.
  ///
  /// Every failure here is fatal: there is no partial or degraded mode.
  pub fn new(queue_depth: u32) -> io::Result<Self> {
    let mut params = IoUringParams {
      flags: sys::IORING_SETUP_COOP_TASKRUN | sys::IORING_SETUP_TASKRUN_FLAG,
      ..Default::default()
    };

    let fd = match sys::io_uring_setup(queue_depth, &mut params) {
      Ok(fd) => fd,
      Err(err) if err.raw_os_error() == Some(libc::EINVAL) => {
        debug!("kernel rejected cooperative setup flags, retrying without");
        params = IoUringParams::default();
        sys::io_uring_setup(queue_depth, &mut params)?
      }
      Err(err) => return Err(err),
    };
    // SAFETY: fresh fd returned by io_uring_setup, owned from here on.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    info!(ring_fd = fd.as_raw_fd(), "io_uring ready");

    let sq = Self::map_submission_queue(fd.as_raw_fd(), &params)?;
    let cq = Self::map_completion_queue(fd.as_raw_fd(), &params)?;

    Ok(Self {
      fd,
      sq,
      cq,
      to_submit: 0,
      actions: Arena::with_capacity(queue_depth as usize),
    })
  }

  fn map_submission_queue(
    fd: RawFd,
    params: &IoUringParams,
  ) -> io::Result<SubmissionQueue> {
    let ring_len = params.sq_off.array as usize
      + params.sq_entries as usize * mem::size_of::<u32>();
    let region = MappedRegion::map(fd, ring_len, sys::IORING_OFF_SQ_RING)?;

    let sqe_len = params.sq_entries as usize * mem::size_of::<Sqe>();
    let sqe_region = MappedRegion::map(fd, sqe_len, sys::IORING_OFF_SQES)?;

    // SAFETY: the kernel's reported offsets all lie within the region it
    // told us to map.
    let ring = unsafe {
      let mask = *region.offset_as::<u32>(params.sq_off.ring_mask);
      Ring::from_raw(
        region.offset_as::<AtomicU32>(params.sq_off.head),
        region.offset_as::<AtomicU32>(params.sq_off.tail),
        mask,
      )
    };
    // SAFETY: as above.
    let array = unsafe { region.offset_as::<u32>(params.sq_off.array) };

    Ok(SubmissionQueue {
      ring,
      array,
      sqes: sqe_region.ptr.cast(),
      _region: region,
      _sqe_region: sqe_region,
    })
  }

  fn map_completion_queue(
    fd: RawFd,
    params: &IoUringParams,
  ) -> io::Result<CompletionQueue> {
    let ring_len = params.cq_off.cqes as usize
      + params.cq_entries as usize * mem::size_of::<Cqe>();
    let region = MappedRegion::map(fd, ring_len, sys::IORING_OFF_CQ_RING)?;

    // SAFETY: kernel-reported offsets, in bounds of the mapped region.
    let ring = unsafe {
      let mask = *region.offset_as::<u32>(params.cq_off.ring_mask);
      Ring::from_raw(
        region.offset_as::<AtomicU32>(params.cq_off.head),
        region.offset_as::<AtomicU32>(params.cq_off.tail),
        mask,
      )
    };
    // SAFETY: as above.
    let cqes = unsafe { region.offset_as::<Cqe>(params.cq_off.cqes) };

    Ok(CompletionQueue { ring, cqes, _region: region })
  }

  /// Hands an action to the engine. The returned handle is its identity
  /// for [`submit`](Engine::submit) and is what completions are routed by.
  pub fn register(&mut self, action: Box<dyn Action>) -> ActionHandle {
    self.actions.insert(action)
  }

  /// Removes a registered action. If it still has a submission in flight,
  /// the kernel-side work runs to completion and the eventual event is
  /// dropped with a warning; accept that before calling this.
  pub fn remove(&mut self, handle: ActionHandle) -> Option<Box<dyn Action>> {
    self.actions.remove(handle)
  }

  /// Toggles automatic resubmission on a registered action.
  pub fn set_requeue(&mut self, handle: ActionHandle, enabled: bool) -> bool {
    match self.actions.get_mut(handle) {
      Some(action) => {
        action.set_requeue(enabled);
        true
      }
      None => false,
    }
  }

  /// Stages one submission for the action. Returns whether the entry was
  /// queued: `false` means the submission ring is full (or the handle is
  /// stale) and nothing was mutated.
  ///
  /// Staged entries are invisible to the kernel until
  /// [`notify`](Engine::notify).
  pub fn submit(&mut self, handle: ActionHandle) -> bool {
    let Some(action) = self.actions.get(handle) else {
      warn!(token = handle.token(), "submit with stale action handle");
      return false;
    };

    let Some(tail) = self.sq.ring.try_reserve() else {
      return false;
    };

    let slot = tail & self.sq.ring.mask();
    let mut sqe = action.generate_submission();
    sqe.user_data = handle.token();

    // SAFETY: slot < sq_entries by construction of the mask, and the
    // reserve guarantees the kernel is not reading this slot.
    unsafe {
      self.sq.sqes.add(slot as usize).write(sqe);
      self.sq.array.add(slot as usize).write(slot);
    }

    self.to_submit += 1;
    self.sq.ring.publish_tail(tail);
    true
  }

  /// Crosses into the kernel to start everything staged since the last
  /// notify. With `wait_for_one`, blocks until at least one completion is
  /// ready or a signal arrives.
  ///
  /// An `EINTR` is benign and intentionally not logged; the caller owns
  /// the retry policy. Any other failure is logged and returned.
  pub fn notify(&mut self, wait_for_one: bool) -> io::Result<()> {
    let min_complete = u32::from(wait_for_one);
    match sys::io_uring_enter(
      self.fd.as_raw_fd(),
      self.to_submit,
      min_complete,
      sys::IORING_ENTER_GETEVENTS,
    ) {
      Ok(_) => {
        self.to_submit = 0;
        Ok(())
      }
      Err(err) => {
        if err.raw_os_error() != Some(libc::EINTR) {
          error!(%err, "io_uring_enter failed");
        }
        Err(err)
      }
    }
  }

  /// Consumes everything currently in the completion ring, delivering
  /// each event to its action and immediately restaging actions that ask
  /// to be requeued. Restaged entries are flushed with a single
  /// non-blocking notify at the end rather than one kernel crossing each.
  ///
  /// With `wait_for_one`, performs a blocking [`notify`](Engine::notify)
  /// first. Returns the number of completions processed.
  pub fn drain_completions(&mut self, wait_for_one: bool) -> usize {
    if wait_for_one {
      // Interrupted or failed waits still fall through to drain whatever
      // already completed.
      let _ = self.notify(true);
    }

    let mask = self.cq.ring.mask();
    let (mut head, tail) = self.cq.ring.unconsumed();

    let mut anything_requeued = false;
    let mut completions = 0;

    while (head & mask) != (tail & mask) {
      // SAFETY: index in [head, tail) masked into the ring; the acquire
      // load of tail ordered the kernel's writes before this read.
      let cqe = unsafe { self.cq.cqes.add((head & mask) as usize).read() };
      let completion = Completion::new(cqe.user_data, cqe.res, cqe.flags);
      let handle = ActionHandle::from_token(cqe.user_data);

      match self.actions.take(handle) {
        Some(mut action) => {
          action.handle_completion(&completion);
          let wants_requeue = action.requeue();
          self.actions.restore(handle, action);

          if wants_requeue {
            if self.submit(handle) {
              anything_requeued = true;
            } else {
              warn!(
                token = cqe.user_data,
                "submission ring full, dropping requeue"
              );
            }
          }
        }
        None => {
          warn!(token = cqe.user_data, "completion for unknown action handle");
        }
      }

      head = head.wrapping_add(1);
      completions += 1;
    }
    self.cq.ring.publish_head(head);

    if anything_requeued {
      let _ = self.notify(false);
    }
    completions
  }
}
