//! Raw io_uring ABI: setup/enter syscalls, ring mmap offsets and the
//! `#[repr(C)]` structures shared with the kernel.
//!
//! The engine talks to the kernel directly through `libc::syscall` rather
//! than liburing, since the ring protocol itself is the point of this
//! crate.

use std::{io, mem, os::fd::RawFd, ptr};

macro_rules! syscall {
  ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
      #[allow(unused_unsafe)]
      let res = unsafe { libc::$fn($($arg, )*) };
      if res == -1 {
          Err(std::io::Error::last_os_error())
      } else {
          Ok(res)
      }
  }};
}

pub(crate) const IORING_SETUP_COOP_TASKRUN: u32 = 1 << 8;
pub(crate) const IORING_SETUP_TASKRUN_FLAG: u32 = 1 << 9;

pub(crate) const IORING_ENTER_GETEVENTS: u32 = 1 << 0;

pub(crate) const IORING_OFF_SQ_RING: i64 = 0;
pub(crate) const IORING_OFF_CQ_RING: i64 = 0x8000000;
pub(crate) const IORING_OFF_SQES: i64 = 0x10000000;

pub const IORING_OP_NOP: u8 = 0;
pub const IORING_OP_READ: u8 = 22;

/// Submission queue entry, 64 bytes. Matches `struct io_uring_sqe` with the
/// unions flattened to the members this crate uses.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Sqe {
  pub opcode: u8,
  pub flags: u8,
  pub ioprio: u16,
  pub fd: i32,
  pub off: u64,
  pub addr: u64,
  pub len: u32,
  pub op_flags: u32,
  pub user_data: u64,
  pub buf_index: u16,
  pub personality: u16,
  pub splice_fd_in: i32,
  pub __pad2: [u64; 2],
}

impl Sqe {
  pub fn zeroed() -> Self {
    // SAFETY: all fields are primitive integers; zero is a valid value.
    unsafe { mem::zeroed() }
  }

  /// A no-op descriptor, completes immediately with result 0.
  pub fn nop() -> Self {
    let mut sqe = Self::zeroed();
    sqe.opcode = IORING_OP_NOP;
    sqe
  }

  /// A read descriptor over `len` bytes at `addr`. The pointed-to buffer
  /// must stay valid until the completion is delivered.
  pub fn read(fd: RawFd, addr: *const u8, len: u32) -> Self {
    let mut sqe = Self::zeroed();
    sqe.opcode = IORING_OP_READ;
    sqe.fd = fd;
    sqe.addr = addr as u64;
    sqe.len = len;
    sqe
  }
}

/// Completion queue event, 16 bytes. Matches `struct io_uring_cqe`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub(crate) struct Cqe {
  pub user_data: u64,
  pub res: i32,
  pub flags: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SqRingOffsets {
  pub head: u32,
  pub tail: u32,
  pub ring_mask: u32,
  pub ring_entries: u32,
  pub flags: u32,
  pub dropped: u32,
  pub array: u32,
  pub resv1: u32,
  pub user_addr: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct CqRingOffsets {
  pub head: u32,
  pub tail: u32,
  pub ring_mask: u32,
  pub ring_entries: u32,
  pub overflow: u32,
  pub cqes: u32,
  pub flags: u32,
  pub resv1: u32,
  pub user_addr: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct IoUringParams {
  pub sq_entries: u32,
  pub cq_entries: u32,
  pub flags: u32,
  pub sq_thread_cpu: u32,
  pub sq_thread_idle: u32,
  pub features: u32,
  pub wq_fd: u32,
  pub resv: [u32; 3],
  pub sq_off: SqRingOffsets,
  pub cq_off: CqRingOffsets,
}

pub(crate) fn io_uring_setup(
  entries: u32,
  params: &mut IoUringParams,
) -> io::Result<RawFd> {
  syscall!(syscall(
    libc::SYS_io_uring_setup,
    entries as libc::c_ulong,
    params as *mut IoUringParams,
  ))
  .map(|fd| fd as RawFd)
}

pub(crate) fn io_uring_enter(
  fd: RawFd,
  to_submit: u32,
  min_complete: u32,
  flags: u32,
) -> io::Result<i32> {
  syscall!(syscall(
    libc::SYS_io_uring_enter,
    fd,
    to_submit,
    min_complete,
    flags,
    ptr::null::<libc::sigset_t>(),
    0usize,
  ))
  .map(|ret| ret as i32)
}

/// Maps one shared ring region of the io_uring fd.
pub(crate) fn map_ring(
  fd: RawFd,
  len: usize,
  offset: i64,
) -> io::Result<*mut u8> {
  // SAFETY: anonymous address, kernel-chosen placement; the fd and offset
  // select which ring region the kernel exposes.
  let ptr = unsafe {
    libc::mmap(
      ptr::null_mut(),
      len,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_SHARED | libc::MAP_POPULATE,
      fd,
      offset,
    )
  };

  if ptr == libc::MAP_FAILED {
    return Err(io::Error::last_os_error());
  }
  Ok(ptr.cast())
}
