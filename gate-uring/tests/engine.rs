//! Integration tests against a live io_uring instance.

use gate_uring::{Engine, NoopAction, ReadAction};
use std::sync::mpsc;

fn dgram_pair() -> (libc::c_int, libc::c_int) {
  let mut fds = [0 as libc::c_int; 2];
  let ret = unsafe {
    libc::socketpair(libc::AF_UNIX, libc::SOCK_DGRAM, 0, fds.as_mut_ptr())
  };
  assert_eq!(ret, 0, "socketpair failed: {}", std::io::Error::last_os_error());
  (fds[0], fds[1])
}

fn send(fd: libc::c_int, data: &[u8]) {
  let written = unsafe {
    libc::write(fd, data.as_ptr() as *const libc::c_void, data.len())
  };
  assert_eq!(written as usize, data.len());
}

#[test]
fn one_completion_per_submission() {
  let mut engine = Engine::new(8).unwrap();

  let (sender, receiver) = mpsc::channel();
  let handles: Vec<_> = (0..5)
    .map(|i| {
      let sender = sender.clone();
      engine.register(Box::new(NoopAction::new(move || {
        sender.send(i).unwrap();
      })))
    })
    .collect();

  for handle in &handles {
    assert!(engine.submit(*handle), "submission ring should have room");
  }

  let mut total = 0;
  while total < 5 {
    let processed = engine.drain_completions(true);
    assert!(processed > 0);
    total += processed;
  }
  assert_eq!(total, 5);

  let mut seen: Vec<i32> = receiver.try_iter().collect();
  seen.sort();
  assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[test]
fn full_ring_rejects_without_losing_entries() {
  // Depth 4 leaves room for 3 staged entries.
  let mut engine = Engine::new(4).unwrap();

  let (sender, receiver) = mpsc::channel();
  let handles: Vec<_> = (0..4)
    .map(|_| {
      let sender = sender.clone();
      engine.register(Box::new(NoopAction::new(move || {
        sender.send(()).unwrap();
      })))
    })
    .collect();

  assert!(engine.submit(handles[0]));
  assert!(engine.submit(handles[1]));
  assert!(engine.submit(handles[2]));
  assert!(!engine.submit(handles[3]), "fourth entry must be rejected");

  let mut total = 0;
  while total < 3 {
    total += engine.drain_completions(true);
  }
  assert_eq!(total, 3, "exactly the queued entries complete");
  assert_eq!(receiver.try_iter().count(), 3);

  // The rejected submit left the ring usable.
  assert!(engine.submit(handles[3]));
  let mut total = 0;
  while total < 1 {
    total += engine.drain_completions(true);
  }
  assert_eq!(receiver.try_iter().count(), 1);
}

#[test]
fn read_action_requeues_itself() {
  let (rx_fd, tx_fd) = dgram_pair();
  let mut engine = Engine::new(8).unwrap();

  let (sender, receiver) = mpsc::channel();
  let handle = engine.register(Box::new(ReadAction::new(
    rx_fd,
    64,
    move |data: &[u8]| {
      sender.send(data.to_vec()).unwrap();
    },
  )));
  assert!(engine.set_requeue(handle, true));

  // One explicit submit; every later round rides on the auto-requeue.
  assert!(engine.submit(handle));

  for i in 0..3u8 {
    send(tx_fd, &[i; 5]);
    let mut processed = 0;
    while processed == 0 {
      processed = engine.drain_completions(true);
    }
    assert_eq!(receiver.recv().unwrap(), vec![i; 5]);
  }

  // Disabling the flag stops the cycle after the next completion.
  assert!(engine.set_requeue(handle, false));
  send(tx_fd, b"last");
  let mut processed = 0;
  while processed == 0 {
    processed = engine.drain_completions(true);
  }
  assert_eq!(receiver.recv().unwrap(), b"last".to_vec());

  send(tx_fd, b"ignored");
  assert_eq!(engine.drain_completions(false), 0);

  unsafe {
    libc::close(rx_fd);
    libc::close(tx_fd);
  }
}

#[test]
fn failed_completion_skips_callback() {
  let mut engine = Engine::new(4).unwrap();

  let (sender, receiver) = mpsc::channel();
  let handle = engine.register(Box::new(ReadAction::new(
    -1,
    16,
    move |data: &[u8]| {
      sender.send(data.to_vec()).unwrap();
    },
  )));

  assert!(engine.submit(handle));
  let mut processed = 0;
  while processed == 0 {
    processed = engine.drain_completions(true);
  }

  assert_eq!(processed, 1);
  assert!(receiver.try_recv().is_err(), "callback must not run on error");
}

#[test]
fn stale_handle_is_not_submittable() {
  let mut engine = Engine::new(4).unwrap();

  let handle = engine.register(Box::new(NoopAction::new(|| {})));
  assert!(engine.remove(handle).is_some());
  assert!(!engine.submit(handle));
  assert!(!engine.set_requeue(handle, true));
}
