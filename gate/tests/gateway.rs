//! End-to-end: datagrams sent to a tunnel socket flow through the
//! engine and reach the gateway's read callback.

use std::{
  os::fd::AsRawFd,
  os::unix::net::UnixDatagram,
  sync::mpsc,
  time::{Duration, SystemTime},
};

use gate_uring::{Engine, ReadAction};

#[path = "../src/stamp.rs"]
mod stamp;

#[test]
fn gateway_reports_latency_for_tunnel_stamps() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("tunnel");
  let tunnel = UnixDatagram::bind(&path).unwrap();

  let mut engine = Engine::new(8).unwrap();
  let (tx, rx) = mpsc::channel();
  let read = ReadAction::new(tunnel.as_raw_fd(), 2048, move |data| {
    tx.send(stamp::latency(data, SystemTime::now())).unwrap();
  });
  let handle = engine.register(Box::new(read));
  engine.set_requeue(handle, true);
  assert!(engine.submit(handle));

  let client = UnixDatagram::unbound().unwrap();
  for _ in 0..3 {
    client.send_to(&stamp::encode(SystemTime::now()), &path).unwrap();
  }

  // One explicit submit; the requeueing action covers the rest.
  let mut delivered = 0;
  while delivered < 3 {
    delivered += engine.drain_completions(true);
  }

  for _ in 0..3 {
    let latency = rx.try_recv().unwrap().expect("well-formed stamp");
    assert!(latency < Duration::from_secs(5));
  }
}

#[test]
fn malformed_payloads_surface_as_no_latency() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("tunnel");
  let tunnel = UnixDatagram::bind(&path).unwrap();

  let mut engine = Engine::new(8).unwrap();
  let (tx, rx) = mpsc::channel();
  let read = ReadAction::new(tunnel.as_raw_fd(), 2048, move |data| {
    tx.send(stamp::latency(data, SystemTime::now())).unwrap();
  });
  let handle = engine.register(Box::new(read));
  assert!(engine.submit(handle));

  let client = UnixDatagram::unbound().unwrap();
  client.send_to(b"not a timestamp", &path).unwrap();

  while engine.drain_completions(true) == 0 {}
  assert_eq!(rx.try_recv().unwrap(), None);
}
