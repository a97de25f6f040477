//! Companion client: sends timestamp payloads to a running gateway so
//! the reported latency can be eyeballed.

use std::{os::unix::net::UnixDatagram, path::PathBuf, time::SystemTime};

use anyhow::Context;
use clap::Parser;

#[path = "../stamp.rs"]
#[allow(dead_code)]
mod stamp;

#[derive(Parser)]
#[command(name = "ping")]
#[command(about = "send timestamp datagrams to a gate tunnel socket")]
struct Args {
  /// Filesystem path of the gateway's tunnel socket.
  #[arg(default_value = "/tmp/warp")]
  tunnel_path: PathBuf,

  /// Number of datagrams to send.
  #[arg(long, default_value_t = 1)]
  count: u32,

  /// Pause between datagrams, in milliseconds.
  #[arg(long, default_value_t = 1000)]
  interval_ms: u64,
}

fn main() -> anyhow::Result<()> {
  let args = Args::parse();
  let socket = UnixDatagram::unbound().context("creating client socket")?;

  for sent in 0..args.count {
    let payload = stamp::encode(SystemTime::now());
    socket.send_to(&payload, &args.tunnel_path).with_context(|| {
      format!("sending to {}", args.tunnel_path.display())
    })?;
    if sent + 1 < args.count {
      std::thread::sleep(std::time::Duration::from_millis(args.interval_ms));
    }
  }
  Ok(())
}
