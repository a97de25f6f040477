//! gate: a UDP tunneling gateway driven by the gate-uring engine.

mod cancel;
mod config;
mod receiver;
mod stamp;
mod tunnel;

use std::{os::fd::AsRawFd, path::PathBuf, time::SystemTime};

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use gate_uring::{Engine, ReadAction};

use crate::{
  cancel::CancelToken, config::GateConfig, receiver::Receiver, tunnel::Tunnel,
};

#[derive(Parser)]
#[command(name = "gate")]
#[command(about = "UDP tunneling gateway")]
struct Args {
  /// Path to the gateway config file.
  #[arg(default_value = "config")]
  config_path: PathBuf,

  /// Filesystem path for the tunnel control socket.
  #[arg(long, default_value = tunnel::DEFAULT_TUNNEL_PATH)]
  tunnel_path: PathBuf,

  /// Submission queue depth of the io_uring instance.
  #[arg(long, default_value_t = 63)]
  queue_depth: u32,
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .init();

  let args = Args::parse();
  let token = cancel::install_sigint().context("installing SIGINT handler")?;

  let text = std::fs::read_to_string(&args.config_path).with_context(|| {
    format!("reading config file {}", args.config_path.display())
  })?;
  let config = GateConfig::parse(&text);

  // Every resolved candidate of every inbound address gets its own
  // socket; any failure here aborts startup.
  let mut receivers = Vec::new();
  for inbound in &config.inbound {
    receivers.extend(Receiver::bind_all(
      &inbound.listen.address,
      inbound.listen.port,
    )?);
  }
  info!(
    inbound = receivers.len(),
    outbound = config.outbound.len(),
    tunnels = config.tunnels.len(),
    "gateway configured"
  );

  let tunnel = Tunnel::bind(&args.tunnel_path).with_context(|| {
    format!("binding tunnel socket {}", args.tunnel_path.display())
  })?;
  let buffer_size = tunnel
    .receive_buffer_size()
    .context("querying tunnel receive buffer size")?;
  info!(buffer_size, "tunnel receive buffer");

  let mut engine =
    Engine::new(args.queue_depth).context("setting up io_uring")?;

  let read = ReadAction::new(tunnel.as_raw_fd(), buffer_size, |data| {
    match stamp::latency(data, SystemTime::now()) {
      Some(latency) => info!(?latency, "received tunnel stamp"),
      None => warn!(len = data.len(), "unintelligible tunnel payload"),
    }
  });
  let handle = engine.register(Box::new(read));
  engine.set_requeue(handle, true);
  if !engine.submit(handle) {
    bail!("could not queue the initial tunnel read");
  }
  let _ = engine.notify(false);

  run(&mut engine, token);

  info!("shutting down");
  Ok(())
}

/// The event loop: block for completions, deliver them, check the
/// cancellation token once per iteration.
fn run(engine: &mut Engine, token: CancelToken) {
  while !token.is_cancelled() {
    let completions = engine.drain_completions(true);
    debug!(completions, "drained completions");
  }
}
