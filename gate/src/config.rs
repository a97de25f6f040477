//! Line-oriented gateway configuration.
//!
//! Three sections: `[tunnels]`, `[inbound]`, `[outbound]`. Blank lines
//! are ignored, `#` starts a comment, and a malformed line is logged and
//! skipped; a bad config line never takes the gateway down.

use tracing::warn;

/// `address:port`, with IPv6 addresses wrapped in square brackets
/// (`[::1]:53`). The address is kept as written; resolution happens when
/// the receivers are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPort {
  pub address: String,
  pub port: u16,
}

impl AddressPort {
  fn parse(line: &str) -> Option<Self> {
    let (address, port) = line.rsplit_once(':')?;

    // IPv6 addresses come bracketed so their colons don't split.
    let address = address
      .strip_prefix('[')
      .and_then(|rest| rest.strip_suffix(']'))
      .unwrap_or(address);

    if address.is_empty() {
      return None;
    }
    let port = port.trim().parse().ok()?;

    Some(Self { address: address.to_string(), port })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundConfig {
  pub listen: AddressPort,
}

impl InboundConfig {
  fn parse(line: &str) -> Option<Self> {
    Some(Self { listen: AddressPort::parse(line)? })
  }
}

/// Parsed but not yet acted upon: no transmitter is wired to the
/// outbound side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundConfig {
  pub local: AddressPort,
  pub remote: AddressPort,
}

impl OutboundConfig {
  fn parse(line: &str) -> Option<Self> {
    let (local, remote) = line.split_once("=>")?;
    Some(Self {
      local: AddressPort::parse(local.trim())?,
      remote: AddressPort::parse(remote.trim())?,
    })
  }
}

#[derive(Debug, Default)]
pub struct GateConfig {
  pub tunnels: Vec<TunnelConfig>,
  pub inbound: Vec<InboundConfig>,
  pub outbound: Vec<OutboundConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
  Tunnels,
  Inbound,
  Outbound,
  Unknown,
}

impl GateConfig {
  /// Dumb little parser that is good enough for this format.
  pub fn parse(input: &str) -> Self {
    let mut config = Self::default();
    let mut section = Section::Unknown;

    for raw_line in input.lines() {
      // Everything after a '#' is a comment.
      let line = match raw_line.split_once('#') {
        Some((before, _)) => before,
        None => raw_line,
      };
      let line = line.trim();
      if line.is_empty() {
        continue;
      }

      match line {
        "[tunnels]" => {
          section = Section::Tunnels;
          continue;
        }
        "[inbound]" => {
          section = Section::Inbound;
          continue;
        }
        "[outbound]" => {
          section = Section::Outbound;
          continue;
        }
        _ => {}
      }

      match section {
        Section::Tunnels => {
          config.tunnels.push(TunnelConfig { name: line.to_string() });
        }
        Section::Inbound => match InboundConfig::parse(line) {
          Some(inbound) => config.inbound.push(inbound),
          None => warn!(line, "skipping malformed inbound line"),
        },
        Section::Outbound => match OutboundConfig::parse(line) {
          Some(outbound) => config.outbound.push(outbound),
          None => warn!(line, "skipping malformed outbound line"),
        },
        Section::Unknown => {
          warn!(line, "skipping line outside any section");
        }
      }
    }

    config
  }
}
