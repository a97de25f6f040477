//! The tunnel payload: a raw timestamp.
//!
//! The payload is the sender's clock as nanoseconds since the unix
//! epoch, in native byte order: effectively an unserialized in-memory
//! value. This is a known compatibility gap (peers must share
//! architecture and build), not a stable wire format.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const STAMP_LEN: usize = std::mem::size_of::<u128>();

pub fn encode(now: SystemTime) -> [u8; STAMP_LEN] {
  let nanos = now
    .duration_since(UNIX_EPOCH)
    .unwrap_or(Duration::ZERO)
    .as_nanos();
  nanos.to_ne_bytes()
}

/// `None` if the payload is not exactly one timestamp.
pub fn decode(payload: &[u8]) -> Option<SystemTime> {
  let bytes: [u8; STAMP_LEN] = payload.try_into().ok()?;
  let nanos = u128::from_ne_bytes(bytes);
  let secs = (nanos / 1_000_000_000) as u64;
  let subsec = (nanos % 1_000_000_000) as u32;
  UNIX_EPOCH.checked_add(Duration::new(secs, subsec))
}

/// Age of a received stamp relative to `now`. `None` for malformed
/// payloads or a stamp from the future (clock skew).
pub fn latency(payload: &[u8], now: SystemTime) -> Option<Duration> {
  now.duration_since(decode(payload)?).ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn roundtrip_preserves_the_instant() {
    let now = SystemTime::now();
    let decoded = decode(&encode(now)).unwrap();
    // Sub-nanosecond precision does not exist; the value is exact.
    assert_eq!(decoded, now);
  }

  #[test]
  fn latency_measures_elapsed_time() {
    let sent = UNIX_EPOCH + Duration::from_secs(100);
    let received = UNIX_EPOCH + Duration::from_millis(100_250);
    let payload = encode(sent);
    assert_eq!(latency(&payload, received), Some(Duration::from_millis(250)));
  }

  #[test]
  fn wrong_size_payload_is_rejected() {
    assert!(decode(b"short").is_none());
    assert!(latency(&[0u8; STAMP_LEN + 1], SystemTime::now()).is_none());
  }

  #[test]
  fn future_stamp_is_rejected() {
    let future = SystemTime::now() + Duration::from_secs(60);
    assert!(latency(&encode(future), SystemTime::now()).is_none());
  }
}
