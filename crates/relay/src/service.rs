//! Per-packet forward/deliver decision and sticky-session tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use capsule_core::NodeId;
use capsule_crypto::{is_local_delivery, unwrap_layer, OnionError, RelayPacket};

/// Sticky sessions idle longer than this are eligible for eviction on the
/// next sweep; bounds memory regardless of adversarial session-id churn.
const STICKY_SESSION_IDLE: Duration = Duration::from_secs(600);
const STICKY_SESSION_MAX_ROWS: usize = 50_000;

#[derive(Error, Debug)]
pub enum RelayServiceError {
    #[error("packet could not be parsed: {0}")]
    Malformed(#[from] OnionError),
}

#[derive(Debug, Clone)]
pub struct StickySessionRow {
    pub count: u64,
    pub last_seen: Instant,
}

/// Outcome of [`RelayService::forward`] for a packet that should continue
/// on to another hop.
pub struct ForwardOutcome {
    pub next_hop: NodeId,
    pub payload: Vec<u8>,
    pub session_id: [u8; 16],
}

#[derive(Default)]
pub struct RelayService {
    packets_forwarded: u64,
    packets_dropped: u64,
    sticky_sessions: HashMap<[u8; 16], StickySessionRow>,
}

impl RelayService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets_forwarded(&self) -> u64 {
        self.packets_forwarded
    }

    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped
    }

    pub fn sticky_session_count(&self) -> usize {
        self.sticky_sessions.len()
    }

    /// Parses `raw_packet`, unwraps one layer with the local static
    /// private key. A zero next-hop means local delivery: bumps
    /// `packets_dropped` and returns `None` so the caller hands the
    /// payload to an upper layer. A non-zero next-hop upserts the sticky
    /// session row, bumps `packets_forwarded`, and returns the hop to
    /// re-emit on the transport.
    pub fn forward(
        &mut self,
        raw_packet: &[u8],
        receiver_static_private: &[u8; 32],
    ) -> Result<Option<ForwardOutcome>, RelayServiceError> {
        let packet = RelayPacket::from_bytes(raw_packet)?;
        let unwrapped = unwrap_layer(&packet, receiver_static_private, None)?;

        if is_local_delivery(&unwrapped.next_hop) {
            self.packets_dropped += 1;
            debug!("relay packet delivered locally");
            return Ok(None);
        }

        self.touch_session(unwrapped.session_id);
        self.packets_forwarded += 1;

        Ok(Some(ForwardOutcome {
            next_hop: unwrapped.next_hop,
            payload: unwrapped.payload,
            session_id: unwrapped.session_id,
        }))
    }

    fn touch_session(&mut self, session_id: [u8; 16]) {
        if self.sticky_sessions.len() >= STICKY_SESSION_MAX_ROWS && !self.sticky_sessions.contains_key(&session_id) {
            self.evict_idle();
        }
        let row = self
            .sticky_sessions
            .entry(session_id)
            .or_insert_with(|| {
                debug!("new sticky session");
                StickySessionRow { count: 0, last_seen: Instant::now() }
            });
        row.count += 1;
        row.last_seen = Instant::now();
    }

    /// Drops sticky-session rows idle longer than [`STICKY_SESSION_IDLE`].
    /// Safe to call on any cadence; the orchestrator runs it on a timer.
    pub fn evict_idle(&mut self) {
        let before = self.sticky_sessions.len();
        self.sticky_sessions
            .retain(|_, row| row.last_seen.elapsed() < STICKY_SESSION_IDLE);
        let evicted = before - self.sticky_sessions.len();
        if evicted > 0 {
            warn!(evicted, "evicted idle sticky sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_crypto::{wrap_layer, EncryptionKeypair};

    #[test]
    fn forward_returns_next_hop_for_non_local_packet() {
        let hop = EncryptionKeypair::generate();
        let next_hop: NodeId = [7u8; 32];
        let packet = wrap_layer(b"payload", &next_hop, &hop.public_key_bytes(), [1u8; 16], None).unwrap();

        let mut service = RelayService::new();
        let outcome = service
            .forward(&packet.to_bytes(), &hop.secret_key_bytes())
            .unwrap()
            .expect("non-local packet should forward");

        assert_eq!(outcome.next_hop, next_hop);
        assert_eq!(outcome.payload, b"payload");
        assert_eq!(service.packets_forwarded(), 1);
        assert_eq!(service.packets_dropped(), 0);
        assert_eq!(service.sticky_session_count(), 1);
    }

    #[test]
    fn local_delivery_increments_dropped_not_forwarded() {
        let hop = EncryptionKeypair::generate();
        let local: NodeId = [0u8; 32];
        let packet = wrap_layer(b"PING", &local, &hop.public_key_bytes(), [2u8; 16], None).unwrap();

        let mut service = RelayService::new();
        let outcome = service.forward(&packet.to_bytes(), &hop.secret_key_bytes()).unwrap();

        assert!(outcome.is_none());
        assert_eq!(service.packets_dropped(), 1);
        assert_eq!(service.packets_forwarded(), 0);
    }

    #[test]
    fn repeated_session_increments_count_without_growing_rows() {
        let hop = EncryptionKeypair::generate();
        let next_hop: NodeId = [7u8; 32];
        let sid = [3u8; 16];

        let mut service = RelayService::new();
        for _ in 0..3 {
            let packet = wrap_layer(b"x", &next_hop, &hop.public_key_bytes(), sid, None).unwrap();
            service.forward(&packet.to_bytes(), &hop.secret_key_bytes()).unwrap();
        }
        assert_eq!(service.sticky_session_count(), 1);
        assert_eq!(service.packets_forwarded(), 3);
    }
}
