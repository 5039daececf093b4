//! Per-peer federation session state machine, owned by the orchestrator.
//!
//! ```text
//! (no session) ───────────▶ Connecting ──────────▶ Authenticating
//!                                                        │
//!                                                        ▼
//!                                                    Federated
//!                                                        │
//!                                                        ▼
//!                                                  Disconnected
//! ```
//! Auth is specified as future work and skipped: `welcome` promotes a
//! session straight from `Connecting`/`Authenticating` to `Federated`.

use std::collections::HashMap;
use std::net::SocketAddr;

use capsule_core::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Federated,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub peer_address: SocketAddr,
    pub state: SessionState,
    pub short_id: Option<NodeId>,
}

impl Session {
    pub fn connecting(peer_address: SocketAddr) -> Self {
        Self { peer_address, state: SessionState::Connecting, short_id: None }
    }

    pub fn authenticating(peer_address: SocketAddr, short_id: NodeId) -> Self {
        Self { peer_address, state: SessionState::Authenticating, short_id: Some(short_id) }
    }
}

/// The orchestrator's live session table, keyed by peer address.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<SocketAddr, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &SocketAddr) -> Option<&Session> {
        self.sessions.get(address)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn federated_addresses(&self) -> Vec<SocketAddr> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.state == SessionState::Federated)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Begins an outbound session attempt for a peer discovered locally.
    pub fn begin_outbound(&mut self, address: SocketAddr) {
        self.sessions
            .entry(address)
            .or_insert_with(|| Session::connecting(address));
    }

    /// An inbound `hello` from an unknown source creates a session directly
    /// in `Authenticating`; one from a known source leaves existing state
    /// alone.
    pub fn on_hello(&mut self, address: SocketAddr, node_id: NodeId) {
        self.sessions
            .entry(address)
            .or_insert_with(|| Session::authenticating(address, node_id));
    }

    /// A `welcome` promotes the session to `Federated` regardless of its
    /// prior state, satisfying the one-iteration liveness requirement.
    /// Returns `true` if the session reached `Federated` as a result (the
    /// caller uses this to decide whether to emit the seeding `dht_ping`).
    pub fn on_welcome(&mut self, address: SocketAddr, node_id: NodeId) -> bool {
        let session = self
            .sessions
            .entry(address)
            .or_insert_with(|| Session::connecting(address));
        let just_federated = session.state != SessionState::Federated;
        session.state = SessionState::Federated;
        session.short_id = Some(node_id);
        just_federated
    }

    pub fn disconnect(&mut self, address: &SocketAddr) {
        if let Some(session) = self.sessions.get_mut(address) {
            session.state = SessionState::Disconnected;
        }
    }

    pub fn remove(&mut self, address: &SocketAddr) -> Option<Session> {
        self.sessions.remove(address)
    }

    /// All live sessions, for the control channel's status listing.
    pub fn iter(&self) -> impl Iterator<Item = (&SocketAddr, &Session)> {
        self.sessions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn welcome_promotes_to_federated_in_one_step() {
        let mut table = SessionTable::new();
        let peer = addr(9000);
        table.begin_outbound(peer);
        assert_eq!(table.get(&peer).unwrap().state, SessionState::Connecting);

        let promoted = table.on_welcome(peer, [9u8; 32]);
        assert!(promoted);
        assert_eq!(table.get(&peer).unwrap().state, SessionState::Federated);
    }

    #[test]
    fn inbound_hello_from_unknown_source_starts_in_authenticating() {
        let mut table = SessionTable::new();
        let peer = addr(9001);
        table.on_hello(peer, [1u8; 32]);
        assert_eq!(table.get(&peer).unwrap().state, SessionState::Authenticating);
    }

    #[test]
    fn second_welcome_is_not_reported_as_a_fresh_promotion() {
        let mut table = SessionTable::new();
        let peer = addr(9002);
        assert!(table.on_welcome(peer, [1u8; 32]));
        assert!(!table.on_welcome(peer, [1u8; 32]));
    }

    #[test]
    fn federated_addresses_lists_only_federated_sessions() {
        let mut table = SessionTable::new();
        table.begin_outbound(addr(1));
        table.on_welcome(addr(2), [2u8; 32]);
        let federated = table.federated_addresses();
        assert_eq!(federated, vec![addr(2)]);
    }
}
