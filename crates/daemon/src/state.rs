//! The node's live, mutable state and the control channel's view onto it.
//!
//! Every piece of state mutated from more than one place (the orchestrator's
//! event loop and the control channel both touch the routing table, the
//! trust graph, and so on) lives behind a `std::sync::Mutex`. Critical
//! sections are all synchronous and short, so a blocking mutex is simpler
//! than threading `tokio::sync::Mutex` through call sites that are mostly
//! not `.await` points anyway. [`PeerTable`] already guards itself the same
//! way, so it is held directly with no extra wrapper.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use capsule_control::{
    ControlHandler, ControlRequest, ControlResponse, ControlServer, PeerSummary, SessionSummary,
    SlashEventSummary,
};
use capsule_core::{node_id_from_hex, node_id_to_hex, NodeId};
use capsule_crypto::{hash, Identity};
use capsule_discovery::PeerTable;
use capsule_federation::{SessionState, SessionTable};
use capsule_relay::{build_circuit, select_relay, send_on_circuit, RelayService};
use capsule_routing::RoutingTable;
use capsule_settings::Config;
use capsule_storage::{FileStore, PeerStore, TrustStore};
use capsule_trust::{AdmissionState, Airlock, SlashEvent, TrustGraph, TrustVertex};
use capsule_transport::UdpTransport;
use tracing::{info, warn};

use crate::codec::{build_frame, source_hint};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Deterministic trust-graph vertex id for a DID string. Vertices in this
/// implementation are keyed by the hex-encoded node id, so the same node
/// always maps to the same vertex regardless of which peer reported it.
fn vertex_id_for_did(did: &str) -> i64 {
    let digest = hash(did.as_bytes());
    i64::from_le_bytes(digest[..8].try_into().unwrap())
}

/// Runtime-adjustable relay posture, mutated by the `relay_control` command.
#[derive(Debug, Clone, Copy)]
pub struct RelayPolicy {
    pub enabled: bool,
    pub trust_threshold: f64,
}

/// All mutable node state, plus the bound sockets the orchestrator polls.
pub struct NodeState {
    pub identity: Identity,
    pub config: Config,
    pub transport: UdpTransport,
    pub discovery: capsule_discovery::DiscoverySocket,
    pub control: ControlServer,
    pub peer_table: PeerTable,
    pub store: FileStore,

    pub routing_table: Mutex<RoutingTable>,
    pub session_table: Mutex<SessionTable>,
    pub relay_service: Mutex<RelayService>,
    pub trust_graph: Mutex<TrustGraph>,
    pub admission: Mutex<AdmissionState>,
    pub relay_policy: Mutex<RelayPolicy>,

    /// Static X25519 keys learned from `hello`/`welcome`, keyed by peer
    /// address; a bare `dht_pong` carries no static key of its own, so this
    /// fills the routing table's `static_key` field when one is later
    /// learned indirectly.
    pub static_keys: Mutex<HashMap<SocketAddr, [u8; 32]>>,

    sequence: AtomicU32,
    shutdown_requested: AtomicBool,
}

impl NodeState {
    pub fn new(
        identity: Identity,
        config: Config,
        transport: UdpTransport,
        discovery: capsule_discovery::DiscoverySocket,
        control: ControlServer,
        store: FileStore,
    ) -> Self {
        let relay_policy = RelayPolicy {
            enabled: config.node.relay_enabled,
            trust_threshold: config.node.relay_trust_threshold,
        };
        Self {
            routing_table: Mutex::new(RoutingTable::new(identity.node_id())),
            identity,
            config,
            transport,
            discovery,
            control,
            peer_table: PeerTable::new(),
            store,
            session_table: Mutex::new(SessionTable::new()),
            relay_service: Mutex::new(RelayService::new()),
            trust_graph: Mutex::new(TrustGraph::new()),
            admission: Mutex::new(AdmissionState::new()),
            relay_policy: Mutex::new(relay_policy),
            static_keys: Mutex::new(HashMap::new()),
            sequence: AtomicU32::new(1),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    fn node_id(&self) -> NodeId {
        self.identity.node_id()
    }

    fn airlock_label(airlock: Airlock) -> &'static str {
        match airlock {
            Airlock::Open => "open",
            Airlock::Restricted => "restricted",
            Airlock::Closed => "closed",
        }
    }

    fn parse_airlock(state: &str) -> Option<Airlock> {
        match state {
            "open" => Some(Airlock::Open),
            "restricted" => Some(Airlock::Restricted),
            "closed" => Some(Airlock::Closed),
            _ => None,
        }
    }

    fn handle_status(&self) -> ControlResponse {
        let admission = self.admission.lock().expect("admission mutex poisoned");
        let federated_sessions = self
            .session_table
            .lock()
            .expect("session table mutex poisoned")
            .federated_addresses()
            .len();
        ControlResponse::Status {
            lockdown: admission.lockdown,
            airlock: Self::airlock_label(admission.airlock).to_string(),
            federated_sessions,
            peer_count: self.peer_table.active_peers().len(),
        }
    }

    fn handle_peers(&self) -> ControlResponse {
        let peers = self
            .peer_table
            .active_peers()
            .into_iter()
            .map(|entry| PeerSummary {
                short_id: hex::encode(entry.short_id),
                address: entry.address.to_string(),
                active: entry.active,
            })
            .collect();
        ControlResponse::Peers { peers }
    }

    fn handle_sessions(&self) -> ControlResponse {
        let table = self.session_table.lock().expect("session table mutex poisoned");
        let sessions = table
            .iter()
            .map(|(address, session)| SessionSummary {
                address: address.to_string(),
                state: match session.state {
                    SessionState::Connecting => "connecting",
                    SessionState::Authenticating => "authenticating",
                    SessionState::Federated => "federated",
                    SessionState::Disconnected => "disconnected",
                }
                .to_string(),
            })
            .collect();
        ControlResponse::Sessions { sessions }
    }

    fn handle_dht(&self) -> ControlResponse {
        let table = self.routing_table.lock().expect("routing table mutex poisoned");
        let bucket_counts = (0..capsule_core::ROUTING_TABLE_BUCKETS)
            .map(|prefix_len| table.bucket_len(prefix_len))
            .collect();
        ControlResponse::Dht { bucket_counts }
    }

    fn handle_identity(&self) -> ControlResponse {
        ControlResponse::Identity {
            node_id: node_id_to_hex(&self.node_id()),
        }
    }

    fn handle_qvl_query(&self) -> ControlResponse {
        let graph = self.trust_graph.lock().expect("trust graph mutex poisoned");
        ControlResponse::QvlQuery {
            vertex_count: graph.vertices().len(),
            edge_count: graph.edges().len(),
        }
    }

    fn handle_slash(&self, did: String, reason: String, severity: u8) -> ControlResponse {
        let event = SlashEvent {
            timestamp: now_secs(),
            target_did: did.clone(),
            reason: reason.clone(),
            severity,
            evidence_hash: hash(format!("{did}:{reason}:{severity}").as_bytes()),
        };
        match self.store.log_slash(&event) {
            Ok(()) => {
                warn!(%did, severity, "peer slashed");
                ControlResponse::Ack
            }
            Err(e) => ControlResponse::error(format!("failed to log slash event: {e}")),
        }
    }

    fn handle_slash_log(&self, limit: usize) -> ControlResponse {
        match self.store.get_slash_events(limit) {
            Ok(events) => {
                let events = events
                    .into_iter()
                    .map(|e| SlashEventSummary {
                        timestamp: e.timestamp,
                        target_did: e.target_did,
                        reason: e.reason,
                        severity: e.severity,
                    })
                    .collect();
                ControlResponse::SlashLog { events }
            }
            Err(e) => ControlResponse::error(format!("failed to read slash log: {e}")),
        }
    }

    fn handle_ban(&self, did: String, reason: String) -> ControlResponse {
        match self.store.ban_peer(&did, &reason) {
            Ok(()) => {
                info!(%did, "peer banned");
                ControlResponse::Ack
            }
            Err(e) => ControlResponse::error(format!("failed to ban peer: {e}")),
        }
    }

    fn handle_unban(&self, did: String) -> ControlResponse {
        match self.store.unban_peer(&did) {
            Ok(()) => ControlResponse::Ack,
            Err(e) => ControlResponse::error(format!("failed to unban peer: {e}")),
        }
    }

    fn handle_trust(&self, did: String, score: f64) -> ControlResponse {
        let mut graph = self.trust_graph.lock().expect("trust graph mutex poisoned");
        graph.upsert_vertex(TrustVertex {
            id: vertex_id_for_did(&did),
            did_text: Some(did),
            trust_score: score,
            last_seen: now_secs(),
        });
        ControlResponse::Ack
    }

    fn handle_lockdown(&self) -> ControlResponse {
        self.admission.lock().expect("admission mutex poisoned").engage_lockdown();
        ControlResponse::Ack
    }

    fn handle_unlock(&self) -> ControlResponse {
        self.admission.lock().expect("admission mutex poisoned").disengage_lockdown();
        ControlResponse::Ack
    }

    fn handle_airlock(&self, state: String) -> ControlResponse {
        match Self::parse_airlock(&state) {
            Some(airlock) => {
                self.admission.lock().expect("admission mutex poisoned").set_airlock(airlock);
                ControlResponse::Ack
            }
            None => ControlResponse::error(format!("unknown airlock state: {state}")),
        }
    }

    fn handle_topology(&self) -> ControlResponse {
        let table = self.routing_table.lock().expect("routing table mutex poisoned");
        ControlResponse::Topology {
            total_known_nodes: table.total_len(),
        }
    }

    fn handle_relay_control(&self, enable: bool, threshold: f64) -> ControlResponse {
        let mut policy = self.relay_policy.lock().expect("relay policy mutex poisoned");
        policy.enabled = enable;
        policy.trust_threshold = threshold;
        ControlResponse::Ack
    }

    fn handle_relay_stats(&self) -> ControlResponse {
        let service = self.relay_service.lock().expect("relay service mutex poisoned");
        ControlResponse::RelayStats {
            packets_forwarded: service.packets_forwarded(),
            packets_dropped: service.packets_dropped(),
            sticky_sessions: service.sticky_session_count(),
        }
    }

    /// Builds a single-hop circuit through a trusted relay and forwards
    /// `message` to `target` (hex node id) over it.
    async fn handle_relay_send(&self, target: String, message: String) -> ControlResponse {
        let policy = *self.relay_policy.lock().expect("relay policy mutex poisoned");
        if !policy.enabled {
            return ControlResponse::error("relaying is disabled on this node");
        }
        let target_id = match node_id_from_hex(&target) {
            Ok(id) => id,
            Err(_) => return ControlResponse::error("target is not a valid hex node id"),
        };

        let candidate_dids: Vec<String> = {
            let graph = self.trust_graph.lock().expect("trust graph mutex poisoned");
            graph
                .vertices()
                .iter()
                .filter(|v| v.trust_score >= policy.trust_threshold)
                .filter_map(|v| v.did_text.clone())
                .filter(|did| did != &target)
                .collect()
        };

        let relay_did = match select_relay(&candidate_dids) {
            Ok(did) => did.to_string(),
            Err(e) => return ControlResponse::error(format!("no relay available: {e}")),
        };
        let relay_id = match node_id_from_hex(&relay_did) {
            Ok(id) => id,
            Err(_) => return ControlResponse::error("trusted relay has a malformed node id"),
        };

        let packet = {
            let table = self.routing_table.lock().expect("routing table mutex poisoned");
            let circuit = match build_circuit(&[relay_id], &table) {
                Ok(c) => c,
                Err(e) => return ControlResponse::error(format!("failed to build circuit: {e}")),
            };
            match send_on_circuit(&circuit, &target_id, message.as_bytes()) {
                Ok(packet) => (packet, circuit.first_hop_address()),
                Err(e) => return ControlResponse::error(format!("failed to wrap relay packet: {e}")),
            }
        };
        let (packet, first_hop) = packet;
        let Some(first_hop) = first_hop else {
            return ControlResponse::error("circuit has no first hop");
        };

        let frame = match build_frame(
            capsule_core::RELAY_SERVICE_TYPE,
            source_hint(&self.node_id()),
            self.next_sequence(),
            &packet.to_bytes(),
        ) {
            Some(frame) => frame,
            None => return ControlResponse::error("relay packet too large for any frame class"),
        };

        match self.transport.send(first_hop, &frame).await {
            Ok(()) => ControlResponse::Ack,
            Err(e) => ControlResponse::error(format!("send failed: {e}")),
        }
    }

    fn handle_shutdown(&self) -> ControlResponse {
        self.shutdown_requested.store(true, Ordering::Relaxed);
        info!("shutdown requested over control channel");
        ControlResponse::Ack
    }
}

impl ControlHandler for NodeState {
    fn handle(
        &self,
        request: ControlRequest,
    ) -> Pin<Box<dyn Future<Output = ControlResponse> + Send + '_>> {
        Box::pin(async move {
            match request {
                ControlRequest::Status => self.handle_status(),
                ControlRequest::Peers => self.handle_peers(),
                ControlRequest::Sessions => self.handle_sessions(),
                ControlRequest::Dht => self.handle_dht(),
                ControlRequest::Identity => self.handle_identity(),
                ControlRequest::QvlQuery => self.handle_qvl_query(),
                ControlRequest::Slash { did, reason, severity } => {
                    self.handle_slash(did, reason, severity)
                }
                ControlRequest::SlashLog { limit } => self.handle_slash_log(limit),
                ControlRequest::Ban { did, reason } => self.handle_ban(did, reason),
                ControlRequest::Unban { did } => self.handle_unban(did),
                ControlRequest::Trust { did, score } => self.handle_trust(did, score),
                ControlRequest::Lockdown => self.handle_lockdown(),
                ControlRequest::Unlock => self.handle_unlock(),
                ControlRequest::Airlock { state } => self.handle_airlock(state),
                ControlRequest::Topology => self.handle_topology(),
                ControlRequest::RelayControl { enable, threshold } => {
                    self.handle_relay_control(enable, threshold)
                }
                ControlRequest::RelayStats => self.handle_relay_stats(),
                ControlRequest::RelaySend { target, message } => {
                    self.handle_relay_send(target, message).await
                }
                ControlRequest::Shutdown => self.handle_shutdown(),
            }
        })
    }
}
