//! The node's single event loop: one `tokio::select!` over the transport
//! socket, the discovery socket, the control channel, and a 100ms tick that
//! drives every slower periodic task.
//!
//! Nothing here spawns a task. The node is one logical actor; the control
//! channel is served inline because its request rate is low and its
//! handlers are already synchronous state mutations behind short-lived
//! mutexes — spawning would only add bookkeeping.

use std::net::SocketAddr;
use std::time::Duration;

use capsule_core::{FEDERATION_SERVICE_TYPE, RELAY_SERVICE_TYPE};
use capsule_federation::{build_notify, handle_find_node, handle_ping, ingest_nodes, FederationMessage};
use capsule_routing::RemoteNode;
use capsule_storage::{PeerStore, TrustStore};
use capsule_transport::Frame;
use tokio::time::interval;
use tracing::{debug, info, trace, warn};

use crate::codec::{build_frame, source_hint};
use crate::error::Result;
use crate::state::NodeState;

const TICK: Duration = Duration::from_millis(100);
const DISCOVERY_CADENCE_TICKS: u64 = 50; // ~5s
const DHT_REFRESH_TICKS: u64 = 600; // ~60s
const TRUST_SNAPSHOT_TICKS: u64 = 300; // ~30s

/// Runs the node until the `shutdown` control command fires or a socket
/// operation returns a fatal (bind-level) error.
pub async fn run(state: NodeState) -> Result<()> {
    let mut transport_buf = vec![0u8; capsule_transport::FrameClass::Jumbo.total_size()];
    let mut discovery_buf = vec![0u8; 1500];
    let mut ticks: u64 = 0;
    let mut tick = interval(TICK);

    info!(node_id = %capsule_core::node_id_to_hex(&state.identity.node_id()), "capsule node starting");

    loop {
        tokio::select! {
            result = state.transport.receive(&mut transport_buf) => {
                match result {
                    Ok((frame, source)) => handle_transport_frame(&state, frame, source).await,
                    Err(e) => debug!(?e, "dropped malformed datagram"),
                }
            }
            result = state.discovery.receive(&mut discovery_buf) => {
                match result {
                    Ok((len, source)) => {
                        state.discovery.handle(&discovery_buf[..len], source, &state.peer_table);
                    }
                    Err(e) => warn!(?e, "discovery socket receive error"),
                }
            }
            result = state.control.accept() => {
                match result {
                    Ok(stream) => {
                        if let Err(e) = capsule_control::serve_request(stream, &state).await {
                            debug!(?e, "control connection ended with an error");
                        }
                    }
                    Err(e) => warn!(?e, "control socket accept error"),
                }
            }
            _ = tick.tick() => {
                ticks += 1;
                on_tick(&state, ticks).await;
            }
        }

        if state.shutdown_requested() {
            info!("shutting down");
            break;
        }
    }

    Ok(())
}

async fn handle_transport_frame(state: &NodeState, frame: Frame, source: SocketAddr) {
    if frame.verify_crc().is_err() {
        debug!(%source, "frame failed CRC verification");
        return;
    }

    match frame.header.service_type {
        FEDERATION_SERVICE_TYPE => handle_federation_payload(state, &frame.payload, source).await,
        RELAY_SERVICE_TYPE => handle_relay_payload(state, &frame.payload, source).await,
        other => trace!(service_type = other, %source, "frame for unrecognized service type"),
    }
}

async fn send_federation(state: &NodeState, destination: SocketAddr, message: &FederationMessage) {
    let Some(frame) = build_frame(
        FEDERATION_SERVICE_TYPE,
        source_hint(&state.identity.node_id()),
        state.next_sequence(),
        &message.to_bytes(),
    ) else {
        warn!("federation message too large for any frame class");
        return;
    };
    if let Err(e) = state.transport.send(destination, &frame).await {
        warn!(?e, %destination, "failed to send federation message");
    }
}

async fn handle_federation_payload(state: &NodeState, payload: &[u8], source: SocketAddr) {
    let message = match FederationMessage::from_bytes(payload) {
        Ok(m) => m,
        Err(e) => {
            debug!(?e, %source, "malformed federation message");
            return;
        }
    };

    match message {
        FederationMessage::Hello { node_id, static_public, .. } => {
            let accepts_work = state.admission.lock().expect("admission mutex poisoned").accepts_new_work();
            if !accepts_work {
                debug!(%source, "airlock closed, dropping inbound hello");
                return;
            }
            let did = capsule_core::node_id_to_hex(&node_id);
            match state.store.is_banned(&did) {
                Ok(true) => {
                    debug!(%source, %did, "banned peer sent hello, dropping");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(?e, %source, "ban check failed, dropping hello");
                    return;
                }
            }
            state
                .session_table
                .lock()
                .expect("session table mutex poisoned")
                .on_hello(source, node_id);
            state
                .static_keys
                .lock()
                .expect("static key map mutex poisoned")
                .insert(source, static_public);

            let welcome = FederationMessage::Welcome {
                node_id: state.identity.node_id(),
                static_public: state.identity.encryption.public_key_bytes(),
            };
            send_federation(state, source, &welcome).await;
        }
        FederationMessage::Welcome { node_id, static_public } => {
            let just_federated = state
                .session_table
                .lock()
                .expect("session table mutex poisoned")
                .on_welcome(source, node_id);
            state
                .static_keys
                .lock()
                .expect("static key map mutex poisoned")
                .insert(source, static_public);
            state
                .routing_table
                .lock()
                .expect("routing table mutex poisoned")
                .update(RemoteNode { id: node_id, address: source, last_seen: 0, static_key: static_public });

            if just_federated {
                info!(%source, node_id = %capsule_core::node_id_to_hex(&node_id), "peer federated");
                let ping = FederationMessage::DhtPing { node_id: state.identity.node_id() };
                send_federation(state, source, &ping).await;
            }
        }
        FederationMessage::Auth { .. } => {
            // Authenticated federation is future work; sessions promote on
            // `welcome` alone.
        }
        FederationMessage::DhtPing { .. } => {
            let pong = handle_ping(state.identity.node_id());
            send_federation(state, source, &pong).await;
        }
        FederationMessage::DhtPong { node_id } => {
            let static_key = state
                .static_keys
                .lock()
                .expect("static key map mutex poisoned")
                .get(&source)
                .copied();
            if let Some(static_key) = static_key {
                state
                    .routing_table
                    .lock()
                    .expect("routing table mutex poisoned")
                    .update(RemoteNode { id: node_id, address: source, last_seen: 0, static_key });
            }
        }
        FederationMessage::DhtFindNode { target } => {
            let response = {
                let table = state.routing_table.lock().expect("routing table mutex poisoned");
                handle_find_node(&table, &target)
            };
            send_federation(state, source, &response).await;
        }
        FederationMessage::DhtNodes { nodes } => {
            let mut table = state.routing_table.lock().expect("routing table mutex poisoned");
            ingest_nodes(&mut table, &nodes);
        }
        FederationMessage::HolePunchRequest { target_id, target_addr } => {
            if !state.config.node.gateway_enabled {
                return;
            }
            let is_federated = state
                .session_table
                .lock()
                .expect("session table mutex poisoned")
                .federated_addresses()
                .into_iter()
                .any(|addr| addr == SocketAddr::V4(target_addr));
            if !is_federated {
                debug!(target_id = %capsule_core::node_id_to_hex(&target_id), "hole punch target not federated, dropping");
                return;
            }
            let SocketAddr::V4(requester_addr) = source else {
                return;
            };
            let notify = build_notify(state.identity.node_id(), requester_addr);
            send_federation(state, SocketAddr::V4(target_addr), &notify).await;
        }
        FederationMessage::HolePunchNotify { peer_id, peer_addr } => {
            info!(peer_id = %capsule_core::node_id_to_hex(&peer_id), %peer_addr, "hole punch notify received");
            state
                .session_table
                .lock()
                .expect("session table mutex poisoned")
                .begin_outbound(SocketAddr::V4(peer_addr));
            let hello = FederationMessage::Hello {
                node_id: state.identity.node_id(),
                static_public: state.identity.encryption.public_key_bytes(),
                listen_addr: match state.transport.local_addr() {
                    Ok(SocketAddr::V4(v4)) => v4,
                    _ => peer_addr,
                },
            };
            send_federation(state, SocketAddr::V4(peer_addr), &hello).await;
        }
    }
}

async fn handle_relay_payload(state: &NodeState, payload: &[u8], source: SocketAddr) {
    let accepts_work = state.admission.lock().expect("admission mutex poisoned").accepts_new_work();
    if !accepts_work {
        debug!(%source, "airlock closed, dropping relay packet");
        return;
    }

    let relay_enabled = state.relay_policy.lock().expect("relay policy mutex poisoned").enabled;
    if !relay_enabled {
        debug!(%source, "relaying disabled on this node, dropping relay packet");
        return;
    }

    let receiver_static_private = state.identity.encryption.secret_key_bytes();
    let outcome = {
        let mut service = state.relay_service.lock().expect("relay service mutex poisoned");
        service.forward(payload, &receiver_static_private)
    };

    match outcome {
        Ok(Some(outcome)) => {
            let next_address = state
                .routing_table
                .lock()
                .expect("routing table mutex poisoned")
                .find(&outcome.next_hop)
                .map(|node| node.address);
            let Some(next_address) = next_address else {
                debug!(next_hop = %capsule_core::node_id_to_hex(&outcome.next_hop), "relay next hop unknown, dropping");
                return;
            };
            let Some(frame) = build_frame(
                RELAY_SERVICE_TYPE,
                source_hint(&state.identity.node_id()),
                state.next_sequence(),
                &outcome.payload,
            ) else {
                warn!("relay payload too large for any frame class");
                return;
            };
            if let Err(e) = state.transport.send(next_address, &frame).await {
                warn!(?e, %next_address, "failed to forward relay packet");
            }
        }
        Ok(None) => {
            debug!(%source, "relay packet delivered locally");
        }
        Err(e) => debug!(?e, %source, "malformed relay packet"),
    }
}

async fn on_tick(state: &NodeState, ticks: u64) {
    state.peer_table.tick();

    let accepts_work = state.admission.lock().expect("admission mutex poisoned").accepts_new_work();

    for entry in state.peer_table.active_peers().into_iter().filter(|_| accepts_work) {
        let has_session = state
            .session_table
            .lock()
            .expect("session table mutex poisoned")
            .get(&entry.address)
            .is_some();
        if !has_session {
            state
                .session_table
                .lock()
                .expect("session table mutex poisoned")
                .begin_outbound(entry.address);
            let hello = FederationMessage::Hello {
                node_id: state.identity.node_id(),
                static_public: state.identity.encryption.public_key_bytes(),
                listen_addr: match state.transport.local_addr() {
                    Ok(SocketAddr::V4(v4)) => v4,
                    _ => continue,
                },
            };
            send_federation(state, entry.address, &hello).await;
        }
    }

    if ticks % DISCOVERY_CADENCE_TICKS == 0 {
        if let Err(e) = state.discovery.announce().await {
            warn!(?e, "discovery announce failed");
        }
        if let Err(e) = state.discovery.query().await {
            warn!(?e, "discovery query failed");
        }
    }

    if ticks % DHT_REFRESH_TICKS == 0 {
        let local_id = state.identity.node_id();
        let find_node = FederationMessage::DhtFindNode { target: local_id };
        let federated = state
            .session_table
            .lock()
            .expect("session table mutex poisoned")
            .federated_addresses();
        for address in federated {
            send_federation(state, address, &find_node).await;
        }
    }

    if ticks % TRUST_SNAPSHOT_TICKS == 0 {
        let graph = state.trust_graph.lock().expect("trust graph mutex poisoned");
        if let Err(e) = state.store.sync_lattice(graph.vertices(), graph.edges()) {
            warn!(?e, "failed to snapshot trust lattice");
        }
    }

    state.relay_service.lock().expect("relay service mutex poisoned").evict_idle();
}
