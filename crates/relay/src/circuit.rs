//! Circuit builder: relay selection driven by the trust store, then
//! recursive onion wrapping into a packet ready for the first hop.

use std::net::SocketAddr;

use rand::seq::SliceRandom;
use rand::thread_rng;
use rand::RngCore;
use thiserror::Error;
use tracing::debug;

use capsule_core::NodeId;
use capsule_crypto::{wrap_layer, EncryptionKeypair, OnionError, RelayPacket};
use capsule_routing::RoutingTable;
use capsule_trust::TrustEdge;
use capsule_trust::TrustVertex;

#[derive(Error, Debug)]
pub enum CircuitError {
    #[error("relay {0} not present in the routing table")]
    RelayNotFound(String),
    #[error("no relays satisfy the trust threshold")]
    NoRelaysAvailable,
    #[error("onion layer construction failed: {0}")]
    Onion(#[from] OnionError),
}

/// One hop of an [`ActiveCircuit`]: the relay's identity and address, plus
/// the ephemeral keypair and session id the initiator committed to for it.
pub struct CircuitHop {
    pub relay_id: NodeId,
    pub relay_static_public: [u8; 32],
    pub relay_address: SocketAddr,
    pub session_id: [u8; 16],
    pub ephemeral_keypair: EncryptionKeypair,
}

/// Ordered hop sequence built by the initiator; immutable after
/// construction. Ephemeral private keys live only here and in the caller
/// that built it — nothing persists them.
pub struct ActiveCircuit {
    pub hops: Vec<CircuitHop>,
}

impl ActiveCircuit {
    pub fn first_hop_address(&self) -> Option<SocketAddr> {
        self.hops.first().map(|h| h.relay_address)
    }
}

fn fresh_session_id() -> [u8; 16] {
    let mut id = [0u8; 16];
    thread_rng().fill_bytes(&mut id);
    id
}

/// Looks up each hop id in the routing table, generating a fresh per-hop
/// ephemeral keypair and session id. Refuses with `RelayNotFound` the
/// moment any hop is absent.
pub fn build_circuit(
    hop_ids: &[NodeId],
    routing_table: &RoutingTable,
) -> Result<ActiveCircuit, CircuitError> {
    let mut hops = Vec::with_capacity(hop_ids.len());
    for hop_id in hop_ids {
        let node = routing_table
            .find(hop_id)
            .ok_or_else(|| CircuitError::RelayNotFound(hex::encode(hop_id)))?;
        hops.push(CircuitHop {
            relay_id: node.id,
            relay_static_public: node.static_key,
            relay_address: node.address,
            session_id: fresh_session_id(),
            ephemeral_keypair: EncryptionKeypair::generate(),
        });
    }
    debug!(hop_count = hops.len(), "circuit built");
    Ok(ActiveCircuit { hops })
}

/// Wraps `payload` innermost-first (last hop addressed to `target_id`) and
/// then outward through the remaining hops, each layer's payload being the
/// wire-encoded bytes of the packet just produced for the hop inside it.
/// The returned packet is meant for the circuit's first hop.
pub fn send_on_circuit(
    circuit: &ActiveCircuit,
    target_id: &NodeId,
    payload: &[u8],
) -> Result<RelayPacket, CircuitError> {
    let mut iter = circuit.hops.iter().rev();
    let last_hop = iter.next().ok_or_else(|| CircuitError::RelayNotFound("<empty circuit>".into()))?;

    let mut packet = wrap_layer(
        payload,
        target_id,
        &last_hop.relay_static_public,
        last_hop.session_id,
        Some(last_hop.ephemeral_keypair.clone()),
    )?;
    let mut inner_next_hop = last_hop.relay_id;

    for hop in iter {
        let packet_bytes = packet.to_bytes();
        packet = wrap_layer(
            &packet_bytes,
            &inner_next_hop,
            &hop.relay_static_public,
            hop.session_id,
            Some(hop.ephemeral_keypair.clone()),
        )?;
        inner_next_hop = hop.relay_id;
    }

    Ok(packet)
}

/// One-hop MVP relay selection: query the trust store for relays above
/// `min_score`, then pick uniformly at random among the results.
pub fn select_relay(trusted_dids: &[String]) -> Result<&str, CircuitError> {
    trusted_dids
        .choose(&mut thread_rng())
        .map(|s| s.as_str())
        .ok_or(CircuitError::NoRelaysAvailable)
}

/// Resolves a DID chosen by [`select_relay`] back to a routable node, using
/// the trust graph's vertex list to recover the numeric vertex id and the
/// routing table to recover the transport-level identity.
pub fn relay_node_id_for_did<'a>(
    did: &str,
    vertices: &'a [TrustVertex],
) -> Option<&'a TrustVertex> {
    vertices.iter().find(|v| v.did_text.as_deref() == Some(did))
}

/// Trust edges originating from `source_id`, used by higher-level callers
/// that want a weighted view rather than the flat DID list.
pub fn outgoing_edges<'a>(source_id: i64, edges: &'a [TrustEdge]) -> Vec<&'a TrustEdge> {
    edges.iter().filter(|e| e.source_id == source_id).collect()
}
