//! DHT RPC handling: ping/pong liveness and find_node/nodes lookups,
//! layered over the routing table.

use std::net::{SocketAddr, SocketAddrV4};

use tracing::trace;

use capsule_core::{NodeId, K_BUCKET_SIZE};
use capsule_routing::RoutingTable;

use crate::messages::{FederationMessage, NodeRecord};

fn to_v4(addr: SocketAddr) -> Option<SocketAddrV4> {
    match addr {
        SocketAddr::V4(v4) => Some(v4),
        SocketAddr::V6(_) => None,
    }
}

/// Answers a `dht_ping` with a `dht_pong` carrying the local node id.
pub fn handle_ping(local_id: NodeId) -> FederationMessage {
    FederationMessage::DhtPong { node_id: local_id }
}

/// Answers a `dht_find_node` with the closest known nodes to `target`,
/// dropping any whose address is not IPv4 (the wire encoding has no v6
/// variant).
pub fn handle_find_node(routing_table: &RoutingTable, target: &NodeId) -> FederationMessage {
    let closest = routing_table.find_closest(target, K_BUCKET_SIZE);
    let nodes = closest
        .into_iter()
        .filter_map(|node| {
            let address = to_v4(node.address)?;
            Some(NodeRecord { node_id: node.id, address, static_public: node.static_key })
        })
        .collect();
    trace!("answering find_node");
    FederationMessage::DhtNodes { nodes }
}

/// Folds a `dht_nodes` reply into the routing table, returning each
/// inserted node's address so the caller can consider federating with it.
pub fn ingest_nodes(routing_table: &mut RoutingTable, nodes: &[NodeRecord]) -> Vec<SocketAddr> {
    let mut addresses = Vec::with_capacity(nodes.len());
    for record in nodes {
        let address = SocketAddr::V4(record.address);
        routing_table.update(capsule_routing::RemoteNode {
            id: record.node_id,
            address,
            last_seen: 0,
            static_key: record.static_public,
        });
        addresses.push(address);
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn ping_answers_with_local_id() {
        let local: NodeId = [9u8; 32];
        assert_eq!(handle_ping(local), FederationMessage::DhtPong { node_id: local });
    }

    #[test]
    fn find_node_returns_known_nodes() {
        let mut table = RoutingTable::new([0u8; 32]);
        table.update(capsule_routing::RemoteNode {
            id: [1u8; 32],
            address: "127.0.0.1:9000".parse().unwrap(),
            last_seen: 0,
            static_key: [1u8; 32],
        });

        let response = handle_find_node(&table, &[0u8; 32]);
        match response {
            FederationMessage::DhtNodes { nodes } => assert_eq!(nodes.len(), 1),
            _ => panic!("expected DhtNodes"),
        }
    }

    #[test]
    fn ingest_nodes_populates_routing_table() {
        let mut table = RoutingTable::new([0u8; 32]);
        let record = NodeRecord {
            node_id: [3u8; 32],
            address: SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 9100),
            static_public: [3u8; 32],
        };
        let addresses = ingest_nodes(&mut table, &[record]);
        assert_eq!(addresses.len(), 1);
        assert!(table.find(&[3u8; 32]).is_some());
    }
}
