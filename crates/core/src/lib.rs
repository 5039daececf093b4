//! Shared types for the Capsule node: node identifiers, the crate-wide
//! error enum, and small serde helpers used by the wire-level crates.

mod error;
mod ids;

pub use error::{CapsuleError, Result};
pub use ids::{
    common_prefix_len, node_id_from_hex, node_id_to_hex, short_id, xor_distance, NodeId,
    ShortId, ShortIdDisplay,
};

/// UDP port the transport socket binds to unless overridden by configuration.
pub const DEFAULT_PORT: u16 = 8710;

/// Well-known multicast group used for local discovery.
pub const DISCOVERY_MULTICAST_GROUP: &str = "224.0.0.251";

/// Well-known multicast port used for local discovery.
pub const DISCOVERY_MULTICAST_PORT: u16 = 5353;

/// Number of peers a k-bucket retains at most.
pub const K_BUCKET_SIZE: usize = 20;

/// Number of k-buckets in the routing table (one per possible common-prefix
/// length of a 256-bit identifier).
pub const ROUTING_TABLE_BUCKETS: usize = 256;

/// Seconds of silence after which a peer-table entry is marked inactive.
pub const PEER_TABLE_IDLE_SECS: u64 = 300;

/// L0 frame `service_type` tag carried by federation/DHT traffic (`hello`,
/// `welcome`, `dht_ping`, ...).
pub const FEDERATION_SERVICE_TYPE: u16 = 0x0A01;

/// L0 frame `service_type` tag carried by onion relay traffic.
pub const RELAY_SERVICE_TYPE: u16 = 0x0A02;
