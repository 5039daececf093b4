//! Kademlia k-buckets and the 256-bucket routing table keyed by XOR
//! distance over 256-bit node identifiers.

mod kbucket;
mod table;

pub use kbucket::{KBucket, RemoteNode};
pub use table::RoutingTable;
