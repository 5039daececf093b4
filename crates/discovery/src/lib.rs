//! Local discovery (mDNS-style announce/query) and the peer table it feeds.

mod mdns;
mod peer_table;

pub use mdns::{DiscoveryError, DiscoverySocket};
pub use peer_table::{PeerTable, PeerTableEntry};
