//! Storage interface, treated abstractly: the peer/ban store and the
//! trust/analytics store. Implementations are external collaborators; the
//! node holds only a handle.

use capsule_core::Result;
use capsule_routing::RemoteNode;
use capsule_trust::{SlashEvent, TrustEdge, TrustVertex};

pub trait PeerStore: Send + Sync {
    fn save_peer(&self, node: &RemoteNode) -> Result<()>;
    fn load_peers(&self) -> Result<Vec<RemoteNode>>;
    fn ban_peer(&self, did: &str, reason: &str) -> Result<()>;
    fn unban_peer(&self, did: &str) -> Result<()>;
    fn is_banned(&self, did: &str) -> Result<bool>;
}

pub trait TrustStore: Send + Sync {
    /// Replaces the snapshot atomically (delete-then-bulk-insert); readers
    /// observe either the prior or the new snapshot, never a partial one.
    fn sync_lattice(&self, vertices: &[TrustVertex], edges: &[TrustEdge]) -> Result<()>;
    fn log_slash(&self, event: &SlashEvent) -> Result<()>;
    fn get_slash_events(&self, limit: usize) -> Result<Vec<SlashEvent>>;
    /// Top-`limit` relays by score above `min_score`, as DIDs.
    fn trusted_relays(&self, min_score: f64, limit: usize) -> Result<Vec<String>>;
}
