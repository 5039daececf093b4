//! A single Kademlia k-bucket: up to `K` remote nodes ordered
//! least-recently-seen to most-recently-seen.

use std::collections::VecDeque;
use std::net::SocketAddr;

use capsule_core::{NodeId, K_BUCKET_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub id: NodeId,
    pub address: SocketAddr,
    pub last_seen: u64,
    pub static_key: [u8; 32],
}

#[derive(Debug, Default)]
pub struct KBucket {
    nodes: VecDeque<RemoteNode>,
}

impl KBucket {
    pub fn new() -> Self {
        Self {
            nodes: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteNode> {
        self.nodes.iter()
    }

    pub fn find(&self, id: &NodeId) -> Option<&RemoteNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Applies the k-bucket insertion policy: if `node.id` is already
    /// present, move it to the back (most-recently-seen); else if the
    /// bucket has room, append it; else the bucket is full and the new
    /// node is dropped, the existing front entry retained (ping-and-replace
    /// is left as future work).
    pub fn update(&mut self, node: RemoteNode) {
        if let Some(pos) = self.nodes.iter().position(|n| n.id == node.id) {
            self.nodes.remove(pos);
            self.nodes.push_back(node);
            return;
        }
        if self.nodes.len() < K_BUCKET_SIZE {
            self.nodes.push_back(node);
        }
        // else: bucket full, front entry retained, new node dropped.
    }
}
