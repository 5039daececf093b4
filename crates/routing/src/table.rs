//! Kademlia routing table: 256 k-buckets indexed by common-prefix length.

use capsule_core::{common_prefix_len, xor_distance, NodeId, ROUTING_TABLE_BUCKETS};

use crate::kbucket::{KBucket, RemoteNode};

pub struct RoutingTable {
    local_id: NodeId,
    buckets: Vec<KBucket>,
}

impl RoutingTable {
    pub fn new(local_id: NodeId) -> Self {
        let mut buckets = Vec::with_capacity(ROUTING_TABLE_BUCKETS);
        buckets.resize_with(ROUTING_TABLE_BUCKETS, KBucket::new);
        Self { local_id, buckets }
    }

    fn bucket_index(&self, id: &NodeId) -> usize {
        let prefix = common_prefix_len(&self.local_id, id);
        // An id identical to the local id has prefix 256; clamp into range,
        // it has no meaningful bucket and update() is a no-op for self.
        prefix.min(ROUTING_TABLE_BUCKETS - 1)
    }

    /// Inserts or refreshes `node` in the bucket its common-prefix length
    /// with the local id selects. A node identical to the local id is
    /// silently ignored — the table never stores the local node itself.
    pub fn update(&mut self, node: RemoteNode) {
        if node.id == self.local_id {
            return;
        }
        let idx = self.bucket_index(&node.id);
        self.buckets[idx].update(node);
    }

    pub fn find(&self, id: &NodeId) -> Option<&RemoteNode> {
        if *id == self.local_id {
            return None;
        }
        let idx = self.bucket_index(id);
        self.buckets[idx].find(id)
    }

    /// Collects every row across every bucket and returns the `count`
    /// closest to `target` under the XOR-distance total order.
    pub fn find_closest(&self, target: &NodeId, count: usize) -> Vec<RemoteNode> {
        let mut all: Vec<RemoteNode> = self.buckets.iter().flat_map(|b| b.iter().cloned()).collect();
        all.sort_by(|a, b| xor_distance(&a.id, target).cmp(&xor_distance(&b.id, target)));
        all.truncate(count);
        all
    }

    pub fn bucket_len(&self, prefix_len: usize) -> usize {
        self.buckets[prefix_len.min(ROUTING_TABLE_BUCKETS - 1)].len()
    }

    pub fn total_len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }
}
