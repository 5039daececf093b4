//! In-memory trust lattice: vertices and weighted edges, periodically
//! replaced wholesale into the persistent store.

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrustVertex {
    pub id: i64,
    pub did_text: Option<String>,
    pub trust_score: f64,
    pub last_seen: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrustEdge {
    pub source_id: i64,
    pub target_id: i64,
    pub weight: f64,
    pub nonce: u64,
    pub level: u8,
    pub expires_at: u64,
}

/// The in-memory lattice the orchestrator mutates as it learns about peers;
/// snapshotted wholesale into the persistent store on a timer.
#[derive(Debug, Default)]
pub struct TrustGraph {
    vertices: Vec<TrustVertex>,
    edges: Vec<TrustEdge>,
}

impl TrustGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_vertex(&mut self, vertex: TrustVertex) {
        if let Some(existing) = self.vertices.iter_mut().find(|v| v.id == vertex.id) {
            *existing = vertex;
        } else {
            self.vertices.push(vertex);
        }
    }

    pub fn upsert_edge(&mut self, edge: TrustEdge) {
        if let Some(existing) = self
            .edges
            .iter_mut()
            .find(|e| e.source_id == edge.source_id && e.target_id == edge.target_id)
        {
            *existing = edge;
        } else {
            self.edges.push(edge);
        }
    }

    pub fn vertices(&self) -> &[TrustVertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[TrustEdge] {
        &self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(id: i64, score: f64) -> TrustVertex {
        TrustVertex {
            id,
            did_text: None,
            trust_score: score,
            last_seen: 0,
        }
    }

    #[test]
    fn upsert_vertex_replaces_existing_by_id() {
        let mut graph = TrustGraph::new();
        graph.upsert_vertex(vertex(1, 0.1));
        graph.upsert_vertex(vertex(1, 0.9));
        assert_eq!(graph.vertices().len(), 1);
        assert_eq!(graph.vertices()[0].trust_score, 0.9);
    }

    #[test]
    fn populates_three_vertices_two_edges() {
        let mut graph = TrustGraph::new();
        graph.upsert_vertex(vertex(1, 1.0));
        graph.upsert_vertex(vertex(2, 1.0));
        graph.upsert_vertex(vertex(3, 1.0));
        graph.upsert_edge(TrustEdge {
            source_id: 1,
            target_id: 2,
            weight: 0.8,
            nonce: 0,
            level: 0,
            expires_at: 0,
        });
        graph.upsert_edge(TrustEdge {
            source_id: 2,
            target_id: 3,
            weight: 0.4,
            nonce: 0,
            level: 0,
            expires_at: 0,
        });
        assert_eq!(graph.vertices().len(), 3);
        assert_eq!(graph.edges().len(), 2);
    }
}
