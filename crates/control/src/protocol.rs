//! Tagged request/response types for the administrative control channel.
//! One JSON object per line, `type` as the discriminant.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Peers,
    Sessions,
    Dht,
    Identity,
    QvlQuery,
    Slash { did: String, reason: String, severity: u8 },
    SlashLog { limit: usize },
    Ban { did: String, reason: String },
    Unban { did: String },
    Trust { did: String, score: f64 },
    Lockdown,
    Unlock,
    Airlock { state: String },
    Topology,
    RelayControl { enable: bool, threshold: f64 },
    RelayStats,
    RelaySend { target: String, message: String },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSummary {
    pub short_id: String,
    pub address: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub address: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashEventSummary {
    pub timestamp: u64,
    pub target_did: String,
    pub reason: String,
    pub severity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResponse {
    Status {
        lockdown: bool,
        airlock: String,
        federated_sessions: usize,
        peer_count: usize,
    },
    Peers {
        peers: Vec<PeerSummary>,
    },
    Sessions {
        sessions: Vec<SessionSummary>,
    },
    Dht {
        bucket_counts: Vec<usize>,
    },
    Identity {
        node_id: String,
    },
    QvlQuery {
        vertex_count: usize,
        edge_count: usize,
    },
    SlashLog {
        events: Vec<SlashEventSummary>,
    },
    RelayStats {
        packets_forwarded: u64,
        packets_dropped: u64,
        sticky_sessions: usize,
    },
    Topology {
        total_known_nodes: usize,
    },
    Ack,
    Error {
        message: String,
    },
}

impl ControlResponse {
    pub fn error(message: impl Into<String>) -> Self {
        ControlResponse::Error { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let req = ControlRequest::Slash { did: "did:x".into(), reason: "spam".into(), severity: 3 };
        let json = serde_json::to_string(&req).unwrap();
        let back: ControlRequest = serde_json::from_str(&json).unwrap();
        match back {
            ControlRequest::Slash { did, reason, severity } => {
                assert_eq!(did, "did:x");
                assert_eq!(reason, "spam");
                assert_eq!(severity, 3);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unit_variant_request_has_bare_type_tag() {
        let json = serde_json::to_string(&ControlRequest::Status).unwrap();
        assert_eq!(json, r#"{"type":"status"}"#);
    }

    #[test]
    fn response_round_trips_through_json() {
        let resp = ControlResponse::RelayStats { packets_forwarded: 4, packets_dropped: 1, sticky_sessions: 2 };
        let json = serde_json::to_string(&resp).unwrap();
        let back: ControlResponse = serde_json::from_str(&json).unwrap();
        match back {
            ControlResponse::RelayStats { packets_forwarded, packets_dropped, sticky_sessions } => {
                assert_eq!(packets_forwarded, 4);
                assert_eq!(packets_dropped, 1);
                assert_eq!(sticky_sessions, 2);
            }
            _ => panic!("wrong variant"),
        }
    }
}
