//! File-backed implementation of [`PeerStore`] and [`TrustStore`].
//!
//! Full-snapshot writes use the write-temp-then-rename pattern so readers
//! never observe a half-written file. The slash log is append-only via
//! `OpenOptions::append`, one JSON object per line.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use capsule_core::{CapsuleError, Result};
use capsule_routing::RemoteNode;
use capsule_trust::{SlashEvent, TrustEdge, TrustVertex};
use serde::{Deserialize, Serialize};

use crate::traits::{PeerStore, TrustStore};

#[derive(Serialize, Deserialize, Clone)]
struct PeerDto {
    id_hex: String,
    address: String,
    last_seen: u64,
    static_key_hex: String,
}

impl PeerDto {
    fn from_node(node: &RemoteNode) -> Self {
        Self {
            id_hex: hex::encode(node.id),
            address: node.address.to_string(),
            last_seen: node.last_seen,
            static_key_hex: hex::encode(node.static_key),
        }
    }

    fn to_node(&self) -> Option<RemoteNode> {
        let id_bytes = hex::decode(&self.id_hex).ok()?;
        let key_bytes = hex::decode(&self.static_key_hex).ok()?;
        if id_bytes.len() != 32 || key_bytes.len() != 32 {
            return None;
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&id_bytes);
        let mut static_key = [0u8; 32];
        static_key.copy_from_slice(&key_bytes);
        let address: SocketAddr = self.address.parse().ok()?;
        Some(RemoteNode {
            id,
            address,
            last_seen: self.last_seen,
            static_key,
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Default)]
struct PeerFile {
    peers: HashMap<String, PeerDto>,
    bans: HashMap<String, BanRowDto>,
}

#[derive(Serialize, Deserialize, Clone)]
struct BanRowDto {
    reason: String,
    banned_at: u64,
}

#[derive(Serialize, Deserialize, Clone, Default)]
struct TrustFile {
    vertices: Vec<TrustVertex>,
    edges: Vec<TrustEdge>,
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(CapsuleError::from),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(CapsuleError::from(e)),
    }
}

pub struct FileStore {
    peer_path: PathBuf,
    trust_path: PathBuf,
    slash_log_path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            peer_path: data_dir.join("capsule.db"),
            trust_path: data_dir.join("qvl.db"),
            slash_log_path: data_dir.join("qvl.slashlog"),
            lock: Mutex::new(()),
        }
    }
}

impl PeerStore for FileStore {
    fn save_peer(&self, node: &RemoteNode) -> Result<()> {
        let _guard = self.lock.lock().expect("store mutex poisoned");
        let mut file: PeerFile = read_or_default(&self.peer_path)?;
        file.peers
            .insert(hex::encode(node.id), PeerDto::from_node(node));
        atomic_write(&self.peer_path, &serde_json::to_vec(&file)?)
    }

    fn load_peers(&self) -> Result<Vec<RemoteNode>> {
        let _guard = self.lock.lock().expect("store mutex poisoned");
        let file: PeerFile = read_or_default(&self.peer_path)?;
        Ok(file.peers.values().filter_map(PeerDto::to_node).collect())
    }

    fn ban_peer(&self, did: &str, reason: &str) -> Result<()> {
        let _guard = self.lock.lock().expect("store mutex poisoned");
        let mut file: PeerFile = read_or_default(&self.peer_path)?;
        file.bans.insert(
            did.to_string(),
            BanRowDto {
                reason: reason.to_string(),
                banned_at: now_secs(),
            },
        );
        atomic_write(&self.peer_path, &serde_json::to_vec(&file)?)
    }

    fn unban_peer(&self, did: &str) -> Result<()> {
        let _guard = self.lock.lock().expect("store mutex poisoned");
        let mut file: PeerFile = read_or_default(&self.peer_path)?;
        file.bans.remove(did);
        atomic_write(&self.peer_path, &serde_json::to_vec(&file)?)
    }

    fn is_banned(&self, did: &str) -> Result<bool> {
        let _guard = self.lock.lock().expect("store mutex poisoned");
        let file: PeerFile = read_or_default(&self.peer_path)?;
        Ok(file.bans.contains_key(did))
    }
}

impl TrustStore for FileStore {
    fn sync_lattice(&self, vertices: &[TrustVertex], edges: &[TrustEdge]) -> Result<()> {
        let _guard = self.lock.lock().expect("store mutex poisoned");
        let file = TrustFile {
            vertices: vertices.to_vec(),
            edges: edges.to_vec(),
        };
        atomic_write(&self.trust_path, &serde_json::to_vec(&file)?)
    }

    fn log_slash(&self, event: &SlashEvent) -> Result<()> {
        let _guard = self.lock.lock().expect("store mutex poisoned");
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.slash_log_path)?;
        let line = serde_json::to_string(event)?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    fn get_slash_events(&self, limit: usize) -> Result<Vec<SlashEvent>> {
        let _guard = self.lock.lock().expect("store mutex poisoned");
        let contents = match fs::read_to_string(&self.slash_log_path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(CapsuleError::from(e)),
        };
        let mut events: Vec<SlashEvent> = contents
            .lines()
            .filter(|l| !l.is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }

    fn trusted_relays(&self, min_score: f64, limit: usize) -> Result<Vec<String>> {
        let _guard = self.lock.lock().expect("store mutex poisoned");
        let file: TrustFile = read_or_default(&self.trust_path)?;
        let mut scored: Vec<&TrustVertex> = file
            .vertices
            .iter()
            .filter(|v| v.trust_score >= min_score && v.did_text.is_some())
            .collect();
        scored.sort_by(|a, b| b.trust_score.partial_cmp(&a.trust_score).unwrap());
        Ok(scored
            .into_iter()
            .take(limit)
            .filter_map(|v| v.did_text.clone())
            .collect())
    }
}

fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_node(tag: u8) -> RemoteNode {
        RemoteNode {
            id: [tag; 32],
            address: "127.0.0.1:9000".parse().unwrap(),
            last_seen: 0,
            static_key: [tag; 32],
        }
    }

    #[test]
    fn save_and_load_peer_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save_peer(&sample_node(1)).unwrap();
        let peers = store.load_peers().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, [1u8; 32]);
    }

    #[test]
    fn ban_then_unban_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.ban_peer("did:capsule:abc", "spam").unwrap();
        assert!(store.is_banned("did:capsule:abc").unwrap());
        store.unban_peer("did:capsule:abc").unwrap();
        assert!(!store.is_banned("did:capsule:abc").unwrap());
    }

    #[test]
    fn snapshot_replacement_semantics() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let vertices = vec![
            TrustVertex { id: 1, did_text: Some("d1".into()), trust_score: 1.0, last_seen: 0 },
            TrustVertex { id: 2, did_text: Some("d2".into()), trust_score: 1.0, last_seen: 0 },
            TrustVertex { id: 3, did_text: Some("d3".into()), trust_score: 1.0, last_seen: 0 },
        ];
        let edges = vec![
            TrustEdge { source_id: 1, target_id: 2, weight: 0.8, nonce: 0, level: 0, expires_at: 0 },
            TrustEdge { source_id: 2, target_id: 3, weight: 0.4, nonce: 0, level: 0, expires_at: 0 },
        ];
        store.sync_lattice(&vertices, &edges).unwrap();
        let file: TrustFile = read_or_default(&store.trust_path).unwrap();
        assert_eq!(file.vertices.len(), 3);
        assert_eq!(file.edges.len(), 2);

        let replacement = vec![TrustVertex { id: 1, did_text: Some("d1".into()), trust_score: 1.0, last_seen: 0 }];
        store.sync_lattice(&replacement, &[]).unwrap();
        let file: TrustFile = read_or_default(&store.trust_path).unwrap();
        assert_eq!(file.vertices.len(), 1);
        assert!(file.edges.is_empty());
    }

    #[test]
    fn slash_log_is_append_only_and_most_recent_first() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for i in 0..3u8 {
            store
                .log_slash(&SlashEvent {
                    timestamp: i as u64,
                    target_did: format!("did:{i}"),
                    reason: "test".into(),
                    severity: 1,
                    evidence_hash: [i; 32],
                })
                .unwrap();
        }
        let events = store.get_slash_events(10).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].target_did, "did:2");
        assert_eq!(events[2].target_did, "did:0");
    }

    #[test]
    fn trusted_relays_filters_by_min_score_and_limit() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let vertices = vec![
            TrustVertex { id: 1, did_text: Some("high".into()), trust_score: 0.9, last_seen: 0 },
            TrustVertex { id: 2, did_text: Some("mid".into()), trust_score: 0.5, last_seen: 0 },
            TrustVertex { id: 3, did_text: Some("low".into()), trust_score: 0.1, last_seen: 0 },
        ];
        store.sync_lattice(&vertices, &[]).unwrap();

        let relays = store.trusted_relays(0.4, 10).unwrap();
        assert_eq!(relays.len(), 2);
        assert_eq!(relays[0], "high");
    }
}
