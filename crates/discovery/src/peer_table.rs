//! Peer table: short-id → last-known-address with liveness decay.
//!
//! The only structure touched from more than one logical context (discovery
//! writes it, the orchestrator's periodic tick reads and mutates it); guard
//! with a mutex and only ever iterate while it is held.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use capsule_core::{ShortId, PEER_TABLE_IDLE_SECS};

#[derive(Debug, Clone, PartialEq)]
pub struct PeerTableEntry {
    pub address: SocketAddr,
    pub short_id: ShortId,
    pub last_seen: Instant,
    pub trust_score: f64,
    pub active: bool,
}

pub struct PeerTable {
    entries: Mutex<HashMap<ShortId, PeerTableEntry>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts or refreshes an entry, stamping `last_seen = now` and
    /// `active = true`.
    pub fn update(&self, short_id: ShortId, address: SocketAddr) {
        let mut guard = self.entries.lock().expect("peer table mutex poisoned");
        let entry = guard.entry(short_id).or_insert_with(|| PeerTableEntry {
            address,
            short_id,
            last_seen: Instant::now(),
            trust_score: 0.0,
            active: true,
        });
        entry.address = address;
        entry.last_seen = Instant::now();
        entry.active = true;
    }

    /// Marks as inactive any entry whose `last_seen` is more than 300 s old.
    pub fn tick(&self) {
        let mut guard = self.entries.lock().expect("peer table mutex poisoned");
        let idle = Duration::from_secs(PEER_TABLE_IDLE_SECS);
        for entry in guard.values_mut() {
            if entry.last_seen.elapsed() > idle {
                entry.active = false;
            }
        }
    }

    pub fn get(&self, short_id: &ShortId) -> Option<PeerTableEntry> {
        self.entries
            .lock()
            .expect("peer table mutex poisoned")
            .get(short_id)
            .cloned()
    }

    /// Active peers, for the orchestrator's new-session bootstrap.
    pub fn active_peers(&self) -> Vec<PeerTableEntry> {
        self.entries
            .lock()
            .expect("peer table mutex poisoned")
            .values()
            .filter(|e| e.active)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("peer table mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short(tag: u8) -> ShortId {
        [tag; 8]
    }

    #[test]
    fn update_inserts_active_entry() {
        let table = PeerTable::new();
        table.update(short(1), "127.0.0.1:9001".parse().unwrap());
        let entry = table.get(&short(1)).unwrap();
        assert!(entry.active);
        assert_eq!(entry.address, "127.0.0.1:9001".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn tick_does_not_deactivate_fresh_entries() {
        let table = PeerTable::new();
        table.update(short(2), "127.0.0.1:9002".parse().unwrap());
        table.tick();
        assert!(table.get(&short(2)).unwrap().active);
    }

    #[test]
    fn stale_entry_becomes_inactive_after_tick() {
        let table = PeerTable::new();
        table.update(short(3), "127.0.0.1:9003".parse().unwrap());
        {
            let mut guard = table.entries.lock().unwrap();
            let entry = guard.get_mut(&short(3)).unwrap();
            entry.last_seen = Instant::now() - Duration::from_secs(301);
        }
        table.tick();
        assert!(!table.get(&short(3)).unwrap().active);
    }

    #[test]
    fn active_peers_filters_inactive() {
        let table = PeerTable::new();
        table.update(short(4), "127.0.0.1:9004".parse().unwrap());
        {
            let mut guard = table.entries.lock().unwrap();
            guard.get_mut(&short(4)).unwrap().active = false;
        }
        assert!(table.active_peers().is_empty());
    }
}
