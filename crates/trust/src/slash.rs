//! Slash events (append-only) and ban rows (upsert-on-conflict).

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SlashEvent {
    pub timestamp: u64,
    pub target_did: String,
    pub reason: String,
    pub severity: u8,
    pub evidence_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BanRow {
    pub did: String,
    pub reason: String,
    pub banned_at: u64,
}
