//! Node identifiers and the XOR distance metric.

use std::fmt;

/// 32-byte node identifier, derived from the long-term Ed25519 signing
/// public key. Used as the Kademlia key and as the "next hop" field inside
/// onion-wrapped packets.
pub type NodeId = [u8; 32];

/// First 8 bytes of a [`NodeId`]; the compact key used by the peer table
/// and discovery gossip.
pub type ShortId = [u8; 8];

/// Derives the short identifier from a full node identifier.
pub fn short_id(id: &NodeId) -> ShortId {
    let mut short = [0u8; 8];
    short.copy_from_slice(&id[..8]);
    short
}

/// XOR distance between two node identifiers, itself a 32-byte value
/// ordered lexicographically — the total order Kademlia sorts candidates by.
pub fn xor_distance(a: &NodeId, b: &NodeId) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Number of leading bits the two identifiers share, i.e. the k-bucket
/// index a candidate falls into relative to a local identifier.
pub fn common_prefix_len(a: &NodeId, b: &NodeId) -> usize {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = x ^ y;
        if diff != 0 {
            return i * 8 + diff.leading_zeros() as usize;
        }
    }
    256
}

/// Renders a node id as a lowercase hex string, for logging and the control
/// protocol's human-facing identity fields.
pub fn node_id_to_hex(id: &NodeId) -> String {
    hex::encode(id)
}

pub fn node_id_from_hex(s: &str) -> Result<NodeId, hex::FromHexError> {
    let bytes = hex::decode(s)?;
    let mut id = [0u8; 32];
    if bytes.len() != 32 {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    id.copy_from_slice(&bytes);
    Ok(id)
}

/// Newtype wrapper used only where a `Display` impl on `ShortId` is wanted
/// without blanket-impling on the bare array type.
pub struct ShortIdDisplay<'a>(pub &'a ShortId);

impl fmt::Display for ShortIdDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_first_eight_bytes() {
        let mut id = [0u8; 32];
        for (i, b) in id.iter_mut().enumerate() {
            *b = i as u8;
        }
        assert_eq!(short_id(&id), [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn xor_distance_is_zero_for_identical_ids() {
        let id = [0x42u8; 32];
        assert_eq!(xor_distance(&id, &id), [0u8; 32]);
    }

    #[test]
    fn xor_distance_is_symmetric() {
        let a = [0x01u8; 32];
        let b = [0xFFu8; 32];
        assert_eq!(xor_distance(&a, &b), xor_distance(&b, &a));
    }

    #[test]
    fn common_prefix_len_all_zero_vs_leading_one_bit() {
        let local = [0x00u8; 32];
        let mut other = [0x00u8; 32];
        other[0] = 0x01; // 0000_0001
        // shared leading zero bits: 7
        assert_eq!(common_prefix_len(&local, &other), 7);
    }

    #[test]
    fn common_prefix_len_identical_is_256() {
        let id = [0xAAu8; 32];
        assert_eq!(common_prefix_len(&id, &id), 256);
    }

    #[test]
    fn hex_round_trip() {
        let id = [0x13u8; 32];
        let s = node_id_to_hex(&id);
        assert_eq!(node_id_from_hex(&s).unwrap(), id);
    }
}
