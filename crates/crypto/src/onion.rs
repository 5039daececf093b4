//! Onion codec: per-hop wrap/unwrap keyed by X25519 ephemeral ECDH over
//! XChaCha20-Poly1305, with a session-identifier-bound nonce prefix.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use capsule_core::NodeId;

use crate::keys::{hash, EncryptionKeypair};

#[derive(Error, Debug)]
pub enum OnionError {
    #[error("onion layer encryption failed")]
    EncryptionFailed,
    #[error("onion layer decryption failed")]
    DecryptionFailed,
    #[error("relay packet shorter than the minimum wire layout")]
    PacketTooShort,
    #[error("nonce session-identifier prefix did not match the expected session")]
    SessionMismatch,
}

/// Size of the cleartext `next_hop` field every onion layer carries.
const NEXT_HOP_LEN: usize = 32;

/// On-wire relay packet: `ephemeral_public(32) ‖ nonce(24) ‖ ciphertext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPacket {
    pub ephemeral_public: [u8; 32],
    pub nonce: [u8; 24],
    pub ciphertext: Vec<u8>,
}

impl RelayPacket {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 24 + self.ciphertext.len());
        out.extend_from_slice(&self.ephemeral_public);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OnionError> {
        if bytes.len() < 32 + 24 {
            return Err(OnionError::PacketTooShort);
        }
        let mut ephemeral_public = [0u8; 32];
        ephemeral_public.copy_from_slice(&bytes[..32]);
        let mut nonce = [0u8; 24];
        nonce.copy_from_slice(&bytes[32..56]);
        let ciphertext = bytes[56..].to_vec();
        Ok(Self {
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// The 16-byte session identifier carried as the nonce's most
    /// significant bytes.
    pub fn session_id(&self) -> [u8; 16] {
        let mut session_id = [0u8; 16];
        session_id.copy_from_slice(&self.nonce[..16]);
        session_id
    }
}

fn derive_key(shared_secret: &[u8; 32]) -> [u8; 32] {
    hash(shared_secret)
}

fn build_nonce(session_id: &[u8; 16]) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[..16].copy_from_slice(session_id);
    OsRng.fill_bytes(&mut nonce[16..]);
    nonce
}

/// Wraps `payload` for one onion hop. Generates a fresh ephemeral keypair
/// unless the caller supplies one (the circuit builder reuses per-hop
/// ephemerals it has already committed to an [`ActiveCircuit`](../../capsule_relay/struct.ActiveCircuit.html)).
/// The returned packet's ephemeral private key, if freshly generated, is
/// dropped with the local `EncryptionKeypair` and never retained — this is
/// what makes forward secrecy hold.
pub fn wrap_layer(
    payload: &[u8],
    next_hop: &NodeId,
    hop_static_public: &[u8; 32],
    session_id: [u8; 16],
    initiator_ephemeral: Option<EncryptionKeypair>,
) -> Result<RelayPacket, OnionError> {
    let ephemeral = initiator_ephemeral.unwrap_or_else(EncryptionKeypair::generate);
    let shared_secret = ephemeral.diffie_hellman(hop_static_public);
    let key = derive_key(&shared_secret);

    let mut cleartext = Vec::with_capacity(NEXT_HOP_LEN + payload.len());
    cleartext.extend_from_slice(next_hop);
    cleartext.extend_from_slice(payload);

    let nonce_bytes = build_nonce(&session_id);
    let cipher = XChaCha20Poly1305::new_from_slice(&key).map_err(|_| OnionError::EncryptionFailed)?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), cleartext.as_slice())
        .map_err(|_| OnionError::EncryptionFailed)?;

    Ok(RelayPacket {
        ephemeral_public: ephemeral.public_key_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypted contents of one onion layer.
pub struct UnwrappedLayer {
    pub next_hop: NodeId,
    pub payload: Vec<u8>,
    pub session_id: [u8; 16],
}

/// Unwraps one onion layer using the hop's long-term static private key.
/// If `expected_session_id` is given, the nonce's session prefix must match
/// it or the packet is rejected as a cross-session replay before any AEAD
/// work runs.
pub fn unwrap_layer(
    packet: &RelayPacket,
    hop_static_private: &[u8; 32],
    expected_session_id: Option<&[u8; 16]>,
) -> Result<UnwrappedLayer, OnionError> {
    let session_id = packet.session_id();
    if let Some(expected) = expected_session_id {
        if &session_id != expected {
            return Err(OnionError::SessionMismatch);
        }
    }

    let local = EncryptionKeypair::from_secret_bytes(hop_static_private);
    let shared_secret = local.diffie_hellman(&packet.ephemeral_public);
    let key = derive_key(&shared_secret);

    let cipher = XChaCha20Poly1305::new_from_slice(&key).map_err(|_| OnionError::DecryptionFailed)?;
    let cleartext = cipher
        .decrypt(XNonce::from_slice(&packet.nonce), packet.ciphertext.as_slice())
        .map_err(|_| OnionError::DecryptionFailed)?;

    if cleartext.len() < NEXT_HOP_LEN {
        return Err(OnionError::DecryptionFailed);
    }
    let mut next_hop = [0u8; 32];
    next_hop.copy_from_slice(&cleartext[..NEXT_HOP_LEN]);
    let payload = cleartext[NEXT_HOP_LEN..].to_vec();

    Ok(UnwrappedLayer {
        next_hop,
        payload,
        session_id,
    })
}

/// All-zero next-hop marks local delivery, per the wire contract.
pub fn is_local_delivery(next_hop: &NodeId) -> bool {
    next_hop.iter().all(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_id(tag: u8) -> [u8; 16] {
        [tag; 16]
    }

    #[test]
    fn wrap_then_unwrap_recovers_payload_and_next_hop() {
        let hop = EncryptionKeypair::generate();
        let next_hop: NodeId = [0xAA; 32];
        let payload = b"PING".to_vec();
        let sid = session_id(1);

        let packet = wrap_layer(&payload, &next_hop, &hop.public_key_bytes(), sid, None).unwrap();
        let unwrapped = unwrap_layer(&packet, &hop.secret_key_bytes(), Some(&sid)).unwrap();

        assert_eq!(unwrapped.next_hop, next_hop);
        assert_eq!(unwrapped.payload, payload);
        assert_eq!(unwrapped.session_id, sid);
    }

    #[test]
    fn three_hop_chain_peels_in_order() {
        let hop1 = EncryptionKeypair::generate();
        let hop2 = EncryptionKeypair::generate();
        let hop3 = EncryptionKeypair::generate();
        let target: NodeId = [0xAA; 32];
        let sid = session_id(7);

        // Innermost first: wrap for hop3 addressed to the target.
        let for_hop3 = wrap_layer(b"PING", &target, &hop3.public_key_bytes(), sid, None).unwrap();
        let for_hop3_bytes = for_hop3.to_bytes();

        let id3: NodeId = [3u8; 32];
        let for_hop2 = wrap_layer(&for_hop3_bytes, &id3, &hop2.public_key_bytes(), sid, None).unwrap();
        let for_hop2_bytes = for_hop2.to_bytes();

        let id2: NodeId = [2u8; 32];
        let for_hop1 = wrap_layer(&for_hop2_bytes, &id2, &hop1.public_key_bytes(), sid, None).unwrap();

        let unwrap1 = unwrap_layer(&for_hop1, &hop1.secret_key_bytes(), Some(&sid)).unwrap();
        assert_eq!(unwrap1.next_hop, id2);
        let repacked1 = RelayPacket::from_bytes(&unwrap1.payload).unwrap();

        let unwrap2 = unwrap_layer(&repacked1, &hop2.secret_key_bytes(), Some(&sid)).unwrap();
        assert_eq!(unwrap2.next_hop, id3);
        let repacked2 = RelayPacket::from_bytes(&unwrap2.payload).unwrap();

        let unwrap3 = unwrap_layer(&repacked2, &hop3.secret_key_bytes(), Some(&sid)).unwrap();
        assert_eq!(unwrap3.next_hop, target);
        assert_eq!(unwrap3.payload, b"PING");
    }

    #[test]
    fn wrong_static_key_fails_to_unwrap() {
        let hop = EncryptionKeypair::generate();
        let wrong = EncryptionKeypair::generate();
        let next_hop: NodeId = [0x01; 32];
        let sid = session_id(2);

        let packet = wrap_layer(b"x", &next_hop, &hop.public_key_bytes(), sid, None).unwrap();
        let result = unwrap_layer(&packet, &wrong.secret_key_bytes(), None);
        assert!(matches!(result, Err(OnionError::DecryptionFailed)));
    }

    #[test]
    fn altered_session_prefix_is_rejected_before_decryption() {
        let hop = EncryptionKeypair::generate();
        let next_hop: NodeId = [0x01; 32];
        let sid = session_id(3);

        let mut packet = wrap_layer(b"x", &next_hop, &hop.public_key_bytes(), sid, None).unwrap();
        packet.nonce[0] ^= 0xFF;

        let result = unwrap_layer(&packet, &hop.secret_key_bytes(), Some(&sid));
        assert!(matches!(result, Err(OnionError::SessionMismatch)));
    }

    #[test]
    fn local_delivery_marker_is_all_zero() {
        assert!(is_local_delivery(&[0u8; 32]));
        let mut not_zero = [0u8; 32];
        not_zero[31] = 1;
        assert!(!is_local_delivery(&not_zero));
    }

    #[test]
    fn packet_byte_round_trip() {
        let hop = EncryptionKeypair::generate();
        let next_hop: NodeId = [0x09; 32];
        let sid = session_id(4);
        let packet = wrap_layer(b"payload", &next_hop, &hop.public_key_bytes(), sid, None).unwrap();

        let bytes = packet.to_bytes();
        let reparsed = RelayPacket::from_bytes(&bytes).unwrap();
        assert_eq!(reparsed, packet);
    }

    #[test]
    fn truncated_packet_bytes_are_rejected() {
        assert!(matches!(
            RelayPacket::from_bytes(&[0u8; 10]),
            Err(OnionError::PacketTooShort)
        ));
    }
}
