use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("invalid public key length")]
    InvalidPublicKey,
    #[error("invalid secret key length")]
    InvalidSecretKey,
}

/// Long-term Ed25519 keypair; the verifying key is the node's identity.
pub struct SigningKeypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
            verifying_key: self.verifying_key,
        }
    }
}

impl SigningKeypair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }
}

/// Long-term X25519 keypair used for per-hop ECDH in the onion codec.
pub struct EncryptionKeypair {
    pub secret: StaticSecret,
    pub public: X25519PublicKey,
}

impl Clone for EncryptionKeypair {
    fn clone(&self) -> Self {
        let secret_bytes = self.secret.as_bytes();
        let secret = StaticSecret::from(*secret_bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }
}

impl EncryptionKeypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        *self.secret.as_bytes()
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*secret);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        *shared.as_bytes()
    }
}

/// A node's full identity: the signing keypair (identity/`NodeId`) plus the
/// long-term encryption keypair used as the onion codec's static key.
pub struct Identity {
    pub signing: SigningKeypair,
    pub encryption: EncryptionKeypair,
}

impl Identity {
    pub fn generate() -> Self {
        Self {
            signing: SigningKeypair::generate(),
            encryption: EncryptionKeypair::generate(),
        }
    }

    /// The signing public key is the authoritative `NodeId`.
    pub fn node_id(&self) -> [u8; 32] {
        self.signing.public_key_bytes()
    }
}

/// SHA-256, used to derive symmetric keys from ECDH output and as the base
/// step of the entropy stamp's memory-hard hash.
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_keypair_round_trips_through_secret_bytes() {
        let kp = SigningKeypair::generate();
        let restored = SigningKeypair::from_secret_bytes(&kp.secret_key_bytes());
        assert_eq!(restored.public_key_bytes(), kp.public_key_bytes());
    }

    #[test]
    fn encryption_keypair_round_trips_through_secret_bytes() {
        let kp = EncryptionKeypair::generate();
        let restored = EncryptionKeypair::from_secret_bytes(&kp.secret_key_bytes());
        assert_eq!(restored.public_key_bytes(), kp.public_key_bytes());
    }

    #[test]
    fn diffie_hellman_is_symmetric() {
        let alice = EncryptionKeypair::generate();
        let bob = EncryptionKeypair::generate();
        assert_eq!(
            alice.diffie_hellman(&bob.public_key_bytes()),
            bob.diffie_hellman(&alice.public_key_bytes())
        );
    }

    #[test]
    fn identity_node_id_is_signing_public_key() {
        let identity = Identity::generate();
        assert_eq!(identity.node_id(), identity.signing.public_key_bytes());
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash(b"capsule"), hash(b"capsule"));
        assert_ne!(hash(b"capsule"), hash(b"Capsule"));
    }
}
