//! Loads or generates the node's persisted identity.
//!
//! Only the Ed25519 signing seed is written to disk. The long-term X25519
//! static key used by the onion codec is re-derived from that seed on every
//! load so a single 32-byte file is the whole of what needs backing up.

use std::fs;
use std::path::Path;

use capsule_crypto::{hash, EncryptionKeypair, Identity, SigningKeypair};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity key at {path} is {len} bytes, expected 32")]
    InvalidKeyLength { path: String, len: usize },
}

const ONION_STATIC_CONTEXT: &[u8] = b"capsule-onion-static-v1";

fn derive_encryption_keypair(seed: &[u8; 32]) -> EncryptionKeypair {
    let mut material = Vec::with_capacity(32 + ONION_STATIC_CONTEXT.len());
    material.extend_from_slice(seed);
    material.extend_from_slice(ONION_STATIC_CONTEXT);
    EncryptionKeypair::from_secret_bytes(&hash(&material))
}

/// Loads the identity at `path`, generating and persisting a fresh one if
/// the file does not exist.
pub fn load_or_generate_identity(path: &Path) -> Result<Identity, KeystoreError> {
    if path.exists() {
        let bytes = fs::read(path)?;
        if bytes.len() != 32 {
            return Err(KeystoreError::InvalidKeyLength {
                path: path.display().to_string(),
                len: bytes.len(),
            });
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        debug!(path = %path.display(), "loaded existing identity key");
        let signing = SigningKeypair::from_secret_bytes(&seed);
        let encryption = derive_encryption_keypair(&seed);
        Ok(Identity { signing, encryption })
    } else {
        let signing = SigningKeypair::generate();
        let seed = signing.secret_key_bytes();
        save_key_bytes(path, &seed)?;
        info!(path = %path.display(), "generated new identity key");
        let encryption = derive_encryption_keypair(&seed);
        Ok(Identity { signing, encryption })
    }
}

fn save_key_bytes(path: &Path, bytes: &[u8; 32]) -> Result<(), KeystoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    restrict_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), KeystoreError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), KeystoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_identity_when_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.key");
        let identity = load_or_generate_identity(&path).unwrap();
        assert!(path.exists());
        assert_eq!(fs::read(&path).unwrap().len(), 32);
        assert_eq!(identity.node_id().len(), 32);
    }

    #[test]
    fn reloads_same_identity_from_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.key");
        let first = load_or_generate_identity(&path).unwrap();
        let second = load_or_generate_identity(&path).unwrap();
        assert_eq!(first.node_id(), second.node_id());
        assert_eq!(
            first.encryption.public_key_bytes(),
            second.encryption.public_key_bytes()
        );
    }

    #[test]
    fn rejects_malformed_key_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.key");
        fs::write(&path, b"too-short").unwrap();
        let err = load_or_generate_identity(&path).unwrap_err();
        assert!(matches!(err, KeystoreError::InvalidKeyLength { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn persisted_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.key");
        load_or_generate_identity(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
