use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("failed to bind transport socket: {0}")]
    Transport(#[from] capsule_transport::TransportError),
    #[error("failed to bind discovery socket: {0}")]
    Discovery(#[from] capsule_discovery::DiscoveryError),
    #[error("failed to bind control socket: {0}")]
    Control(#[from] capsule_control::ControlError),
    #[error("identity error: {0}")]
    Keystore(#[from] capsule_keystore::KeystoreError),
    #[error("configuration error: {0}")]
    Settings(#[from] capsule_settings::SettingsError),
    #[error("storage error: {0}")]
    Storage(#[from] capsule_core::CapsuleError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
