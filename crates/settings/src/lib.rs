//! Capsule node configuration.
//!
//! Covers everything the daemon and CLI need to agree on before the node
//! starts: where state lives on disk, which port to bind, which peers to
//! bootstrap from, and the relay/gateway posture of this node.
//!
//! ```no_run
//! use capsule_settings::Config;
//!
//! let config = Config::load_or_default()?;
//! config.save()?;
//! # Ok::<(), capsule_settings::SettingsError>(())
//! ```

mod config;

pub use config::{Config, NetworkSettings, NodeSettings, StorageSettings};

use std::path::PathBuf;

use capsule_keystore::default_data_dir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read config: {0}")]
    ReadError(std::io::Error),

    #[error("failed to write config: {0}")]
    WriteError(std::io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(serde_json::Error),

    #[error("failed to create config directory: {0}")]
    CreateDirError(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Default path for the node's config file, alongside its data directory.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.json")
}
