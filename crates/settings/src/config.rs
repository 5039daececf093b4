//! Configuration types.

use std::path::PathBuf;

use capsule_keystore::default_data_dir;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{default_config_path, Result, SettingsError};

/// Top-level node configuration, loaded from and saved to a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub node: NodeSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    /// `"trace" | "debug" | "info" | "warn" | "error"`, passed straight
    /// through to `tracing_subscriber::EnvFilter` when no `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkSettings::default(),
            node: NodeSettings::default(),
            storage: StorageSettings::default(),
            log_level: default_log_level(),
            config_path: None,
        }
    }
}

impl Config {
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_config_path())
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut config: Config =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            config.config_path = Some(path.clone());
            info!(path = %path.display(), "loaded config");
            Ok(config)
        } else {
            let mut config = Self::default();
            config.config_path = Some(path.clone());
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_config_path);
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }
        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!(path = %path.display(), "saved config");
        Ok(())
    }

    /// `identity_key_path`, resolved against `storage.data_dir` when relative.
    pub fn identity_key_path(&self) -> PathBuf {
        self.storage
            .identity_key_path
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("identity.key"))
    }

    /// `control_socket_path`, resolved against `storage.data_dir` when relative.
    pub fn control_socket_path(&self) -> PathBuf {
        self.storage
            .control_socket_path
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("capsule.sock"))
    }
}

/// Listen port, bootstrap peers, and relay/gateway posture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_port")]
    pub port: u16,

    /// `host:port` strings of federation bootstrap peers.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

fn default_port() -> u16 {
    capsule_core::DEFAULT_PORT
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            bootstrap_peers: Vec::new(),
        }
    }
}

/// Whether and how this node participates as gateway/relay infrastructure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default)]
    pub gateway_enabled: bool,

    #[serde(default = "default_true")]
    pub relay_enabled: bool,

    /// Minimum trust score (0.0-1.0) a peer needs before this node will
    /// select it as a relay hop when building outbound circuits.
    #[serde(default = "default_relay_trust_threshold")]
    pub relay_trust_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_relay_trust_threshold() -> f64 {
    0.3
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            gateway_enabled: false,
            relay_enabled: true,
            relay_trust_threshold: default_relay_trust_threshold(),
        }
    }
}

/// Where persisted state lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub identity_key_path: Option<PathBuf>,

    #[serde(default)]
    pub control_socket_path: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            identity_key_path: None,
            control_socket_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_default_port_and_relay_enabled() {
        let config = Config::default();
        assert_eq!(config.network.port, capsule_core::DEFAULT_PORT);
        assert!(config.node.relay_enabled);
        assert!(!config.node.gateway_enabled);
        assert!(config.network.bootstrap_peers.is_empty());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.network.port, config.network.port);
        assert_eq!(parsed.log_level, config.log_level);
    }

    #[test]
    fn explicit_paths_override_data_dir_derivation() {
        let mut config = Config::default();
        config.storage.identity_key_path = Some(PathBuf::from("/tmp/custom.key"));
        assert_eq!(config.identity_key_path(), PathBuf::from("/tmp/custom.key"));
        assert_eq!(
            config.control_socket_path(),
            config.storage.data_dir.join("capsule.sock")
        );
    }
}
