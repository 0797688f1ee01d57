//! # vprj-config
//!
//! Configuration management for the vprj projected filesystem.
//!
//! Loads configuration from:
//! 1. `~/.vprj/config.toml` (global)
//! 2. `.vprj/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;

use once_cell::sync::Lazy;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Smallest chunk the provider handles efficiently (512 KiB).
pub const DEFAULT_MIN_CHUNK_SIZE: u32 = 512 * 1024;
/// Largest single write the provider accepts (5 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: u32 = 5 * 1024 * 1024;

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> RwLockReadGuard<'static, Config> {
    CONFIG.read()
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write() = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mount: MountConfig,
    pub transfer: TransferConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let project = Path::new(".vprj/config.toml");

        // Global first, then the project file on top of it.
        let mut layers = Vec::new();
        if let Some(global_path) = global.as_deref() {
            layers.push(global_path);
        }
        layers.push(project);

        let mut config = Self::load_layered(&layers)?;
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Parse a single config file without layering.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Stack config files, later ones winning key by key. Missing files are skipped.
    pub fn load_layered(paths: &[&Path]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in paths {
            if !path.exists() {
                continue;
            }
            debug!("Loading config layer from {:?}", path);
            let layer: toml::Table = toml::from_str(&std::fs::read_to_string(path)?)?;
            merge_table(&mut merged, layer);
        }
        Ok(toml::Value::Table(merged).try_into()?)
    }

    /// Global config path: ~/.vprj/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".vprj/config.toml"))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("VPRJ_CAS_ROOT") {
            self.storage.cas_root = PathBuf::from(path);
        }
        if let Ok(socket) = std::env::var("VPRJ_SOCKET") {
            self.mount.socket = PathBuf::from(socket);
        }
        if let Ok(level) = std::env::var("VPRJ_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Reject chunk limits the transfer policy cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.transfer;
        if t.min_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "transfer.min_chunk_size must be greater than zero".to_string(),
            ));
        }
        if t.max_chunk_size < t.min_chunk_size {
            return Err(ConfigError::Invalid(format!(
                "transfer.max_chunk_size ({}) is smaller than min_chunk_size ({})",
                t.max_chunk_size, t.min_chunk_size
            )));
        }
        self.logging.level.parse::<logging::LogLevel>()?;
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml()
    }

    /// Render this config as TOML.
    pub fn to_toml(&self) -> String {
        // Every field is a plain string, path or integer, so serialization cannot fail.
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Mount identity: the three strings the `.vprj/config` virtual file is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Repository root the projection is mounted at
    pub root: PathBuf,
    /// Endpoint of the backing service
    pub socket: PathBuf,
    /// Per-checkout client state directory
    pub client_dir: PathBuf,
}

impl Default for MountConfig {
    fn default() -> Self {
        let home = vprj_home();
        Self {
            root: PathBuf::from("."),
            socket: home.join("socket"),
            client_dir: home.join("clients").join("default"),
        }
    }
}

/// Chunking limits for file data delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Files at or below this size are always delivered whole
    pub min_chunk_size: u32,
    /// Upper bound for a single provider write
    pub max_chunk_size: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// CAS root directory
    pub cas_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cas_root: vprj_home().join("cas"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Overlay `layer` onto `base`; nested tables merge, anything else replaces.
fn merge_table(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_table(existing, incoming)
            }
            (Some(slot), value) => *slot = value,
            (None, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn vprj_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".vprj")
}
