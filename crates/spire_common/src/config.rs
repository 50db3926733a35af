use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Process configuration, loaded from `spire.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Directory holding `<db>/<table>.json` rule files and `version.json`.
    pub meta_dir: String,
    /// Per-transaction ceiling on rows a cross-shard join may produce.
    #[serde(default = "default_max_join_rows")]
    pub max_join_rows: usize,
    #[serde(default)]
    pub router: RouterConfig,
}

fn default_max_join_rows() -> usize {
    32768
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            meta_dir: "./spire-meta".to_string(),
            max_join_rows: default_max_join_rows(),
            router: RouterConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Render as TOML (for `--print-default-config`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Load from `path`; a missing or malformed file falls back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config {}: {}, using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
        }
    }
}

/// Hash slot space layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Total number of hash slots; every hash table must cover `[0, slots)`.
    pub slots: usize,
    /// Slots per partition when a hash table is laid out uniformly.
    pub blocks: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            slots: 4096,
            blocks: 128,
        }
    }
}

/// Partitioning scheme of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardType {
    Hash,
    List,
    Global,
    Single,
}

impl ShardType {
    /// Parse the `shardtype` string stored in a rule file (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HASH" => Some(ShardType::Hash),
            "LIST" => Some(ShardType::List),
            "GLOBAL" => Some(ShardType::Global),
            "SINGLE" => Some(ShardType::Single),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShardType::Hash => "HASH",
            ShardType::List => "LIST",
            ShardType::Global => "GLOBAL",
            ShardType::Single => "SINGLE",
        }
    }
}

impl fmt::Display for ShardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical partition of a table as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub table: String,
    /// Hash interval `"start-end"`; empty for other schemes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub segment: String,
    /// List discriminator; empty for other schemes.
    #[serde(default, rename = "listvalue", skip_serializing_if = "String::is_empty")]
    pub list_value: String,
    pub backend: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutoIncrement {
    pub column: String,
}

/// The rule file `<metadir>/<db>/<table>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(rename = "shardtype")]
    pub shard_type: String,
    #[serde(rename = "shardkey", default)]
    pub shard_key: String,
    pub partitions: Vec<PartitionConfig>,
    #[serde(rename = "autoincrement", default, skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<AutoIncrement>,
}

impl TableConfig {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
