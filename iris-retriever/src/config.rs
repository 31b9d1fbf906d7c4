//! File-based configuration shared by the CLI and the HTTP service.
//!
//! ```toml
//! [index]
//! index_path = "iris_index.bin"
//! metadata_path = "iris_metadata.json"
//!
//! [builder]
//! annotations_path = "data/flickr30k/results.csv"
//! asset_root = "data/flickr30k_images"
//! max_unique_assets = 4000
//!
//! [retrieval]
//! default_k = 5
//!
//! [embedding]
//! model = "clip-vit-b32"
//! cache_dir = ".iris/models"
//! ```
//!
//! Every table and field is optional.

use crate::retrieval::{BuilderConfig, DEFAULT_K};
use crate::storage::IndexPaths;
use anyhow::{Context, Result};
use iris_embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Name of the configuration file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "iris.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Results returned when a query does not ask for a count
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IrisConfig {
    pub index: IndexPaths,
    pub builder: BuilderConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbedConfig,
}

impl IrisConfig {
    /// Parse a configuration file. The file must exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `explicit` if given, else `iris.toml` in the working directory if
    /// it exists, else the defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            debug!("Using configuration from {}", fallback.display());
            return Self::load(fallback);
        }
        Ok(Self::default())
    }
}
