//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A text/vision model pair trained into one joint embedding space.
///
/// Only pairs are offered: a text tower and an image tower from different
/// families would produce vectors that cannot be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MultimodalModel {
    /// OpenAI CLIP ViT-B/32 (512 dimensions)
    #[default]
    #[serde(alias = "clip-vit-b-32")]
    ClipVitB32,
    /// Nomic embed text/vision v1.5 (768 dimensions)
    #[serde(alias = "nomic-embed-v1.5")]
    NomicV15,
}

impl MultimodalModel {
    /// Stable name used in logs and status output
    pub fn name(&self) -> &'static str {
        match self {
            MultimodalModel::ClipVitB32 => "clip-vit-b-32",
            MultimodalModel::NomicV15 => "nomic-embed-v1.5",
        }
    }

    /// Dimension both towers of this pair produce
    pub fn dimension(&self) -> usize {
        match self {
            MultimodalModel::ClipVitB32 => 512,
            MultimodalModel::NomicV15 => 768,
        }
    }
}

impl std::fmt::Display for MultimodalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for MultimodalModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clip-vit-b-32" | "clip" | "clip-vit-b32" => Ok(MultimodalModel::ClipVitB32),
            "nomic-embed-v1.5" | "nomic" | "nomic-v15" => Ok(MultimodalModel::NomicV15),
            _ => Err(format!(
                "Invalid model: '{s}'. Valid values are: clip-vit-b-32, nomic-embed-v1.5"
            )),
        }
    }
}

/// Configuration for embedding models
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
#[serde(default)]
pub struct EmbedConfig {
    /// Which text/vision pair to load
    #[builder(default)]
    pub model: MultimodalModel,
    /// Directory where model files are downloaded and cached
    #[builder(default = r#"PathBuf::from(".iris/models")"#)]
    pub cache_dir: PathBuf,
    /// Maximum batch size for embedding generation
    #[builder(default = "32")]
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    #[builder(default = "true")]
    pub normalize: bool,
    /// Show a progress bar while model files download
    #[builder(default = "true")]
    pub show_download_progress: bool,
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Create a configuration for the given model pair (convenience method)
    pub fn new<P: AsRef<Path>>(model: MultimodalModel, cache_dir: P) -> Self {
        EmbedConfigBuilder::default()
            .model(model)
            .cache_dir(cache_dir.as_ref())
            .build()
            .expect("Failed to build EmbedConfig")
    }

    /// Default CLIP configuration with a custom cache directory
    pub fn default_with_cache<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self::new(MultimodalModel::ClipVitB32, cache_dir)
    }

    /// Nomic v1.5 text/vision configuration
    pub fn nomic_v15<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self::new(MultimodalModel::NomicV15, cache_dir)
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Model name for logs
    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Check that the settings are usable and the cache directory exists.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }

        if let Err(e) = std::fs::create_dir_all(&self.cache_dir) {
            tracing::error!(
                "Cannot create model cache {}: {}",
                self.cache_dir.display(),
                e
            );
            return Err(EmbedError::CacheDir {
                path: self.cache_dir.clone(),
            });
        }

        tracing::debug!("Embedding configuration valid for: {}", self.model_name());
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        EmbedConfigBuilder::default()
            .build()
            .expect("Failed to build default EmbedConfig")
    }
}
