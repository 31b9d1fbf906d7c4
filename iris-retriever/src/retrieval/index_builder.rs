//! Offline construction of a persisted index pair from caption annotations.
//!
//! ## Pipeline
//!
//! ```text
//! annotations ─▶ parse rows ─▶ resolve asset ─▶ unique-asset limit ─▶ embed captions ─▶ IndexPair
//!                   │               │                  │                                   │
//!               malformed        missing           over_limit                    save (stage + rename)
//! ```
//!
//! Every row is handled on its own. Rows that cannot be used are counted in
//! [`BuildStats`] and skipped; only an empty result or an embedding failure
//! fails the build.

use crate::error::{IndexError, Result};
use crate::retrieval::annotations::{read_annotations, resolve_asset};
use crate::storage::{IndexEntry, IndexPair, IndexPaths, Record};
use iris_embed::{EmbedError, EmbeddingProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration for [`IndexBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Delimited annotation file
    pub annotations_path: PathBuf,
    /// Directory the annotation filenames are relative to
    pub asset_root: PathBuf,
    /// Field separator in the annotation file
    pub delimiter: char,
    /// Extension tried when a filename does not resolve as written
    pub default_extension: String,
    /// Maximum number of distinct images to index; `None` for no limit
    pub max_unique_assets: Option<usize>,
    /// Captions per embedding call
    pub batch_size: usize,
    /// Log progress every this many captions
    pub progress_interval: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            annotations_path: PathBuf::from("data/results.csv"),
            asset_root: PathBuf::from("data/images"),
            delimiter: '|',
            default_extension: "jpg".to_string(),
            max_unique_assets: Some(1000),
            batch_size: 32,
            progress_interval: 500,
        }
    }
}

impl BuilderConfig {
    /// Create a builder configuration for one annotation source.
    ///
    /// # Arguments
    /// * `annotations_path` - Delimited `filename|index|caption` file
    /// * `asset_root` - Directory containing the referenced images
    ///
    /// # Returns
    /// A configuration with the remaining settings at their defaults:
    /// `|` delimiter, `jpg` fallback extension, at most 1000 unique images,
    /// batches of 32 and progress every 500 captions.
    pub fn new(annotations_path: impl Into<PathBuf>, asset_root: impl Into<PathBuf>) -> Self {
        Self {
            annotations_path: annotations_path.into(),
            asset_root: asset_root.into(),
            ..Self::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_default_extension(mut self, extension: impl Into<String>) -> Self {
        self.default_extension = extension.into();
        self
    }

    /// Limit the number of distinct images. Further captions of images that
    /// are already indexed are still accepted once the limit is reached.
    ///
    /// # Arguments
    /// * `limit` - Maximum distinct images, or `None` to index everything
    pub fn with_max_unique_assets(mut self, limit: Option<usize>) -> Self {
        self.max_unique_assets = limit;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Counters describing one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Non-blank annotation rows seen
    pub rows_read: usize,
    pub malformed_rows: usize,
    /// Rows whose image could not be found
    pub missing_assets: usize,
    /// Rows for new images after the unique-image limit was reached
    pub over_limit: usize,
    pub unique_assets: usize,
    pub records_indexed: usize,
    pub dimension: usize,
}

impl fmt::Display for BuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows read, {} indexed ({} unique images, dimension {}); skipped {} malformed, {} missing, {} over limit",
            self.rows_read,
            self.records_indexed,
            self.unique_assets,
            self.dimension,
            self.malformed_rows,
            self.missing_assets,
            self.over_limit
        )
    }
}

/// Builds an [`IndexPair`] by embedding annotation captions.
pub struct IndexBuilder {
    config: BuilderConfig,
    provider: Arc<dyn EmbeddingProvider>,
}

impl IndexBuilder {
    pub fn new(config: BuilderConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Read the annotation source and choose the rows to index.
    ///
    /// Returns the records in source order; updates every counter in `stats`
    /// except `records_indexed` and `dimension`.
    pub fn select_records(&self, stats: &mut BuildStats) -> Result<Vec<Record>> {
        let config = &self.config;
        info!(
            "Reading annotations from {}",
            config.annotations_path.display()
        );
        let rows = read_annotations(&config.annotations_path, config.delimiter)?;

        let mut retained: HashSet<PathBuf> = HashSet::new();
        let mut records = Vec::new();

        for row in rows {
            stats.rows_read += 1;

            let row = match row {
                Ok(row) => row,
                Err(malformed) => {
                    debug!(
                        "Skipping malformed annotation on line {}: {}",
                        malformed.line, malformed.reason
                    );
                    stats.malformed_rows += 1;
                    continue;
                }
            };

            let Some(asset_path) = resolve_asset(
                &config.asset_root,
                &row.asset_filename,
                &config.default_extension,
            ) else {
                debug!(
                    "Skipping line {}: no image found for {}",
                    row.line, row.asset_filename
                );
                stats.missing_assets += 1;
                continue;
            };

            if !retained.contains(&asset_path) {
                if matches!(config.max_unique_assets, Some(limit) if retained.len() >= limit) {
                    debug!(
                        "Skipping line {}: unique image limit reached before {}",
                        row.line, row.asset_filename
                    );
                    stats.over_limit += 1;
                    continue;
                }
                retained.insert(asset_path.clone());
            }

            records.push(Record {
                asset_path: asset_path.to_string_lossy().into_owned(),
                asset_id: row.asset_filename,
                description: row.caption,
            });
        }

        stats.unique_assets = retained.len();
        info!(
            "Selected {} captions for {} unique images",
            records.len(),
            retained.len()
        );
        Ok(records)
    }

    /// Build an in-memory, sealed index pair.
    ///
    /// # Errors
    /// - [`IndexError::Annotations`] if the annotation file cannot be read
    /// - [`IndexError::EmptyIndex`] if no row survives selection
    /// - [`IndexError::Encoding`] if the provider fails on a caption
    /// - [`IndexError::DimensionMismatch`] if the provider returns vectors of
    ///   differing lengths
    pub async fn build(&self) -> Result<(IndexPair, BuildStats)> {
        let mut stats = BuildStats::default();
        let records = self.select_records(&mut stats)?;
        if records.is_empty() {
            return Err(IndexError::EmptyIndex);
        }

        let total = records.len();
        let batch_size = self.config.batch_size.max(1);
        let interval = self.config.progress_interval;
        let mut pair: Option<IndexPair> = None;
        let mut pending = records.into_iter().peekable();
        let mut done = 0usize;

        while pending.peek().is_some() {
            let batch: Vec<Record> = pending.by_ref().take(batch_size).collect();
            if interval > 0 && (done == 0 || done / interval != (done + batch.len()) / interval) {
                info!("Encoding caption {}/{}", done, total);
            }

            let captions: Vec<String> = batch.iter().map(|r| r.description.clone()).collect();
            let embedded = self.provider.embed_texts(&captions).await?;
            if embedded.len() != batch.len() {
                return Err(EmbedError::embedding_gen(format!(
                    "provider returned {} vectors for {} captions",
                    embedded.len(),
                    batch.len()
                ))
                .into());
            }

            for (vector, record) in embedded.embeddings.into_iter().zip(batch) {
                let pair = pair.get_or_insert_with(|| IndexPair::new(vector.len()));
                pair.push(IndexEntry::new(vector, record))?;
            }
            done += captions.len();
        }

        let mut pair = pair.ok_or(IndexError::EmptyIndex)?;
        pair.seal();

        stats.records_indexed = pair.len();
        stats.dimension = pair.dimension();
        info!("Build complete: {}", stats);
        Ok((pair, stats))
    }

    /// Build the index and atomically replace the pair at `paths`.
    pub async fn build_and_persist(&self, paths: &IndexPaths) -> Result<BuildStats> {
        let (mut pair, stats) = self.build().await?;
        pair.save(paths)?;
        Ok(stats)
    }
}
