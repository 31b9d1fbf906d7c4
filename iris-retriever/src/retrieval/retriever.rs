//! Serving-time query facade over a loaded index pair.
//!
//! The retriever owns a single serving slot. A loaded pair is never mutated;
//! [`Retriever::reload`] and [`Retriever::install`] replace the whole slot
//! under a brief write lock, and queries take a cheap `Arc` clone under a read
//! lock before searching without holding it.
//!
//! When no pair is loaded the retriever is *degraded*: every query returns an
//! empty result. Callers distinguish this from a genuinely empty answer with
//! [`Retriever::is_ready`].

use crate::error::{IndexError, Result};
use crate::status::IndexStatus;
use crate::storage::{IndexPair, IndexPaths, QueryResult};
use chrono::{DateTime, Utc};
use iris_embed::EmbeddingProvider;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Default number of results per query
pub const DEFAULT_K: usize = 5;

/// An immutable loaded index pair.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub pair: IndexPair,
    pub loaded_at: DateTime<Utc>,
}

impl IndexSnapshot {
    fn new(pair: IndexPair) -> Self {
        Self {
            pair,
            loaded_at: Utc::now(),
        }
    }
}

type Slot = Option<Arc<IndexSnapshot>>;

/// Text and image retrieval over a shared embedding space.
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    paths: IndexPaths,
    slot: RwLock<Slot>,
}

impl Retriever {
    /// A retriever with nothing loaded yet.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, paths: IndexPaths) -> Self {
        Self {
            provider,
            paths,
            slot: RwLock::new(None),
        }
    }

    /// Create a retriever and load the pair at `paths`.
    ///
    /// A missing or corrupt pair does not fail construction; the retriever
    /// starts degraded and logs why.
    pub fn initialize(provider: Arc<dyn EmbeddingProvider>, paths: IndexPaths) -> Self {
        let retriever = Self::new(provider, paths);
        if let Err(e) = retriever.reload() {
            warn!("Retriever starting without an index: {}", e);
        }
        retriever
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The currently served pair, if any.
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.read_slot().clone()
    }

    /// Whether an index is loaded and queries are answered from it.
    pub fn is_ready(&self) -> bool {
        self.read_slot().is_some()
    }

    /// Load the pair from the configured paths and swap it in.
    ///
    /// On failure the currently served pair, if any, stays in place.
    ///
    /// # Returns
    /// The number of entries now being served.
    pub fn reload(&self) -> Result<usize> {
        let pair = IndexPair::load(&self.paths)?;
        let entries = pair.len();
        info!(
            "Loaded index with {} entries (dimension {}) from {}",
            entries,
            pair.dimension(),
            self.paths.index_path.display()
        );
        if pair.dimension() != self.provider.embedding_dimension() {
            warn!(
                "Index dimension {} differs from {} dimension {}; queries will fail",
                pair.dimension(),
                self.provider.provider_name(),
                self.provider.embedding_dimension()
            );
        }
        self.install(pair);
        Ok(entries)
    }

    /// Serve an in-memory pair, replacing the current one.
    pub fn install(&self, pair: IndexPair) {
        let snapshot = Arc::new(IndexSnapshot::new(pair));
        *self.write_slot() = Some(snapshot);
    }

    /// Describe what is currently being served.
    pub fn status(&self) -> IndexStatus {
        match self.snapshot() {
            Some(snapshot) => IndexStatus::ready(&self.paths, &snapshot),
            None => IndexStatus::degraded(&self.paths),
        }
    }

    /// The `k` records whose captions are nearest to `query`.
    ///
    /// # Errors
    /// - [`IndexError::Encoding`] if the provider rejects the text (for
    ///   example an empty query)
    /// - [`IndexError::DimensionMismatch`] if the provider and index disagree
    pub async fn retrieve_by_text(&self, query: &str, k: usize) -> Result<Vec<QueryResult>> {
        let Some(snapshot) = self.snapshot() else {
            debug!("Text query while degraded; returning no results");
            return Ok(Vec::new());
        };

        let vector = self.provider.embed_text(query).await?;
        snapshot.pair.search(&vector, k)
    }

    /// The `k` records whose captions are nearest to the image at `path`.
    ///
    /// An image that cannot be read or decoded yields an empty result rather
    /// than an error.
    pub async fn retrieve_by_image(&self, path: &Path, k: usize) -> Result<Vec<QueryResult>> {
        let Some(snapshot) = self.snapshot() else {
            debug!("Image query while degraded; returning no results");
            return Ok(Vec::new());
        };

        let vector = match self.provider.embed_image(path).await {
            Ok(vector) => vector,
            Err(e) if e.is_input_error() => {
                warn!("Cannot use query image {}: {}", path.display(), e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(IndexError::Encoding(e)),
        };
        snapshot.pair.search(&vector, k)
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("provider", &self.provider.provider_name())
            .field("paths", &self.paths)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{IndexEntry, Record};
    use async_trait::async_trait;
    use iris_embed::EmbedError;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    /// Maps a handful of known strings and image names to fixed vectors.
    struct TableProvider;

    fn lookup(key: &str) -> Option<Vec<f32>> {
        match key {
            "east" | "east.jpg" => Some(vec![1.0, 0.0]),
            "north" | "north.jpg" => Some(vec![0.0, 1.0]),
            "wide" => Some(vec![1.0, 0.0, 0.0]),
            _ => None,
        }
    }

    #[async_trait]
    impl EmbeddingProvider for TableProvider {
        async fn embed_text(&self, text: &str) -> iris_embed::Result<Vec<f32>> {
            if text.trim().is_empty() {
                return Err(EmbedError::encoding("text is empty"));
            }
            Ok(lookup(text).unwrap_or_else(|| vec![0.5, 0.5]))
        }

        async fn embed_image(&self, path: &Path) -> iris_embed::Result<Vec<f32>> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name == "model-crash.jpg" {
                return Err(EmbedError::embedding_gen("model crashed"));
            }
            lookup(name).ok_or_else(|| EmbedError::encoding("cannot decode image"))
        }

        fn embedding_dimension(&self) -> usize {
            2
        }

        fn provider_name(&self) -> &str {
            "table"
        }
    }

    fn entry(vector: [f32; 2], caption: &str) -> IndexEntry {
        IndexEntry::new(
            vector.to_vec(),
            Record {
                asset_path: format!("/images/{caption}.jpg"),
                asset_id: format!("{caption}.jpg"),
                description: caption.to_string(),
            },
        )
    }

    fn sample_pair() -> IndexPair {
        IndexPair::from_entries(
            2,
            [
                entry([1.0, 0.0], "first"),
                entry([0.0, 1.0], "second"),
                entry([0.9, 0.1], "third"),
            ],
        )
        .unwrap()
    }

    fn ready_retriever() -> Retriever {
        let retriever = Retriever::new(Arc::new(TableProvider), IndexPaths::default());
        retriever.install(sample_pair());
        retriever
    }

    fn captions(results: &[QueryResult]) -> Vec<&str> {
        results.iter().map(|r| r.description.as_str()).collect()
    }

    #[tokio::test]
    async fn test_text_query_ranks_by_distance() {
        let retriever = ready_retriever();
        let results = retriever.retrieve_by_text("east", 2).await.unwrap();

        assert_eq!(captions(&results), vec!["first", "third"]);
        assert!(results[0].distance < results[1].distance);
    }

    #[tokio::test]
    async fn test_empty_text_is_an_encoding_error() {
        let retriever = ready_retriever();
        assert!(matches!(
            retriever.retrieve_by_text("", DEFAULT_K).await,
            Err(IndexError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn test_image_query() {
        let retriever = ready_retriever();
        let results = retriever
            .retrieve_by_image(Path::new("/queries/north.jpg"), 1)
            .await
            .unwrap();
        assert_eq!(captions(&results), vec!["second"]);
        assert_eq!(results[0].distance, 0.0);
    }

    #[tokio::test]
    async fn test_unreadable_image_returns_empty() {
        let retriever = ready_retriever();
        let results = retriever
            .retrieve_by_image(Path::new("/queries/garbage.bin"), 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_on_image_propagates() {
        let retriever = ready_retriever();
        assert!(
            retriever
                .retrieve_by_image(Path::new("model-crash.jpg"), 5)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let retriever = ready_retriever();
        assert!(matches!(
            retriever.retrieve_by_text("wide", 5).await,
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_degraded_retriever_returns_empty() {
        let temp_dir = tempdir().unwrap();
        let retriever =
            Retriever::initialize(Arc::new(TableProvider), IndexPaths::in_dir(temp_dir.path()));

        assert!(!retriever.is_ready());
        assert!(retriever.retrieve_by_text("east", 5).await.unwrap().is_empty());
        assert!(
            retriever
                .retrieve_by_image(Path::new("east.jpg"), 5)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(!retriever.status().ready);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_degraded_start_is_logged() {
        let temp_dir = tempdir().unwrap();
        let _retriever =
            Retriever::initialize(Arc::new(TableProvider), IndexPaths::in_dir(temp_dir.path()));
        assert!(logs_contain("Retriever starting without an index"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queries_during_swaps_see_whole_pairs() {
        let temp_dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(temp_dir.path());
        let mut other = IndexPair::from_entries(
            2,
            [
                entry([0.0, 1.0], "other-north"),
                entry([1.0, 0.0], "other-east"),
                entry([0.5, 0.5], "other-mid"),
            ],
        )
        .unwrap();
        other.save(&paths).unwrap();

        let retriever = Arc::new(Retriever::new(Arc::new(TableProvider), paths));
        retriever.install(sample_pair());

        let swapper = {
            let retriever = Arc::clone(&retriever);
            tokio::task::spawn_blocking(move || {
                for _ in 0..200 {
                    retriever.reload().unwrap();
                    retriever.install(sample_pair());
                }
            })
        };

        let mut readers = Vec::new();
        for reader in 0..8 {
            let retriever = Arc::clone(&retriever);
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let results = if reader % 2 == 0 {
                        retriever.retrieve_by_text("east", 3).await.unwrap()
                    } else {
                        retriever
                            .retrieve_by_image(Path::new("east.jpg"), 3)
                            .await
                            .unwrap()
                    };
                    let seen = captions(&results);
                    assert!(
                        seen == ["first", "third", "second"]
                            || seen == ["other-east", "other-mid", "other-north"],
                        "results mixed two pairs: {seen:?}"
                    );
                    tokio::task::yield_now().await;
                }
            }));
        }

        for reader in readers {
            reader.await.unwrap();
        }
        swapper.await.unwrap();
        assert!(retriever.is_ready());
    }

    #[tokio::test]
    async fn test_reload_swaps_and_keeps_old_on_failure() {
        let temp_dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(temp_dir.path());
        let retriever = Retriever::new(Arc::new(TableProvider), paths.clone());

        let mut pair = sample_pair();
        pair.save(&paths).unwrap();
        assert_eq!(retriever.reload().unwrap(), 3);
        assert!(retriever.is_ready());

        let held = retriever.snapshot().unwrap();

        std::fs::write(&paths.index_path, b"corrupt").unwrap();
        assert!(matches!(
            retriever.reload(),
            Err(IndexError::IndexUnavailable { .. })
        ));
        assert!(retriever.is_ready());
        assert_eq!(retriever.snapshot().unwrap().pair.len(), 3);

        let mut bigger = IndexPair::new(2);
        for (i, vector) in [[1.0, 0.0], [0.0, 1.0], [0.5, 0.5], [0.2, 0.2]].iter().enumerate() {
            bigger.push(entry(*vector, &format!("entry{i}"))).unwrap();
        }
        bigger.save(&paths).unwrap();
        assert_eq!(retriever.reload().unwrap(), 4);
        assert_eq!(retriever.status().entries, 4);

        // A snapshot taken before the swap stays usable.
        assert_eq!(held.pair.len(), 3);
    }
}
