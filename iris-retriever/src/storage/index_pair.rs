//! The joined vector index and record store.

use super::{IndexPaths, IndexVersion, QueryResult, Record, RecordStore, VectorIndex, commit};
use crate::error::{IndexError, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// One vector together with the record it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub record: Record,
}

impl IndexEntry {
    pub fn new(vector: Vec<f32>, record: Record) -> Self {
        Self { vector, record }
    }
}

/// A vector index and its record store, kept position-aligned.
///
/// The only way to grow a pair is [`IndexPair::push`], which adds a vector and
/// its record together, so `vectors.len() == records.len()` holds at every
/// point a caller can observe.
#[derive(Debug, Clone)]
pub struct IndexPair {
    vectors: VectorIndex,
    records: RecordStore,
}

impl IndexPair {
    /// Empty pair for vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: VectorIndex::create(dimension),
            records: RecordStore::new(),
        }
    }

    /// Build and seal a pair from entries. Fails with [`IndexError::EmptyIndex`]
    /// when there are none.
    pub fn from_entries(dimension: usize, entries: impl IntoIterator<Item = IndexEntry>) -> Result<Self> {
        let mut pair = Self::new(dimension);
        for entry in entries {
            pair.push(entry)?;
        }
        if pair.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        pair.seal();
        Ok(pair)
    }

    /// Add one entry; on a dimension mismatch neither side changes.
    pub fn push(&mut self, entry: IndexEntry) -> Result<usize> {
        let position = self.vectors.push(&entry.vector)?;
        let record_position = self.records.append(entry.record);
        debug_assert_eq!(position, record_position);
        Ok(position)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    pub fn version(&self) -> IndexVersion {
        self.vectors.version()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.records.built_at()
    }

    /// The vector and record stored at `position`.
    pub fn entry(&self, position: usize) -> Result<IndexEntry> {
        let record = self.records.get(position)?;
        let vector = self
            .vectors
            .vector(position)
            .ok_or(IndexError::OutOfRange {
                position,
                size: self.vectors.len(),
            })?;
        Ok(IndexEntry::new(vector.to_vec(), record.clone()))
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Stamp both halves with the digest of the current contents.
    pub fn seal(&mut self) -> IndexVersion {
        let version = IndexVersion::compute(
            self.vectors.dimension(),
            self.vectors.data(),
            self.records.records(),
        );
        self.vectors.set_version(version);
        self.records.set_version(version);
        version
    }

    /// Seal and persist both files.
    ///
    /// Both files are fully written to temporary siblings before either is
    /// renamed into place, so a failure while writing leaves the previously
    /// persisted pair untouched.
    pub fn save(&mut self, paths: &IndexPaths) -> Result<()> {
        let version = self.seal();
        let staged_index = self.vectors.stage(&paths.index_path)?;
        let staged_records = self.records.stage(&paths.metadata_path)?;

        commit(staged_index, &paths.index_path)?;
        commit(staged_records, &paths.metadata_path)?;

        info!(
            "Saved index with {} entries (version {}) to {} and {}",
            self.len(),
            &version.to_hex()[..12],
            paths.index_path.display(),
            paths.metadata_path.display()
        );
        Ok(())
    }

    /// Load a persisted pair, refusing halves that do not belong together.
    pub fn load(paths: &IndexPaths) -> Result<Self> {
        let vectors = VectorIndex::load(&paths.index_path)?;
        let records = RecordStore::load(&paths.metadata_path)?;

        if vectors.len() != records.len() {
            return Err(IndexError::unavailable(
                &paths.metadata_path,
                format!(
                    "index holds {} vectors but metadata holds {} records",
                    vectors.len(),
                    records.len()
                ),
            ));
        }
        if vectors.version() != records.version() {
            return Err(IndexError::unavailable(
                &paths.metadata_path,
                format!(
                    "index version {} does not match metadata version {}",
                    vectors.version(),
                    records.version()
                ),
            ));
        }

        debug!(
            "Loaded index pair: {} entries, dimension {}",
            vectors.len(),
            vectors.dimension()
        );
        Ok(Self { vectors, records })
    }

    /// Top `k` records nearest to `query`, ascending by distance.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<QueryResult>> {
        let hits = self.vectors.search(query, k)?;
        Ok(self.join_hits(&hits))
    }

    /// Resolve positions to records. Positions without a record are logged and
    /// dropped.
    fn join_hits(&self, hits: &[(usize, f32)]) -> Vec<QueryResult> {
        hits.iter()
            .filter_map(|&(position, distance)| match self.records.get(position) {
                Ok(record) => Some(QueryResult {
                    description: record.description.clone(),
                    asset_path: record.asset_path.clone(),
                    distance,
                }),
                Err(e) => {
                    warn!("Skipping search hit: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    fn entry(vector: [f32; 2], id: &str, caption: &str) -> IndexEntry {
        IndexEntry::new(
            vector.to_vec(),
            Record {
                asset_path: format!("/images/{id}"),
                asset_id: id.to_string(),
                description: caption.to_string(),
            },
        )
    }

    fn sample_pair() -> IndexPair {
        IndexPair::from_entries(
            2,
            [
                entry([1.0, 0.0], "a.jpg", "A"),
                entry([0.0, 1.0], "b.jpg", "B"),
                entry([0.9, 0.1], "c.jpg", "C"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_search_joins_records() {
        let pair = sample_pair();
        let results = pair.search(&[1.0, 0.0], 2).unwrap();

        let captions: Vec<&str> = results.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(captions, vec!["A", "C"]);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[0].asset_path, "/images/a.jpg");
        assert!((results[1].distance - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_push_keeps_sides_aligned_on_error() {
        let mut pair = sample_pair();
        let err = pair
            .push(IndexEntry::new(
                vec![1.0, 2.0, 3.0],
                Record {
                    asset_path: "x".into(),
                    asset_id: "x".into(),
                    description: "x".into(),
                },
            ))
            .unwrap_err();

        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
        assert_eq!(pair.vectors().len(), 3);
        assert_eq!(pair.records().len(), 3);
    }

    #[test]
    fn test_entry_by_position() {
        let pair = sample_pair();
        let entry = pair.entry(1).unwrap();
        assert_eq!(entry.vector, vec![0.0, 1.0]);
        assert_eq!(entry.record.asset_id, "b.jpg");
        assert!(matches!(pair.entry(3), Err(IndexError::OutOfRange { .. })));
    }

    #[test]
    fn test_from_entries_rejects_empty() {
        assert!(matches!(
            IndexPair::from_entries(2, Vec::new()),
            Err(IndexError::EmptyIndex)
        ));
    }

    #[test]
    fn test_save_load_round_trip() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let paths = IndexPaths::in_dir(temp_dir.path());

        let mut pair = sample_pair();
        pair.save(&paths)?;

        let loaded = IndexPair::load(&paths)?;
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.version(), pair.version());
        assert!(loaded.version().is_sealed());
        assert_eq!(
            loaded.search(&[0.0, 1.0], 3)?,
            pair.search(&[0.0, 1.0], 3)?
        );
        Ok(())
    }

    #[test]
    fn test_load_rejects_mismatched_halves() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let paths = IndexPaths::in_dir(temp_dir.path());
        let other = IndexPaths::in_dir(temp_dir.path().join("other"));

        sample_pair().save(&paths)?;

        // Same length, different content: only the version tells them apart.
        let mut different = IndexPair::from_entries(
            2,
            [
                entry([0.5, 0.5], "x.jpg", "X"),
                entry([0.2, 0.8], "y.jpg", "Y"),
                entry([0.7, 0.3], "z.jpg", "Z"),
            ],
        )?;
        different.save(&other)?;
        std::fs::copy(&other.metadata_path, &paths.metadata_path)?;

        assert!(matches!(
            IndexPair::load(&paths),
            Err(IndexError::IndexUnavailable { .. })
        ));

        // Different length.
        let mut shorter = IndexPair::from_entries(2, [entry([0.5, 0.5], "x.jpg", "X")])?;
        shorter.save(&other)?;
        std::fs::copy(&other.metadata_path, &paths.metadata_path)?;

        let err = IndexPair::load(&paths).unwrap_err();
        assert!(err.to_string().contains("3 vectors but metadata holds 1"));
        Ok(())
    }

    #[test]
    fn test_load_missing_files() {
        let temp_dir = tempdir().unwrap();
        let paths = IndexPaths::in_dir(temp_dir.path());
        assert!(matches!(
            IndexPair::load(&paths),
            Err(IndexError::IndexUnavailable { .. })
        ));
    }

    #[test]
    #[traced_test]
    fn test_join_hits_skips_out_of_range() {
        let pair = sample_pair();
        let results = pair.join_hits(&[(2, 0.1), (7, 0.2), (0, 0.3)]);

        let captions: Vec<&str> = results.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(captions, vec!["C", "A"]);
        assert!(logs_contain("Skipping search hit"));
    }
}
