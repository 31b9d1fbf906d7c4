//! Position-addressed metadata records persisted as JSON.

use super::{IndexVersion, Record, commit, stage};
use crate::error::{IndexError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use tempfile::NamedTempFile;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct RecordFile<'a> {
    format: u32,
    version: String,
    built_at: DateTime<Utc>,
    records: Cow<'a, [Record]>,
}

/// Ordered sequence of [`Record`]s; position `i` describes vector `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordStore {
    records: Vec<Record>,
    version: IndexVersion,
    built_at: DateTime<Utc>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            version: IndexVersion::default(),
            built_at: Utc::now(),
        }
    }

    /// Append a record and return its position.
    pub fn append(&mut self, record: Record) -> usize {
        self.records.push(record);
        self.version = IndexVersion::default();
        self.records.len() - 1
    }

    /// Record at `position`, or [`IndexError::OutOfRange`].
    pub fn get(&self, position: usize) -> Result<&Record> {
        self.records.get(position).ok_or(IndexError::OutOfRange {
            position,
            size: self.records.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn version(&self) -> IndexVersion {
        self.version
    }

    /// When the records were sealed for persistence
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub(crate) fn set_version(&mut self, version: IndexVersion) {
        self.version = version;
        self.built_at = Utc::now();
    }

    /// Write the store to `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let staged = self.stage(path)?;
        commit(staged, path)
    }

    pub(crate) fn stage(&self, path: &Path) -> Result<NamedTempFile> {
        let file = RecordFile {
            format: FORMAT_VERSION,
            version: self.version.to_hex(),
            built_at: self.built_at,
            records: Cow::Borrowed(&self.records),
        };
        stage(path, |w| {
            serde_json::to_writer(w, &file)?;
            Ok(())
        })
    }

    /// Read a store written by [`RecordStore::save`].
    ///
    /// Missing or unparseable files are [`IndexError::IndexUnavailable`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| IndexError::unavailable(path, format!("cannot read metadata: {e}")))?;
        let file: RecordFile<'static> = serde_json::from_slice(&bytes)
            .map_err(|e| IndexError::unavailable(path, format!("malformed metadata: {e}")))?;

        if file.format != FORMAT_VERSION {
            return Err(IndexError::unavailable(
                path,
                format!("unsupported metadata format {}", file.format),
            ));
        }
        let version = IndexVersion::from_hex(&file.version).ok_or_else(|| {
            IndexError::unavailable(path, format!("malformed version '{}'", file.version))
        })?;

        Ok(Self {
            records: file.records.into_owned(),
            version,
            built_at: file.built_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, caption: &str) -> Record {
        Record {
            asset_path: format!("/images/{id}"),
            asset_id: id.to_string(),
            description: caption.to_string(),
        }
    }

    #[test]
    fn test_append_and_get() {
        let mut store = RecordStore::new();
        assert!(store.is_empty());

        assert_eq!(store.append(record("a.jpg", "a cat")), 0);
        assert_eq!(store.append(record("b.jpg", "a dog")), 1);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).unwrap().description, "a dog");
        assert!(matches!(
            store.get(2),
            Err(IndexError::OutOfRange {
                position: 2,
                size: 2
            })
        ));
    }

    #[test]
    fn test_save_load_round_trip() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("metadata.json");

        let mut store = RecordStore::new();
        store.append(record("a.jpg", "quotes \" and | pipes"));
        store.append(record("b.jpg", "ünïcödé caption"));
        store.set_version(IndexVersion([3u8; 32]));
        store.save(&path)?;

        let loaded = RecordStore::load(&path)?;
        assert_eq!(loaded.records(), store.records());
        assert_eq!(loaded.version(), store.version());
        assert_eq!(loaded.built_at(), store.built_at());
        Ok(())
    }

    #[test]
    fn test_load_malformed() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("metadata.json");

        std::fs::write(&path, "{ not json")?;
        assert!(matches!(
            RecordStore::load(&path),
            Err(IndexError::IndexUnavailable { .. })
        ));

        std::fs::write(
            &path,
            r#"{"format":1,"version":"zz","built_at":"2024-01-01T00:00:00Z","records":[]}"#,
        )?;
        assert!(matches!(
            RecordStore::load(&path),
            Err(IndexError::IndexUnavailable { .. })
        ));

        assert!(RecordStore::load(temp_dir.path().join("missing.json")).is_err());
        Ok(())
    }
}
