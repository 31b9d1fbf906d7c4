//! Storage layer for iris-retriever
//!
//! This module holds the two halves of a persisted index and the type that keeps
//! them aligned:
//!
//! - **VectorIndex**: dense vectors with exact nearest-neighbour search
//! - **RecordStore**: metadata records addressed by the same positions
//! - **IndexPair**: the joined entity; it only grows by whole [`IndexEntry`] values
//!
//! ## Architecture
//!
//! ```text
//! IndexEntry { vector, record } ──push──▶ IndexPair ─┬─ VectorIndex  ──▶ iris_index.bin
//!                                                    └─ RecordStore  ──▶ iris_metadata.json
//! ```
//!
//! Search returns positions, never records, so position `i` in the vector file must
//! always describe record `i` in the metadata file. Both files carry the same
//! [`IndexVersion`]; a pair with differing versions or lengths does not load.
//!
//! ## Durability
//!
//! Files are written to a temporary file next to their destination and renamed into
//! place, so a reader never observes a half-written file under the canonical path.

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub mod index_pair;
pub mod record_store;
pub mod vector_index;

pub use index_pair::{IndexEntry, IndexPair};
pub use record_store::RecordStore;
pub use vector_index::VectorIndex;

/// One indexed (image, caption) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Resolvable location of the image bytes
    pub asset_path: String,
    /// Stable identifier of the image asset (the annotation filename)
    pub asset_id: String,
    /// Caption text that was embedded
    pub description: String,
}

/// One ranked hit returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub description: String,
    pub asset_path: String,
    /// Squared L2 distance to the query; smaller is more similar
    pub distance: f32,
}

/// Content digest shared by the two files of one persisted pair.
///
/// The all-zero value marks an index that has not been sealed yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IndexVersion(pub [u8; 32]);

impl IndexVersion {
    /// Digest the dimension, every vector and every record field.
    pub fn compute(dimension: usize, vectors: &[f32], records: &[Record]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(dimension as u64).to_le_bytes());
        hasher.update(&(records.len() as u64).to_le_bytes());
        for value in vectors {
            hasher.update(&value.to_le_bytes());
        }
        for record in records {
            for field in [&record.asset_path, &record.asset_id, &record.description] {
                hasher.update(&(field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
        }
        Self(*hasher.finalize().as_bytes())
    }

    pub fn is_sealed(&self) -> bool {
        self.0 != [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl fmt::Display for IndexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Locations of the two files that make up one persisted index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexPaths {
    /// Serialized vector index
    pub index_path: PathBuf,
    /// Serialized record sequence
    pub metadata_path: PathBuf,
}

impl IndexPaths {
    pub fn new(index_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    /// Both files placed in `dir` under their default names
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("iris_index.bin"), dir.join("iris_metadata.json"))
    }
}

impl Default for IndexPaths {
    fn default() -> Self {
        Self::new("iris_index.bin", "iris_metadata.json")
    }
}

/// Write a file's full contents to a temporary sibling of `path`.
///
/// The returned file is flushed and synced; [`commit`] renames it into place.
pub(crate) fn stage<F>(path: &Path, write: F) -> Result<NamedTempFile>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::Builder::new()
        .prefix(".iris-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    file.as_file().sync_all()?;
    Ok(file)
}

/// Atomically move a staged file to its canonical path.
pub(crate) fn commit(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged
        .persist(path)
        .map_err(|e| IndexError::from(e.error))?;
    Ok(())
}
