//! Exact nearest-neighbour index over fixed-dimension f32 vectors.
//!
//! Vectors are stored row-major in one contiguous buffer. Search is exhaustive
//! under squared Euclidean distance, so results are exact: no training step, no
//! recall trade-off.
//!
//! ## File format
//!
//! All integers and floats are little-endian.
//!
//! ```text
//! offset  size        field
//! 0       8           magic "IRISVIDX"
//! 8       4           format version (1)
//! 12      4           dimension
//! 16      8           vector count
//! 24      32          IndexVersion digest
//! 56      4·d·count   vectors, row-major f32
//! ```

use super::{IndexVersion, commit, stage};
use crate::error::{IndexError, Result};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const MAGIC: &[u8; 8] = b"IRISVIDX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 4 + 8 + 32;
const WRITE_CHUNK: usize = 16 * 1024;

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Ascending distance, ties broken by insertion order.
fn by_distance(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Flat vector index with exact k-nearest-neighbour search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    count: usize,
    data: Vec<f32>,
    version: IndexVersion,
}

impl VectorIndex {
    /// Create an empty index fixed to `dimension`.
    pub fn create(dimension: usize) -> Self {
        Self {
            dimension,
            count: 0,
            data: Vec::new(),
            version: IndexVersion::default(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn version(&self) -> IndexVersion {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: IndexVersion) {
        self.version = version;
    }

    /// Raw row-major vector buffer
    pub(crate) fn data(&self) -> &[f32] {
        &self.data
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if self.dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        if actual != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Append vectors in order. Either all vectors are added or, on a dimension
    /// mismatch, none are.
    pub fn add<V: AsRef<[f32]>>(&mut self, vectors: &[V]) -> Result<()> {
        for vector in vectors {
            self.check_dimension(vector.as_ref().len())?;
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector.as_ref());
        }
        self.count += vectors.len();
        self.version = IndexVersion::default();
        Ok(())
    }

    /// Append one vector and return its position.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize> {
        self.add(&[vector])?;
        Ok(self.count - 1)
    }

    /// The vector stored at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        (position < self.count)
            .then(|| &self.data[position * self.dimension..(position + 1) * self.dimension])
    }

    /// The `min(k, len)` nearest vectors to `query`, ascending by squared L2
    /// distance. Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        self.check_dimension(query.len())?;

        let k = k.min(self.count);
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = (0..self.count)
            .map(|position| {
                let row = &self.data[position * self.dimension..(position + 1) * self.dimension];
                (position, squared_l2(query, row))
            })
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance);
        Ok(scored)
    }

    /// Write the index to `path` atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let staged = self.stage(path)?;
        commit(staged, path)
    }

    pub(crate) fn stage(&self, path: &Path) -> Result<NamedTempFile> {
        if self.dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        stage(path, |w| self.write_to(w))
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        w.write_u32::<LittleEndian>(self.dimension as u32)?;
        w.write_u64::<LittleEndian>(self.count as u64)?;
        w.write_all(&self.version.0)?;

        let mut buf = vec![0u8; WRITE_CHUNK * 4];
        for chunk in self.data.chunks(WRITE_CHUNK) {
            let bytes = &mut buf[..chunk.len() * 4];
            LittleEndian::write_f32_into(chunk, bytes);
            w.write_all(bytes)?;
        }
        Ok(())
    }

    /// Read an index written by [`VectorIndex::save`].
    ///
    /// A missing, truncated or otherwise malformed file is
    /// [`IndexError::IndexUnavailable`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| IndexError::unavailable(path, format!("cannot read index: {e}")))?;
        Self::from_bytes(&bytes).map_err(|reason| IndexError::unavailable(path, reason))
    }

    fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("file too short for header ({} bytes)", bytes.len()));
        }

        let mut cursor = Cursor::new(bytes);
        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic).map_err(|e| e.to_string())?;
        if &magic != MAGIC {
            return Err("not an iris vector index (bad magic)".to_string());
        }

        let format = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| e.to_string())?;
        if format != FORMAT_VERSION {
            return Err(format!("unsupported format version {format}"));
        }

        let dimension = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| e.to_string())? as usize;
        if dimension == 0 {
            return Err("dimension is zero".to_string());
        }
        let count = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| e.to_string())? as usize;

        let mut version = [0u8; 32];
        cursor.read_exact(&mut version).map_err(|e| e.to_string())?;

        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| format!("vector count {count} overflows"))?;
        let body = &bytes[HEADER_LEN..];
        if body.len() != expected {
            return Err(format!(
                "expected {expected} bytes of vector data for {count}×{dimension}, found {}",
                body.len()
            ));
        }

        let mut data = vec![0f32; count * dimension];
        LittleEndian::read_f32_into(body, &mut data);

        Ok(Self {
            dimension,
            count,
            data,
            version: IndexVersion(version),
        })
    }
}
