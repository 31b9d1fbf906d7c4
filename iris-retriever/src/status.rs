//! Serving status reported by the CLI and the HTTP service.

use crate::retrieval::IndexSnapshot;
use crate::storage::IndexPaths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What a retriever is currently serving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Is an index loaded? `false` means queries return no results
    pub ready: bool,
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
    /// Number of indexed captions
    pub entries: usize,
    /// Embedding dimension of the loaded index
    pub dimension: Option<usize>,
    /// Hex content digest shared by both files
    pub version: Option<String>,
    /// When the loaded index was built
    pub built_at: Option<DateTime<Utc>>,
}

impl IndexStatus {
    pub(crate) fn ready(paths: &IndexPaths, snapshot: &IndexSnapshot) -> Self {
        let pair = &snapshot.pair;
        Self {
            ready: true,
            index_path: paths.index_path.clone(),
            metadata_path: paths.metadata_path.clone(),
            entries: pair.len(),
            dimension: Some(pair.dimension()),
            version: Some(pair.version().to_hex()),
            built_at: Some(pair.built_at()),
        }
    }

    pub(crate) fn degraded(paths: &IndexPaths) -> Self {
        Self {
            ready: false,
            index_path: paths.index_path.clone(),
            metadata_path: paths.metadata_path.clone(),
            entries: 0,
            dimension: None,
            version: None,
            built_at: None,
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.ready {
            return write!(
                f,
                "not ready: no index loaded from {} / {}",
                self.index_path.display(),
                self.metadata_path.display()
            );
        }
        write!(f, "ready: {} entries", self.entries)?;
        if let Some(dimension) = self.dimension {
            write!(f, ", dimension {dimension}")?;
        }
        if let Some(version) = &self.version {
            write!(f, ", version {}", &version[..version.len().min(12)])?;
        }
        if let Some(built_at) = self.built_at {
            write!(f, ", built {}", built_at.to_rfc3339())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_status() {
        let status = IndexStatus::degraded(&IndexPaths::default());
        assert!(!status.ready);
        assert_eq!(status.entries, 0);
        assert_eq!(
            status.to_string(),
            "not ready: no index loaded from iris_index.bin / iris_metadata.json"
        );

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["ready"], false);
        assert!(json["version"].is_null());
    }
}
