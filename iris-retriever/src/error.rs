//! Error types for indexing and retrieval

use iris_embed::EmbedError;
use std::path::PathBuf;

/// Result type for index and retrieval operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors raised by the vector index, the record store, the builder and the
/// retriever.
///
/// How callers are expected to react differs per variant:
///
/// - [`IndexError::DimensionMismatch`] and [`IndexError::ZeroDimension`] are
///   configuration mistakes and fail the call.
/// - [`IndexError::OutOfRange`] is a defect between index and store; the retriever
///   skips the offending hit.
/// - [`IndexError::IndexUnavailable`] puts the retriever into its degraded state.
/// - [`IndexError::Encoding`] is a request-level error from the embedding provider.
/// - [`IndexError::EmptyIndex`] fails the build step only.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A vector's length differs from the index dimension
    #[error("Dimension mismatch: index has dimension {expected}, got a vector of length {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vectors of length zero cannot be indexed or persisted
    #[error("Vectors have zero dimensions; check the embedding model")]
    ZeroDimension,

    /// A position beyond the end of the record store
    #[error("Position {position} out of range for record store of size {size}")]
    OutOfRange { position: usize, size: usize },

    /// Persisted index state is missing, corrupt, or inconsistent
    #[error("Index unavailable at {path}: {reason}")]
    IndexUnavailable { path: PathBuf, reason: String },

    /// The build produced no usable rows
    #[error("No usable annotation rows; refusing to build an empty index")]
    EmptyIndex,

    /// The embedding provider rejected the input or failed
    #[error("Encoding error: {0}")]
    Encoding(#[from] EmbedError),

    /// The annotation source could not be read
    #[error("Cannot read annotations at {path}: {source}")]
    Annotations {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO errors while writing index files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Record serialization failed
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl IndexError {
    /// Shorthand for [`IndexError::IndexUnavailable`].
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
