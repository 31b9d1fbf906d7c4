//! Error types for the embedding system

use std::path::PathBuf;

/// Result type for embedding operations.
///
/// This is a convenience type alias that uses [`EmbedError`] as the error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// The variants split into two groups. Input errors ([`EmbedError::Encoding`] and
/// [`EmbedError::Io`]) mean the caller handed over something that cannot be
/// embedded: empty text, or an image that is missing or cannot be decoded. Every
/// other variant means the provider itself failed.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The input cannot be embedded (empty text, unreadable or undecodable image)
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// Error when the model cache directory cannot be used
    #[error("Model cache directory unusable: {path}")]
    CacheDir { path: PathBuf },

    /// Error when model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors when reading inputs or model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create an encoding error for input that cannot be embedded.
    pub fn encoding<S: Into<String>>(message: S) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a model initialization error from any error type.
    ///
    /// # Arguments
    /// * `source` - The underlying error that caused the initialization failure
    pub fn model_init<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ModelInitialization {
            source: source.into(),
        }
    }

    /// Create an embedding generation error from any error type.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    ///
    /// Used for configuration validation errors and for models that produce
    /// output violating the provider contract (empty or non-finite vectors).
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns `true` if the error was caused by the caller's input rather than
    /// by the provider.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Encoding { .. } | Self::Io { .. })
    }
}
