//! # iris-embed
//!
//! Joint text/image embeddings for the iris retrieval pipeline. Text captions and
//! query images are mapped into one shared vector space, so a caption vector and an
//! image vector can be compared directly with a plain distance metric.
//!
//! ## Features
//!
//! - **Local ONNX Models**: CLIP-style text and vision towers run locally via FastEmbed
//! - **Async-First Design**: Model calls run on tokio's blocking pool
//! - **Model Caching**: Loaded model pairs are shared process-wide per configuration
//! - **Normalized Output**: Vectors are unit-length by default so both modalities share a scale
//!
//! ## Quick Start
//!
//! ```no_run
//! use iris_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let caption = provider.embed_text("two dogs playing in the snow").await?;
//! let photo = provider.embed_image(Path::new("data/dogs.jpg")).await?;
//!
//! assert_eq!(caption.len(), photo.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: Model selection and runtime settings
//! - [`provider`]: The [`EmbeddingProvider`] trait and the FastEmbed implementation
//! - [`error`]: Error types and result handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type. Bad
//! caller input (empty text, unreadable image) is reported as
//! [`EmbedError::Encoding`] so callers can tell it apart from model failures.

pub mod config;
pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use config::{EmbedConfig, MultimodalModel};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, normalize};
