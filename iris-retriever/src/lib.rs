//! iris-retriever: exact vector search over captioned images
//!
//! This crate builds a persisted index from caption annotations and answers
//! text and image queries against it through a shared embedding space.
//!
//! ## Key Modules
//!
//! - **[`storage`]**: vector index, record store and the joined [`IndexPair`]
//! - **[`retrieval`]**: [`IndexBuilder`] for offline builds, [`Retriever`] for serving
//! - **[`status`]**: what a retriever is currently serving
//! - **[`config`]**: TOML configuration shared by the binaries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iris_embed::{EmbedConfig, FastEmbedProvider};
//! use iris_retriever::{BuilderConfig, IndexBuilder, IndexPaths, Retriever};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = Arc::new(FastEmbedProvider::create(EmbedConfig::default()).await?);
//! let paths = IndexPaths::default();
//!
//! let config = BuilderConfig::new("data/results.csv", "data/images");
//! IndexBuilder::new(config, provider.clone())
//!     .build_and_persist(&paths)
//!     .await?;
//!
//! let retriever = Retriever::initialize(provider, paths);
//! for hit in retriever.retrieve_by_text("a dog on the beach", 5).await? {
//!     println!("{:.4} {}", hit.distance, hit.description);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! annotations → IndexBuilder → EmbeddingProvider → IndexPair ─save→ (index, metadata)
//!                                                                        ↓ load
//! query ──────→ Retriever ───→ EmbeddingProvider → IndexPair.search → QueryResult
//! ```

pub mod config;
pub mod error;
pub mod retrieval;
pub mod status;
pub mod storage;

pub use config::IrisConfig;
pub use error::{IndexError, Result};
pub use retrieval::{BuildStats, BuilderConfig, IndexBuilder, Retriever};
pub use status::IndexStatus;
pub use storage::{IndexEntry, IndexPair, IndexPaths, QueryResult, Record};
