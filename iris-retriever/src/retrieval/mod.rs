//! Building indexes from annotations and answering queries against them.

pub mod annotations;
pub mod index_builder;
pub mod retriever;

pub use index_builder::{BuildStats, BuilderConfig, IndexBuilder};
pub use retriever::{DEFAULT_K, IndexSnapshot, Retriever};
