//! # iris-server
//!
//! HTTP front end for iris: multimodal search over captioned images with a
//! generated answer grounded in the retrieved captions.
//!
//! ## Endpoints
//!
//! ### `POST /search`
//! Multipart form with:
//! - `query_type`: `text` or `image`
//! - `query_text`: the question, for text queries
//! - `query_image`: the uploaded picture, for image queries
//!
//! Responds with
//! ```json
//! {
//!   "results": [{ "description": "...", "image_b64": "...", "distance": "0.4210" }],
//!   "generated_response": "..."
//! }
//! ```
//!
//! ### `GET /status`
//! Whether an index is loaded, and which.
//!
//! ### `POST /reload`
//! Re-read the index files from disk and swap them in.
//!
//! ## Errors
//!
//! Failures are returned as `{ "error": message }` with status 400 for a
//! missing or invalid query, 503 while no index is loaded, and 500 otherwise.

mod api;
mod error;
mod state;
mod types;

pub use self::error::ApiError;
pub use self::state::AppState;
pub use self::types::{IMAGE_QUERY_TEXT, SearchHit, SearchResponse};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use iris_retriever::IndexPaths;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

/// Upload limit: 10 MiB
pub const DEFAULT_UPLOAD_LIMIT: usize = 1024 * 1024 * 10;

/// Configuration for the HTTP service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: SocketAddr,
    /// Results per search
    pub default_k: usize,
    /// Maximum request body size in bytes
    pub upload_limit: usize,
    /// Index files served and reloaded
    pub index: IndexPaths,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            default_k: iris_retriever::retrieval::DEFAULT_K,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            index: IndexPaths::default(),
        }
    }
}

/// Build the router.
pub fn create_app(state: Arc<AppState>) -> Router {
    let upload_limit = state.upload_limit;
    Router::new()
        .route("/search", post(api::search_handler))
        .route("/status", get(api::status_handler))
        .route("/reload", post(api::reload_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit))
        .with_state(state)
}

/// Serve `state` on `bind` until the process is stopped.
pub async fn run_server(bind: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_app(state)).await?;
    Ok(())
}
