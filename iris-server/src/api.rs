use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum_typed_multipart::TypedMultipart;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use iris_answer::answer_or_fallback;
use iris_retriever::{IndexStatus, QueryResult};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::error::{ApiError, Result};
use super::state::AppState;
use super::types::*;

/// Search by text or by an uploaded image, then answer from the captions found.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(request): TypedMultipart<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let query = SearchQuery::try_from(request)?;
    if !state.retriever.is_ready() {
        return Err(ApiError::NotReady(
            "The index is not loaded. Build it and call /reload.".to_string(),
        ));
    }

    let start = Instant::now();

    let (results, generator_query) = match query {
        SearchQuery::Text(text) => {
            info!("Searching by text: '{}'", text);
            let results = state.retriever.retrieve_by_text(&text, state.k).await?;
            (results, text)
        }
        SearchQuery::Image {
            file_name,
            contents,
        } => {
            info!("Searching by uploaded image '{}'", file_name);
            let upload = stage_upload(&file_name, contents).await?;
            let results = state
                .retriever
                .retrieve_by_image(upload.path(), state.k)
                .await?;
            drop(upload);
            (results, IMAGE_QUERY_TEXT.to_string())
        }
    };

    let snippets: Vec<String> = results.iter().map(|r| r.description.clone()).collect();
    let generated_response =
        answer_or_fallback(state.generator.as_ref(), &generator_query, &snippets).await;
    let results = display_results(&results).await;

    info!(
        "Answered search with {} results in {} ms",
        results.len(),
        start.elapsed().as_millis()
    );
    Ok(Json(SearchResponse {
        results,
        generated_response,
    }))
}

/// What the service is currently serving.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<IndexStatus> {
    Json(state.retriever.status())
}

/// Load the index files again and swap them in; the old index stays on failure.
pub async fn reload_handler(State(state): State<Arc<AppState>>) -> Result<Json<IndexStatus>> {
    let retriever = Arc::clone(&state.retriever);
    tokio::task::spawn_blocking(move || retriever.reload())
        .await?
        .map_err(|e| {
            warn!("Reload failed, keeping the current index: {}", e);
            ApiError::NotReady(e.to_string())
        })?;
    Ok(Json(state.retriever.status()))
}

/// Write an upload to a temporary file, keeping its extension. The file is
/// removed when the handle is dropped.
async fn stage_upload(file_name: &str, contents: Bytes) -> Result<NamedTempFile> {
    let suffix = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let file = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("iris-query-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(&contents)?;
        file.flush()?;
        Ok(file)
    })
    .await??;
    Ok(file)
}

async fn display_results(results: &[QueryResult]) -> Vec<SearchHit> {
    let mut hits = Vec::with_capacity(results.len());
    for result in results {
        let image_b64 = match tokio::fs::read(&result.asset_path).await {
            Ok(bytes) => STANDARD.encode(bytes),
            Err(e) => {
                warn!("Cannot read result image {}: {}", result.asset_path, e);
                String::new()
            }
        };
        hits.push(SearchHit {
            description: result.description.clone(),
            image_b64,
            distance: format!("{:.4}", result.distance),
        });
    }
    hits
}
