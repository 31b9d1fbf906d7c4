use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use iris_retriever::IndexError;
use serde_json::json;
use tracing::error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned to HTTP clients as `{ "error": message }`.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid query (400)
    BadRequest(String),
    /// No index is being served (503)
    NotReady(String),
    /// Anything else (500)
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(message) | ApiError::NotReady(message) => message,
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                format!("Something went wrong: {e}")
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::IndexUnavailable { .. } => ApiError::NotReady(err.to_string()),
            IndexError::Encoding(ref e) if e.is_input_error() => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iris_embed::EmbedError;

    #[test]
    fn test_index_error_mapping() {
        let err: ApiError = IndexError::unavailable("index.bin", "missing").into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err: ApiError = IndexError::Encoding(EmbedError::encoding("text is empty")).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = IndexError::DimensionMismatch {
            expected: 512,
            actual: 768,
        }
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
