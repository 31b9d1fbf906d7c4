use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::{Deserialize, Serialize};

use super::error::ApiError;

/// Generator query used for image searches, which carry no text
pub const IMAGE_QUERY_TEXT: &str = "an image query";

/// Multipart search form
#[derive(TryFromMultipart)]
pub struct SearchRequest {
    /// `text` or `image`
    pub query_type: Option<String>,
    pub query_text: Option<String>,
    pub query_image: Option<FieldData<Bytes>>,
}

/// A validated search request
#[derive(Debug)]
pub enum SearchQuery {
    Text(String),
    Image { file_name: String, contents: Bytes },
}

impl TryFrom<SearchRequest> for SearchQuery {
    type Error = ApiError;

    fn try_from(request: SearchRequest) -> Result<Self, Self::Error> {
        match request.query_type.as_deref().map(str::trim) {
            Some("text") => {
                let text = request.query_text.unwrap_or_default();
                if text.trim().is_empty() {
                    return Err(ApiError::bad_request("The text query cannot be empty."));
                }
                Ok(SearchQuery::Text(text))
            }
            Some("image") => {
                let image = request
                    .query_image
                    .ok_or_else(|| ApiError::bad_request("No image part found in the request."))?;
                let file_name = image
                    .metadata
                    .file_name
                    .filter(|name| !name.trim().is_empty())
                    .ok_or_else(|| ApiError::bad_request("No image was selected."))?;
                Ok(SearchQuery::Image {
                    file_name,
                    contents: image.contents,
                })
            }
            _ => Err(ApiError::bad_request("Invalid query type.")),
        }
    }
}

/// One result as shown to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub description: String,
    /// Base64-encoded image bytes; empty if the image could not be read
    pub image_b64: String,
    /// Distance with four decimals
    pub distance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub generated_response: String,
}
