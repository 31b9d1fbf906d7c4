//! Error types for answer generation

/// Result type for answer generation.
pub type Result<T> = std::result::Result<T, GenerateError>;

/// Failures talking to a generative model.
///
/// A safety refusal is not an error; it is returned as
/// [`crate::GeneratedAnswer::Refused`].
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// No API key was configured
    #[error("No API key configured; set the GOOGLE_API_KEY environment variable")]
    MissingApiKey,

    /// The request never produced an HTTP response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status
    #[error("Provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    /// The provider answered with a body we cannot interpret
    #[error("Malformed provider response: {message}")]
    MalformedResponse { message: String },
}

impl GenerateError {
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GenerateError::Provider {
            status: 429,
            body: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "Provider returned HTTP 429: quota exceeded");
        assert!(
            GenerateError::MissingApiKey
                .to_string()
                .contains("GOOGLE_API_KEY")
        );
        assert_eq!(
            GenerateError::malformed("missing candidates").to_string(),
            "Malformed provider response: missing candidates"
        );
    }
}
