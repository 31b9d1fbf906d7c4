//! Google Gemini `generateContent` client.
//!
//! Requests carry the grounded prompt, the generation settings and a safety
//! configuration that disables provider-side blocking for all four harm
//! categories. Blocks can still happen (prompt feedback, or a candidate with no
//! content); those come back as [`GeneratedAnswer::Refused`].

use crate::error::{GenerateError, Result};
use crate::generator::{AnswerGenerator, GeneratedAnswer};
use crate::prompt::PromptBuilder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Settings for [`GeminiGenerator`].
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_output_tokens: 250,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Read the API key from `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(GenerateError::MissingApiKey),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SafetyRating {
    category: String,
    probability: String,
}

fn request_body<'a>(config: &GeminiConfig, prompt: &'a str) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
        safety_settings: HARM_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
    }
}

/// Turn a successful response body into an answer or a refusal.
fn interpret(response: GenerateContentResponse) -> GeneratedAnswer {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return GeneratedAnswer::Refused {
            reason: format!("prompt blocked: {reason}"),
        };
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return GeneratedAnswer::Refused {
            reason: "no candidates returned".to_string(),
        };
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    if !text.trim().is_empty() {
        return GeneratedAnswer::Grounded(text.trim().to_string());
    }

    let ratings = candidate
        .safety_ratings
        .iter()
        .map(|r| format!("{}: {}", r.category, r.probability))
        .collect::<Vec<_>>();
    GeneratedAnswer::Refused {
        reason: format!(
            "finish reason {}; ratings: {}",
            candidate.finish_reason.as_deref().unwrap_or("unknown"),
            if ratings.is_empty() {
                "n/a".to_string()
            } else {
                ratings.join(", ")
            }
        ),
    }
}

/// [`AnswerGenerator`] backed by the Gemini HTTP API.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    config: GeminiConfig,
    prompt: PromptBuilder,
    client: reqwest::Client,
}

impl GeminiGenerator {
    /// Fails with [`GenerateError::MissingApiKey`] when the key is empty.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(GenerateError::MissingApiKey);
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        info!("Gemini model '{}' initialized", config.model);
        Ok(Self {
            config,
            prompt: PromptBuilder::default(),
            client,
        })
    }

    /// Configure from the environment; see [`GeminiConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, query: &str, snippets: &[String]) -> Result<GeneratedAnswer> {
        let prompt = self.prompt.build(query, snippets);
        let body = request_body(&self.config, &prompt);
        debug!(
            "Requesting answer from {} ({} context snippets)",
            self.config.model,
            snippets.len()
        );

        let response = self
            .client
            .post(self.config.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GenerateError::Provider {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| GenerateError::malformed(e.to_string()))?;
        Ok(interpret(parsed))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GeneratedAnswer {
        interpret(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_request_body_shape() {
        let config = GeminiConfig::new("key");
        let body = serde_json::to_value(request_body(&config, "the prompt")).unwrap();

        assert_eq!(body["contents"][0]["parts"][0]["text"], "the prompt");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 250);
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

        let settings = body["safetySettings"].as_array().unwrap();
        assert_eq!(settings.len(), 4);
        assert!(settings.iter().all(|s| s["threshold"] == "BLOCK_NONE"));
        assert!(
            settings
                .iter()
                .any(|s| s["category"] == "HARM_CATEGORY_DANGEROUS_CONTENT")
        );
    }

    #[test]
    fn test_endpoint() {
        let config = GeminiConfig::new("key").with_base_url("http://localhost:8080/v1beta/");
        assert_eq!(
            config.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_text_response() {
        let answer = parse(json!({
            "candidates": [{
                "content": {"parts": [{"text": "A dog "}, {"text": "is running."}], "role": "model"},
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(answer, GeneratedAnswer::Grounded("A dog is running.".to_string()));
    }

    #[test]
    fn test_candidate_without_parts_is_refusal() {
        let answer = parse(json!({
            "candidates": [{
                "finishReason": "SAFETY",
                "safetyRatings": [{"category": "HARM_CATEGORY_HARASSMENT", "probability": "HIGH"}]
            }]
        }));
        match answer {
            GeneratedAnswer::Refused { reason } => {
                assert!(reason.contains("SAFETY"));
                assert!(reason.contains("HARM_CATEGORY_HARASSMENT: HIGH"));
            }
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[test]
    fn test_prompt_block_is_refusal() {
        let answer = parse(json!({"promptFeedback": {"blockReason": "OTHER"}}));
        assert!(answer.is_refusal());
        assert!(parse(json!({})).is_refusal());
    }

    #[test]
    fn test_missing_key() {
        assert!(matches!(
            GeminiGenerator::new(GeminiConfig::new("  ")),
            Err(GenerateError::MissingApiKey)
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", GeminiConfig::new("secret-key"));
        assert!(!debug.contains("secret-key"));
    }
}
