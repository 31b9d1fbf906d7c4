//! The answer generator contract and the caller-side fallback policy.

use crate::error::Result;
use async_trait::async_trait;
use tracing::{error, warn};

/// Shown in place of an answer the provider blocked
pub const REFUSAL_MESSAGE: &str =
    "Sorry, the response was blocked by the model's safety filters.";

/// Shown when the provider could not be reached or failed
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I could not generate a response right now. There was an error with the AI model.";

/// Shown when retrieval produced nothing to ground an answer in
pub const NO_CONTEXT_MESSAGE: &str =
    "No related images were found, so there is no context to answer from.";

/// Outcome of a successful generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedAnswer {
    /// Text produced from the supplied context
    Grounded(String),
    /// The provider declined to answer, usually a safety block
    Refused { reason: String },
}

impl GeneratedAnswer {
    /// The user-facing text; refusals become [`REFUSAL_MESSAGE`].
    pub fn text(&self) -> &str {
        match self {
            GeneratedAnswer::Grounded(text) => text,
            GeneratedAnswer::Refused { .. } => REFUSAL_MESSAGE,
        }
    }

    pub fn is_refusal(&self) -> bool {
        matches!(self, GeneratedAnswer::Refused { .. })
    }
}

/// Produces a natural-language answer grounded in retrieved snippets.
///
/// Implementations return `Ok(GeneratedAnswer::Refused { .. })` for blocked
/// content and reserve `Err` for transport and provider failures.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, snippets: &[String]) -> Result<GeneratedAnswer>;

    /// Name of the backing model, for logs
    fn model_name(&self) -> &str;
}

/// Generate an answer, mapping every failure mode to displayable text.
///
/// Empty `snippets` short-circuit to [`NO_CONTEXT_MESSAGE`] without calling
/// the generator.
pub async fn answer_or_fallback(
    generator: &dyn AnswerGenerator,
    query: &str,
    snippets: &[String],
) -> String {
    if snippets.iter().all(|s| s.trim().is_empty()) {
        return NO_CONTEXT_MESSAGE.to_string();
    }

    match generator.generate(query, snippets).await {
        Ok(GeneratedAnswer::Grounded(text)) => text,
        Ok(GeneratedAnswer::Refused { reason }) => {
            warn!("{} refused to answer: {}", generator.model_name(), reason);
            REFUSAL_MESSAGE.to_string()
        }
        Err(e) => {
            error!("Answer generation with {} failed: {}", generator.model_name(), e);
            FALLBACK_MESSAGE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerateError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    enum Behaviour {
        Echo,
        Refuse,
        Fail,
    }

    struct ScriptedGenerator {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AnswerGenerator for ScriptedGenerator {
        async fn generate(&self, query: &str, snippets: &[String]) -> Result<GeneratedAnswer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Echo => Ok(GeneratedAnswer::Grounded(format!(
                    "{query}: {}",
                    snippets.join(" / ")
                ))),
                Behaviour::Refuse => Ok(GeneratedAnswer::Refused {
                    reason: "SAFETY".to_string(),
                }),
                Behaviour::Fail => Err(GenerateError::Provider {
                    status: 503,
                    body: "overloaded".to_string(),
                }),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn snippets() -> Vec<String> {
        vec!["A dog runs.".to_string(), "A dog swims.".to_string()]
    }

    #[test]
    fn test_answer_text() {
        assert_eq!(GeneratedAnswer::Grounded("hi".into()).text(), "hi");
        let refused = GeneratedAnswer::Refused {
            reason: "SAFETY".into(),
        };
        assert_eq!(refused.text(), REFUSAL_MESSAGE);
        assert!(refused.is_refusal());
    }

    #[tokio::test]
    async fn test_grounded_answer_passes_through() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let answer = answer_or_fallback(&generator, "dogs?", &snippets()).await;
        assert_eq!(answer, "dogs?: A dog runs. / A dog swims.");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_refusal_is_not_a_failure() {
        let generator = ScriptedGenerator::new(Behaviour::Refuse);
        let answer = answer_or_fallback(&generator, "q", &snippets()).await;
        assert_eq!(answer, REFUSAL_MESSAGE);
        assert!(logs_contain("refused to answer"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failure_maps_to_fallback() {
        let generator = ScriptedGenerator::new(Behaviour::Fail);
        let answer = answer_or_fallback(&generator, "q", &snippets()).await;
        assert_eq!(answer, FALLBACK_MESSAGE);
        assert!(logs_contain("Answer generation with scripted failed"));
    }

    #[tokio::test]
    async fn test_no_context_skips_generator() {
        let generator = ScriptedGenerator::new(Behaviour::Echo);
        let answer = answer_or_fallback(&generator, "q", &[]).await;
        assert_eq!(answer, NO_CONTEXT_MESSAGE);

        let answer = answer_or_fallback(&generator, "q", &["  ".to_string()]).await;
        assert_eq!(answer, NO_CONTEXT_MESSAGE);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }
}
