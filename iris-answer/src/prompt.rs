//! Grounded prompt construction.
//!
//! Retrieved captions are folded into a single context block and wrapped in
//! instructions that confine the model to that context:
//!
//! ```text
//! You are a helpful, objective assistant. ...
//!
//! ---
//! Query: what is the dog doing?
//!
//! Context:
//! A brown dog runs along the beach. A dog catches a frisbee in mid air.
//! ---
//!
//! Answer:
//! ```

/// Instructions placed before the query and context
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful, objective assistant. Your task is to write a descriptive or informative answer.\n\
The answer must be based strictly on the information given in the context.\n\
Do not add new information, opinions, inferences or personal interpretations.\n\
Be concise and to the point. If the information is not in the context, say that you do not have it.";

/// Builds the prompt sent to the generative model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    instructions: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUCTIONS)
    }
}

impl PromptBuilder {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Join the non-empty snippets into one context paragraph.
    pub fn context<S: AsRef<str>>(snippets: &[S]) -> String {
        snippets
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The full prompt for `query` grounded in `snippets`.
    pub fn build<S: AsRef<str>>(&self, query: &str, snippets: &[S]) -> String {
        format!(
            "{}\n\n---\nQuery: {}\n\nContext:\n{}\n---\n\nAnswer:",
            self.instructions,
            query.trim(),
            Self::context(snippets)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_skips_empty_snippets() {
        let context = PromptBuilder::context(&["A dog runs.", "", "   ", " A cat sleeps. "]);
        assert_eq!(context, "A dog runs. A cat sleeps.");
    }

    #[test]
    fn test_build_prompt() {
        let prompt = PromptBuilder::new("Answer from context only.")
            .build(" what animals? ", &["A dog runs.".to_string()]);

        assert_eq!(
            prompt,
            "Answer from context only.\n\n---\nQuery: what animals?\n\nContext:\nA dog runs.\n---\n\nAnswer:"
        );
    }

    #[test]
    fn test_default_instructions_restrict_to_context() {
        let prompt = PromptBuilder::default().build::<&str>("q", &[]);
        assert!(prompt.starts_with(DEFAULT_INSTRUCTIONS));
        assert!(prompt.contains("strictly on the information given in the context"));
    }
}
