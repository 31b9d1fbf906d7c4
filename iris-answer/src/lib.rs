//! iris-answer: grounded answers from retrieved captions
//!
//! - [`AnswerGenerator`] is the contract the service depends on
//! - [`PromptBuilder`] turns a query and retrieved captions into a grounded prompt
//! - [`GeminiGenerator`] implements the contract against the Gemini HTTP API
//! - [`answer_or_fallback`] applies the display policy for refusals and failures

pub mod error;
pub mod gemini;
pub mod generator;
pub mod prompt;

pub use error::{GenerateError, Result};
pub use gemini::{GeminiConfig, GeminiGenerator};
pub use generator::{
    AnswerGenerator, FALLBACK_MESSAGE, GeneratedAnswer, NO_CONTEXT_MESSAGE, REFUSAL_MESSAGE,
    answer_or_fallback,
};
pub use prompt::PromptBuilder;
