use std::sync::Arc;

use iris_answer::AnswerGenerator;
use iris_retriever::Retriever;

/// Shared request-handling state
pub struct AppState {
    /// Text and image retrieval over the served index
    pub retriever: Arc<Retriever>,
    /// Produces the answer shown next to the results
    pub generator: Arc<dyn AnswerGenerator>,
    /// Results per search
    pub k: usize,
    /// Maximum request body size in bytes
    pub upload_limit: usize,
}

impl AppState {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn AnswerGenerator>,
        k: usize,
        upload_limit: usize,
    ) -> Arc<Self> {
        Arc::new(AppState {
            retriever,
            generator,
            k,
            upload_limit,
        })
    }
}
