//! Language model abstraction used by the conversation engine.
pub mod mock;
pub mod openai;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ModelError;

pub use mock::MockModel;
pub use openai::OpenAiClient;

/// The two messages sent to the model for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    /// Rendered system template carrying the retrieved context and history.
    pub system: String,
    /// The user's question, verbatim.
    pub user: String,
}

/// A chat-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the assistant's reply to `prompt`.
    async fn complete(&self, prompt: &Prompt) -> Result<String, ModelError>;
}
