/// Scripted language model for tests and offline runs.
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{LanguageModel, Prompt};
use crate::error::ModelError;

/// Answers every prompt with a fixed reply (or echoes the question), after an
/// optional delay. Every prompt it receives is recorded.
#[derive(Default)]
pub struct MockModel {
    reply: Option<String>,
    delay: Option<Duration>,
    fail: bool,
    prompts: Mutex<Vec<Prompt>>,
}

impl MockModel {
    /// A model that answers `"Answer: <question>"`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every call fail with [`ModelError::EmptyResponse`].
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ModelError> {
        match self.prompts.lock() {
            Ok(mut p) => p.push(prompt.clone()),
            Err(poisoned) => poisoned.into_inner().push(prompt.clone()),
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ModelError::EmptyResponse);
        }

        Ok(match &self.reply {
            Some(reply) => reply.clone(),
            None => format!("Answer: {}", prompt.user),
        })
    }
}
