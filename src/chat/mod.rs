//! Conversation engine: retrieval, prompt assembly, the language-model call
//! and bounded conversation memory.
pub mod memory;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ModelError, Result};
use crate::indexer::IndexManager;
use crate::indexer::loader::DocumentFormat;
use crate::llm::LanguageModel;
use crate::vector::ScoredChunk;

pub use memory::{ConversationMemory, Turn};
pub use prompt::PromptTemplate;

const EXCERPT_CHARS: usize = 200;

/// Where a retrieved passage came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub document: String,
    pub format: DocumentFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub position: usize,
    pub score: f32,
    pub excerpt: String,
}

impl From<&ScoredChunk> for Source {
    fn from(hit: &ScoredChunk) -> Self {
        Self {
            document: hit.chunk.source.clone(),
            format: hit.chunk.format,
            page: hit.chunk.page,
            position: hit.chunk.position,
            score: hit.score,
            excerpt: hit.chunk.text.chars().take(EXCERPT_CHARS).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    /// Conversation memory after this turn, oldest first.
    pub history: Vec<Turn>,
    /// Whether the question was new to the question store.
    pub question_stored: bool,
}

pub struct ConversationEngine {
    llm: Arc<dyn LanguageModel>,
    memory: Mutex<ConversationMemory>,
    template: PromptTemplate,
    top_k: usize,
    timeout: Duration,
}

impl ConversationEngine {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        template: PromptTemplate,
        memory_k: usize,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            memory: Mutex::new(ConversationMemory::new(memory_k)),
            template,
            top_k,
            timeout,
        }
    }

    /// Answer `question` from the indexed documents.
    ///
    /// The turn is only remembered when the model answers in time, and only
    /// if the memory was not cleared while the answer was pending.
    pub async fn ask(&self, index: &IndexManager, question: &str) -> Result<Answer> {
        let (history, generation) = {
            let memory = self.memory.lock().await;
            (memory.snapshot(), memory.generation())
        };

        let hits = index.retrieve(question, self.top_k).await?;
        debug!("Retrieved {} chunks for question", hits.len());

        let prompt = self
            .template
            .render(hits.iter().map(|h| &h.chunk), &history, question);

        let answer = match tokio::time::timeout(self.timeout, self.llm.complete(&prompt)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!("Language model call failed: {e}");
                return Err(e.into());
            }
            Err(_) => {
                warn!("Language model timed out after {:?}", self.timeout);
                return Err(ModelError::Timeout(self.timeout).into());
            }
        };

        let history = {
            let mut memory = self.memory.lock().await;
            if memory.generation() == generation {
                memory.push(question, answer.as_str());
            } else {
                debug!("Conversation was reset while answering, turn not recorded");
            }
            memory.snapshot()
        };
        info!(
            "Answered question using {} sources ({} turns in memory)",
            hits.len(),
            history.len()
        );

        Ok(Answer {
            answer,
            sources: hits.iter().map(Source::from).collect(),
            history,
            question_stored: false,
        })
    }

    /// Current conversation memory, oldest first.
    pub async fn history(&self) -> Vec<Turn> {
        self.memory.lock().await.snapshot()
    }

    pub async fn clear_memory(&self) {
        self.memory.lock().await.clear();
    }
}
