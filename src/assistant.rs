//! The document assistant: one owned service object tying together the upload
//! store, the index lifecycle, the conversation engine and the question store.
use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

use crate::chat::{Answer, ConversationEngine, PromptTemplate, Turn};
use crate::config::Config;
use crate::db::Db;
use crate::embedder::Embedder;
use crate::error::{Error, Result};
use crate::indexer::{Chunker, IndexManager, SyncReport};
use crate::llm::LanguageModel;
use crate::uploads::{FileStore, StoredDocument};

pub struct DocumentAssistant {
    config: Config,
    index: IndexManager,
    engine: ConversationEngine,
    questions: TokioMutex<Db>,
}

impl DocumentAssistant {
    /// Open the question store and restore any persisted index.
    pub fn open(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let index = IndexManager::open(
            embedder,
            Chunker::new(config.chunk_size, config.chunk_overlap),
            FileStore::new(config.upload_dir()),
            config.index_path(),
        )?;
        let engine = ConversationEngine::new(
            llm,
            PromptTemplate::new(config.prompt.system_template.clone()),
            config.memory_k,
            config.search_top_k,
            config.llm_timeout(),
        );
        let questions = Db::open(&config.questions_db)?;

        info!("Document assistant ready (uploads in {})", config.upload_dir);
        Ok(Self {
            config,
            index,
            engine,
            questions: TokioMutex::new(questions),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    /// Store an uploaded file and index it. Returns whether an index is
    /// available afterwards.
    pub async fn upload(&self, name: &str, bytes: &[u8]) -> Result<bool> {
        Ok(self.index.upload(name, bytes).await?.built)
    }

    /// Index whatever is new in the upload directory. Returns whether an index
    /// is available afterwards.
    pub async fn ingest(&self) -> Result<bool> {
        Ok(self.sync().await?.built)
    }

    /// Like [`ingest`](Self::ingest), with the full report.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.index.sync().await
    }

    /// Record the question, then answer it from the indexed documents.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        if !self.index.is_built().await {
            return Err(Error::NotInitialized);
        }

        let stored = self.add_question(question).await?;
        debug!("Question stored: {stored}");

        let mut answer = self.engine.ask(&self.index, question).await?;
        answer.question_stored = stored;
        Ok(answer)
    }

    /// Forget the conversation, drop the index and delete every uploaded
    /// document. Stored questions are kept.
    pub async fn reset(&self) -> Result<()> {
        let result = self.index.reset().await;
        self.engine.clear_memory().await;
        result
    }

    pub fn list_indexed_documents(&self) -> Result<Vec<StoredDocument>> {
        self.index.files().list()
    }

    pub async fn add_question(&self, question: &str) -> Result<bool> {
        Ok(self.questions.lock().await.add_question(question)?)
    }

    pub async fn suggestions(&self, fragment: &str) -> Result<Vec<String>> {
        Ok(self.questions.lock().await.suggestions(fragment)?)
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.engine.history().await
    }

    /// Flush and close the question store.
    pub fn close(self) -> Result<()> {
        self.questions.into_inner().close()?;
        info!("Document assistant closed");
        Ok(())
    }
}
