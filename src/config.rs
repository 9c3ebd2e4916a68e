/// Configuration module for docqa.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Extensions the loader and the upload store recognise.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "xlsx", "txt"];

/// Default system prompt. `{context}` and `{chat_history}` are substituted on
/// every question.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = "You are a helpful AI assistant that answers questions based on the following context:
{context}
Follow these guidelines:
- Always be professional and courteous
- Always answer in the language of the source documents in the context
- Provide concise, accurate answers based on the context
- If the information is not in the context, say so explicitly
- Include relevant quotes from the source documents when possible
- Maintain context from previous conversations: {chat_history}
- Format complex information in a readable way";

// ── Default value functions ──────────────────────────────────────────

fn default_upload_dir() -> String {
    "./documents".to_string()
}

fn default_index_path() -> String {
    "./documents/vectorstore/index.bin".to_string()
}

fn default_questions_db() -> String {
    "./questions.db".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_search_top_k() -> usize {
    4
}

fn default_memory_k() -> usize {
    5
}

fn default_dimensions() -> usize {
    384
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_system_template() -> String {
    DEFAULT_SYSTEM_TEMPLATE.to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directory uploads are stored in and documents are loaded from.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// File the vector index is persisted to.
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// SQLite database holding asked questions.
    #[serde(default = "default_questions_db")]
    pub questions_db: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Number of question/answer turns kept in conversation memory.
    #[serde(default = "default_memory_k")]
    pub memory_k: usize,

    #[serde(default)]
    pub embedder: EmbedderConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderProvider {
    /// Local ONNX sentence-transformer.
    #[default]
    Onnx,
    /// Deterministic hash embedder, for tests and offline runs.
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbedderConfig {
    #[serde(default)]
    pub provider: EmbedderProvider,

    /// Where the ONNX model files live. Defaults to the user cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<String>,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_system_template")]
    pub system_template: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            index_path: default_index_path(),
            questions_db: default_questions_db(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            search_top_k: default_search_top_k(),
            memory_k: default_memory_k(),
            embedder: EmbedderConfig::default(),
            llm: LlmConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::default(),
            model_dir: None,
            dimensions: default_dimensions(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_llm_model(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_template: default_system_template(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template file for the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(self.memory_k > 0, "memory_k must be positive");
        anyhow::ensure!(
            self.embedder.dimensions > 0,
            "embedder.dimensions must be positive"
        );
        anyhow::ensure!(
            self.llm.timeout_secs > 0,
            "llm.timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.prompt.system_template.contains("{context}"),
            "prompt.system_template must contain a {{context}} placeholder"
        );
        Ok(())
    }

    #[must_use]
    pub fn upload_dir(&self) -> PathBuf {
        PathBuf::from(&self.upload_dir)
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        PathBuf::from(&self.index_path)
    }

    #[must_use]
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    /// Directory holding the ONNX model files.
    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        match &self.embedder.model_dir {
            Some(dir) => PathBuf::from(dir),
            None => crate::embedder::download::default_model_dir(),
        }
    }
}

/// Whether `path` carries one of [`ALLOWED_EXTENSIONS`] (case-insensitive).
#[must_use]
pub fn is_allowed_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

// ── Tests ────────────────────────────────────────────────────────────
