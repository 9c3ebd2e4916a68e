//! # docqa: Document Question Answering
//!
//! Retrieval-augmented question answering over a folder of uploaded
//! documents (PDF, DOCX, XLSX, plain text). Documents are split into
//! overlapping chunks, embedded locally, and the most similar chunks ground a
//! chat-completion prompt together with a short conversation memory.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, validation, and defaults
//! - **[`indexer`]**: Document loading, chunking, and the index lifecycle (EMPTY/BUILT)
//! - **[`vector`]**: In-memory cosine index with single-file persistence
//! - **[`embedder`]**: Text embedding via ONNX Runtime (all-MiniLM-L6-v2)
//! - **[`llm`]**: OpenAI-compatible chat completion client
//! - **[`chat`]**: Prompt rendering and bounded conversation memory
//! - **[`uploads`]**: Upload directory management
//! - **[`db`]**: SQLite question store for autocomplete suggestions
//! - **[`assistant`]**: The service facade used by the CLI

pub mod assistant;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod llm;
pub mod uploads;
pub mod vector;

pub use assistant::DocumentAssistant;
pub use error::{Error, Result};
