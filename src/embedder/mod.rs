/// Embedder trait and shared types for text embedding.
pub mod download;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::{Config, EmbedderProvider};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// Implementations must be deterministic for identical input and
/// `Send + Sync` to allow concurrent use behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Build the embedder selected in the configuration.
///
/// The ONNX provider downloads its model files on first use.
pub fn from_config(config: &Config) -> Result<Arc<dyn Embedder>, EmbedderError> {
    match config.embedder.provider {
        EmbedderProvider::Mock => {
            info!(
                "Using mock embedder ({} dimensions)",
                config.embedder.dimensions
            );
            Ok(Arc::new(mock::MockEmbedder::new(config.embedder.dimensions)))
        }
        EmbedderProvider::Onnx => {
            let model_dir = config.model_dir();
            download::download_model_files(&model_dir)
                .map_err(|e| EmbedderError::ModelLoadFailed(format!("{e:#}")))?;
            let embedder = onnx::OnnxEmbedder::new(&model_dir, config.embedder.dimensions)?;
            Ok(Arc::new(embedder))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_mock() {
        let mut config = Config::default();
        config.embedder.provider = EmbedderProvider::Mock;
        config.embedder.dimensions = 16;
        let embedder = from_config(&config).unwrap();
        assert_eq!(embedder.dimensions(), 16);
        assert_eq!(embedder.embed("abc").unwrap().len(), 16);
    }
}
