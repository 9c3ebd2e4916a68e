/// BERT tokenizer wrapper around HuggingFace `tokenizers` crate.
///
/// Provides tokenization with attention masks for the ONNX embedder.
use std::path::Path;

use anyhow::Result;
use tokenizers::Tokenizer;

const MAX_SEQUENCE_LENGTH: usize = 256;

/// Wrapper around the HuggingFace tokenizer for BERT-style models.
pub struct BertTokenizer {
    inner: Tokenizer,
    max_length: usize,
}

/// Output of a tokenization operation.
#[derive(Debug, Clone)]
pub struct TokenizerOutput {
    /// Token IDs (input_ids for the model).
    pub input_ids: Vec<i64>,
    /// Attention mask (1 for real tokens, 0 for padding).
    pub attention_mask: Vec<i64>,
}

/// Several tokenized texts padded to a common length, flattened row-major as
/// `[batch_size, seq_len]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl TokenBatch {
    /// Right-pad every sequence with id 0 and mask 0 to the longest one.
    #[must_use]
    pub fn pad(outputs: &[TokenizerOutput]) -> Self {
        let seq_len = outputs
            .iter()
            .map(|o| o.input_ids.len())
            .max()
            .unwrap_or(0);
        let mut input_ids = Vec::with_capacity(outputs.len() * seq_len);
        let mut attention_mask = Vec::with_capacity(outputs.len() * seq_len);

        for output in outputs {
            let pad = seq_len - output.input_ids.len();
            input_ids.extend_from_slice(&output.input_ids);
            input_ids.extend(std::iter::repeat_n(0, pad));
            attention_mask.extend_from_slice(&output.attention_mask);
            attention_mask.extend(std::iter::repeat_n(0, pad));
        }

        Self {
            input_ids,
            attention_mask,
            batch_size: outputs.len(),
            seq_len,
        }
    }
}

impl BertTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file in the model directory.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        // MiniLM was trained on sequences of at most 256 word pieces
        inner
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;

        // Batches are padded by `TokenBatch::pad`
        inner.with_padding(None);

        Ok(Self {
            inner,
            max_length: MAX_SEQUENCE_LENGTH,
        })
    }

    /// Tokenize a single text, returning input IDs and attention mask.
    pub fn tokenize(&self, text: &str) -> Result<TokenizerOutput> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("failed to encode text: {e}"))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();

        Ok(TokenizerOutput {
            input_ids,
            attention_mask,
        })
    }

    /// Tokenize several texts into one padded batch.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<TokenBatch> {
        let outputs = texts
            .iter()
            .map(|t| self.tokenize(t))
            .collect::<Result<Vec<_>>>()?;
        Ok(TokenBatch::pad(&outputs))
    }

    /// Get the vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    /// Get the configured maximum sequence length.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// This test requires the actual tokenizer.json file.
    /// Run with: cargo test tokenizer -- --ignored
    #[test]
    #[ignore]
    fn test_tokenize_with_real_model() {
        let model_dir = crate::embedder::download::default_model_dir();
        if !model_dir.join("tokenizer.json").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(&model_dir).unwrap();
        let output = tokenizer.tokenize("Hello, world!").unwrap();

        assert!(!output.input_ids.is_empty());
        assert_eq!(output.input_ids.len(), output.attention_mask.len());
        // Should have CLS and SEP tokens
        assert!(output.input_ids.len() >= 3);
    }

    #[test]
    #[ignore]
    fn test_long_input_is_truncated() {
        let model_dir = crate::embedder::download::default_model_dir();
        if !model_dir.join("tokenizer.json").exists() {
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(&model_dir).unwrap();
        let output = tokenizer.tokenize(&"word ".repeat(2000)).unwrap();
        assert!(output.input_ids.len() <= tokenizer.max_length());
    }

    #[test]
    fn test_pad_batch() {
        let outputs = vec![
            TokenizerOutput {
                input_ids: vec![101, 7, 102],
                attention_mask: vec![1, 1, 1],
            },
            TokenizerOutput {
                input_ids: vec![101, 102],
                attention_mask: vec![1, 1],
            },
        ];
        let batch = TokenBatch::pad(&outputs);
        assert_eq!(batch.batch_size, 2);
        assert_eq!(batch.seq_len, 3);
        assert_eq!(batch.input_ids, vec![101, 7, 102, 101, 102, 0]);
        assert_eq!(batch.attention_mask, vec![1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn test_pad_empty_batch() {
        let batch = TokenBatch::pad(&[]);
        assert_eq!(batch.batch_size, 0);
        assert!(batch.input_ids.is_empty());
    }

    #[test]
    fn test_tokenizer_missing_file() {
        let result = BertTokenizer::from_model_dir(Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }
}
