//! In-memory vector index over embedded chunks.
//!
//! Entries are kept in insertion order and identified by their insertion
//! ordinal. Search is an exact cosine scan, which is plenty for the size of a
//! personal document folder.
pub mod persist;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedder::{Embedder, EmbedderError};
use crate::error::{Error, ModelError, Result};
use crate::indexer::chunker::Chunk;

/// Size and modification time of an indexed source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// A retrieval hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Insertion ordinal of the entry.
    pub id: usize,
    pub score: f32,
    pub chunk: Chunk,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<Chunk>,
    sources: BTreeMap<String, SourceRecord>,
}

impl VectorIndex {
    /// An index with no entries.
    #[must_use]
    pub fn empty(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: Vec::new(),
            chunks: Vec::new(),
            sources: BTreeMap::new(),
        }
    }

    /// Embed `chunks` into a fresh index. Fails with [`Error::IndexBuild`]
    /// when there is nothing to index.
    pub fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::IndexBuild);
        }
        let mut index = Self::empty(embedder.dimensions());
        index.append(chunks, embedder)?;
        Ok(index)
    }

    /// Embed and add `chunks` after the existing entries.
    ///
    /// All chunks are embedded before anything is inserted, so a failure
    /// leaves the index unchanged.
    pub fn append(&mut self, chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedder.embed_batch(&texts).map_err(ModelError::from)?;
        if vectors.len() != chunks.len() {
            let reason = format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                chunks.len()
            );
            return Err(ModelError::from(EmbedderError::InferenceFailed(reason)).into());
        }
        for v in &vectors {
            self.check_dimensions(v)?;
        }

        debug!("Appending {} chunks to index", chunks.len());
        self.vectors.extend(vectors);
        self.chunks.extend(chunks);
        Ok(())
    }

    /// Embed `text` and return its `k` nearest entries.
    pub fn query(&self, text: &str, k: usize, embedder: &dyn Embedder) -> Result<Vec<ScoredChunk>> {
        let vector = embedder.embed(text).map_err(ModelError::from)?;
        self.search(&vector, k)
    }

    /// The `k` entries most similar to `vector`, best first. Equal scores keep
    /// insertion order.
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.check_dimensions(vector)?;

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, v)| (id, cosine_similarity(vector, v)))
            .collect();
        // stable sort keeps earlier ids ahead on ties
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(id, score)| ScoredChunk {
                id,
                score,
                chunk: self.chunks[id].clone(),
            })
            .collect())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(ModelError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Record that `name` is covered by the index.
    pub fn track_source(&mut self, name: impl Into<String>, record: SourceRecord) {
        self.sources.insert(name.into(), record);
    }

    #[must_use]
    pub fn sources(&self) -> &BTreeMap<String, SourceRecord> {
        &self.sources
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn embedding(&self, id: usize) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    #[must_use]
    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::indexer::loader::DocumentFormat;

    fn chunk(source: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: source.to_string(),
            format: DocumentFormat::Txt,
            page: None,
            position: 0,
            start: 0,
        }
    }

    /// Embeds every text to the same fixed vector.
    struct ConstantEmbedder(Vec<f32>);

    impl Embedder for ConstantEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            Ok(self.0.clone())
        }
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
        fn dimensions(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn test_build_rejects_empty() {
        let embedder = MockEmbedder::new(16);
        assert!(matches!(
            VectorIndex::build(Vec::new(), &embedder),
            Err(Error::IndexBuild)
        ));
    }

    #[test]
    fn test_query_returns_at_most_k_from_index() {
        let embedder = MockEmbedder::new(256);
        let chunks = vec![
            chunk("a.txt", "apples and pears"),
            chunk("b.txt", "rust borrow checker"),
            chunk("c.txt", "sourdough bread"),
        ];
        let index = VectorIndex::build(chunks.clone(), &embedder).unwrap();

        let hits = index.query("borrow checker", 2, &embedder).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source, "b.txt");
        assert!(hits.iter().all(|h| chunks.contains(&h.chunk)));
        assert!(hits[0].score >= hits[1].score);

        let all = index.query("anything", 10, &embedder).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let embedder = ConstantEmbedder(vec![1.0, 0.0, 0.0]);
        let index = VectorIndex::build(
            vec![chunk("first", "x"), chunk("second", "y"), chunk("third", "z")],
            &embedder,
        )
        .unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_append_keeps_existing_embeddings() {
        let embedder = MockEmbedder::new(32);
        let mut index = VectorIndex::build(vec![chunk("a.txt", "alpha beta")], &embedder).unwrap();
        let before = index.embedding(0).unwrap().to_vec();

        index
            .append(vec![chunk("b.txt", "gamma"), chunk("b.txt", "delta")], &embedder)
            .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.embedding(0).unwrap(), before.as_slice());
        assert_eq!(index.chunk(2).unwrap().text, "delta");
    }

    #[test]
    fn test_append_empty_is_noop() {
        let embedder = MockEmbedder::new(8);
        let mut index = VectorIndex::build(vec![chunk("a.txt", "alpha")], &embedder).unwrap();
        index.append(Vec::new(), &embedder).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = VectorIndex::build(vec![chunk("a.txt", "alpha")], &MockEmbedder::new(8)).unwrap();

        let err = index
            .append(vec![chunk("b.txt", "beta")], &MockEmbedder::new(4))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Model(ModelError::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
        assert_eq!(index.len(), 1, "failed append must not modify the index");

        assert!(index.search(&[1.0; 3], 1).is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_track_source() {
        let mut index = VectorIndex::empty(4);
        let record = SourceRecord {
            size: 10,
            modified_at: Utc::now(),
        };
        index.track_source("a.txt", record);
        assert_eq!(index.sources().get("a.txt"), Some(&record));
        assert!(index.is_empty());
    }
}
