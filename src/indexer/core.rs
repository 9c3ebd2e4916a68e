use crate::embedder::Embedder;
use crate::error::{Error, PersistenceError, ResetFailure, Result};
use crate::indexer::chunker::{Chunk, Chunker};
use crate::indexer::loader;
use crate::uploads::{FileStore, SourceFile};
use crate::vector::{ScoredChunk, VectorIndex};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Outcome of one ingest pass over the upload directory.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Files loaded and embedded in this pass.
    pub indexed: usize,
    /// Files already in the index and unchanged.
    pub skipped: usize,
    pub chunks_added: usize,
    /// The whole directory was re-embedded.
    pub rebuilt: bool,
    /// An index is available afterwards.
    pub built: bool,
}

/// Lifecycle of the in-memory index.
#[derive(Debug)]
pub enum IndexState {
    Empty,
    Built(VectorIndex),
}

/// Owns the vector index and every transition between EMPTY and BUILT.
///
/// Mutations (ingest, upload, reset) hold the write lock for their whole
/// duration; retrieval only needs the read lock. Parsing, embedding and file
/// I/O run on the blocking pool while the guard is held.
pub struct IndexManager {
    state: Arc<RwLock<IndexState>>,
    pipeline: Arc<Pipeline>,
}

/// The parts of an ingest that run off the async workers.
struct Pipeline {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    files: FileStore,
    index_path: PathBuf,
}

impl IndexManager {
    /// Restore the persisted index at `index_path` if there is one.
    ///
    /// A corrupt file is an error. An index built with a different embedding
    /// size is ignored and gets rebuilt on the next ingest.
    pub fn open(
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        files: FileStore,
        index_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let index_path = index_path.into();
        let state = match VectorIndex::load(&index_path) {
            Ok(index) if index.dimensions() != embedder.dimensions() => {
                warn!(
                    "Ignoring persisted index with {} dimensions (embedder has {})",
                    index.dimensions(),
                    embedder.dimensions()
                );
                IndexState::Empty
            }
            Ok(index) => {
                info!(
                    "Restored index with {} chunks from {}",
                    index.len(),
                    index_path.display()
                );
                IndexState::Built(index)
            }
            Err(PersistenceError::Missing(_)) => {
                debug!("No persisted index at {}", index_path.display());
                IndexState::Empty
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            pipeline: Arc::new(Pipeline {
                embedder,
                chunker,
                files,
                index_path,
            }),
        })
    }

    #[must_use]
    pub fn files(&self) -> &FileStore {
        &self.pipeline.files
    }

    #[must_use]
    pub fn index_path(&self) -> &Path {
        &self.pipeline.index_path
    }

    pub async fn is_built(&self) -> bool {
        matches!(*self.state.read().await, IndexState::Built(_))
    }

    /// Number of chunks in the index (zero when EMPTY).
    pub async fn chunk_count(&self) -> usize {
        match &*self.state.read().await {
            IndexState::Built(index) => index.len(),
            IndexState::Empty => 0,
        }
    }

    /// Names of the files covered by the index.
    pub async fn indexed_sources(&self) -> Vec<String> {
        match &*self.state.read().await {
            IndexState::Built(index) => index.sources().keys().cloned().collect(),
            IndexState::Empty => Vec::new(),
        }
    }

    /// Bring the index in line with the upload directory.
    pub async fn sync(&self) -> Result<SyncReport> {
        let mut state = Arc::clone(&self.state).write_owned().await;
        let pipeline = Arc::clone(&self.pipeline);
        run_blocking(move || pipeline.sync_locked(&mut state)).await
    }

    /// Store an upload and index it, as one serialised mutation.
    pub async fn upload(&self, name: &str, bytes: &[u8]) -> Result<SyncReport> {
        let mut state = Arc::clone(&self.state).write_owned().await;
        let pipeline = Arc::clone(&self.pipeline);
        let (name, bytes) = (name.to_owned(), bytes.to_vec());
        run_blocking(move || {
            pipeline.files.save(&name, &bytes)?;
            pipeline.sync_locked(&mut state)
        })
        .await
    }

    /// The `k` chunks most similar to `question`.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let state = Arc::clone(&self.state).read_owned().await;
        if matches!(*state, IndexState::Empty) {
            return Err(Error::NotInitialized);
        }
        let pipeline = Arc::clone(&self.pipeline);
        let question = question.to_owned();
        run_blocking(move || match &*state {
            IndexState::Built(index) => index.query(&question, k, pipeline.embedder.as_ref()),
            IndexState::Empty => Err(Error::NotInitialized),
        })
        .await
    }

    /// Drop the index, delete its file and every stored source file.
    ///
    /// Every step runs even when an earlier one fails; failures are reported
    /// together.
    pub async fn reset(&self) -> Result<()> {
        let mut state = Arc::clone(&self.state).write_owned().await;
        *state = IndexState::Empty;
        let pipeline = Arc::clone(&self.pipeline);
        run_blocking(move || {
            let failures = pipeline.purge();
            // The write guard is held until the files are gone.
            drop(state);
            if failures.is_empty() {
                info!("Index and uploaded documents deleted");
                Ok(())
            } else {
                Err(Error::PartialReset { failures })
            }
        })
        .await
    }
}

impl Pipeline {
    fn purge(&self) -> Vec<ResetFailure> {
        let mut failures = Vec::new();
        if let Err(e) = remove_if_exists(&self.index_path) {
            warn!("Failed to delete {}: {e}", self.index_path.display());
            failures.push(ResetFailure {
                path: self.index_path.clone(),
                reason: e.to_string(),
            });
        }
        failures.extend(self.files.purge());
        failures
    }

    fn sync_locked(&self, state: &mut IndexState) -> Result<SyncReport> {
        let snapshot = self.files.snapshot()?;

        let IndexState::Built(current) = &*state else {
            return self.rebuild(state, &snapshot);
        };

        let stale = current.sources().iter().find(|(name, record)| {
            !snapshot
                .iter()
                .any(|f| &f.name == *name && f.record == **record)
        });
        if let Some((name, _)) = stale {
            info!("{name} changed or was removed since indexing, rebuilding");
            return self.rebuild(state, &snapshot);
        }

        let (new, known): (Vec<&SourceFile>, Vec<&SourceFile>) = snapshot
            .iter()
            .partition(|f| !current.sources().contains_key(&f.name));
        if new.is_empty() {
            debug!("No new documents to index");
            return Ok(SyncReport {
                skipped: known.len(),
                built: true,
                ..SyncReport::default()
            });
        }

        let chunks = self.load_chunks(&new);
        let chunks_added = chunks.len();
        let mut candidate = current.clone();
        candidate.append(chunks, self.embedder.as_ref())?;
        for file in &new {
            candidate.track_source(file.name.clone(), file.record);
        }
        candidate.save(&self.index_path)?;

        info!(
            "Appended {} chunks from {} new documents",
            chunks_added,
            new.len()
        );
        *state = IndexState::Built(candidate);
        Ok(SyncReport {
            indexed: new.len(),
            skipped: known.len(),
            chunks_added,
            rebuilt: false,
            built: true,
        })
    }

    fn rebuild(&self, state: &mut IndexState, snapshot: &[SourceFile]) -> Result<SyncReport> {
        let files: Vec<&SourceFile> = snapshot.iter().collect();
        let chunks = self.load_chunks(&files);

        if chunks.is_empty() {
            if matches!(state, IndexState::Built(_)) {
                remove_if_exists(&self.index_path).map_err(|source| PersistenceError::Io {
                    path: self.index_path.clone(),
                    source,
                })?;
                *state = IndexState::Empty;
            }
            info!("No indexable content in {}", self.files.dir().display());
            return Ok(SyncReport::default());
        }

        let chunks_added = chunks.len();
        let mut candidate = VectorIndex::build(chunks, self.embedder.as_ref())?;
        for file in &files {
            candidate.track_source(file.name.clone(), file.record);
        }
        candidate.save(&self.index_path)?;

        info!(
            "Built index with {} chunks from {} documents",
            chunks_added,
            files.len()
        );
        *state = IndexState::Built(candidate);
        Ok(SyncReport {
            indexed: files.len(),
            skipped: 0,
            chunks_added,
            rebuilt: true,
            built: true,
        })
    }

    fn load_chunks(&self, files: &[&SourceFile]) -> Vec<Chunk> {
        let docs = loader::load_files(files.iter().map(|f| f.path.clone()));
        self.chunker.split_documents(docs)
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
