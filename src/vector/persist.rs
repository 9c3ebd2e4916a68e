//! Single-file persistence for [`VectorIndex`].
//!
//! Layout: the 8-byte magic `DOCQAIX1`, the manifest length as a little-endian
//! `u64`, a JSON manifest (dimensions, source records, chunk payloads), then
//! every embedding as little-endian `f32`s in insertion order.
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{SourceRecord, VectorIndex};
use crate::error::PersistenceError;
use crate::indexer::chunker::Chunk;

const MAGIC: &[u8; 8] = b"DOCQAIX1";
const HEADER_LEN: usize = MAGIC.len() + 8;

#[derive(Serialize)]
struct ManifestRef<'a> {
    dimensions: usize,
    sources: &'a BTreeMap<String, SourceRecord>,
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct Manifest {
    dimensions: usize,
    #[serde(default)]
    sources: BTreeMap<String, SourceRecord>,
    chunks: Vec<Chunk>,
}

/// Serialize a float32 vector into little-endian bytes.
fn serialize_vector(vec: &[f32], out: &mut Vec<u8>) {
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

impl VectorIndex {
    /// Write the index to `path`, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let manifest = serde_json::to_vec(&ManifestRef {
            dimensions: self.dimensions,
            sources: &self.sources,
            chunks: &self.chunks,
        })?;

        let mut payload = Vec::with_capacity(self.vectors.len() * self.dimensions * 4);
        for v in &self.vectors {
            serialize_vector(v, &mut payload);
        }

        let tmp = tmp_path(path);
        {
            let file = File::create(&tmp).map_err(io_err)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(MAGIC).map_err(io_err)?;
            writer
                .write_all(&(manifest.len() as u64).to_le_bytes())
                .map_err(io_err)?;
            writer.write_all(&manifest).map_err(io_err)?;
            writer.write_all(&payload).map_err(io_err)?;
            let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp, path).map_err(io_err)?;

        info!(
            "Saved index ({} chunks, {} sources) to {}",
            self.len(),
            self.sources.len(),
            path.display()
        );
        Ok(())
    }

    /// Restore an index written by [`VectorIndex::save`].
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistenceError::Missing(path.to_path_buf()));
            }
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let corrupt = |reason: String| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(corrupt("missing index header".to_string()));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
        let manifest_len = usize::try_from(u64::from_le_bytes(len_bytes))
            .map_err(|_| corrupt("manifest length overflows".to_string()))?;

        let manifest_end = HEADER_LEN
            .checked_add(manifest_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| corrupt("truncated manifest".to_string()))?;
        let manifest: Manifest = serde_json::from_slice(&bytes[HEADER_LEN..manifest_end])
            .map_err(|e| corrupt(format!("invalid manifest: {e}")))?;

        let payload = &bytes[manifest_end..];
        let expected = manifest
            .chunks
            .len()
            .checked_mul(manifest.dimensions)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| corrupt("vector payload size overflows".to_string()))?;
        if payload.len() != expected {
            return Err(corrupt(format!(
                "expected {expected} bytes of vectors, found {}",
                payload.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = if manifest.dimensions == 0 {
            vec![Vec::new(); manifest.chunks.len()]
        } else {
            payload
                .chunks_exact(manifest.dimensions * 4)
                .map(|row| {
                    row.chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect()
                })
                .collect()
        };

        debug!(
            "Loaded {} vectors of {} dimensions from {}",
            vectors.len(),
            manifest.dimensions,
            path.display()
        );

        Ok(Self {
            dimensions: manifest.dimensions,
            vectors,
            chunks: manifest.chunks,
            sources: manifest.sources,
        })
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
