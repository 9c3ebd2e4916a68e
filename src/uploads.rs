//! Upload directory management: storing, listing and purging source files.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::is_allowed_file;
use crate::error::{Error, ResetFailure, Result};
use crate::indexer::loader::discover;
use crate::vector::SourceRecord;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static pattern compiles"));

/// A file in the upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDocument {
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Reduce an uploaded file name to a safe, flat name.
///
/// Returns `None` when nothing usable is left.
#[must_use]
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let replaced = UNSAFE_CHARS.replace_all(base.trim(), "_");
    let cleaned = replaced.trim_start_matches(['.', '_']).trim_end_matches('_');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// A recognised file as seen by ingestion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub record: SourceRecord,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` under a sanitised version of `name`, replacing any file of
    /// the same name. Returns the stored path.
    pub fn save(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let safe = sanitize_file_name(name)
            .ok_or_else(|| Error::Upload(format!("invalid file name {name:?}")))?;
        if !is_allowed_file(Path::new(&safe)) {
            return Err(Error::Upload(format!(
                "{safe}: only pdf, docx, xlsx and txt files are accepted"
            )));
        }

        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let path = self.dir.join(&safe);
        fs::write(&path, bytes).map_err(|e| Error::io(&path, e))?;
        info!("Stored upload {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Every recognised file, sorted by name.
    pub fn list(&self) -> Result<Vec<StoredDocument>> {
        let mut docs = Vec::new();
        for path in discover(&self.dir) {
            let meta = fs::metadata(&path).map_err(|e| Error::io(&path, e))?;
            let created = meta.created().or_else(|_| meta.modified());
            let created_at = created
                .map(DateTime::<Utc>::from)
                .map_err(|e| Error::io(&path, e))?;
            docs.push(StoredDocument {
                name: file_name(&path),
                size: meta.len(),
                created_at,
            });
        }
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(docs)
    }

    /// Size and modification time of every recognised file, in discovery
    /// order.
    pub fn snapshot(&self) -> Result<Vec<SourceFile>> {
        discover(&self.dir)
            .into_iter()
            .map(|path| {
                let record = source_record(&path)?;
                Ok(SourceFile {
                    name: file_name(&path),
                    path,
                    record,
                })
            })
            .collect()
    }

    /// Remove every recognised file. Files that cannot be removed are
    /// reported, the rest are still deleted.
    pub fn purge(&self) -> Vec<ResetFailure> {
        let mut failures = Vec::new();
        for path in discover(&self.dir) {
            match fs::remove_file(&path) {
                Ok(()) => info!("Deleted {}", path.display()),
                Err(e) => {
                    warn!("Failed to delete {}: {e}", path.display());
                    failures.push(ResetFailure {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        failures
    }
}

fn source_record(path: &Path) -> Result<SourceRecord> {
    let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    let modified = meta.modified().map_err(|e| Error::io(path, e))?;
    Ok(SourceRecord {
        size: meta.len(),
        modified_at: DateTime::<Utc>::from(modified),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
