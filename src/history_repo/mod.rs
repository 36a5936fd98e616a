// Bounded on-disk history: one JSON file per snapshot, oldest evicted past the cap.

mod eviction;

use crate::models::Snapshot;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub use eviction::{StateFile, select_evictions};

const STATE_PREFIX: &str = "state_";
const STATE_SUFFIX: &str = ".json";
const TEMP_PREFIX: &str = ".state_";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("create state dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("retention task join: {0}")]
    Task(String),
}

impl PersistError {
    /// Only an unencodable snapshot aborts the rest of the cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PersistError::Serialize(_))
    }
}

/// Outcome of one eviction pass. Individual failures are logged, not raised.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvictionReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub stale_temp_removed: usize,
}

pub struct HistoryRepo {
    dir: PathBuf,
    capacity: usize,
}

impl HistoryRepo {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity: capacity.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a snapshot, second granularity in UTC.
    pub fn file_name(snapshot: &Snapshot) -> String {
        format!(
            "{}{}{}",
            STATE_PREFIX,
            snapshot.timestamp.format("%Y%m%d_%H%M%S"),
            STATE_SUFFIX
        )
    }

    /// Write the snapshot atomically (temp file in the same directory, then
    /// rename) and run an eviction pass. Returns the final path.
    #[instrument(skip(self, snapshot), fields(repo = "history", operation = "persist"))]
    pub async fn persist(&self, snapshot: &Snapshot) -> Result<PathBuf, PersistError> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        let dir = self.dir.clone();
        let capacity = self.capacity;
        let name = Self::file_name(snapshot);

        tokio::task::spawn_blocking(move || {
            let path = write_atomic(&dir, &name, &body)?;
            let report = evict(&dir, capacity);
            if !report.removed.is_empty() || report.stale_temp_removed > 0 {
                debug!(
                    removed = report.removed.len(),
                    stale_temp = report.stale_temp_removed,
                    "eviction pass"
                );
            }
            Ok(path)
        })
        .await
        .map_err(|e| PersistError::Task(e.to_string()))?
    }

    /// Read a retained file back into a snapshot.
    #[instrument(skip(self), fields(repo = "history", operation = "load"))]
    pub async fn load(&self, path: &Path) -> Result<Snapshot, PersistError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path).map_err(|source| PersistError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice(&bytes).map_err(|source| PersistError::Decode { path, source })
        })
        .await
        .map_err(|e| PersistError::Task(e.to_string()))?
    }

    /// Run an eviction pass without writing.
    pub async fn evict(&self) -> Result<EvictionReport, PersistError> {
        let dir = self.dir.clone();
        let capacity = self.capacity;
        tokio::task::spawn_blocking(move || evict(&dir, capacity))
            .await
            .map_err(|e| PersistError::Task(e.to_string()))
    }
}

fn write_atomic(dir: &Path, name: &str, body: &[u8]) -> Result<PathBuf, PersistError> {
    std::fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(name);
    let write_err = |source| PersistError::Write {
        path: path.clone(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(write_err)?;
    tmp.write_all(body).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(&path).map_err(|e| write_err(e.error))?;
    Ok(path)
}

fn is_state_file(name: &str) -> bool {
    name.starts_with(STATE_PREFIX) && name.ends_with(STATE_SUFFIX)
}

fn is_temp_file(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

fn evict(dir: &Path, capacity: usize) -> EvictionReport {
    evict_with(dir, capacity, |path| std::fs::remove_file(path))
}

/// Best-effort: an unreadable directory or entry is logged and skipped.
/// Only regular files count toward the capacity.
fn evict_with(
    dir: &Path,
    capacity: usize,
    mut remove: impl FnMut(&Path) -> std::io::Result<()>,
) -> EvictionReport {
    let mut report = EvictionReport::default();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, path = %dir.display(), "eviction: cannot list state dir");
            return report;
        }
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_temp_file(&name) {
            match remove(entry.path().as_path()) {
                Ok(()) => report.stale_temp_removed += 1,
                Err(e) => warn!(error = %e, path = %entry.path().display(), "eviction: cannot remove temp file"),
            }
            continue;
        }
        if !is_state_file(&name) {
            continue;
        }
        match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => files.push(StateFile {
                name,
                modified,
            }),
            Err(e) => warn!(error = %e, path = %entry.path().display(), "eviction: cannot stat file"),
        }
    }

    for file in select_evictions(files, capacity) {
        let path = dir.join(&file.name);
        match remove(path.as_path()) {
            Ok(()) => report.removed.push(path),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "eviction: cannot remove file");
                report.failed.push(path);
            }
        }
    }
    report
}
