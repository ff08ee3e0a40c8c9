//! Persisted record of repositories that have been fully uploaded.
//!
//! The JSON file is the source of truth: every query re-reads it and every
//! update is a read-modify-write followed by an atomic rename. A missing or
//! empty file means nothing has been processed yet.
//!
//! ```json
//! {
//!   "https://huggingface.co/facebook/opt-125m": {
//!     "status": "uploaded",
//!     "target": "my-org/opt-125m",
//!     "uploaded_at": "2024-08-01T12:00:00Z"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::CacheError;

/// Default location, relative to the working directory.
pub const DEFAULT_CACHE_PATH: &str = ".cache/repo_cache.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Uploaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

pub type CacheMap = BTreeMap<String, CacheEntry>;

enum Snapshot {
    Entries(CacheMap),
    Corrupt(serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RepoCache {
    path: PathBuf,
}

impl RepoCache {
    /// Handle to the cache at `path`. Nothing is touched on disk yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Like [`RepoCache::new`], but creates an empty cache file when none exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache = Self::new(path);
        if !cache.path.exists() {
            cache.store(&CacheMap::new())?;
            info!(path = %cache.path.display(), "Created empty repository cache");
        }
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_processed(&self, repo_id: &str) -> Result<bool, CacheError> {
        Ok(self
            .load()?
            .get(repo_id)
            .is_some_and(|entry| entry.status == EntryStatus::Uploaded))
    }

    pub fn get(&self, repo_id: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.load()?.remove(repo_id))
    }

    /// Record `repo_id` as uploaded to `target`.
    pub fn mark_processed(&self, repo_id: &str, target: &str) -> Result<(), CacheError> {
        let mut entries = self.load()?;
        entries.insert(
            repo_id.to_string(),
            CacheEntry {
                status: EntryStatus::Uploaded,
                target: Some(target.to_string()),
                uploaded_at: Some(Utc::now()),
            },
        );
        self.store(&entries)?;
        info!(repo_id, target, path = %self.path.display(), "Marked repository as processed");
        Ok(())
    }

    /// Drop the entry for `repo_id`. Returns whether there was one.
    pub fn forget(&self, repo_id: &str) -> Result<bool, CacheError> {
        let mut entries = self.load()?;
        if entries.remove(repo_id).is_none() {
            return Ok(false);
        }
        self.store(&entries)?;
        info!(repo_id, "Removed repository from cache");
        Ok(true)
    }

    /// Entries as currently on disk. Unlike updates, this never repairs the
    /// file: a corrupt cache is reported as empty and left where it is.
    pub fn entries(&self) -> Result<CacheMap, CacheError> {
        match self.read()? {
            Snapshot::Entries(entries) => Ok(entries),
            Snapshot::Corrupt(e) => {
                warn!(
                    error = %e,
                    path = %self.path.display(),
                    "Cache file is corrupted; reporting it as empty"
                );
                Ok(CacheMap::new())
            }
        }
    }

    /// Entries for a pipeline step. A corrupt file is moved aside first.
    fn load(&self) -> Result<CacheMap, CacheError> {
        match self.read()? {
            Snapshot::Entries(entries) => Ok(entries),
            Snapshot::Corrupt(e) => {
                let aside = self.corrupt_path();
                warn!(
                    error = %e,
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    "Cache file is corrupted; moving it aside and starting empty"
                );
                fs::rename(&self.path, &aside).map_err(|source| CacheError::Write {
                    path: aside.clone(),
                    source,
                })?;
                Ok(CacheMap::new())
            }
        }
    }

    fn read(&self) -> Result<Snapshot, CacheError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cache file yet; treating as empty");
                return Ok(Snapshot::Entries(CacheMap::new()));
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Snapshot::Entries(CacheMap::new()));
        }
        Ok(match serde_json::from_str(&content) {
            Ok(entries) => Snapshot::Entries(entries),
            Err(e) => Snapshot::Corrupt(e),
        })
    }

    fn store(&self, entries: &CacheMap) -> Result<(), CacheError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let write_err = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };
        fs::create_dir_all(&dir).map_err(write_err)?;

        let json = serde_json::to_string_pretty(entries)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }
}
