use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned across the [`crate::contract`] trait seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while mirroring repositories.
///
/// Only `Configuration` aborts a run. Every other variant is scoped to the
/// repository being processed and is recorded in the run report.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to upload to {target}: {source}")]
    Upload {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to remove scratch directory {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl MirrorError {
    /// Short name of the failed step, used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorError::Configuration(_) => "configuration",
            MirrorError::Clone { .. } => "clone",
            MirrorError::Upload { .. } => "upload",
            MirrorError::Cleanup { .. } => "cleanup",
            MirrorError::Cache(_) => "cache",
        }
    }
}

/// Failures reading or writing the processed-repository cache file.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to read cache file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write cache file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialise cache: {0}")]
    Serialise(#[from] serde_json::Error),
}
