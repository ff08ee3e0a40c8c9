//! # contract: the seams between the driver loop and the outside world
//!
//! The driver only talks to git and to the Hub through the two traits below.
//! Production implementations are [`crate::download::GitCloner`] and the Hub
//! client in the `hf-mirror` crate; tests use the `mockall` mocks generated
//! when the `test-export-mocks` feature is on.

use std::path::Path;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::BoxError;
use crate::source::SourceRepo;

/// Downloads a source repository, large files included, into a local directory.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Cloner: Send + Sync {
    /// Clone `source` into `dest`. An existing `dest` is only accepted when it
    /// holds a complete clone from an earlier run, which is reused as is.
    ///
    /// On failure a partially populated `dest` may remain; callers decide what to do with it.
    async fn clone_repo(&self, source: &SourceRepo, dest: &Path) -> Result<(), BoxError>;
}

/// Publishes a local clone to a repository on the destination platform.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Make sure `repo_id` (`namespace/name`) exists, creating it if needed.
    async fn ensure_repo(&self, repo_id: &str) -> Result<(), BoxError>;

    /// Push everything in `local_path`, LFS objects included, to `repo_id`.
    async fn push(&self, local_path: &Path, repo_id: &str) -> Result<(), BoxError>;
}
