use std::path::PathBuf;

use tracing::{debug, info};

use crate::source::SourceRepo;

/// Author identity for commits made in scratch clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

/// Everything the driver loop needs for one run.
#[derive(Debug, Clone)]
pub struct SynchroniseConfig {
    /// Root under which each repository gets its own scratch directory.
    pub workdir: PathBuf,
    /// Destination user or organization.
    pub namespace: String,
    pub sources: Vec<SourceRepo>,
    /// Leave scratch directories on disk after a successful upload.
    pub keep_clones: bool,
}

impl SynchroniseConfig {
    pub fn scratch_dir(&self, source: &SourceRepo) -> PathBuf {
        self.workdir.join(&source.name)
    }

    pub fn trace_loaded(&self) {
        info!(
            workdir = %self.workdir.display(),
            namespace = %self.namespace,
            sources_count = self.sources.len(),
            keep_clones = self.keep_clones,
            "Loaded synchronise config"
        );
        debug!(?self, "Synchronise config loaded (full debug)");
    }
}
