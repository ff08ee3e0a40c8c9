//! High-level pipeline: drives every configured repository through
//! clone → upload → cache update → cleanup.
//!
//! # Per-repository states
//! `pending → cloned → uploaded → cleaned`, with `failed` reachable from the
//! clone and upload steps. Repositories are processed strictly one after the
//! other and a failure never stops the loop.
//!
//! # Ordering
//! The cache entry is written immediately after a successful push and before
//! cleanup, so an interruption between the two still leaves the repository
//! recorded as complete. A clone is only deleted once its upload is recorded.
//! Failed clones and uploads keep their scratch directory. A complete clone
//! whose upload failed is reused by the next run; an incomplete one is refused.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Output: [`SynchroniseReport`] with one [`RepoReport`] per source.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::cache::RepoCache;
use crate::config::SynchroniseConfig;
use crate::contract::{Cloner, Uploader};
use crate::error::{BoxError, MirrorError};
use crate::source::SourceRepo;

#[derive(Debug)]
pub enum RepoOutcome {
    /// Already recorded in the cache; nothing was invoked.
    Skipped,
    /// Uploaded, recorded and cleaned up (or kept on request).
    Completed { target: String, elapsed: Duration },
    /// Uploaded and recorded, but the scratch directory could not be removed.
    CompletedWithLeftovers {
        target: String,
        elapsed: Duration,
        error: MirrorError,
    },
    Failed(MirrorError),
}

#[derive(Debug)]
pub struct RepoReport {
    pub source: SourceRepo,
    pub outcome: RepoOutcome,
}

#[derive(Debug, Default)]
pub struct SynchroniseReport {
    pub repos: Vec<RepoReport>,
}

impl SynchroniseReport {
    pub fn failed(&self) -> impl Iterator<Item = &RepoReport> {
        self.repos
            .iter()
            .filter(|r| matches!(r.outcome, RepoOutcome::Failed(_)))
    }

    pub fn completed_count(&self) -> usize {
        self.repos
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    RepoOutcome::Completed { .. } | RepoOutcome::CompletedWithLeftovers { .. }
                )
            })
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.repos
            .iter()
            .filter(|r| matches!(r.outcome, RepoOutcome::Skipped))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

pub async fn synchronise<C, U>(
    config: &SynchroniseConfig,
    cloner: &C,
    uploader: &U,
    cache: &RepoCache,
) -> SynchroniseReport
where
    C: Cloner + ?Sized,
    U: Uploader + ?Sized,
{
    info!(
        sources = config.sources.len(),
        namespace = %config.namespace,
        "[SYNC] Starting mirror run"
    );

    let mut report = SynchroniseReport::default();
    for source in &config.sources {
        let outcome = process_one(config, cloner, uploader, cache, source).await;
        match &outcome {
            RepoOutcome::Skipped => {}
            RepoOutcome::Completed { target, elapsed } => {
                info!(repo_url = %source.url, target = %target, elapsed_secs = elapsed.as_secs_f64(), "[SYNC] Repository mirrored");
            }
            RepoOutcome::CompletedWithLeftovers { target, error, .. } => {
                warn!(repo_url = %source.url, target = %target, error = %error, "[SYNC] Repository mirrored but scratch directory remains");
            }
            RepoOutcome::Failed(e) => {
                error!(repo_url = %source.url, kind = e.kind(), error = %e, "[SYNC][ERROR] Repository failed; moving to the next one");
            }
        }
        report.repos.push(RepoReport {
            source: source.clone(),
            outcome,
        });
    }

    info!(
        completed = report.completed_count(),
        skipped = report.skipped_count(),
        failed = report.failed().count(),
        "[SYNC] Mirror run finished"
    );
    report
}

async fn process_one<C, U>(
    config: &SynchroniseConfig,
    cloner: &C,
    uploader: &U,
    cache: &RepoCache,
    source: &SourceRepo,
) -> RepoOutcome
where
    C: Cloner + ?Sized,
    U: Uploader + ?Sized,
{
    match cache.is_processed(&source.url) {
        Ok(true) => {
            info!(repo_url = %source.url, "[SYNC] Already processed; skipping");
            return RepoOutcome::Skipped;
        }
        Ok(false) => {}
        Err(e) => return RepoOutcome::Failed(e.into()),
    }

    let started = Instant::now();
    let scratch = config.scratch_dir(source);
    let target = source.target(&config.namespace);

    // --- Clone ---
    if let Err(e) = cloner.clone_repo(source, &scratch).await {
        if scratch.exists() {
            warn!(path = %scratch.display(), "[SYNC] Partial clone left on disk");
        }
        return RepoOutcome::Failed(MirrorError::Clone {
            url: source.url.clone(),
            source: e,
        });
    }
    info!(repo_url = %source.url, path = %scratch.display(), "[SYNC] Cloned");

    // --- Upload ---
    let uploaded: Result<(), BoxError> = async {
        uploader.ensure_repo(&target).await?;
        uploader.push(&scratch, &target).await
    }
    .await;
    if let Err(e) = uploaded {
        warn!(path = %scratch.display(), "[SYNC] Upload failed; keeping local clone for the next run");
        return RepoOutcome::Failed(MirrorError::Upload {
            target,
            source: e,
        });
    }
    info!(target = %target, "[SYNC][UPLOAD] Pushed");

    // --- Record ---
    if let Err(e) = cache.mark_processed(&source.url, &target) {
        warn!(path = %scratch.display(), "[SYNC] Upload could not be recorded; keeping local clone");
        return RepoOutcome::Failed(e.into());
    }

    // --- Cleanup ---
    let elapsed = started.elapsed();
    if config.keep_clones {
        info!(path = %scratch.display(), "[SYNC] Keeping local clone as requested");
        return RepoOutcome::Completed { target, elapsed };
    }
    match remove_scratch(scratch) {
        Ok(()) => RepoOutcome::Completed { target, elapsed },
        Err(error) => RepoOutcome::CompletedWithLeftovers {
            target,
            elapsed,
            error,
        },
    }
}

fn remove_scratch(path: PathBuf) -> Result<(), MirrorError> {
    match fs::remove_dir_all(&path) {
        Ok(()) => {
            info!(path = %path.display(), "[SYNC] Removed local clone");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(MirrorError::Cleanup { path, source }),
    }
}
