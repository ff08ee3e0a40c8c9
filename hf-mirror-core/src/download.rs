//! Clone step: fetch a source repository with all of its Git LFS content.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::GitIdentity;
use crate::contract::Cloner;
use crate::error::BoxError;
use crate::git::Git;
use crate::source::SourceRepo;

/// [`Cloner`] backed by the `git` and `git-lfs` executables.
pub struct GitCloner {
    git: Git,
    identity: GitIdentity,
    lfs_track: Vec<String>,
}

impl GitCloner {
    pub fn new(git: Git, identity: GitIdentity) -> Self {
        Self {
            git,
            identity,
            lfs_track: Vec::new(),
        }
    }

    /// Extra patterns to route through LFS after cloning (e.g. `*.bin`).
    pub fn with_lfs_track(mut self, patterns: Vec<String>) -> Self {
        self.lfs_track = patterns;
        self
    }

    /// Make sure every configured pattern is tracked by LFS, committing the
    /// `.gitattributes` change with the configured identity when needed.
    async fn track_patterns(&self, dest: &Path) -> Result<(), BoxError> {
        let attributes = match fs::read_to_string(dest.join(".gitattributes")) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let missing = untracked_patterns(&attributes, &self.lfs_track);
        if missing.is_empty() {
            debug!(path = %dest.display(), "All configured LFS patterns already tracked");
            return Ok(());
        }

        info!(patterns = ?missing, path = %dest.display(), "Tracking additional patterns with Git LFS");
        self.git
            .command()
            .in_dir(dest)
            .args(["lfs", "track"])
            .args(&missing)
            .run()
            .await?;
        self.git
            .command()
            .in_dir(dest)
            .args(["add", ".gitattributes"])
            .run()
            .await?;
        self.git
            .command()
            .in_dir(dest)
            .arg("-c")
            .arg(format!("user.name={}", self.identity.name))
            .arg("-c")
            .arg(format!("user.email={}", self.identity.email))
            .args(["commit", "-m"])
            .arg(format!("Track {} with Git LFS", missing.join(", ")))
            .run()
            .await?;
        Ok(())
    }
}

/// Written inside `.git` once a clone has all of its content, so it is never pushed.
pub const CLONE_COMPLETE_MARKER: &str = ".git/hf-mirror-clone-complete";

/// Whether `dest` holds a clone that finished, LFS objects included.
pub fn is_complete_clone(dest: &Path) -> bool {
    dest.join(CLONE_COMPLETE_MARKER).is_file()
}

pub fn mark_clone_complete(dest: &Path) -> std::io::Result<()> {
    fs::write(dest.join(CLONE_COMPLETE_MARKER), b"")
}

#[async_trait]
impl Cloner for GitCloner {
    async fn clone_repo(&self, source: &SourceRepo, dest: &Path) -> Result<(), BoxError> {
        if is_complete_clone(dest) {
            info!(repo_url = %source.url, path = %dest.display(), "Reusing complete clone from an earlier run");
            return Ok(());
        }
        if dest.exists() {
            return Err(format!(
                "scratch directory {} holds an incomplete clone; inspect or remove it before retrying",
                dest.display()
            )
            .into());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(repo_url = %source.url, path = %dest.display(), "Cloning repository");
        // Smudging is deferred; `lfs pull` below must succeed or the clone
        // only holds pointer files.
        self.git
            .command()
            .env("GIT_LFS_SKIP_SMUDGE", "1")
            .arg("clone")
            .arg(&source.url)
            .arg(dest)
            .run()
            .await?;
        self.git
            .command()
            .in_dir(dest)
            .args(["lfs", "install", "--local"])
            .run()
            .await?;
        self.git
            .command()
            .in_dir(dest)
            .args(["lfs", "pull"])
            .run()
            .await?;
        info!(repo_url = %source.url, path = %dest.display(), "Fetched Git LFS objects");

        if !self.lfs_track.is_empty() {
            self.track_patterns(dest).await?;
        }
        mark_clone_complete(dest)?;
        Ok(())
    }
}

/// Patterns from `wanted` that have no `filter=lfs` rule in `gitattributes`.
pub fn untracked_patterns(gitattributes: &str, wanted: &[String]) -> Vec<String> {
    wanted
        .iter()
        .filter(|pattern| {
            !gitattributes.lines().any(|line| {
                let mut fields = line.split_whitespace();
                fields.next() == Some(pattern.as_str()) && fields.any(|f| f == "filter=lfs")
            })
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_patterns_without_lfs_filter() {
        let attributes = "*.bin filter=lfs diff=lfs merge=lfs -text\n*.pt -text\n";
        let wanted = vec!["*.bin".to_string(), "*.pt".to_string(), "*.ckpt".to_string()];
        assert_eq!(
            untracked_patterns(attributes, &wanted),
            vec!["*.pt".to_string(), "*.ckpt".to_string()]
        );
    }

    #[test]
    fn nothing_missing_when_all_tracked() {
        let attributes = "*.safetensors filter=lfs diff=lfs merge=lfs -text";
        assert!(untracked_patterns(attributes, &["*.safetensors".to_string()]).is_empty());
    }
}
