#![doc = "Hub client: creates destination repositories over the HTTP API and pushes clones to them with git."]
//
//! # Uploader Integration (CLI <-> Core)
//!
//! [`HubClient`] implements [`hf_mirror_core::contract::Uploader`] for the
//! Hugging Face Hub:
//!
//! - `ensure_repo` calls `POST /api/repos/create`; `409 Conflict` means the
//!   repository already exists and is accepted.
//! - `push` adds the destination as a git remote of the clone, uploads every
//!   LFS object with `git lfs push --all`, then force-pushes `HEAD` to `main`.
//!   The force push replaces the initial commit a freshly created repository has.
//!
//! The token is sent as a bearer header, both to the API and (through
//! [`Git::with_bearer_auth`]) to git and git-lfs.

use std::path::Path;

use async_trait::async_trait;
use hf_mirror_core::contract::Uploader;
use hf_mirror_core::error::BoxError;
use hf_mirror_core::git::{Git, GitError};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const PUSH_REMOTE: &str = "hf-mirror";

#[derive(Error, Debug)]
pub enum HubError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hub API returned {status} for {url}: {body}")]
    Status {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("invalid Hub URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid repository id {0:?}; expected namespace/name")]
    RepoId(String),
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    name: String,
}

pub struct HubClient {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
    private: bool,
    git: Git,
}

impl HubClient {
    /// `endpoint` must end with `/` (e.g. `https://huggingface.co/`).
    pub fn new(endpoint: Url, token: String, private: bool) -> Result<Self, HubError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hf-mirror/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http_client(http, endpoint, token, private))
    }

    /// Like [`HubClient::new`], with a caller-configured HTTP client.
    pub fn with_http_client(
        http: reqwest::Client,
        endpoint: Url,
        token: String,
        private: bool,
    ) -> Self {
        let git = Git::with_bearer_auth(endpoint.as_str(), token.clone());
        tracing::info!(
            endpoint = %endpoint,
            token_set = !token.is_empty(),
            private,
            "Initialized Hub client"
        );
        Self {
            http,
            endpoint,
            token,
            private,
            git,
        }
    }

    /// Name of the account the token belongs to.
    pub async fn whoami(&self) -> Result<String, HubError> {
        let url = self.endpoint.join("api/whoami-v2")?;
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, url = %url, "whoami request failed");
            return Err(HubError::Status {
                status,
                url: url.to_string(),
                body,
            });
        }
        let who: WhoAmI = response.json().await?;
        tracing::info!(namespace = %who.name, "Resolved namespace from token");
        Ok(who.name)
    }

    /// Git URL of a repository on this Hub.
    pub fn repo_url(&self, repo_id: &str) -> Result<Url, HubError> {
        Ok(self.endpoint.join(repo_id)?)
    }

    async fn create_repo(&self, repo_id: &str) -> Result<(), HubError> {
        let url = self.endpoint.join("api/repos/create")?;
        let body = create_repo_body(repo_id, self.private)?;
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            tracing::info!(repo_id, "Created destination repository");
            return Ok(());
        }
        if status == StatusCode::CONFLICT {
            tracing::info!(repo_id, "Destination repository already exists");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(%status, repo_id, body = %body, "Failed to create destination repository");
        Err(HubError::Status {
            status,
            url: url.to_string(),
            body,
        })
    }

    /// Point the `hf-mirror` remote of `local_path` at `remote`. A clone kept
    /// from an earlier run may already have the remote.
    async fn set_push_remote(&self, local_path: &Path, remote: &Url) -> Result<(), GitError> {
        let existing = self
            .git
            .command()
            .in_dir(local_path)
            .args(["remote", "get-url", PUSH_REMOTE])
            .run()
            .await;
        let action = if existing.is_ok() { "set-url" } else { "add" };
        self.git
            .command()
            .in_dir(local_path)
            .args(["remote", action, PUSH_REMOTE, remote.as_str()])
            .run()
            .await?;
        Ok(())
    }
}

/// Request body for `POST /api/repos/create`.
pub fn create_repo_body(repo_id: &str, private: bool) -> Result<serde_json::Value, HubError> {
    let (namespace, name) = repo_id
        .split_once('/')
        .filter(|(ns, name)| !ns.is_empty() && !name.is_empty() && !name.contains('/'))
        .ok_or_else(|| HubError::RepoId(repo_id.to_string()))?;
    Ok(serde_json::json!({
        "type": "model",
        "name": name,
        "organization": namespace,
        "private": private,
    }))
}

#[async_trait]
impl Uploader for HubClient {
    async fn ensure_repo(&self, repo_id: &str) -> Result<(), BoxError> {
        self.create_repo(repo_id).await?;
        Ok(())
    }

    async fn push(&self, local_path: &Path, repo_id: &str) -> Result<(), BoxError> {
        let remote = self.repo_url(repo_id)?;
        tracing::info!(path = %local_path.display(), repo_id, "Pushing clone to destination");

        self.set_push_remote(local_path, &remote).await?;
        self.git
            .command()
            .in_dir(local_path)
            .args(["lfs", "push", "--all", PUSH_REMOTE])
            .run()
            .await?;
        tracing::info!(repo_id, "Uploaded Git LFS objects");
        self.git
            .command()
            .in_dir(local_path)
            .args(["push", "--force", PUSH_REMOTE, "HEAD:refs/heads/main"])
            .run()
            .await?;
        tracing::info!(repo_id, "Pushed repository history");
        Ok(())
    }
}
