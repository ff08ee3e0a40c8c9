//! Thin wrapper around the `git` executable.
//!
//! Credentials for the Hub are handed to git (and git-lfs) as an HTTP
//! `Authorization` header through `GIT_CONFIG_*` environment variables, scoped
//! to the Hub endpoint. They never appear in argv, URLs or `.git/config`.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("failed to launch git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("`git {args}` exited with {status}: {stderr}")]
    Failed {
        args: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Bearer token sent to every URL below `url_prefix`.
#[derive(Clone)]
struct HttpAuth {
    url_prefix: String,
    token: String,
}

/// Factory for git invocations sharing the same authentication.
#[derive(Clone, Default)]
pub struct Git {
    auth: Option<HttpAuth>,
}

impl Git {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticate requests to `url_prefix` (e.g. `https://huggingface.co/`).
    pub fn with_bearer_auth(url_prefix: impl Into<String>, token: impl Into<String>) -> Self {
        let mut url_prefix = url_prefix.into();
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }
        Self {
            auth: Some(HttpAuth {
                url_prefix,
                token: token.into(),
            }),
        }
    }

    pub fn command(&self) -> GitInvocation {
        let mut command = Command::new("git");
        command
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(auth) = &self.auth {
            command
                .env("GIT_CONFIG_COUNT", "1")
                .env(
                    "GIT_CONFIG_KEY_0",
                    format!("http.{}.extraheader", auth.url_prefix),
                )
                .env(
                    "GIT_CONFIG_VALUE_0",
                    format!("Authorization: Bearer {}", auth.token),
                );
        }
        GitInvocation {
            command,
            args: Vec::new(),
        }
    }
}

pub struct GitInvocation {
    command: Command,
    args: Vec<String>,
}

impl GitInvocation {
    /// Run git as if started in `dir` (`git -C <dir>`).
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.command.arg("-C").arg(dir);
        self.args.push(format!("-C {}", dir.display()));
        self
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self.command.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.command.env(key, value);
        self
    }

    /// Run to completion and return stdout. Non-zero exit is an error carrying stderr.
    pub async fn run(mut self) -> Result<String, GitError> {
        let args = self.args.join(" ");
        debug!(args = %args, "Running git");
        let output = self.command.output().await.map_err(GitError::Spawn)?;
        if !output.status.success() {
            return Err(GitError::Failed {
                args,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
