/// `load_config` module: loads the YAML config, fills in missing credentials
/// from the environment or the user, writes them back and adapts the result
/// into the strongly-typed [`MirrorConfig`].
///
/// # Responsibilities
/// - Parse the user's YAML file into [`FileConfig`]. A missing file is an empty config.
/// - Fill `platform.token`, `git.username` and `git.email` from environment
///   variables, then from an interactive [`Prompter`] when one is available.
/// - Persist anything that was filled in, so the next run does not ask again.
/// - Validate endpoint and repository entries before any work starts.
///
/// # Errors
/// Every failure here is a [`ConfigError`]; the CLI treats all of them as fatal.
///
/// Accepted schema:
///
/// ```yaml
/// platform:
///   token: hf_xxx
///   namespace: my-org
///   private: false
/// git:
///   username: jane
///   email: jane@example.com
/// repositories:
///   - https://huggingface.co/facebook/opt-125m
///   - Qwen/Qwen2-0.5B
/// workdir: models
/// cache_path: .cache/repo_cache.json
/// lfs_track: ["*.bin", "*.pt", "*.ckpt"]
/// ```
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use hf_mirror_core::cache::DEFAULT_CACHE_PATH;
use hf_mirror_core::config::GitIdentity;
use hf_mirror_core::error::MirrorError;
use hf_mirror_core::source::{parse_sources, SourceRepo};
use serde::{Deserialize, Deserializer, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::prompt::Prompter;

pub const DEFAULT_CONFIG_PATH: &str = "hf-mirror.yaml";
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co/";
pub const DEFAULT_WORKDIR: &str = "models";

pub const TOKEN_ENV: &[&str] = &["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"];
pub const NAMESPACE_ENV: &[&str] = &["HF_NAMESPACE", "ORG_NAME"];
pub const GIT_USERNAME_ENV: &[&str] = &["GIT_AUTHOR_NAME"];
pub const GIT_EMAIL_ENV: &[&str] = &["GIT_AUTHOR_EMAIL"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialise config: {0}")]
    Serialise(#[from] serde_yaml::Error),

    #[error("missing credential `{field}`: set it in the config file or export {}", env.join(" or "))]
    MissingCredential {
        field: &'static str,
        env: &'static [&'static str],
    },

    #[error("failed to read `{field}` from the terminal: {source}")]
    Prompt {
        field: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid platform.endpoint {value:?}: {source}")]
    Endpoint {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Repositories(#[from] MirrorError),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub platform: PlatformSection,
    #[serde(default, deserialize_with = "null_as_default")]
    pub git: GitSection,
    #[serde(default, deserialize_with = "null_as_default")]
    pub repositories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub lfs_track: Vec<String>,
}

#[derive(Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl fmt::Debug for PlatformSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformSection")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("namespace", &self.namespace)
            .field("private", &self.private)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl FileConfig {
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let value = self
            .platform
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim();
        let mut url = Url::parse(value).map_err(|source| ConfigError::Endpoint {
            value: value.to_string(),
            source,
        })?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn workdir(&self) -> PathBuf {
        self.workdir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKDIR))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH))
    }

    pub fn sources(&self) -> Result<Vec<SourceRepo>, ConfigError> {
        Ok(parse_sources(&self.repositories, &self.endpoint()?)?)
    }
}

/// Fully resolved configuration for a run.
#[derive(Clone)]
pub struct MirrorConfig {
    pub token: String,
    /// `None` when neither the file nor the environment names one; resolve it from the token.
    pub namespace: Option<String>,
    pub private: bool,
    pub endpoint: Url,
    pub identity: GitIdentity,
    pub sources: Vec<SourceRepo>,
    pub workdir: PathBuf,
    pub cache_path: PathBuf,
    pub lfs_track: Vec<String>,
}

impl fmt::Debug for MirrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorConfig")
            .field("token", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("private", &self.private)
            .field("endpoint", &self.endpoint.as_str())
            .field("identity", &self.identity)
            .field("sources", &self.sources.len())
            .field("workdir", &self.workdir)
            .field("cache_path", &self.cache_path)
            .field("lfs_track", &self.lfs_track)
            .finish()
    }
}

impl MirrorConfig {
    /// Build from a file config whose credentials have already been filled in.
    pub fn resolve(
        file: &FileConfig,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let token = present(&file.platform.token).ok_or(ConfigError::MissingCredential {
            field: "platform.token",
            env: TOKEN_ENV,
        })?;
        let name = present(&file.git.username).ok_or(ConfigError::MissingCredential {
            field: "git.username",
            env: GIT_USERNAME_ENV,
        })?;
        let email = present(&file.git.email).ok_or(ConfigError::MissingCredential {
            field: "git.email",
            env: GIT_EMAIL_ENV,
        })?;
        let namespace = present(&file.platform.namespace)
            .or_else(|| NAMESPACE_ENV.iter().find_map(|key| env(key)));

        Ok(MirrorConfig {
            token,
            namespace,
            private: file.platform.private,
            endpoint: file.endpoint()?,
            identity: GitIdentity { name, email },
            sources: file.sources()?,
            workdir: file.workdir(),
            cache_path: file.cache_path(),
            lfs_track: file.lfs_track.clone(),
        })
    }
}

/// Reads an environment variable, treating blank values as unset.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Reads the YAML config at `path`. A missing file yields an empty config.
pub fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(config_path = ?path, "Config file not found; starting from an empty configuration");
            return Ok(FileConfig::default());
        }
        Err(source) => {
            error!(error = ?source, config_path = ?path, "Failed to read config file");
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|source| {
        error!(error = %source, config_path = ?path, "Failed to parse config YAML");
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Replaces the config at `path` atomically. The file holds the token, so it
/// is written owner-only (mode 0600 on Unix).
pub fn write_config_file(path: &Path, config: &FileConfig) -> Result<(), ConfigError> {
    let yaml = serde_yaml::to_string(config)?;
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(write_err)?;

    // NamedTempFile creates its file with mode 0600.
    let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(yaml.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    info!(config_path = ?path, "Saved configuration");
    Ok(())
}

/// Fills missing credentials from `env`, then from `prompter`.
///
/// Returns whether anything was filled in. Fails with
/// [`ConfigError::MissingCredential`] when a value cannot be obtained.
pub fn fill_missing_credentials(
    file: &mut FileConfig,
    env: &dyn Fn(&str) -> Option<String>,
    mut prompter: Option<&mut (dyn Prompter + '_)>,
) -> Result<bool, ConfigError> {
    let mut changed = false;
    changed |= fill(
        &mut file.platform.token,
        "platform.token",
        "Hugging Face access token",
        TOKEN_ENV,
        env,
        prompter.as_deref_mut(),
    )?;
    changed |= fill(
        &mut file.git.username,
        "git.username",
        "Git user name",
        GIT_USERNAME_ENV,
        env,
        prompter.as_deref_mut(),
    )?;
    changed |= fill(
        &mut file.git.email,
        "git.email",
        "Git email",
        GIT_EMAIL_ENV,
        env,
        prompter.as_deref_mut(),
    )?;
    Ok(changed)
}

fn fill(
    slot: &mut Option<String>,
    field: &'static str,
    label: &str,
    env_keys: &'static [&'static str],
    env: &dyn Fn(&str) -> Option<String>,
    prompter: Option<&mut (dyn Prompter + '_)>,
) -> Result<bool, ConfigError> {
    if present(slot).is_some() {
        return Ok(false);
    }
    if let Some((key, value)) = env_keys
        .iter()
        .find_map(|key| env(key).map(|value| (*key, value)))
    {
        info!(field, env = key, "Using credential from environment");
        *slot = Some(value.trim().to_string());
        return Ok(true);
    }
    let answer = match prompter {
        Some(prompter) => prompter
            .ask(label)
            .map_err(|source| ConfigError::Prompt { field, source })?,
        None => None,
    };
    match answer {
        Some(value) => {
            info!(field, "Using credential entered interactively");
            *slot = Some(value);
            Ok(true)
        }
        None => {
            error!(field, env = ?env_keys, "Missing credential");
            Err(ConfigError::MissingCredential {
                field,
                env: env_keys,
            })
        }
    }
}

/// Loads the config at `path`, fills missing credentials, writes the file
/// back when anything was filled in, and resolves the result.
pub fn load_config(
    path: &Path,
    env: &dyn Fn(&str) -> Option<String>,
    prompter: Option<&mut (dyn Prompter + '_)>,
) -> Result<MirrorConfig> {
    let mut file = read_config_file(path)?;
    if fill_missing_credentials(&mut file, env, prompter)? {
        write_config_file(path, &file)?;
    }
    let config = MirrorConfig::resolve(&file, env)?;
    info!(
        config_path = ?path,
        sources = config.sources.len(),
        namespace = config.namespace.as_deref().unwrap_or("<from token>"),
        "Config loaded and resolved"
    );
    Ok(config)
}
