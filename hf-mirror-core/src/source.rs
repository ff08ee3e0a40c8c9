//! Source repository identifiers: parsing, canonicalisation and validation.

use std::collections::HashMap;

use tracing::warn;
use url::Url;

use crate::error::MirrorError;

/// A repository to mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepo {
    /// Canonical clone URL. Also the cache key.
    pub url: String,
    /// Last path segment of the source; names the scratch directory and the target.
    pub name: String,
}

impl SourceRepo {
    /// Parse a configured entry.
    ///
    /// Accepts full URLs (`https://huggingface.co/facebook/opt-125m`),
    /// `owner/name` shorthand resolved against `endpoint`, and scp-like git
    /// addresses (`git@host:owner/name.git`). Trailing `/` and `.git` are
    /// dropped so different spellings of one repository share a cache entry.
    pub fn parse(raw: &str, endpoint: &Url) -> Result<Self, MirrorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MirrorError::Configuration(
                "empty repository entry".to_string(),
            ));
        }

        if raw.contains("://") {
            let url = Url::parse(raw).map_err(|e| {
                MirrorError::Configuration(format!("invalid repository URL {raw:?}: {e}"))
            })?;
            return Self::from_url(url, raw);
        }

        if is_shorthand(raw) {
            let url = endpoint.join(raw).map_err(|e| {
                MirrorError::Configuration(format!("invalid repository id {raw:?}: {e}"))
            })?;
            return Self::from_url(url, raw);
        }

        if let Some((_, path)) = raw.split_once(':') {
            if raw.contains('@') && !path.is_empty() {
                let url = strip_repo_suffix(raw).to_string();
                let name = last_segment(path)
                    .ok_or_else(|| invalid_entry(raw))?
                    .to_string();
                return Ok(Self { url, name });
            }
        }

        Err(invalid_entry(raw))
    }

    fn from_url(mut url: Url, raw: &str) -> Result<Self, MirrorError> {
        url.set_query(None);
        url.set_fragment(None);
        let path = strip_repo_suffix(url.path()).to_string();
        let name = last_segment(&path)
            .ok_or_else(|| invalid_entry(raw))?
            .to_string();
        url.set_path(&path);
        Ok(Self {
            url: url.to_string(),
            name,
        })
    }

    /// Destination repository id under `namespace`.
    pub fn target(&self, namespace: &str) -> String {
        format!("{namespace}/{}", self.name)
    }
}

/// Parse every configured entry and reject lists that would collide on the
/// destination side. Repeated URLs are collapsed with a warning.
pub fn parse_sources(raw: &[String], endpoint: &Url) -> Result<Vec<SourceRepo>, MirrorError> {
    let mut sources: Vec<SourceRepo> = Vec::with_capacity(raw.len());
    let mut by_name: HashMap<String, String> = HashMap::new();

    for entry in raw {
        let source = SourceRepo::parse(entry, endpoint)?;
        match by_name.get(&source.name) {
            Some(url) if *url == source.url => {
                warn!(repo_url = %source.url, "Repository listed more than once; ignoring duplicate");
                continue;
            }
            Some(url) => {
                return Err(MirrorError::Configuration(format!(
                    "{} and {} both map to destination name {:?}",
                    url, source.url, source.name
                )));
            }
            None => {
                by_name.insert(source.name.clone(), source.url.clone());
            }
        }
        sources.push(source);
    }
    Ok(sources)
}

fn invalid_entry(raw: &str) -> MirrorError {
    MirrorError::Configuration(format!(
        "cannot derive a repository name from {raw:?}; expected a URL or owner/name"
    ))
}

fn is_shorthand(raw: &str) -> bool {
    let mut parts = raw.split('/');
    let ok = |p: Option<&str>| {
        p.is_some_and(|p| {
            !p.is_empty()
                && p
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
    };
    ok(parts.next()) && ok(parts.next()) && parts.next().is_none()
}

fn strip_repo_suffix(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    path.strip_suffix(".git").unwrap_or(path)
}

fn last_segment(path: &str) -> Option<&str> {
    strip_repo_suffix(path)
        .rsplit(['/', ':'])
        .next()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> Url {
        Url::parse("https://huggingface.co").unwrap()
    }

    #[test]
    fn full_url_and_shorthand_share_a_key() {
        let a = SourceRepo::parse("https://huggingface.co/facebook/opt-125m/", &hub()).unwrap();
        let b = SourceRepo::parse("facebook/opt-125m", &hub()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.url, "https://huggingface.co/facebook/opt-125m");
        assert_eq!(a.name, "opt-125m");
        assert_eq!(a.target("my-org"), "my-org/opt-125m");
    }

    #[test]
    fn git_suffix_and_query_are_dropped() {
        let s = SourceRepo::parse("https://huggingface.co/Qwen/Qwen2-0.5B.git?x=1", &hub()).unwrap();
        assert_eq!(s.url, "https://huggingface.co/Qwen/Qwen2-0.5B");
        assert_eq!(s.name, "Qwen2-0.5B");
    }

    #[test]
    fn scp_like_address() {
        let s = SourceRepo::parse("git@hf.co:google/gemma-2b.git", &hub()).unwrap();
        assert_eq!(s.url, "git@hf.co:google/gemma-2b");
        assert_eq!(s.name, "gemma-2b");
    }

    #[test]
    fn rejects_entries_without_a_name() {
        assert!(SourceRepo::parse("", &hub()).is_err());
        assert!(SourceRepo::parse("https://huggingface.co/", &hub()).is_err());
        assert!(SourceRepo::parse("just-a-word", &hub()).is_err());
    }

    #[test]
    fn duplicate_urls_collapse_but_name_clashes_fail() {
        let raw = vec![
            "facebook/opt-125m".to_string(),
            "https://huggingface.co/facebook/opt-125m".to_string(),
        ];
        assert_eq!(parse_sources(&raw, &hub()).unwrap().len(), 1);

        let clash = vec!["a/model".to_string(), "b/model".to_string()];
        let err = parse_sources(&clash, &hub()).unwrap_err();
        assert!(matches!(err, MirrorError::Configuration(_)));
    }
}
