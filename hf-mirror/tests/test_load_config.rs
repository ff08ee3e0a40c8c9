use std::env;
use std::fs::{read_to_string, write};

use hf_mirror::load_config::{load_config, process_env, ConfigError};
use serial_test::serial;
use tempfile::{NamedTempFile, TempDir};

fn clear_credential_env() {
    for key in [
        "HF_TOKEN",
        "HUGGING_FACE_HUB_TOKEN",
        "GIT_AUTHOR_NAME",
        "GIT_AUTHOR_EMAIL",
        "HF_NAMESPACE",
        "ORG_NAME",
    ] {
        env::remove_var(key);
    }
}

/// Credentials taken from the environment end up in the file, next to what was already there.
#[test]
#[serial]
fn test_load_config_writes_env_credentials_back() {
    clear_credential_env();
    let config_yaml = r#"
platform:
  namespace: mirror-org
  private: true
repositories:
  - https://huggingface.co/facebook/opt-125m
lfs_track: ["*.bin"]
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    env::set_var("HF_TOKEN", "hf_from_env");
    env::set_var("GIT_AUTHOR_NAME", "Jane");
    env::set_var("GIT_AUTHOR_EMAIL", "jane@example.com");

    let config = load_config(config_file.path(), &process_env, None).expect("Config should load");
    clear_credential_env();

    assert_eq!(config.token, "hf_from_env");
    assert_eq!(config.namespace.as_deref(), Some("mirror-org"));
    assert!(config.private);
    assert_eq!(config.identity.name, "Jane");
    assert_eq!(config.sources.len(), 1);
    assert_eq!(config.sources[0].name, "opt-125m");
    assert_eq!(config.lfs_track, vec!["*.bin".to_string()]);

    let saved = read_to_string(config_file.path()).unwrap();
    assert!(saved.contains("token: hf_from_env"), "{saved}");
    assert!(saved.contains("email: jane@example.com"), "{saved}");
    assert!(saved.contains("private: true"), "{saved}");
    assert!(saved.contains("https://huggingface.co/facebook/opt-125m"), "{saved}");
}

/// A config that already carries everything is left untouched on disk.
#[test]
#[serial]
fn test_load_config_complete_file_is_not_rewritten() {
    clear_credential_env();
    let config_yaml = "# my mirror list\nplatform:\n  token: hf_file\ngit:\n  username: Jane\n  email: jane@example.com\nrepositories: []\n";
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(config_file.path(), &process_env, None).expect("Config should load");

    assert_eq!(config.token, "hf_file");
    assert!(config.namespace.is_none());
    assert_eq!(read_to_string(config_file.path()).unwrap(), config_yaml);
}

#[test]
#[serial]
fn test_load_config_missing_file_without_env_fails() {
    clear_credential_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hf-mirror.yaml");

    let err = load_config(&path, &process_env, None).unwrap_err();
    let config_err = err
        .downcast_ref::<ConfigError>()
        .expect("error should be a ConfigError");
    assert!(matches!(
        config_err,
        ConfigError::MissingCredential {
            field: "platform.token",
            ..
        }
    ));
    assert!(!path.exists());
}

#[test]
#[serial]
fn test_load_config_invalid_yaml_is_a_parse_error() {
    clear_credential_env();
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "platform: [unterminated").unwrap();

    let err = load_config(config_file.path(), &process_env, None).unwrap_err();
    assert!(err.to_string().contains("parse"), "{err}");
}

#[test]
#[serial]
fn test_load_config_rejects_conflicting_repository_names() {
    clear_credential_env();
    let config_yaml = r#"
platform:
  token: hf_file
git:
  username: Jane
  email: jane@example.com
repositories:
  - facebook/opt-125m
  - someone-else/opt-125m
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    assert!(load_config(config_file.path(), &process_env, None).is_err());
}

/// The written-back file carries the token, so only the owner may read it.
#[cfg(unix)]
#[test]
#[serial]
fn test_load_config_write_back_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    clear_credential_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hf-mirror.yaml");
    write(
        &path,
        "git:\n  username: Jane\n  email: jane@example.com\nrepositories: []\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    env::set_var("HF_TOKEN", "hf_secret_from_env");
    let result = load_config(&path, &process_env, None);
    clear_credential_env();
    result.expect("Config should load");

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600, "config mode was {mode:o}");
    assert!(read_to_string(&path).unwrap().contains("hf_secret_from_env"));
}
