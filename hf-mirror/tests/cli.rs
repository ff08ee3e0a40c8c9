use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CREDENTIAL_ENV: &[&str] = &[
    "HF_TOKEN",
    "HUGGING_FACE_HUB_TOKEN",
    "GIT_AUTHOR_NAME",
    "GIT_AUTHOR_EMAIL",
    "HF_NAMESPACE",
    "ORG_NAME",
];

/// `hf-mirror` running inside `dir` with no credentials leaking in from the environment.
fn hf_mirror(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hf-mirror").expect("Binary exists");
    cmd.current_dir(dir);
    for key in CREDENTIAL_ENV {
        cmd.env_remove(key);
    }
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) {
    fs::write(dir.path().join("hf-mirror.yaml"), yaml).expect("Writing temp config failed");
}

fn write_cache(dir: &TempDir, json: &str) {
    let cache_dir = dir.path().join(".cache");
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(cache_dir.join("repo_cache.json"), json).unwrap();
}

const TWO_REPOS: &str = r#"
platform:
  token: hf_test
  namespace: mirror-org
git:
  username: Jane
  email: jane@example.com
repositories:
  - https://huggingface.co/facebook/opt-125m
  - Qwen/Qwen2-0.5B
"#;

#[test]
fn status_lists_done_and_pending_repositories() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, TWO_REPOS);
    write_cache(
        &dir,
        r#"{"https://huggingface.co/facebook/opt-125m": {"status": "uploaded", "target": "mirror-org/opt-125m"}}"#,
    );

    hf_mirror(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("done      https://huggingface.co/facebook/opt-125m -> mirror-org/opt-125m")
                .and(predicate::str::contains("pending   https://huggingface.co/Qwen/Qwen2-0.5B"))
                .and(predicate::str::contains("1 of 2 repositories mirrored")),
        );
}

#[test]
fn forget_removes_the_cache_entry() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, TWO_REPOS);
    write_cache(
        &dir,
        r#"{"https://huggingface.co/facebook/opt-125m": {"status": "uploaded"}}"#,
    );

    hf_mirror(dir.path())
        .args(["forget", "facebook/opt-125m"])
        .assert()
        .success()
        .stdout(predicate::str::contains("forgot"));

    let cache = fs::read_to_string(dir.path().join(".cache/repo_cache.json")).unwrap();
    assert!(!cache.contains("opt-125m"), "{cache}");
}

#[test]
fn run_without_token_fails_with_missing_credential() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "git:\n  username: Jane\n  email: jane@example.com\nrepositories: []\n",
    );

    hf_mirror(dir.path())
        .args(["run", "--no-prompt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing credential `platform.token`"));
}

#[test]
fn run_with_no_repositories_succeeds_and_creates_cache() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "platform:\n  token: hf_test\n  namespace: mirror-org\ngit:\n  username: Jane\n  email: jane@example.com\nrepositories: []\n",
    );

    hf_mirror(dir.path())
        .args(["run", "--no-prompt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 mirrored, 0 skipped, 0 failed"));

    assert!(dir.path().join(".cache/repo_cache.json").exists());
}

#[test]
fn token_from_environment_is_written_back() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "platform:\n  namespace: mirror-org\ngit:\n  username: Jane\n  email: jane@example.com\nrepositories: []\n",
    );

    hf_mirror(dir.path())
        .args(["run", "--no-prompt"])
        .env("HF_TOKEN", "hf_from_env")
        .assert()
        .success();

    let saved = fs::read_to_string(dir.path().join("hf-mirror.yaml")).unwrap();
    assert!(saved.contains("token: hf_from_env"), "{saved}");
    assert!(saved.contains("namespace: mirror-org"), "{saved}");
}

#[test]
fn cached_repositories_are_skipped_without_network() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, TWO_REPOS);
    write_cache(
        &dir,
        r#"{
  "https://huggingface.co/facebook/opt-125m": {"status": "uploaded"},
  "https://huggingface.co/Qwen/Qwen2-0.5B": {"status": "uploaded"}
}"#,
    );

    hf_mirror(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 mirrored, 2 skipped, 0 failed"));
}

#[test]
fn malformed_config_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "repositories: [:::");

    hf_mirror(dir.path())
        .args(["run", "--no-prompt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse config YAML"));
}

#[test]
fn failed_repository_exits_nonzero_and_is_not_cached() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        r#"
platform:
  token: hf_test
  namespace: mirror-org
git:
  username: Jane
  email: jane@example.com
repositories:
  - https://127.0.0.1:1/a/b
"#,
    );

    hf_mirror(dir.path())
        .args(["run", "--no-prompt"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("0 mirrored, 0 skipped, 1 failed"));

    let cache = fs::read_to_string(dir.path().join(".cache/repo_cache.json")).unwrap();
    assert!(!cache.contains("127.0.0.1"), "{cache}");
}

#[test]
fn status_does_not_touch_a_corrupted_cache() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, TWO_REPOS);
    write_cache(&dir, "{not json");

    hf_mirror(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 of 2 repositories mirrored"));

    assert_eq!(
        fs::read_to_string(dir.path().join(".cache/repo_cache.json")).unwrap(),
        "{not json"
    );
    assert!(!dir.path().join(".cache/repo_cache.json.corrupt").exists());
}
