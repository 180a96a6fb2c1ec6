mod common;

use predicates::prelude::*;
use secret_projector::Secret;
use std::fs;
use tempfile::TempDir;

fn creds_repo_arg() -> String {
    format!("production={}", common::creds_repo().display())
}

#[test]
fn test_help() {
    common::projector_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--creds-repo"))
        .stdout(predicate::str::contains("--manifests"));
}

#[test]
fn test_requires_creds_repo() {
    common::projector_cmd()
        .args(["--manifests", common::fixtures().join("manifests").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 1 --creds-repo argument is required"));
}

#[test]
fn test_rejects_malformed_creds_repo() {
    common::projector_cmd()
        .args(["--creds-repo", "no-equals-sign"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("identifier=path"));
}

#[test]
fn test_rejects_missing_manifests_dir() {
    common::projector_cmd()
        .args(["--creds-repo", &creds_repo_arg()])
        .args(["--manifests", "/nonexistent/manifests"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to open manifests argument"));
}

#[test]
fn test_rejects_directory_as_key_file() {
    common::projector_cmd()
        .args(["--creds-repo", &creds_repo_arg()])
        .args(["--manifests", common::fixtures().join("manifests").to_str().unwrap()])
        .args(["--creds-encryption-key", common::creds_repo().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a file"));
}

#[test]
fn test_projects_and_writes_all_fixtures() {
    let out = TempDir::new().unwrap();

    common::projector_cmd()
        .args(["--creds-repo", &creds_repo_arg()])
        .args(["--manifests", common::fixtures().join("manifests").to_str().unwrap()])
        .args(["--output", out.path().to_str().unwrap()])
        .args(["--creds-encryption-key", common::creds_keys().to_str().unwrap()])
        .args(["--generation", common::GENERATION])
        .args(["--label-managed-key", common::MANAGED_KEY])
        .args(["--label-version-key", common::VERSION_KEY])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let mut written: Vec<_> = fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    written.sort();
    assert_eq!(written.len(), 9);

    let raw = written
        .iter()
        .find(|p| p.to_string_lossy().ends_with("-raw-test1-test2.yaml"))
        .expect("raw secret not written");
    let secret = Secret::from_yaml(&fs::read_to_string(raw).unwrap()).unwrap();
    assert_eq!(secret.get("raw-file"), Some(&b"hello\nthis is a raw file\n"[..]));
    assert_eq!(
        secret.metadata.labels.get(common::MANAGED_KEY).map(String::as_str),
        Some("true")
    );
    assert_eq!(
        secret.metadata.labels.get(common::VERSION_KEY).map(String::as_str),
        Some(common::GENERATION)
    );
}

#[test]
fn test_label_secrets_false() {
    let out = TempDir::new().unwrap();
    common::projector_cmd()
        .args(["--creds-repo", &creds_repo_arg()])
        .args(["--manifests", common::fixtures().join("manifests").to_str().unwrap()])
        .args(["--output", out.path().to_str().unwrap()])
        .args(["--creds-encryption-key", common::creds_keys().to_str().unwrap()])
        .arg("--label-secrets=false")
        .assert()
        .success();

    for entry in fs::read_dir(out.path()).unwrap() {
        let secret = Secret::from_yaml(&fs::read_to_string(entry.unwrap().path()).unwrap()).unwrap();
        assert!(secret.metadata.labels.is_empty());
    }
}

#[test]
fn test_show_secrets_requires_debug() {
    let base = |cmd: &mut assert_cmd::Command| {
        cmd.args(["--creds-repo", &creds_repo_arg()])
            .args(["--manifests", common::fixtures().join("manifests").to_str().unwrap()])
            .args(["--creds-encryption-key", common::creds_keys().to_str().unwrap()])
            .arg("--debug-show-secrets");
    };

    let mut quiet = common::projector_cmd();
    base(&mut quiet);
    quiet.assert().success().stdout(predicate::str::is_empty());

    let mut loud = common::projector_cmd();
    base(&mut loud);
    let output = loud.arg("--debug").assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8(output).unwrap();
    assert_eq!(stdout.matches("---\n").count(), 9);
    assert!(stdout.contains("name: test-json-subset"));
}

#[test]
fn test_missing_encryption_key_fails_loading() {
    common::projector_cmd()
        .args(["--creds-repo", &creds_repo_arg()])
        .args(["--manifests", common::fixtures().join("manifests").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to load 2 of 9 projection mappings"));
}

#[test]
fn test_unknown_repo_fails_run() {
    let out = TempDir::new().unwrap();
    let manifests = TempDir::new().unwrap();
    fs::copy(
        common::manifest("raw.yaml"),
        manifests.path().join("raw.yaml"),
    )
    .unwrap();

    common::projector_cmd()
        .args(["--creds-repo", &format!("staging={}", common::creds_repo().display())])
        .args(["--manifests", manifests.path().to_str().unwrap()])
        .args(["--output", out.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--creds-repo=production=/path/to/repo"))
        .stderr(predicate::str::contains(
            "expected to create 1 secrets, but only successfully created 0",
        ));

    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn test_settings_from_env_and_config_file() {
    let config_dir = TempDir::new().unwrap();
    let config = config_dir.path().join("config.toml");
    fs::write(
        &config,
        format!(
            "manifests = \"{}\"\ncreds_encryption_key = \"{}\"\n",
            common::fixtures().join("manifests").display(),
            common::creds_keys().display()
        ),
    )
    .unwrap();

    common::projector_cmd()
        .env("SECRET_PROJECTOR_CREDS_REPOS", creds_repo_arg())
        .args(["--config", config.to_str().unwrap()])
        .assert()
        .success();
}
