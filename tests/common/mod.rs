use assert_cmd::{cargo::cargo_bin_cmd, Command};
use secret_projector::encryption::{EncryptionDefaults, ModuleRegistry};
use secret_projector::secret::DeployLabels;
use secret_projector::ProjectionMapping;
use std::path::PathBuf;

pub const GENERATION: &str = "6969420";
pub const MANAGED_KEY: &str = "test/managed";
pub const VERSION_KEY: &str = "test/version";

/// Root of the checked-in test fixtures.
pub fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// The creds repository tagged `production` by every fixture manifest.
#[allow(dead_code)]
pub fn creds_repo() -> PathBuf {
    fixtures().join("files")
}

#[allow(dead_code)]
pub fn manifest(rel: &str) -> PathBuf {
    fixtures().join("manifests").join(rel)
}

#[allow(dead_code)]
pub fn bad_manifest(name: &str) -> PathBuf {
    fixtures().join("bad_manifests").join(name)
}

#[allow(dead_code)]
pub fn creds_keys() -> PathBuf {
    creds_repo().join("creds_keys.json")
}

#[allow(dead_code)]
pub fn defaults() -> EncryptionDefaults {
    EncryptionDefaults {
        creds_keys_file: Some(creds_keys()),
        keys_decrypter_file: None,
    }
}

#[allow(dead_code)]
pub fn labels() -> DeployLabels {
    DeployLabels {
        managed_key: MANAGED_KEY.into(),
        version_key: VERSION_KEY.into(),
        generation: GENERATION.into(),
    }
}

/// Load a manifest with the fixture key file as the encryption default.
#[allow(dead_code)]
pub fn load(path: PathBuf) -> secret_projector::Result<ProjectionMapping> {
    ProjectionMapping::load_file(&path, &defaults(), &ModuleRegistry::default())
}

/// Convenience helper for spawning the secret-projector binary via assert_cmd.
#[allow(dead_code)]
pub fn projector_cmd() -> Command {
    let mut cmd = cargo_bin_cmd!("secret-projector");
    // keep runs independent of the developer's environment
    cmd.env_remove("SECRET_PROJECTOR_LOG");
    cmd.env("XDG_CONFIG_HOME", fixtures().join("no-config"));
    for var in [
        "CREDS_REPOS",
        "MANIFESTS",
        "OUTPUT",
        "CREDS_ENCRYPTION_KEY",
        "CREDS_KEY_DECRYPTION_KEY",
        "LABEL_SECRETS",
        "LABEL_MANAGED_KEY",
        "LABEL_VERSION_KEY",
        "GENERATION",
        "DEBUG",
        "DEBUG_SHOW_SECRETS",
    ] {
        cmd.env_remove(format!("SECRET_PROJECTOR_{var}"));
    }
    cmd
}
