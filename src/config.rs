//! # Settings
//!
//! Process-wide settings, resolved in layers (later layers win):
//!
//! 1. built-in defaults
//! 2. a TOML settings file (`--config`, else `secret-projector/config.toml`
//!    under the platform config directory when it exists)
//! 3. `SECRET_PROJECTOR_*` environment variables
//! 4. command-line flags
//!
//! ```toml
//! manifests = "/etc/secret-projector/manifests"
//! output = "/var/run/secrets/projected"
//! creds_encryption_key = "/etc/secret-projector/creds_keys.json"
//! label_managed_key = "example.com/managed-secret"
//!
//! [creds_repos]
//! production = "/srv/creds/production"
//! staging = "/srv/creds/staging"
//! ```

use crate::encryption::EncryptionDefaults;
use crate::error::{ProjectorError, Result};
use crate::secret::DeployLabels;
use ::config::{Config, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

pub const CONFIG_DIR: &str = "secret-projector";
pub const CONFIG_FILE: &str = "config.toml";
pub const ENV_PREFIX: &str = "SECRET_PROJECTOR_";

pub const DEFAULT_LABEL_MANAGED_KEY: &str = "secret-projector/managed-secret";
pub const DEFAULT_LABEL_VERSION_KEY: &str = "secret-projector/secret-version";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Creds repository tag to directory.
    pub creds_repos: BTreeMap<String, PathBuf>,
    pub manifests: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub creds_encryption_key: Option<PathBuf>,
    pub creds_key_decryption_key: Option<PathBuf>,
    pub label_secrets: bool,
    pub label_managed_key: String,
    pub label_version_key: String,
    pub generation: String,
    pub debug: bool,
    pub debug_show_secrets: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            creds_repos: BTreeMap::new(),
            manifests: None,
            output: None,
            creds_encryption_key: None,
            creds_key_decryption_key: None,
            label_secrets: true,
            label_managed_key: DEFAULT_LABEL_MANAGED_KEY.to_string(),
            label_version_key: DEFAULT_LABEL_VERSION_KEY.to_string(),
            generation: unix_now().to_string(),
            debug: false,
            debug_show_secrets: false,
        }
    }
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub creds_repos: Vec<(String, PathBuf)>,
    pub manifests: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub creds_encryption_key: Option<PathBuf>,
    pub creds_key_decryption_key: Option<PathBuf>,
    pub label_secrets: Option<bool>,
    pub label_managed_key: Option<String>,
    pub label_version_key: Option<String>,
    pub generation: Option<String>,
    pub debug: bool,
    pub debug_show_secrets: bool,
}

impl Settings {
    /// Resolve every layer and validate the result.
    pub fn load(config_file: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut settings = match config_file {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env()?;
        settings.apply_overrides(overrides);
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| ProjectorError::Config(format!("invalid config path {}", path.display())))?;
        let settings = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml))
            .build()
            .and_then(|cfg| cfg.try_deserialize::<Settings>())
            .map_err(|err| {
                ProjectorError::Config(format!("failed to load {}: {err}", path.display()))
            })?;
        debug!(path = %path.display(), "loaded settings file");
        Ok(settings)
    }

    /// Apply `SECRET_PROJECTOR_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        let var = |name: &str| env::var(format!("{ENV_PREFIX}{name}")).ok();
        let flag = |name: &str| -> Result<Option<bool>> {
            var(name)
                .map(|v| {
                    v.parse().map_err(|_| {
                        ProjectorError::Config(format!("{ENV_PREFIX}{name} must be true or false, got '{v}'"))
                    })
                })
                .transpose()
        };

        if let Some(repos) = var("CREDS_REPOS") {
            for pair in repos.split(',').filter(|p| !p.is_empty()) {
                let (label, path) = parse_creds_repo(pair)?;
                self.creds_repos.insert(label, path);
            }
        }
        if let Some(manifests) = var("MANIFESTS") {
            self.manifests = Some(PathBuf::from(manifests));
        }
        if let Some(output) = var("OUTPUT") {
            self.output = Some(PathBuf::from(output));
        }
        if let Some(key) = var("CREDS_ENCRYPTION_KEY") {
            self.creds_encryption_key = Some(PathBuf::from(key));
        }
        if let Some(key) = var("CREDS_KEY_DECRYPTION_KEY") {
            self.creds_key_decryption_key = Some(PathBuf::from(key));
        }
        if let Some(label_secrets) = flag("LABEL_SECRETS")? {
            self.label_secrets = label_secrets;
        }
        if let Some(key) = var("LABEL_MANAGED_KEY") {
            self.label_managed_key = key;
        }
        if let Some(key) = var("LABEL_VERSION_KEY") {
            self.label_version_key = key;
        }
        if let Some(generation) = var("GENERATION") {
            self.generation = generation;
        }
        if let Some(debug) = flag("DEBUG")? {
            self.debug = debug;
        }
        if let Some(show) = flag("DEBUG_SHOW_SECRETS")? {
            self.debug_show_secrets = show;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        self.creds_repos.extend(overrides.creds_repos);
        if let Some(manifests) = overrides.manifests {
            self.manifests = Some(manifests);
        }
        if let Some(output) = overrides.output {
            self.output = Some(output);
        }
        if let Some(key) = overrides.creds_encryption_key {
            self.creds_encryption_key = Some(key);
        }
        if let Some(key) = overrides.creds_key_decryption_key {
            self.creds_key_decryption_key = Some(key);
        }
        if let Some(label_secrets) = overrides.label_secrets {
            self.label_secrets = label_secrets;
        }
        if let Some(key) = overrides.label_managed_key {
            self.label_managed_key = key;
        }
        if let Some(key) = overrides.label_version_key {
            self.label_version_key = key;
        }
        if let Some(generation) = overrides.generation {
            self.generation = generation;
        }
        // flags can only switch these on
        self.debug |= overrides.debug;
        self.debug_show_secrets |= overrides.debug_show_secrets;
    }

    pub fn validate(&self) -> Result<()> {
        if self.creds_repos.is_empty() {
            return Err(ProjectorError::Config(
                "at least 1 --creds-repo argument is required".into(),
            ));
        }
        for (label, path) in &self.creds_repos {
            if label.is_empty() {
                return Err(ProjectorError::Config(
                    "creds-repo requires an identifier=path argument, but no identifier found"
                        .into(),
                ));
            }
            validate_resource(&format!("creds-repo {label}"), path, Resource::Directory)?;
        }

        let manifests = self
            .manifests
            .as_deref()
            .ok_or_else(|| ProjectorError::Config("manifests requires an argument".into()))?;
        validate_resource("manifests", manifests, Resource::Directory)?;

        if let Some(output) = &self.output {
            validate_resource("output", output, Resource::Directory)?;
        }
        if let Some(key) = &self.creds_encryption_key {
            validate_resource("creds-encryption-key", key, Resource::File)?;
        }
        if let Some(key) = &self.creds_key_decryption_key {
            validate_resource("creds-key-decryption-key", key, Resource::File)?;
        }
        Ok(())
    }

    /// Directory backing a creds repository tag.
    pub fn creds_root(&self, repo: &str) -> Option<&Path> {
        self.creds_repos.get(repo).map(PathBuf::as_path)
    }

    /// Key files used by manifests whose `encryption` block leaves them out.
    pub fn encryption_defaults(&self) -> EncryptionDefaults {
        EncryptionDefaults {
            creds_keys_file: self.creds_encryption_key.clone(),
            keys_decrypter_file: self.creds_key_decryption_key.clone(),
        }
    }

    /// Labels to stamp on projected secrets, or `None` when labelling is off.
    pub fn deploy_labels(&self) -> Option<DeployLabels> {
        self.label_secrets.then(|| DeployLabels {
            managed_key: self.label_managed_key.clone(),
            version_key: self.label_version_key.clone(),
            generation: self.generation.clone(),
        })
    }

    /// Whether rendered secrets should be printed.
    pub fn show_secrets(&self) -> bool {
        self.debug && self.debug_show_secrets
    }
}

/// `secret-projector/config.toml` under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Parse a `label=path` creds repository argument.
pub fn parse_creds_repo(arg: &str) -> Result<(String, PathBuf)> {
    let (label, path) = arg.split_once('=').ok_or_else(|| {
        ProjectorError::Config(format!(
            "creds-repo requires an identifier=path argument, got '{arg}'"
        ))
    })?;
    let label = label.trim();
    if label.is_empty() {
        return Err(ProjectorError::Config(
            "creds-repo requires an identifier=path argument, but no identifier found".into(),
        ));
    }
    if path.is_empty() {
        return Err(ProjectorError::Config(format!(
            "creds-repo identifier {label} requires a value"
        )));
    }
    Ok((label.to_string(), PathBuf::from(path)))
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Clone, Copy)]
enum Resource {
    Directory,
    File,
}

fn validate_resource(name: &str, path: &Path, resource: Resource) -> Result<()> {
    let meta = fs::metadata(path).map_err(|err| {
        ProjectorError::Config(format!(
            "unable to open {name} argument {}: {err}",
            path.display()
        ))
    })?;
    match resource {
        Resource::Directory if !meta.is_dir() => Err(ProjectorError::Config(format!(
            "{name} argument {} is not a directory",
            path.display()
        ))),
        Resource::File if meta.is_dir() => Err(ProjectorError::Config(format!(
            "{name} argument {} is not a file",
            path.display()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: [&str; 11] = [
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
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(format!("{ENV_PREFIX}{var}"));
        }
    }

    struct Layout {
        temp: TempDir,
    }

    impl Layout {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            for dir in ["creds", "manifests", "out"] {
                fs::create_dir(temp.path().join(dir)).unwrap();
            }
            fs::write(temp.path().join("keys.json"), r#"{"password":"x"}"#).unwrap();
            Self { temp }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.temp.path().join(name)
        }

        fn overrides(&self) -> Overrides {
            Overrides {
                creds_repos: vec![("production".into(), self.path("creds"))],
                manifests: Some(self.path("manifests")),
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_parse_creds_repo() {
        assert_eq!(
            parse_creds_repo("production=/srv/creds").unwrap(),
            ("production".to_string(), PathBuf::from("/srv/creds"))
        );
        assert_eq!(
            parse_creds_repo("a=b=c").unwrap(),
            ("a".to_string(), PathBuf::from("b=c"))
        );
        assert!(parse_creds_repo("noequals").is_err());
        assert!(parse_creds_repo("=/srv/creds").is_err());
        assert!(parse_creds_repo("label=").is_err());
    }

    #[test]
    #[serial]
    fn test_defaults_and_overrides() {
        clear_env();
        let layout = Layout::new();
        let mut overrides = layout.overrides();
        overrides.generation = Some("4206969".into());
        overrides.creds_encryption_key = Some(layout.path("keys.json"));

        let settings = Settings::load(Some(&layout.path("missing.toml")), overrides.clone());
        assert!(settings.is_err(), "explicit config file must exist");

        let mut settings = Settings::default();
        settings.apply_overrides(overrides);
        settings.validate().unwrap();

        assert_eq!(settings.creds_root("production"), Some(layout.path("creds").as_path()));
        assert_eq!(settings.creds_root("staging"), None);
        assert_eq!(
            settings.encryption_defaults().creds_keys_file,
            Some(layout.path("keys.json"))
        );
        assert!(settings.encryption_defaults().keys_decrypter_file.is_none());

        let labels = settings.deploy_labels().unwrap();
        assert_eq!(labels.managed_key, DEFAULT_LABEL_MANAGED_KEY);
        assert_eq!(labels.version_key, DEFAULT_LABEL_VERSION_KEY);
        assert_eq!(labels.generation, "4206969");
        assert!(!settings.show_secrets());
    }

    #[test]
    fn test_generation_defaults_to_now() {
        let before = unix_now();
        let generation: u64 = Settings::default().generation.parse().unwrap();
        assert!(generation >= before);
    }

    #[test]
    fn test_labels_disabled() {
        let settings = Settings {
            label_secrets: false,
            ..Default::default()
        };
        assert!(settings.deploy_labels().is_none());
    }

    #[test]
    fn test_validation_errors() {
        let layout = Layout::new();

        let mut settings = Settings::default();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("at least 1 --creds-repo"));

        settings.apply_overrides(layout.overrides());
        settings.validate().unwrap();

        let mut bad = settings.clone();
        bad.manifests = Some(layout.path("manifests/foobar"));
        assert!(bad
            .validate()
            .unwrap_err()
            .to_string()
            .contains("unable to open manifests argument"));

        let mut bad = settings.clone();
        bad.manifests = None;
        assert!(bad.validate().unwrap_err().to_string().contains("manifests requires"));

        let mut bad = settings.clone();
        bad.creds_encryption_key = Some(layout.path("creds"));
        assert!(bad.validate().unwrap_err().to_string().contains("is not a file"));

        let mut bad = settings.clone();
        bad.output = Some(layout.path("keys.json"));
        assert!(bad
            .validate()
            .unwrap_err()
            .to_string()
            .contains("output argument"));

        let mut bad = settings.clone();
        bad.creds_repos
            .insert("staging".into(), layout.path("keys.json"));
        assert!(bad
            .validate()
            .unwrap_err()
            .to_string()
            .contains("creds-repo staging argument"));
    }

    #[test]
    #[serial]
    fn test_config_file_layer() {
        clear_env();
        let layout = Layout::new();
        let file = layout.path("config.toml");
        fs::write(
            &file,
            format!(
                "manifests = \"{}\"\nlabel_managed_key = \"example.com/managed\"\nlabel_secrets = true\n\n[creds_repos]\nproduction = \"{}\"\n",
                layout.path("manifests").display(),
                layout.path("creds").display()
            ),
        )
        .unwrap();

        let settings = Settings::load(Some(&file), Overrides::default()).unwrap();
        assert_eq!(settings.label_managed_key, "example.com/managed");
        assert_eq!(settings.label_version_key, DEFAULT_LABEL_VERSION_KEY);
        assert_eq!(settings.creds_root("production"), Some(layout.path("creds").as_path()));

        fs::write(&file, "manifest = \"/typo\"\n").unwrap();
        let err = Settings::from_file(&file).unwrap_err();
        assert!(matches!(err, ProjectorError::Config(_)));
    }

    #[test]
    #[serial]
    fn test_env_layer_then_flags() {
        clear_env();
        let layout = Layout::new();
        env::set_var(
            format!("{ENV_PREFIX}CREDS_REPOS"),
            format!("staging={},other={}", layout.path("creds").display(), layout.path("out").display()),
        );
        env::set_var(format!("{ENV_PREFIX}MANIFESTS"), layout.path("manifests"));
        env::set_var(format!("{ENV_PREFIX}GENERATION"), "111");
        env::set_var(format!("{ENV_PREFIX}LABEL_VERSION_KEY"), "env/version");
        env::set_var(format!("{ENV_PREFIX}DEBUG"), "true");

        let overrides = Overrides {
            generation: Some("222".into()),
            debug_show_secrets: true,
            ..Default::default()
        };
        let result = Settings::load(Some(&write_empty(&layout)), overrides);
        clear_env();

        let settings = result.unwrap();
        assert_eq!(settings.creds_repos.len(), 2);
        assert_eq!(settings.generation, "222");
        assert_eq!(settings.label_version_key, "env/version");
        assert!(settings.show_secrets());
    }

    #[test]
    #[serial]
    fn test_env_bad_bool() {
        clear_env();
        env::set_var(format!("{ENV_PREFIX}LABEL_SECRETS"), "maybe");
        let result = Settings::default().apply_env();
        clear_env();
        assert!(result.unwrap_err().to_string().contains("LABEL_SECRETS"));
    }

    fn write_empty(layout: &Layout) -> PathBuf {
        let file = layout.path("empty.toml");
        fs::write(&file, "").unwrap();
        file
    }
}
