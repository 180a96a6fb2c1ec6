//! # Encryption Modules
//!
//! A projection mapping may encrypt any of its fields. How that happens is up
//! to an [`EncryptionModule`], selected by the `module` identifier of the
//! mapping's [`EncryptionConfig`] and built by a [`ModuleRegistry`].
//!
//! ## Built-in modules
//!
//! - `aes-gcm` (alias `cbc`): AES-256-GCM keyed from a hashed passphrase. See
//!   [`aes`].
//!
//! ## Plugins
//!
//! The identifier `plugin` is reserved. A manifest using it must also name a
//! `plugin-path`; the host process is expected to have registered a factory
//! for that path with [`ModuleRegistry::register_plugin`] before manifests are
//! loaded. Every factory, built in or not, has the same signature:
//!
//! ```text
//! (&EncryptionConfig, primary key stream, secondary key stream) -> Box<dyn EncryptionModule>
//! ```
//!
//! The primary stream is the creds keys file. The secondary stream is the
//! optional key-decrypter file, or an empty stream when none is configured.

pub mod aes;

use crate::error::{ProjectorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Reserved module identifier for host-registered implementations.
pub const PLUGIN_MODULE: &str = "plugin";

/// Key material that can be handed to consumers of a projected secret.
pub trait Key: Send + Sync {
    /// The secret this key reveals (e.g. a passphrase).
    fn plaintext(&self) -> &str;

    /// Compact JSON form, as embedded in projected secrets.
    fn to_json(&self) -> Result<Vec<u8>>;
}

/// Encrypts and decrypts projected fields.
///
/// Implementations must be safe to share between threads; the key material
/// is fixed at construction.
pub trait EncryptionModule: Send + Sync {
    fn name(&self) -> &str;

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Keys needed to decrypt what [`EncryptionModule::encrypt`] produces.
    fn decryption_keys(&self) -> Result<Vec<Box<dyn Key>>>;
}

/// How a projection mapping wants its fields encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    /// Empty means no module is configured.
    #[serde(default)]
    pub module: String,

    #[serde(default)]
    pub include_decryption_keys: bool,

    /// Only used when `module` is `plugin`.
    #[serde(default, rename = "plugin-path")]
    pub plugin_path: Option<PathBuf>,

    /// Free-form options for the module implementation.
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Usually left out of manifests and filled from [`EncryptionDefaults`].
    #[serde(default)]
    pub creds_keys_file: Option<PathBuf>,

    /// Usually left out of manifests and filled from [`EncryptionDefaults`].
    #[serde(default)]
    pub keys_decrypter_file: Option<PathBuf>,
}

impl EncryptionConfig {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Default::default()
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Fill key file paths the manifest left out from process-wide defaults.
    pub fn with_defaults(mut self, defaults: &EncryptionDefaults) -> Self {
        if self.creds_keys_file.is_none() {
            self.creds_keys_file = defaults.creds_keys_file.clone();
        }
        if self.keys_decrypter_file.is_none() {
            self.keys_decrypter_file = defaults.keys_decrypter_file.clone();
        }
        self
    }
}

/// Process-wide fallbacks for the key file paths of an [`EncryptionConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionDefaults {
    pub creds_keys_file: Option<PathBuf>,
    pub keys_decrypter_file: Option<PathBuf>,
}

pub type ModuleFactory = Arc<
    dyn Fn(&EncryptionConfig, &mut dyn Read, &mut dyn Read) -> Result<Box<dyn EncryptionModule>>
        + Send
        + Sync,
>;

/// Maps module identifiers (and plugin paths) to factories.
#[derive(Clone)]
pub struct ModuleRegistry {
    modules: HashMap<String, ModuleFactory>,
    plugins: HashMap<PathBuf, ModuleFactory>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ModuleRegistry {
    /// A registry with no modules at all.
    pub fn empty() -> Self {
        Self {
            modules: HashMap::new(),
            plugins: HashMap::new(),
        }
    }

    /// A registry holding the built-in modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for name in [aes::MODULE_NAME, aes::LEGACY_MODULE_NAME] {
            registry
                .modules
                .insert(name.to_string(), Arc::new(aes::AesGcmModule::factory));
        }
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&EncryptionConfig, &mut dyn Read, &mut dyn Read) -> Result<Box<dyn EncryptionModule>>
            + Send
            + Sync
            + 'static,
    {
        if name.is_empty() || name == PLUGIN_MODULE || self.modules.contains_key(name) {
            return Err(ProjectorError::ModuleAlreadyRegistered(name.to_string()));
        }
        debug!(module = name, "registered encryption module");
        self.modules.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Register the factory a `module: plugin` manifest reaches through `plugin-path`.
    pub fn register_plugin<F>(&mut self, path: impl Into<PathBuf>, factory: F) -> Result<()>
    where
        F: Fn(&EncryptionConfig, &mut dyn Read, &mut dyn Read) -> Result<Box<dyn EncryptionModule>>
            + Send
            + Sync
            + 'static,
    {
        let path = path.into();
        if self.plugins.contains_key(&path) {
            return Err(ProjectorError::ModuleAlreadyRegistered(
                path.display().to_string(),
            ));
        }
        debug!(plugin = %path.display(), "registered encryption plugin");
        self.plugins.insert(path, Arc::new(factory));
        Ok(())
    }

    /// Registered module identifiers, sorted.
    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn factory(&self, config: &EncryptionConfig) -> Result<&ModuleFactory> {
        if config.module == PLUGIN_MODULE {
            let path = config
                .plugin_path
                .as_deref()
                .filter(|p| !p.as_os_str().is_empty())
                .ok_or(ProjectorError::MissingPluginPath)?;
            return self
                .plugins
                .get(path)
                .ok_or_else(|| ProjectorError::PluginNotFound(path.to_path_buf()));
        }
        self.modules
            .get(&config.module)
            .ok_or_else(|| ProjectorError::UnsupportedModule(config.module.clone()))
    }

    /// Open the key files named by `config` and construct its module.
    pub fn build(&self, config: &EncryptionConfig) -> Result<Box<dyn EncryptionModule>> {
        let factory = self.factory(config)?;

        let creds_keys_path = config
            .creds_keys_file
            .as_deref()
            .ok_or_else(|| ProjectorError::MissingKeyFile(config.module.clone()))?;
        let mut creds_keys = open_key_file("creds keys file", creds_keys_path)?;

        // symmetric modules only need one key, so the decrypter may be absent
        let mut decrypter: Box<dyn Read> = match &config.keys_decrypter_file {
            Some(path) => Box::new(open_key_file("keys decrypter file", path)?),
            None => Box::new(std::io::empty()),
        };

        let module = (**factory)(config, &mut creds_keys, &mut decrypter)?;
        debug!(module = module.name(), "constructed encryption module");
        Ok(module)
    }
}

fn open_key_file(label: &'static str, path: &Path) -> Result<File> {
    File::open(path).map_err(|source| ProjectorError::KeyFile {
        label,
        path: path.to_path_buf(),
        source,
    })
}
