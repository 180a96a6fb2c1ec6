//! # Projection Mappings
//!
//! A manifest describes one secret: its identity, the creds repository its
//! sources live in, and the fields to project.
//!
//! ```yaml
//! name: app-creds
//! namespace: team-a
//! repo: production
//! encryption:
//!   module: aes-gcm
//!   include_decryption_keys: true
//!   params:
//!     hash: sha256
//! data:
//! - name: password
//!   encrypt: true
//!   source:
//!     json: db/credentials.json
//!     jsonpath: $.password
//! - name: tls.crt
//!   source:
//!     raw: certs/app.crt
//! ```
//!
//! Parsing is strict: unknown fields anywhere in the manifest are rejected.
//! The encryption module, if any, is constructed when the manifest is loaded,
//! so a bad `encryption` block fails before any source is read.

use crate::encryption::{EncryptionConfig, EncryptionDefaults, EncryptionModule, ModuleRegistry};
use crate::error::{ProjectorError, Result};
use crate::secret::{DeployLabels, Secret};
use crate::source::DataSource;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// One field of a projected secret.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretEntry {
    pub name: String,
    #[serde(default)]
    pub encrypt: bool,
    pub source: DataSource,
}

impl SecretEntry {
    pub fn new(name: impl Into<String>, source: DataSource) -> Self {
        Self {
            name: name.into(),
            encrypt: false,
            source,
        }
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    fn project(&self, base_dir: &Path, module: Option<&dyn EncryptionModule>) -> Result<Vec<u8>> {
        // checked before touching the source so plaintext is never produced
        let module = match (self.encrypt, module) {
            (true, None) => {
                return Err(ProjectorError::EncryptionNotConfigured {
                    entry: self.name.clone(),
                })
            }
            (true, Some(module)) => Some(module),
            (false, _) => None,
        };

        let wrap = |source: ProjectorError| ProjectorError::Entry {
            name: self.name.clone(),
            source: Box::new(source),
        };

        let bytes = self.source.project(base_dir).map_err(wrap)?;
        match module {
            Some(module) => {
                let encrypted = module.encrypt(&bytes).map_err(wrap)?;
                trace!(entry = %self, module = module.name(), len = encrypted.len(), "encrypted entry");
                Ok(encrypted)
            }
            None => Ok(bytes),
        }
    }
}

impl fmt::Display for SecretEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.source)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    name: String,
    namespace: String,
    repo: String,
    #[serde(default)]
    data: Vec<SecretEntry>,
    #[serde(default)]
    encryption: Option<EncryptionConfig>,
}

pub struct ProjectionMapping {
    name: String,
    namespace: String,
    repo: String,
    data: Vec<SecretEntry>,
    encryption: Option<EncryptionConfig>,
    module: Option<Box<dyn EncryptionModule>>,
}

impl ProjectionMapping {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        repo: impl Into<String>,
        data: Vec<SecretEntry>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            repo: repo.into(),
            data,
            encryption: None,
            module: None,
        }
    }

    /// Attach an already constructed encryption module.
    pub fn with_encryption(
        mut self,
        config: EncryptionConfig,
        module: Box<dyn EncryptionModule>,
    ) -> Self {
        self.encryption = Some(config);
        self.module = Some(module);
        self
    }

    /// Parse a manifest and build its encryption module.
    ///
    /// Key file paths the manifest leaves out are taken from `defaults`.
    pub fn load(
        raw: &[u8],
        defaults: &EncryptionDefaults,
        registry: &ModuleRegistry,
    ) -> Result<Self> {
        let manifest: Manifest =
            serde_yaml::from_slice(raw).map_err(|e| ProjectorError::Manifest(e.to_string()))?;

        let (encryption, module) = match manifest.encryption {
            Some(config) if config.module.is_empty() => (Some(config), None),
            Some(config) => {
                let config = config.with_defaults(defaults);
                let module = registry.build(&config)?;
                (Some(config), Some(module))
            }
            None => (None, None),
        };

        let mapping = Self {
            name: manifest.name,
            namespace: manifest.namespace,
            repo: manifest.repo,
            data: manifest.data,
            encryption,
            module,
        };
        debug!(mapping = %mapping, "loaded projection mapping");
        Ok(mapping)
    }

    pub fn load_file(
        path: &Path,
        defaults: &EncryptionDefaults,
        registry: &ModuleRegistry,
    ) -> Result<Self> {
        let raw = fs::read(path).map_err(|source| ProjectorError::ReadSource {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(&raw, defaults, registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Tag of the creds repository the sources are resolved against.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn data(&self) -> &[SecretEntry] {
        &self.data
    }

    pub fn encryption(&self) -> Option<&EncryptionConfig> {
        self.encryption.as_ref()
    }

    pub fn module(&self) -> Option<&dyn EncryptionModule> {
        self.module.as_deref()
    }

    /// Project every entry against `base_dir`.
    ///
    /// Either every entry is present in the result or an error is returned.
    /// When the encryption config asks for it, the module's decryption keys
    /// are appended as `keys_1.json`, `keys_2.json`, ... and an entry already
    /// using one of those names is an error.
    pub fn project(&self, base_dir: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut data = BTreeMap::new();
        for entry in &self.data {
            let bytes = entry.project(base_dir, self.module())?;
            debug!(mapping = %self, entry = %entry, encrypted = entry.encrypt, len = bytes.len(), "projected entry");
            data.insert(entry.name.clone(), bytes);
        }

        let include_keys = self
            .encryption
            .as_ref()
            .is_some_and(|c| c.include_decryption_keys);
        if let (true, Some(module)) = (include_keys, self.module()) {
            for (i, key) in module.decryption_keys()?.iter().enumerate() {
                let name = decryption_key_name(i + 1);
                if data.contains_key(&name) {
                    return Err(ProjectorError::DecryptionKeyCollision(name));
                }
                data.insert(name, key.to_json()?);
            }
        }

        Ok(data)
    }

    /// Project into a [`Secret`], labelled when `labels` is given.
    pub fn project_secret(&self, base_dir: &Path, labels: Option<&DeployLabels>) -> Result<Secret> {
        let data = self.project(base_dir)?;
        let secret = Secret::new(&self.name, &self.namespace, data);
        Ok(match labels {
            Some(labels) => secret.with_labels(labels),
            None => secret,
        })
    }
}

/// Name a decryption key is stored under, `index` starting at 1.
pub fn decryption_key_name(index: usize) -> String {
    format!("keys_{}.json", index)
}

impl fmt::Display for ProjectionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}{{", self.namespace, self.name, self.repo)?;
        for (i, entry) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", entry)?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for ProjectionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionMapping")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("repo", &self.repo)
            .field("data", &self.data)
            .field("encryption", &self.encryption)
            .field("module", &self.module.as_ref().map(|m| m.name()))
            .finish()
    }
}
