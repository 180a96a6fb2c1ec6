//! # Projector
//!
//! Drives a whole run: discover manifests, resolve each mapping's creds
//! repository, project every mapping into a [`Secret`] and write the results.
//!
//! A run is all-or-nothing. If any manifest fails to load, or any mapping
//! fails to project, no secret is written.

use crate::config::{self, Settings};
use crate::encryption::ModuleRegistry;
use crate::error::{ProjectorError, Result};
use crate::mapping::ProjectionMapping;
use crate::secret::Secret;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MANIFEST_EXTENSION: &str = "yaml";

/// What a successful run produced.
#[derive(Debug)]
pub struct Summary {
    pub secrets: Vec<Secret>,
    pub written: Vec<PathBuf>,
}

pub struct Projector {
    settings: Settings,
    registry: ModuleRegistry,
}

impl Projector {
    pub fn new(settings: Settings) -> Self {
        Self::with_registry(settings, ModuleRegistry::default())
    }

    pub fn with_registry(settings: Settings, registry: ModuleRegistry) -> Self {
        Self { settings, registry }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// For registering plugin modules before manifests are loaded.
    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    /// Load every manifest under the configured manifests directory.
    pub fn load_projection_mappings(&self) -> Result<Vec<ProjectionMapping>> {
        let root = self
            .settings
            .manifests
            .as_deref()
            .ok_or_else(|| ProjectorError::Config("manifests requires an argument".into()))?;
        let files = discover_manifests(root)?;
        let defaults = self.settings.encryption_defaults();

        let mut mappings = Vec::with_capacity(files.len());
        let mut failed = 0;
        for file in &files {
            match ProjectionMapping::load_file(file, &defaults, &self.registry) {
                Ok(mapping) => {
                    debug!(path = %file.display(), mapping = %mapping, "loaded manifest");
                    mappings.push(mapping);
                }
                Err(err) => {
                    warn!(path = %file.display(), error = %err, "unable to load manifest");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(ProjectorError::ManifestsFailed {
                failed,
                total: files.len(),
            });
        }
        if mappings.is_empty() {
            return Err(ProjectorError::NoManifests(root.to_path_buf()));
        }
        info!(count = mappings.len(), "loaded projection mappings");
        Ok(mappings)
    }

    /// Directory of the creds repository a mapping reads from.
    pub fn creds_root_for(&self, mapping: &ProjectionMapping) -> Result<&Path> {
        self.settings
            .creds_root(mapping.repo())
            .ok_or_else(|| ProjectorError::UnknownRepo {
                repo: mapping.repo().to_string(),
                namespace: mapping.namespace().to_string(),
                name: mapping.name().to_string(),
            })
    }

    pub fn project(&self, mapping: &ProjectionMapping) -> Result<Secret> {
        let creds_root = self.creds_root_for(mapping)?;
        debug!(mapping = %mapping, creds_root = %creds_root.display(), "projecting mapping");
        let labels = self.settings.deploy_labels();
        mapping.project_secret(creds_root, labels.as_ref())
    }

    /// Project every mapping, failing if any one of them fails.
    pub fn project_all(&self, mappings: &[ProjectionMapping]) -> Result<Vec<Secret>> {
        let mut secrets = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            match self.project(mapping) {
                Ok(secret) => secrets.push(secret),
                Err(err) => {
                    warn!(mapping = %mapping, error = %err, "unable to project mapping");
                }
            }
        }
        if secrets.len() != mappings.len() {
            return Err(ProjectorError::ProjectionFailed {
                expected: mappings.len(),
                succeeded: secrets.len(),
            });
        }
        Ok(secrets)
    }

    /// Load, project and, when an output directory is configured, write.
    pub fn run(&self) -> Result<Summary> {
        let mappings = self.load_projection_mappings()?;
        let secrets = self.project_all(&mappings)?;
        let written = match &self.settings.output {
            Some(dir) => write_secrets(&secrets, dir, config::unix_now())?,
            None => Vec::new(),
        };
        Ok(Summary { secrets, written })
    }
}

/// Every `*.yaml` file under `root`, recursively, in sorted order.
pub fn discover_manifests(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(root, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if path.extension().is_some_and(|ext| ext == MANIFEST_EXTENSION) {
            found.push(path);
        }
    }
    Ok(())
}

/// Write each secret to `<timestamp>-<namespace>-<name>.yaml` under `dir`.
pub fn write_secrets(secrets: &[Secret], dir: &Path, timestamp: u64) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ProjectorError::Config(format!(
            "output {} is not a directory",
            dir.display()
        )));
    }

    let mut written = Vec::with_capacity(secrets.len());
    for secret in secrets {
        let path = dir.join(secret.file_name(timestamp));
        info!(secret = %secret, path = %path.display(), "writing secret");
        write_read_only(&path, secret.to_yaml()?.as_bytes()).map_err(|source| {
            ProjectorError::WriteSecret {
                path: path.clone(),
                source,
            }
        })?;
        written.push(path);
    }
    Ok(written)
}

fn write_read_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;

    // Owner read-only (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o400);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}

/// Rendered secrets as a multi-document YAML stream.
pub fn render_all(secrets: &[Secret]) -> Result<String> {
    let mut out = String::new();
    for secret in secrets {
        out.push_str("---\n");
        out.push_str(&secret.to_yaml()?);
    }
    Ok(out)
}
