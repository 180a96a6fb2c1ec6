//! # Data Sources
//!
//! A [`DataSource`] points at one file inside a creds repository and says how
//! to turn it into the bytes of a single secret field.
//!
//! ## Kinds
//!
//! - **Raw**: the file is copied verbatim.
//! - **JSON / YAML**: the file is parsed and one value (`jsonpath`) or a set of
//!   labelled values (`jsonpaths`) is extracted from it.
//!
//! ## Output format inference
//!
//! | source   | selector    | `format`      | result                     |
//! |----------|-------------|---------------|----------------------------|
//! | raw      | none        | unset / raw   | raw                        |
//! | raw      | none        | json / yaml   | error                      |
//! | json/yaml| `jsonpath`  | unset / raw   | raw                        |
//! | json/yaml| `jsonpath`  | json / yaml   | error                      |
//! | json     | `jsonpaths` | unset         | json                       |
//! | yaml     | `jsonpaths` | unset         | yaml                       |
//! | json/yaml| `jsonpaths` | json / yaml   | as requested               |
//! | json/yaml| `jsonpaths` | raw           | error                      |
//! | json/yaml| none        | any           | error                      |
//!
//! Multi-field output is re-serialized with keys sorted, so projections are
//! reproducible byte for byte.

use crate::document::Node;
use crate::error::{ProjectorError, Result};
use crate::jsonpath;
use crate::scalar::{self, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Encoding of a projected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Raw,
    Json,
    Yaml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Raw => "raw",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        })
    }
}

/// Which file backs a source, and how it is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Json(PathBuf),
    Yaml(PathBuf),
    Raw(PathBuf),
    Unknown,
}

/// What to pull out of a structured source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A single value, emitted as raw bytes.
    Path(String),
    /// Several values keyed by output label, emitted as a JSON or YAML mapping.
    Labeled(BTreeMap<String, String>),
}

/// Manifest shape of a source, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceFields {
    json: Option<String>,
    yaml: Option<String>,
    raw: Option<String>,
    format: Option<OutputFormat>,
    jsonpath: Option<String>,
    jsonpaths: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SourceFields")]
pub struct DataSource {
    kind: SourceKind,
    format: Option<OutputFormat>,
    selector: Option<Selector>,
}

impl TryFrom<SourceFields> for DataSource {
    type Error = ProjectorError;

    fn try_from(fields: SourceFields) -> Result<Self> {
        let present = |s: Option<String>| s.filter(|s| !s.is_empty());

        let mut kinds = Vec::new();
        if let Some(f) = present(fields.json) {
            kinds.push(SourceKind::Json(PathBuf::from(f)));
        }
        if let Some(f) = present(fields.yaml) {
            kinds.push(SourceKind::Yaml(PathBuf::from(f)));
        }
        if let Some(f) = present(fields.raw) {
            kinds.push(SourceKind::Raw(PathBuf::from(f)));
        }
        if kinds.len() > 1 {
            return Err(ProjectorError::MultipleSourceKinds);
        }
        let kind = kinds.pop().unwrap_or(SourceKind::Unknown);

        let path = present(fields.jsonpath);
        let paths = fields.jsonpaths.filter(|p| !p.is_empty());
        let selector = match (path, paths) {
            (Some(_), Some(_)) => return Err(ProjectorError::MultipleSelectors),
            (Some(p), None) => Some(Selector::Path(p)),
            (None, Some(p)) => Some(Selector::Labeled(p)),
            (None, None) => None,
        };

        let source = DataSource {
            kind,
            format: fields.format,
            selector,
        };
        source.validate_selector()?;
        Ok(source)
    }
}

impl DataSource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            format: None,
            selector: None,
        }
    }

    pub fn json(file: impl Into<PathBuf>) -> Self {
        Self::new(SourceKind::Json(file.into()))
    }

    pub fn yaml(file: impl Into<PathBuf>) -> Self {
        Self::new(SourceKind::Yaml(file.into()))
    }

    pub fn raw(file: impl Into<PathBuf>) -> Self {
        Self::new(SourceKind::Raw(file.into()))
    }

    /// Extract a single value.
    pub fn with_path(mut self, expression: impl Into<String>) -> Self {
        self.selector = Some(Selector::Path(expression.into()));
        self
    }

    /// Extract several labelled values.
    pub fn with_paths<I, K, V>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.selector = Some(Selector::Labeled(
            paths
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ));
        self
    }

    /// Request an explicit output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn selector(&self) -> Option<&Selector> {
        self.selector.as_ref()
    }

    pub fn requested_format(&self) -> Option<OutputFormat> {
        self.format
    }

    // Structural checks that do not depend on the requested format.
    fn validate_selector(&self) -> Result<()> {
        match (&self.kind, &self.selector) {
            (SourceKind::Raw(_), Some(_)) => Err(ProjectorError::SelectorOnRawSource),
            (SourceKind::Json(_) | SourceKind::Yaml(_), None) => {
                Err(ProjectorError::MissingSelector)
            }
            _ => Ok(()),
        }
    }

    /// Infer the output format from the source kind, selector and explicit request.
    pub fn resolve_format(&self) -> Result<OutputFormat> {
        self.validate_selector()?;

        let native = match &self.kind {
            SourceKind::Unknown => return Err(ProjectorError::UnknownSourceKind),
            SourceKind::Raw(_) => {
                return match self.format {
                    None | Some(OutputFormat::Raw) => Ok(OutputFormat::Raw),
                    Some(other) => Err(ProjectorError::StructuredFormatOnRawSource(
                        other.to_string(),
                    )),
                };
            }
            SourceKind::Json(_) => OutputFormat::Json,
            SourceKind::Yaml(_) => OutputFormat::Yaml,
        };

        match (&self.selector, self.format) {
            (Some(Selector::Path(_)), None | Some(OutputFormat::Raw)) => Ok(OutputFormat::Raw),
            (Some(Selector::Path(_)), Some(other)) => Err(
                ProjectorError::StructuredFormatOnSinglePath(other.to_string()),
            ),
            (Some(Selector::Labeled(_)), None) => Ok(native),
            (Some(Selector::Labeled(_)), Some(OutputFormat::Raw)) => {
                Err(ProjectorError::RawFormatOnMultiplePaths)
            }
            (Some(Selector::Labeled(_)), Some(requested)) => Ok(requested),
            (None, _) => Err(ProjectorError::MissingSelector),
        }
    }

    /// Resolve the source against `base_dir` and return the field bytes.
    pub fn project(&self, base_dir: &Path) -> Result<Vec<u8>> {
        let format = self.resolve_format()?;

        let path = match &self.kind {
            SourceKind::Raw(file) => {
                let bytes = read_source(&base_dir.join(file))?;
                trace!(source = %self, len = bytes.len(), "projected raw source");
                return Ok(bytes);
            }
            SourceKind::Json(file) | SourceKind::Yaml(file) => base_dir.join(file),
            SourceKind::Unknown => return Err(ProjectorError::UnknownSourceKind),
        };

        let contents = read_source(&path)?;
        let document = match &self.kind {
            SourceKind::Json(_) => Node::from_json_slice(&contents, &path)?,
            _ => Node::from_yaml_slice(&contents, &path)?,
        };
        let bytes = self.extract(&document, format)?;
        trace!(source = %self, %format, len = bytes.len(), "projected structured source");
        Ok(bytes)
    }

    fn extract(&self, document: &Node, format: OutputFormat) -> Result<Vec<u8>> {
        match &self.selector {
            Some(Selector::Path(expression)) => {
                scalar::to_bytes(jsonpath::lookup(document, expression)?)
            }
            Some(Selector::Labeled(paths)) => {
                let mut values = BTreeMap::new();
                for (label, expression) in paths {
                    let node = jsonpath::lookup(document, expression)?;
                    values.insert(label.as_str(), Scalar::try_from(node)?);
                }
                encode_structured(&values, format)
            }
            None => Err(ProjectorError::MissingSelector),
        }
    }
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| ProjectorError::ReadSource {
        path: path.to_path_buf(),
        source,
    })
}

fn encode_structured(values: &BTreeMap<&str, Scalar>, format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Json => {
            serde_json::to_vec(values).map_err(|e| ProjectorError::Render(e.to_string()))
        }
        OutputFormat::Yaml => serde_yaml::to_string(values)
            .map(String::into_bytes)
            .map_err(|e| ProjectorError::Render(e.to_string())),
        OutputFormat::Raw => Err(ProjectorError::RawFormatOnMultiplePaths),
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SourceKind::Json(file) => write!(f, "json:{}", file.display()),
            SourceKind::Yaml(file) => write!(f, "yaml:{}", file.display()),
            SourceKind::Raw(file) => write!(f, "raw:{}", file.display()),
            SourceKind::Unknown => write!(f, "unknown"),
        }
    }
}
