use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot read file {}: {source}", path.display())]
    ReadSource {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to parse {}: {message}", path.display())]
    ParseSource { path: PathBuf, message: String },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("invalid path expression '{expression}': {reason}")]
    InvalidPath { expression: String, reason: String },

    #[error("path '{expression}' not found: {reason}")]
    PathNotFound { expression: String, reason: String },

    #[error("unable to extract scalar value, unsupported datatype {0}")]
    UnsupportedValue(String),

    #[error("unable to extract scalar value from sequence, only sequences of strings are supported; try extracting a specific element. unsupported element {0}")]
    UnsupportedSequenceElement(String),

    #[error("only raw format is supported for raw sources (requested {0})")]
    StructuredFormatOnRawSource(String),

    #[error("output format requested is structured ({0}), but a single path extraction only supports raw output")]
    StructuredFormatOnSinglePath(String),

    #[error("output format requested is raw, but multiple labelled paths require structured output")]
    RawFormatOnMultiplePaths,

    #[error("either jsonpath or jsonpaths needs to be defined for structured sources")]
    MissingSelector,

    #[error("only one of jsonpath or jsonpaths may be defined")]
    MultipleSelectors,

    #[error("raw sources do not support jsonpath or jsonpaths")]
    SelectorOnRawSource,

    #[error("only one of json, yaml or raw may be defined for a source")]
    MultipleSourceKinds,

    #[error("unable to project unknown type datasource")]
    UnknownSourceKind,

    #[error("secret entry '{name}': {source}")]
    Entry {
        name: String,
        source: Box<ProjectorError>,
    },

    #[error("encryption of data element '{entry}' was requested, but no encryption config was found to instantiate an encryption module")]
    EncryptionNotConfigured { entry: String },

    #[error("decryption key '{0}' would overwrite the secret entry of the same name")]
    DecryptionKeyCollision(String),

    #[error("unsupported encryption module '{0}'")]
    UnsupportedModule(String),

    #[error("encryption module name '{0}' is reserved or already registered")]
    ModuleAlreadyRegistered(String),

    #[error("plugin-path is required for encryption module 'plugin'")]
    MissingPluginPath,

    #[error("no encryption plugin registered for plugin-path {}", .0.display())]
    PluginNotFound(PathBuf),

    #[error("unsupported cipher {0}")]
    UnsupportedCipher(String),

    #[error("unsupported hash {0}")]
    UnsupportedHash(String),

    #[error("no creds keys file configured for encryption module '{0}' (see --creds-encryption-key)")]
    MissingKeyFile(String),

    #[error("unable to open {label} {}: {source}", path.display())]
    KeyFile {
        label: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to load key: {0}")]
    InvalidKey(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("no creds repo configured for '{repo}' used by {namespace}/{name} (perhaps you missed a --creds-repo={repo}=/path/to/repo argument)")]
    UnknownRepo {
        repo: String,
        namespace: String,
        name: String,
    },

    #[error("unable to load {failed} of {total} projection mappings")]
    ManifestsFailed { failed: usize, total: usize },

    #[error("no projection mappings found under {}", .0.display())]
    NoManifests(PathBuf),

    #[error("expected to create {expected} secrets, but only successfully created {succeeded}")]
    ProjectionFailed { expected: usize, succeeded: usize },

    #[error("unable to write secret to {}: {source}", path.display())]
    WriteSecret {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to render secret: {0}")]
    Render(String),
}

impl ProjectorError {
    /// The innermost error, looking through `Entry` wrappers.
    pub fn root_cause(&self) -> &ProjectorError {
        match self {
            ProjectorError::Entry { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectorError>;
