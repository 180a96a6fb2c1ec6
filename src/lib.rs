//! # secret-projector
//!
//! Projects credentials kept in one or more creds repositories into
//! Kubernetes `Secret` manifests, driven by small YAML projection mappings.
//!
//! ## Features
//!
//! - **Field extraction**: Pull single values or labelled sets of values out of JSON and YAML files with path expressions
//! - **Raw files**: Copy certificates, keys and other blobs byte for byte
//! - **Format inference**: Multi-field projections keep the source's native format unless told otherwise
//! - **Field encryption**: Encrypt selected fields with AES-256-GCM, optionally shipping the decryption keys alongside
//! - **Pluggable modules**: Register additional encryption modules from the host process
//! - **All-or-nothing runs**: Either every secret is produced or none is written
//!
//! ## Quick Start
//!
//! ```bash
//! secret-projector \
//!   --creds-repo production=/srv/creds/production \
//!   --manifests ./manifests \
//!   --output ./out \
//!   --creds-encryption-key /etc/secret-projector/creds_keys.json
//! ```
//!
//! Each `*.yaml` under `--manifests` (searched recursively) is a projection
//! mapping:
//!
//! ```yaml
//! name: app-creds
//! namespace: team-a
//! repo: production
//! data:
//! - name: db-password
//!   encrypt: true
//!   source:
//!     json: db/credentials.json
//!     jsonpath: $.password
//! - name: settings.yaml
//!   source:
//!     yaml: app/settings.yaml
//!     jsonpaths:
//!       host: $.db.host
//!       replicas: $.db.replicas
//! - name: tls.crt
//!   source:
//!     raw: certs/app.crt
//! encryption:
//!   module: aes-gcm
//!   include_decryption_keys: false
//!   params:
//!     hash: sha256
//! ```
//!
//! ## How It Works
//!
//! ```text
//! manifests/*.yaml → ProjectionMapping → DataSource::project (per entry)
//!                                      → EncryptionModule::encrypt (entries with encrypt: true)
//!                                      → Secret → <unix>-<namespace>-<name>.yaml
//! ```
//!
//! 1. Manifests are parsed strictly; typos in field names are errors.
//! 2. A mapping's `repo` tag picks the creds repository its sources are read from.
//! 3. Each entry's source is read and normalized to bytes.
//! 4. Encrypted entries go through the mapping's encryption module.
//! 5. The resulting secrets are labelled and written read-only.
//!
//! ### Value normalization
//!
//! | extracted value   | bytes in the secret              |
//! |-------------------|----------------------------------|
//! | string            | unchanged                        |
//! | integer / float   | decimal text                     |
//! | bool              | `true` / `false`                 |
//! | list of strings   | comma-joined                     |
//! | anything else     | error                            |
//!
//! ## Module Overview
//!
//! - [`source`] - Data sources and output format inference
//! - [`jsonpath`] - Path expressions over parsed documents
//! - [`scalar`] - Scalar normalization of extracted values
//! - [`document`] - The parsed document tree shared by JSON and YAML
//! - [`encryption`] - The encryption module contract, registry and AES-256-GCM module
//! - [`mapping`] - Secret entries and projection mappings
//! - [`secret`] - The emitted `Secret` record
//! - [`config`] - Layered settings
//! - [`projector`] - Manifest discovery and whole-run orchestration
//! - [`error`] - Error types and unified error handling
//!
//! ## Cryptography Details
//!
//! - **Algorithm**: AES-256-GCM (Galois/Counter Mode)
//! - **Key**: hex digest of a passphrase (`md5` by default), fitted to 32 bytes
//! - **Nonce size**: 96 bits (12 bytes), randomly generated per encryption
//! - **Authentication**: Built into GCM mode (16-byte tag)
//!
//! ```text
//! [12-byte nonce][variable-length ciphertext + 16-byte GCM tag]
//! ```
//!
//! ## Logging
//!
//! The binary logs through `tracing`. Set `SECRET_PROJECTOR_LOG` to any
//! `EnvFilter` directive (for example `secret_projector=trace`) to override the
//! default level.
//!
//! ## Testing
//!
//! ```bash
//! # Unit tests
//! cargo test --lib
//!
//! # Library-level projection tests over the fixtures
//! cargo test --test projection_test
//!
//! # End-to-end tests of the binary
//! cargo test --test cli_test
//! ```
//!
//! Fixtures live under `tests/fixtures/`.

pub mod config;
pub mod document;
pub mod encryption;
pub mod error;
pub mod jsonpath;
pub mod mapping;
pub mod projector;
pub mod scalar;
pub mod secret;
pub mod source;

// Re-export commonly used types
pub use config::Settings;
pub use encryption::{EncryptionConfig, EncryptionModule, Key, ModuleRegistry};
pub use error::{ProjectorError, Result};
pub use mapping::{ProjectionMapping, SecretEntry};
pub use projector::Projector;
pub use secret::Secret;
pub use source::{DataSource, OutputFormat};
