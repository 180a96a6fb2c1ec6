//! # Passphrase-keyed AES-256-GCM
//!
//! The built-in encryption module. It is registered as `aes-gcm`, and as `cbc`
//! for manifests written against older releases.
//!
//! ## Key derivation
//!
//! The creds keys file holds a JSON object `{"password": "..."}`. The
//! passphrase is hashed with the digest named by `params.hash` and the
//! lowercase hex text of that digest becomes the cipher key:
//!
//! - longer than 32 bytes: the trailing 32 bytes are kept
//! - shorter than 32 bytes: left-padded with zero bytes
//!
//! | `params.hash` | hex length | key                    |
//! |---------------|------------|------------------------|
//! | `md5` (default) | 32       | the full hex digest    |
//! | `sha1`        | 40         | last 32 hex characters |
//! | `sha256`      | 64         | last 32 hex characters |
//! | `sha512`      | 128        | last 32 hex characters |
//!
//! `params.cipher` defaults to `aes`, which is the only supported cipher.
//!
//! ## Encrypted Data Format
//!
//! ```text
//! [12-byte nonce][variable-length ciphertext + 16-byte GCM tag]
//! ```
//!
//! A fresh random nonce is drawn for every call to `encrypt`, so encrypting
//! the same plaintext twice never yields the same bytes.

use super::{EncryptionConfig, EncryptionModule, Key};
use crate::error::{ProjectorError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use md5::Md5;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use tracing::trace;

pub const MODULE_NAME: &str = "aes-gcm";
pub const LEGACY_MODULE_NAME: &str = "cbc";

pub const KEY_SIZE: usize = 32; // 256 bits
pub const NONCE_SIZE: usize = 12; // 96 bits for GCM

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Md5 => Md5::digest(data).to_vec(),
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = ProjectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(ProjectorError::UnsupportedHash(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    Aes,
}

impl CipherAlgorithm {
    pub fn key_len(&self) -> usize {
        match self {
            CipherAlgorithm::Aes => KEY_SIZE,
        }
    }
}

impl FromStr for CipherAlgorithm {
    type Err = ProjectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aes" => Ok(CipherAlgorithm::Aes),
            other => Err(ProjectorError::UnsupportedCipher(other.to_string())),
        }
    }
}

/// Keep the trailing `size` bytes of `data`, or left-pad it with zeros.
pub fn pad_or_trim(data: &[u8], size: usize) -> Vec<u8> {
    let len = data.len();
    if len >= size {
        return data[len - size..].to_vec();
    }
    let mut padded = vec![0u8; size];
    padded[size - len..].copy_from_slice(data);
    padded
}

/// The passphrase read from the creds keys file.
#[derive(Clone, Serialize, Deserialize)]
pub struct PasswordKey {
    password: String,
}

impl PasswordKey {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    pub fn from_reader(reader: &mut dyn Read) -> Result<Self> {
        serde_json::from_reader(reader).map_err(|e| ProjectorError::InvalidKey(e.to_string()))
    }
}

impl fmt::Debug for PasswordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordKey")
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Key for PasswordKey {
    fn plaintext(&self) -> &str {
        &self.password
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProjectorError::Render(e.to_string()))
    }
}

/// Cipher key derived from a passphrase.
#[derive(Clone)]
pub struct DerivedKey {
    hashed: String,
    padded: Vec<u8>,
}

impl DerivedKey {
    pub fn derive(password: &str, hash: HashAlgorithm, cipher: CipherAlgorithm) -> Self {
        let hashed = hex::encode(hash.digest(password.as_bytes()));
        let padded = pad_or_trim(hashed.as_bytes(), cipher.key_len());
        Self { hashed, padded }
    }

    /// Hex digest of the passphrase, before padding.
    pub fn hashed(&self) -> &str {
        &self.hashed
    }

    /// The bytes handed to the cipher.
    pub fn as_bytes(&self) -> &[u8] {
        &self.padded
    }
}

pub struct AesGcmModule {
    key: PasswordKey,
    derived: DerivedKey,
    cipher: Aes256Gcm,
}

impl AesGcmModule {
    /// Build from an encryption config and the creds keys stream.
    pub fn new(config: &EncryptionConfig, creds_key: &mut dyn Read) -> Result<Self> {
        let cipher: CipherAlgorithm = config.param("cipher").unwrap_or("aes").parse()?;
        let hash: HashAlgorithm = config.param("hash").unwrap_or("md5").parse()?;
        let key = PasswordKey::from_reader(creds_key)?;
        Self::from_key(key, hash, cipher)
    }

    pub fn from_key(key: PasswordKey, hash: HashAlgorithm, cipher: CipherAlgorithm) -> Result<Self> {
        let derived = DerivedKey::derive(&key.password, hash, cipher);
        let cipher = match cipher {
            CipherAlgorithm::Aes => Aes256Gcm::new_from_slice(derived.as_bytes())
                .map_err(|e| ProjectorError::Crypto(e.to_string()))?,
        };
        trace!(?hash, "derived aes-gcm key");
        Ok(Self {
            key,
            derived,
            cipher,
        })
    }

    /// Matches the [`super::ModuleFactory`] signature; the secondary stream is unused.
    pub fn factory(
        config: &EncryptionConfig,
        primary: &mut dyn Read,
        _secondary: &mut dyn Read,
    ) -> Result<Box<dyn EncryptionModule>> {
        Ok(Box::new(Self::new(config, primary)?))
    }

    pub fn derived_key(&self) -> &DerivedKey {
        &self.derived
    }
}

impl EncryptionModule for AesGcmModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| ProjectorError::Crypto(e.to_string()))?;

        // Format: nonce + ciphertext
        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(ProjectorError::Crypto("Ciphertext too short".into()));
        }

        let (nonce_bytes, encrypted_data) = ciphertext.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, encrypted_data)
            .map_err(|e| ProjectorError::Crypto(e.to_string()))
    }

    fn decryption_keys(&self) -> Result<Vec<Box<dyn Key>>> {
        Ok(vec![Box::new(self.key.clone())])
    }
}
