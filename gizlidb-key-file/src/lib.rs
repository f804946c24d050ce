//! Root key files for `GizliDB`.
//!
//! A key file holds the 32-byte root key as 64 hexadecimal characters. It is
//! created with `0600` permissions and never overwritten, suitable for
//! development and single-host deployments.
//!
//! The key can also be supplied through the [`ROOT_KEY_ENV`] environment
//! variable in the same hexadecimal form.

#![warn(clippy::pedantic, clippy::nursery)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use gizlidb::kdf::KEY_SIZE;
use gizlidb::keys::KeyContext;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretVec};
use tracing::info;
use zeroize::Zeroizing;

/// Environment variable holding a hex-encoded root key.
pub const ROOT_KEY_ENV: &str = "GIZLIDB_ROOT_KEY";

/// Errors from reading, writing or installing key files.
#[derive(Debug, thiserror::Error)]
pub enum KeyFileError {
    /// Filesystem access failed
    #[error("key file {}: {source}", path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Refused to overwrite an existing key
    #[error("key file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The key material is not 32 hex-encoded bytes
    #[error("invalid root key: {0}")]
    InvalidKey(String),

    /// The key context rejected the key
    #[error(transparent)]
    Install(#[from] gizlidb::Error),
}

/// A root key stored on disk.
#[derive(Debug, Clone)]
pub struct KeyFile {
    path: PathBuf,
}

impl KeyFile {
    /// Refers to the key file at `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the key file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a freshly generated random root key.
    ///
    /// # Errors
    ///
    /// Returns `KeyFileError::AlreadyExists` if the file exists, and
    /// `KeyFileError::Io` if it cannot be created.
    pub fn generate(&self) -> Result<(), KeyFileError> {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut key[..]);
        let encoded = Zeroizing::new(hex::encode(&key[..]));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                KeyFileError::AlreadyExists(self.path.clone())
            } else {
                self.io_error(source)
            }
        })?;
        writeln!(file, "{}", encoded.as_str()).map_err(|source| self.io_error(source))?;
        file.sync_all().map_err(|source| self.io_error(source))?;

        info!(path = %self.path.display(), "generated root key");
        Ok(())
    }

    /// Reads the root key.
    ///
    /// # Errors
    ///
    /// Returns `KeyFileError::Io` if the file cannot be read and
    /// `KeyFileError::InvalidKey` if it does not hold exactly 32 bytes.
    pub fn load(&self) -> Result<SecretVec<u8>, KeyFileError> {
        let contents =
            Zeroizing::new(fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?);
        decode_key(&contents)
    }

    /// Loads the root key into `keys` and returns its key identifier.
    ///
    /// # Errors
    ///
    /// Returns loading errors, or `KeyFileError::Install` if `keys` already
    /// holds a key.
    pub fn install(&self, keys: &KeyContext) -> Result<[u8; 4], KeyFileError> {
        let key = self.load()?;
        keys.set_key(key.expose_secret())?;
        Ok(keys.key_id()?)
    }

    fn io_error(&self, source: std::io::Error) -> KeyFileError {
        KeyFileError::Io { path: self.path.clone(), source }
    }
}

/// Decodes a hex-encoded root key, ignoring surrounding whitespace.
///
/// # Errors
///
/// Returns `KeyFileError::InvalidKey` for malformed input or a length other
/// than 32 bytes.
pub fn decode_key(encoded: &str) -> Result<SecretVec<u8>, KeyFileError> {
    let bytes = Zeroizing::new(
        hex::decode(encoded.trim()).map_err(|e| KeyFileError::InvalidKey(e.to_string()))?,
    );
    if bytes.len() != KEY_SIZE {
        return Err(KeyFileError::InvalidKey(format!(
            "expected {KEY_SIZE} bytes, found {}",
            bytes.len()
        )));
    }
    Ok(SecretVec::new(bytes.to_vec()))
}

/// Installs the key from [`ROOT_KEY_ENV`] into `keys`, if the variable is set.
///
/// Returns `Ok(false)` when the variable is unset.
///
/// # Errors
///
/// Returns `KeyFileError::InvalidKey` for malformed keys and
/// `KeyFileError::Install` if `keys` already holds a key.
pub fn install_from_env(keys: &KeyContext) -> Result<bool, KeyFileError> {
    let Ok(encoded) = std::env::var(ROOT_KEY_ENV) else {
        return Ok(false);
    };
    let encoded = Zeroizing::new(encoded);
    let key = decode_key(&encoded)?;
    keys.set_key(key.expose_secret())?;
    Ok(true)
}
