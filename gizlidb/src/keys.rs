//! Root key management.
//!
//! A [`KeyContext`] holds the 32-byte root key. It is set exactly once and
//! never replaced; rotating keys means migrating into new columns under a
//! fresh context, not swapping the key in place. Most applications use the
//! process-wide instance returned by [`global`].

use std::sync::OnceLock;

use secrecy::{ExposeSecret, SecretVec};
use tracing::debug;

use crate::context::FieldId;
use crate::error::Error;
use crate::field::Field;
use crate::kdf::{derive_key_id, KEY_ID_SIZE, KEY_SIZE};

struct RootKey {
    key: SecretVec<u8>,
    id: [u8; KEY_ID_SIZE],
}

/// Holder of the root key.
///
/// # Example
///
/// ```
/// use gizlidb::keys::KeyContext;
///
/// let keys = KeyContext::new();
/// assert!(keys.field("people", "first_name").is_err());
///
/// keys.set_key(&[7u8; 32]).expect("key rejected");
/// let field = keys.field("people", "first_name").expect("no field");
/// assert_eq!(field.id().to_string(), "people|first_name");
/// ```
pub struct KeyContext {
    root: OnceLock<RootKey>,
}

impl KeyContext {
    /// Creates a context with no key set.
    #[must_use]
    pub const fn new() -> Self {
        Self { root: OnceLock::new() }
    }

    /// Installs the root key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `key` is not exactly 32 bytes or a
    /// key has already been set.
    pub fn set_key(&self, key: &[u8]) -> Result<(), Error> {
        if key.len() != KEY_SIZE {
            return Err(Error::Configuration(format!(
                "root key must be {KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }

        let key = SecretVec::new(key.to_vec());
        let id = derive_key_id(&key)?;
        self.root
            .set(RootKey { key, id })
            .map_err(|_| Error::Configuration("root key has already been set".to_string()))
    }

    /// Returns `true` once a key has been installed.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.root.get().is_some()
    }

    /// Identifier of the installed root key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if no key has been set.
    pub fn key_id(&self) -> Result<[u8; KEY_ID_SIZE], Error> {
        self.root_key().map(|root| root.id)
    }

    /// Derives the crypto handle for an attribute.
    ///
    /// Derivation is deterministic, so repeated calls yield equivalent
    /// handles.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if no key has been set.
    pub fn field(&self, relation: &str, attribute: &str) -> Result<Field, Error> {
        let root = self.root_key()?;
        let id = FieldId::new(relation, attribute);
        debug!(field = %id, "deriving field key");
        Field::derive(&root.key, root.id, id)
    }

    fn root_key(&self) -> Result<&RootKey, Error> {
        self.root.get().ok_or_else(|| {
            Error::Configuration("no root key has been set; call set_key first".to_string())
        })
    }
}

impl Default for KeyContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyContext").field("set", &self.is_set()).finish()
    }
}

static GLOBAL: KeyContext = KeyContext::new();

/// The process-wide key context.
#[must_use]
pub fn global() -> &'static KeyContext {
    &GLOBAL
}

/// Installs the process-wide root key.
///
/// # Errors
///
/// Returns `Error::Configuration` if the key has the wrong length or was
/// already set.
pub fn set_root_key(key: &[u8]) -> Result<(), Error> {
    GLOBAL.set_key(key)
}

/// Copy of the process-wide root key.
///
/// # Errors
///
/// Returns `Error::Configuration` if no key has been set.
pub fn root() -> Result<SecretVec<u8>, Error> {
    GLOBAL.root_key().map(|root| SecretVec::new(root.key.expose_secret().clone()))
}
