//! Error types for `GizliDB` operations.

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error reported by a storage backend.
pub type StorageSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for `GizliDB` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The raw value has the wrong shape for the target encrypted type
    #[error("invalid value: {0}")]
    Validation(String),

    /// The value has the right shape but cannot be represented by the target type
    #[error("value out of range: {0}")]
    Range(String),

    /// Decryption failed under the supplied context (wrong row, wrong key or tampered data)
    #[error("decryption failed: {0}")]
    DecryptionContext(String),

    /// Misuse of keys, attribute options or predicates
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A migration batch failed and was rolled back
    #[error("migration batch {batch} rolled back: {source}")]
    MigrationBatch {
        /// One-based number of the failed batch
        batch: usize,
        /// The failure that aborted the batch
        #[source]
        source: Box<Error>,
    },

    /// The ciphertext document is malformed or of an unsupported version
    #[error("invalid envelope: {0}")]
    Envelope(String),

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivation,

    /// The storage backend failed
    #[error("storage error: {0}")]
    Storage(#[source] StorageSource),
}

impl Error {
    /// Wraps any backend error as [`Error::Storage`].
    pub fn storage(err: impl Into<StorageSource>) -> Self {
        Self::Storage(err.into())
    }

    /// Returns `true` for failures that the empty-context decode fallback may recover from.
    #[must_use]
    pub const fn is_decryption(&self) -> bool {
        matches!(self, Self::DecryptionContext(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Envelope(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_batch_display_includes_cause() {
        let err = Error::MigrationBatch {
            batch: 3,
            source: Box::new(Error::Range("2^63 does not fit".to_string())),
        };

        assert_eq!(
            err.to_string(),
            "migration batch 3 rolled back: value out of range: 2^63 does not fit"
        );
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "lock wait timeout");
        let err = Error::storage(io);

        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("lock wait timeout"));
    }

    #[test]
    fn test_is_decryption() {
        assert!(Error::DecryptionContext("tag mismatch".to_string()).is_decryption());
        assert!(!Error::Validation("nope".to_string()).is_decryption());
    }
}
