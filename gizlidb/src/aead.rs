//! Authenticated encryption of attribute payloads.
//!
//! Payloads are sealed with ChaCha20-Poly1305 under the field's AEAD key.
//! The record context is bound as associated data, so a ciphertext copied to
//! another row fails authentication.

use crate::envelope::AeadCiphertext;
use crate::error::Error;
use chacha20poly1305::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    ChaCha20Poly1305, Nonce,
};
use secrecy::{ExposeSecret, SecretVec};

/// Nonce size for ChaCha20-Poly1305 (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size appended to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// Encrypts `plaintext` with `context` as associated data.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the key has the wrong size and
/// `Error::Validation` if the cipher rejects the payload.
pub fn seal(key: &SecretVec<u8>, plaintext: &[u8], context: &str) -> Result<AeadCiphertext, Error> {
    let cipher =
        ChaCha20Poly1305::new_from_slice(key.expose_secret()).map_err(|_| Error::KeyDerivation)?;

    let mut iv = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ct = cipher
        .encrypt(&Nonce::from(iv), Payload { msg: plaintext, aad: context.as_bytes() })
        .map_err(|e| Error::Validation(format!("payload cannot be encrypted: {e}")))?;

    Ok(AeadCiphertext { iv, ct })
}

/// Decrypts a sealed payload, checking `context` against the associated data.
///
/// # Errors
///
/// Returns `Error::DecryptionContext` if the context does not match or the
/// ciphertext was modified.
pub fn open(key: &SecretVec<u8>, sealed: &AeadCiphertext, context: &str) -> Result<Vec<u8>, Error> {
    let cipher =
        ChaCha20Poly1305::new_from_slice(key.expose_secret()).map_err(|_| Error::KeyDerivation)?;

    cipher
        .decrypt(
            &Nonce::from(sealed.iv),
            Payload { msg: &sealed.ct, aad: context.as_bytes() },
        )
        .map_err(|_| {
            Error::DecryptionContext(
                "authentication failed: wrong context or tampered ciphertext".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretVec<u8> {
        SecretVec::new(vec![42u8; 32])
    }

    #[test]
    fn test_seal_open_round_trip() {
        let sealed = seal(&key(), b"alice", "17").unwrap();
        assert_eq!(open(&key(), &sealed, "17").unwrap(), b"alice");
    }

    #[test]
    fn test_ciphertext_includes_tag() {
        let sealed = seal(&key(), b"", "").unwrap();
        assert_eq!(sealed.ct.len(), TAG_SIZE);
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let a = seal(&key(), b"same", "1").unwrap();
        let b = seal(&key(), b"same", "1").unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ct, b.ct);
    }

    #[test]
    fn test_wrong_context_fails() {
        let sealed = seal(&key(), b"alice", "17").unwrap();
        let result = open(&key(), &sealed, "18");

        assert!(matches!(result, Err(Error::DecryptionContext(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut sealed = seal(&key(), b"alice", "17").unwrap();
        sealed.ct[0] ^= 0xFF;

        assert!(matches!(open(&key(), &sealed, "17"), Err(Error::DecryptionContext(_))));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&key(), b"alice", "17").unwrap();
        let other = SecretVec::new(vec![7u8; 32]);

        assert!(open(&other, &sealed, "17").is_err());
    }
}
