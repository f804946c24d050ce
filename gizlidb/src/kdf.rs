//! Key derivation using HKDF (HMAC-based Key Derivation Function).
//!
//! The root key never encrypts anything directly. Every field gets its own
//! field key, derived from the root key and the field identifier, and every
//! primitive inside a field (AEAD, ORE, text hashes) derives a sub-key from
//! that field key with a purpose label.

use crate::context::FieldId;
use crate::error::Error;
use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

/// Size of every derived key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the key identifier embedded in every envelope.
pub const KEY_ID_SIZE: usize = 4;

const KEY_ID_INFO: &str = "gizlidb/key-identifier";

/// Derives a 32-byte key from `ikm` with `info` as the HKDF info parameter.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the expansion fails.
///
/// # Example
///
/// ```
/// use gizlidb::kdf::derive_key;
/// use secrecy::SecretVec;
///
/// let root = SecretVec::new(vec![0u8; 32]);
/// let key = derive_key(&root, "people|first_name").expect("derivation failed");
/// ```
pub fn derive_key(ikm: &SecretVec<u8>, info: &str) -> Result<SecretVec<u8>, Error> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm.expose_secret());

    let mut key = vec![0u8; KEY_SIZE];
    hkdf.expand(info.as_bytes(), &mut key).map_err(|_| Error::KeyDerivation)?;

    Ok(SecretVec::new(key))
}

/// Derives the field key for an attribute from the root key.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the expansion fails.
pub fn derive_field_key(root: &SecretVec<u8>, id: &FieldId) -> Result<SecretVec<u8>, Error> {
    derive_key(root, &format!("gizlidb/field/{id}"))
}

/// Derives the short identifier of a root key.
///
/// The identifier is embedded in envelopes so ciphertexts produced under a
/// different root key are rejected before any decryption is attempted.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the expansion fails.
pub fn derive_key_id(root: &SecretVec<u8>) -> Result<[u8; KEY_ID_SIZE], Error> {
    let key = derive_key(root, KEY_ID_INFO)?;
    let mut id = [0u8; KEY_ID_SIZE];
    id.copy_from_slice(&key.expose_secret()[..KEY_ID_SIZE]);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_field_key_deterministic() {
        let root = SecretVec::new(vec![1u8; 32]);
        let id = FieldId::new("people", "first_name");

        let k1 = derive_field_key(&root, &id).expect("derivation failed");
        let k2 = derive_field_key(&root, &id).expect("derivation failed");

        assert_eq!(k1.expose_secret(), k2.expose_secret());
        assert_eq!(k1.expose_secret().len(), KEY_SIZE);
    }

    #[test]
    fn test_derive_field_key_different_fields() {
        let root = SecretVec::new(vec![1u8; 32]);

        let k1 = derive_field_key(&root, &FieldId::new("people", "first_name")).unwrap();
        let k2 = derive_field_key(&root, &FieldId::new("people", "last_name")).unwrap();
        let k3 = derive_field_key(&root, &FieldId::new("staff", "first_name")).unwrap();

        assert_ne!(k1.expose_secret(), k2.expose_secret());
        assert_ne!(k1.expose_secret(), k3.expose_secret());
    }

    #[test]
    fn test_derive_field_key_different_roots() {
        let id = FieldId::new("people", "first_name");

        let k1 = derive_field_key(&SecretVec::new(vec![1u8; 32]), &id).unwrap();
        let k2 = derive_field_key(&SecretVec::new(vec![2u8; 32]), &id).unwrap();

        assert_ne!(k1.expose_secret(), k2.expose_secret());
    }

    #[test]
    fn test_key_id_depends_only_on_root() {
        let root = SecretVec::new(vec![9u8; 32]);

        assert_eq!(derive_key_id(&root).unwrap(), derive_key_id(&root).unwrap());
        assert_ne!(
            derive_key_id(&root).unwrap(),
            derive_key_id(&SecretVec::new(vec![8u8; 32])).unwrap()
        );
    }

    // RFC 5869 Test Vector (using HKDF-SHA256)
    // https://tools.ietf.org/html/rfc5869#appendix-A.1
    #[test]
    fn test_hkdf_rfc5869_test_case_1() {
        const IKM_HEX: &str = "0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b";
        const SALT_HEX: &str = "000102030405060708090a0b0c";
        const INFO_HEX: &str = "f0f1f2f3f4f5f6f7f8f9";
        const EXPECTED_OKM_HEX: &str =
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865";

        let ikm = hex::decode(IKM_HEX).unwrap();
        let salt = hex::decode(SALT_HEX).unwrap();
        let info = hex::decode(INFO_HEX).unwrap();
        let expected_okm = hex::decode(EXPECTED_OKM_HEX).unwrap();

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), &ikm);
        let mut okm = vec![0u8; 42];
        hkdf.expand(&info, &mut okm).expect("HKDF expand failed");

        assert_eq!(okm, expected_okm);
    }
}
