//! Keyed digests of text values.
//!
//! Text cannot be fed to the order-revealing cipher directly, so equality
//! queries work on a blind index instead: a keyed HMAC digest of the text,
//! truncated to 64 bits and then ORE-encrypted like any integer. A second,
//! independently keyed digest truncated to 32 bits is stored in the clear as
//! a hash code (`h`) for reduced-security attributes, so storage can
//! partition equality candidates before comparing order terms.

use crate::error::Error;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn digest(key: &SecretVec<u8>, value: &[u8]) -> Result<[u8; 32], Error> {
    let mut mac =
        HmacSha256::new_from_slice(key.expose_secret()).map_err(|_| Error::KeyDerivation)?;
    mac.update(value);

    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// 64-bit equality digest of `value`.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the key is rejected by HMAC.
pub fn equality_digest(key: &SecretVec<u8>, value: &[u8]) -> Result<u64, Error> {
    let bytes = digest(key, value)?;
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    Ok(u64::from_be_bytes(out))
}

/// 32-bit hash code of `value`.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the key is rejected by HMAC.
pub fn hash_code(key: &SecretVec<u8>, value: &[u8]) -> Result<u32, Error> {
    let bytes = digest(key, value)?;
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes[..4]);
    Ok(u32::from_be_bytes(out))
}
