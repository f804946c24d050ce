//! Per-attribute crypto handle.
//!
//! A [`Field`] is derived from the root key for one `(relation, attribute)`
//! pair. It seals payloads with ChaCha20-Poly1305 and attaches the ORE terms
//! needed for queries. All sub-keys are derived from the field key with a
//! purpose label, so no two primitives ever share key material.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use secrecy::SecretVec;
use zeroize::Zeroizing;

use crate::aead;
use crate::blind_index;
use crate::context::FieldId;
use crate::envelope::{
    AeadCiphertext, BoolCiphertext, DateCiphertext, I64Ciphertext, OreCiphertext, TextCiphertext,
};
use crate::error::Error;
use crate::kdf::{derive_field_key, derive_key, KEY_ID_SIZE};
use crate::ore::{OreCipher, OreDomain};

/// Longest text prefix that can be order-encrypted.
pub const MAX_ORDER_PREFIX: usize = 8;

/// Leakage level of generated order terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Safety {
    /// Right terms only; values compare only against query literals
    #[default]
    Default,
    /// Right and left terms; stored values compare against each other
    Unsafe,
}

/// Crypto handle for a single encrypted attribute.
pub struct Field {
    id: FieldId,
    key_id: [u8; KEY_ID_SIZE],
    key: SecretVec<u8>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("id", &self.id).field("key_id", &self.key_id).finish()
    }
}

impl Field {
    /// Derives the handle for `id` from the root key.
    ///
    /// # Arguments
    ///
    /// * `root` - Root key material
    /// * `key_id` - Identifier of the root key, embedded in every envelope
    /// * `id` - Attribute being encrypted
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivation` if HKDF expansion fails.
    pub fn derive(
        root: &SecretVec<u8>,
        key_id: [u8; KEY_ID_SIZE],
        id: FieldId,
    ) -> Result<Self, Error> {
        let key = derive_field_key(root, &id)?;
        Ok(Self { id, key_id, key })
    }

    /// The attribute this handle encrypts.
    #[must_use]
    pub const fn id(&self) -> &FieldId {
        &self.id
    }

    /// Identifier of the root key this handle was derived from.
    #[must_use]
    pub const fn key_id(&self) -> [u8; KEY_ID_SIZE] {
        self.key_id
    }

    /// Encrypts a 64-bit integer.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation or sealing fails.
    pub fn encrypt_i64(
        &self,
        value: i64,
        context: &str,
        safety: Safety,
        no_query: bool,
    ) -> Result<I64Ciphertext, Error> {
        let a = aead::seal(&self.subkey("aead")?, &value.to_be_bytes(), context)?;
        let o = if no_query {
            None
        } else {
            Some(self.order_term("i64", OreDomain::U64, order_i64(value), safety)?)
        };
        Ok(I64Ciphertext { a, k: self.key_id, o })
    }

    /// Decrypts a 64-bit integer.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionContext` on a key or context mismatch and
    /// `Error::Envelope` if the payload has the wrong size.
    pub fn decrypt_i64(&self, value: &I64Ciphertext, context: &str) -> Result<i64, Error> {
        self.check_key_id(&value.k)?;
        let payload = self.open(&value.a, context)?;
        let bytes: [u8; 8] = payload
            .as_slice()
            .try_into()
            .map_err(|_| Error::Envelope(format!("integer payload has {} bytes", payload.len())))?;
        Ok(i64::from_be_bytes(bytes))
    }

    /// Encrypts a boolean.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation or sealing fails.
    pub fn encrypt_bool(
        &self,
        value: bool,
        context: &str,
        safety: Safety,
        no_query: bool,
    ) -> Result<BoolCiphertext, Error> {
        let a = aead::seal(&self.subkey("aead")?, &[u8::from(value)], context)?;
        let o = if no_query {
            None
        } else {
            Some(self.order_term("bool", OreDomain::BIT, u64::from(value), safety)?)
        };
        Ok(BoolCiphertext { a, k: self.key_id, o })
    }

    /// Decrypts a boolean.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionContext` on a key or context mismatch and
    /// `Error::Envelope` if the payload is not a boolean.
    pub fn decrypt_bool(&self, value: &BoolCiphertext, context: &str) -> Result<bool, Error> {
        self.check_key_id(&value.k)?;
        let payload = self.open(&value.a, context)?;
        match payload.as_slice() {
            [0] => Ok(false),
            [1] => Ok(true),
            _ => Err(Error::Envelope("boolean payload is malformed".to_string())),
        }
    }

    /// Encrypts a date.
    ///
    /// # Errors
    ///
    /// Returns `Error::Range` if the year does not fit in 16 bits.
    pub fn encrypt_date(
        &self,
        value: NaiveDate,
        context: &str,
        safety: Safety,
        no_query: bool,
    ) -> Result<DateCiphertext, Error> {
        let year = i16::try_from(value.year()).map_err(|_| {
            Error::Range(format!("year {} is outside the supported era", value.year()))
        })?;
        // Safe casts: month and day are at most 31
        #[allow(clippy::cast_possible_truncation)]
        let (month, day) = (value.month() as u8, value.day() as u8);

        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&year.to_be_bytes());
        payload.extend_from_slice(&[month, day]);
        let a = aead::seal(&self.subkey("aead")?, &payload, context)?;

        let (y, m, d) = if no_query {
            (None, None, None)
        } else {
            (
                Some(self.order_term("date-year", OreDomain::U16, order_i16(year), safety)?),
                Some(self.order_term("date-month", OreDomain::MONTH, u64::from(month), safety)?),
                Some(self.order_term("date-day", OreDomain::DAY, u64::from(day), safety)?),
            )
        };
        Ok(DateCiphertext { a, k: self.key_id, y, m, d })
    }

    /// Decrypts a date.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionContext` on a key or context mismatch and
    /// `Error::Envelope` if the payload is not a valid date.
    pub fn decrypt_date(&self, value: &DateCiphertext, context: &str) -> Result<NaiveDate, Error> {
        self.check_key_id(&value.k)?;
        let payload = self.open(&value.a, context)?;
        let [y0, y1, month, day] = payload.as_slice() else {
            return Err(Error::Envelope(format!("date payload has {} bytes", payload.len())));
        };
        let year = i16::from_be_bytes([*y0, *y1]);
        NaiveDate::from_ymd_opt(i32::from(year), u32::from(*month), u32::from(*day))
            .ok_or_else(|| Error::Envelope("date payload is not a calendar date".to_string()))
    }

    /// Encrypts a text value.
    ///
    /// `order_prefix` enables the prefix order term; it is the number of
    /// leading UTF-8 bytes that take part in ordering.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `order_prefix` is zero or longer than
    /// [`MAX_ORDER_PREFIX`] and `Error::Range` if the text is longer than
    /// `u32::MAX` characters.
    pub fn encrypt_text(
        &self,
        value: &str,
        context: &str,
        safety: Safety,
        no_query: bool,
        order_prefix: Option<usize>,
    ) -> Result<TextCiphertext, Error> {
        let a = aead::seal(&self.subkey("aead")?, value.as_bytes(), context)?;
        if no_query {
            return Ok(TextCiphertext { a, k: self.key_id, e: None, h: None, n: None, o: None });
        }

        let digest = blind_index::equality_digest(&self.subkey("text-eq")?, value.as_bytes())?;
        let e = self.order_term("text-eq", OreDomain::U64, digest, safety)?;
        let h = match safety {
            Safety::Unsafe => {
                Some(blind_index::hash_code(&self.subkey("text-hash")?, value.as_bytes())?)
            }
            Safety::Default => None,
        };
        let n = self.text_length_term(text_length(value)?, safety)?;
        let o = order_prefix
            .map(|len| {
                let (domain, prefix) = order_prefix_value(value, len)?;
                self.order_term("text-order", domain, prefix, safety)
            })
            .transpose()?;

        Ok(TextCiphertext { a, k: self.key_id, e: Some(e), h, n: Some(n), o })
    }

    /// Decrypts a text value.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionContext` on a key or context mismatch and
    /// `Error::Envelope` if the payload is not UTF-8.
    pub fn decrypt_text(&self, value: &TextCiphertext, context: &str) -> Result<String, Error> {
        self.check_key_id(&value.k)?;
        let payload = self.open(&value.a, context)?;
        String::from_utf8(payload.to_vec())
            .map_err(|_| Error::Envelope("text payload is not UTF-8".to_string()))
    }

    /// Encodes a text length (in characters) as a query literal.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation fails.
    pub fn encrypt_text_length_query(&self, length: u32) -> Result<OreCiphertext, Error> {
        self.text_length_term(length, Safety::Unsafe)
    }

    fn text_length_term(&self, length: u32, safety: Safety) -> Result<OreCiphertext, Error> {
        self.order_term("text-length", OreDomain::U32, u64::from(length), safety)
    }

    fn order_term(
        &self,
        component: &str,
        domain: OreDomain,
        value: u64,
        safety: Safety,
    ) -> Result<OreCiphertext, Error> {
        let cipher = OreCipher::new(
            self.subkey(&format!("ore-prf/{component}"))?,
            self.subkey(&format!("ore-prp/{component}"))?,
        );
        let l = match safety {
            Safety::Unsafe => Some(cipher.encrypt_left(domain, value)?),
            Safety::Default => None,
        };
        Ok(OreCiphertext { l, r: cipher.encrypt_right(domain, value)? })
    }

    fn subkey(&self, purpose: &str) -> Result<SecretVec<u8>, Error> {
        derive_key(&self.key, purpose)
    }

    fn open(&self, sealed: &AeadCiphertext, context: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
        aead::open(&self.subkey("aead")?, sealed, context).map(Zeroizing::new)
    }

    fn check_key_id(&self, key_id: &[u8; KEY_ID_SIZE]) -> Result<(), Error> {
        if *key_id == self.key_id {
            Ok(())
        } else {
            Err(Error::DecryptionContext(format!(
                "ciphertext for {} was produced under a different key",
                self.id
            )))
        }
    }
}

/// Maps a signed integer onto `u64` preserving order.
#[allow(clippy::cast_sign_loss)]
const fn order_i64(value: i64) -> u64 {
    (value as u64) ^ (1 << 63)
}

#[allow(clippy::cast_sign_loss)]
fn order_i16(value: i16) -> u64 {
    u64::from((value as u16) ^ 0x8000)
}

fn text_length(value: &str) -> Result<u32, Error> {
    u32::try_from(value.chars().count())
        .map_err(|_| Error::Range("text is longer than 2^32-1 characters".to_string()))
}

fn order_prefix_value(value: &str, len: usize) -> Result<(OreDomain, u64), Error> {
    if len == 0 || len > MAX_ORDER_PREFIX {
        return Err(Error::Configuration(format!(
            "order prefix length must be between 1 and {MAX_ORDER_PREFIX}, got {len}"
        )));
    }
    let prefix = value.as_bytes().iter().copied().chain(std::iter::repeat(0)).take(len);
    let packed = prefix.fold(0u64, |acc, b| (acc << 8) | u64::from(b));
    Ok((OreDomain::bytes(len), packed))
}
