//! Versioned ciphertext envelopes.
//!
//! Every encrypted attribute value is stored as a JSON document of the form
//!
//! ```text
//! { "v1": {
//!     "a": { "iv": [12 bytes], "ct": [bytes] },
//!     "k": [4 bytes],
//!     "o" | "e": { "l": [bytes, reduced security only], "r": [bytes] },
//!     "h": u32 (text, reduced security only),
//!     "y" / "m" / "d": order terms (dates only)
//! } }
//! ```
//!
//! Byte strings are serialised as arrays of integers. Order and equality
//! terms are absent for no-query attributes.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::aead::NONCE_SIZE;
use crate::error::Error;
use crate::kdf::KEY_ID_SIZE;
use crate::ore::{self, OreDomain};
use crate::types::EncryptedType;

/// Current envelope format version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Authenticated-encryption part of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AeadCiphertext {
    /// Random 96-bit nonce
    pub iv: [u8; NONCE_SIZE],
    /// Ciphertext with authentication tag
    pub ct: Vec<u8>,
}

/// Order-revealing part of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OreCiphertext {
    /// Deterministic left term, present only in reduced-security mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<Vec<u8>>,
    /// Randomised right term
    pub r: Vec<u8>,
}

impl OreCiphertext {
    /// Ordering of the value behind `self` relative to the value behind `literal`.
    ///
    /// `self` contributes its right term and `literal` its left term.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `literal` has no left term and
    /// `Error::Envelope` if the terms do not match `domain`.
    pub fn compare(&self, literal: &Self, domain: OreDomain) -> Result<Ordering, Error> {
        let left = literal.l.as_deref().ok_or_else(|| {
            Error::Configuration(
                "comparison operand has no left ORE term; encode it as a query literal".to_string(),
            )
        })?;
        ore::compare(domain, left, &self.r).map(Ordering::reverse)
    }
}

/// Envelope body of a 64-bit integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct I64Ciphertext {
    /// Authenticated ciphertext
    pub a: AeadCiphertext,
    /// Key identifier
    pub k: [u8; KEY_ID_SIZE],
    /// Order term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o: Option<OreCiphertext>,
}

/// Envelope body of a boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolCiphertext {
    /// Authenticated ciphertext
    pub a: AeadCiphertext,
    /// Key identifier
    pub k: [u8; KEY_ID_SIZE],
    /// Order term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o: Option<OreCiphertext>,
}

/// Envelope body of a date, with one order term per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateCiphertext {
    /// Authenticated ciphertext
    pub a: AeadCiphertext,
    /// Key identifier
    pub k: [u8; KEY_ID_SIZE],
    /// Year order term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<OreCiphertext>,
    /// Month order term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<OreCiphertext>,
    /// Day order term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<OreCiphertext>,
}

/// Envelope body of a text value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCiphertext {
    /// Authenticated ciphertext
    pub a: AeadCiphertext,
    /// Key identifier
    pub k: [u8; KEY_ID_SIZE],
    /// Equality term over a keyed 64-bit digest of the text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<OreCiphertext>,
    /// Keyed 32-bit hash code for equality partitioning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
    /// Length term (character count)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<OreCiphertext>,
    /// Prefix order term, present only when ordering is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o: Option<OreCiphertext>,
}

#[derive(Serialize, Deserialize)]
enum Versioned<T> {
    #[serde(rename = "v1")]
    V1(T),
}

/// An encrypted attribute value of any supported type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedValue {
    /// 64-bit integer
    Integer64(I64Ciphertext),
    /// Boolean
    Boolean(BoolCiphertext),
    /// Date
    Date(DateCiphertext),
    /// Text
    Text(TextCiphertext),
}

impl EncryptedValue {
    /// The encrypted type this envelope belongs to.
    #[must_use]
    pub const fn kind(&self) -> EncryptedType {
        match self {
            Self::Integer64(_) => EncryptedType::Integer64,
            Self::Boolean(_) => EncryptedType::Boolean,
            Self::Date(_) => EncryptedType::Date,
            Self::Text(_) => EncryptedType::Text,
        }
    }

    /// Returns the authenticated ciphertext.
    #[must_use]
    pub const fn aead(&self) -> &AeadCiphertext {
        match self {
            Self::Integer64(c) => &c.a,
            Self::Boolean(c) => &c.a,
            Self::Date(c) => &c.a,
            Self::Text(c) => &c.a,
        }
    }

    /// Returns the key identifier.
    #[must_use]
    pub const fn key_id(&self) -> &[u8; KEY_ID_SIZE] {
        match self {
            Self::Integer64(c) => &c.k,
            Self::Boolean(c) => &c.k,
            Self::Date(c) => &c.k,
            Self::Text(c) => &c.k,
        }
    }

    /// Returns `true` if the envelope carries any order or equality term.
    #[must_use]
    pub const fn is_queryable(&self) -> bool {
        match self {
            Self::Integer64(c) => c.o.is_some(),
            Self::Boolean(c) => c.o.is_some(),
            Self::Date(c) => c.y.is_some(),
            Self::Text(c) => c.e.is_some(),
        }
    }

    /// Returns `true` if the envelope carries left terms (reduced security).
    #[must_use]
    pub fn has_left_term(&self) -> bool {
        let left = |o: &Option<OreCiphertext>| o.as_ref().is_some_and(|o| o.l.is_some());
        match self {
            Self::Integer64(c) => left(&c.o),
            Self::Boolean(c) => left(&c.o),
            Self::Date(c) => left(&c.y),
            Self::Text(c) => left(&c.e),
        }
    }

    /// Serialises the envelope to its JSON document form.
    ///
    /// # Errors
    ///
    /// Returns `Error::Envelope` if serialisation fails.
    pub fn to_json(&self) -> Result<String, Error> {
        let json = match self {
            Self::Integer64(c) => serde_json::to_string(&Versioned::V1(c))?,
            Self::Boolean(c) => serde_json::to_string(&Versioned::V1(c))?,
            Self::Date(c) => serde_json::to_string(&Versioned::V1(c))?,
            Self::Text(c) => serde_json::to_string(&Versioned::V1(c))?,
        };
        Ok(json)
    }

    /// Parses a JSON envelope of the given type.
    ///
    /// # Errors
    ///
    /// Returns `Error::Envelope` if the document is malformed or not a
    /// supported version.
    pub fn from_json(kind: EncryptedType, json: &str) -> Result<Self, Error> {
        fn parse<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, Error> {
            let Versioned::V1(body) = serde_json::from_str::<Versioned<T>>(json)?;
            Ok(body)
        }

        let value = match kind {
            EncryptedType::Integer64 => Self::Integer64(parse(json)?),
            EncryptedType::Boolean => Self::Boolean(parse(json)?),
            EncryptedType::Date => Self::Date(parse(json)?),
            EncryptedType::Text => Self::Text(parse(json)?),
        };
        Ok(value)
    }

    /// Tests the stored value behind `self` for equality with a query literal.
    ///
    /// Returns `Ok(None)` if `self` is not queryable; such a value never
    /// satisfies a comparison.
    ///
    /// # Errors
    ///
    /// Returns an error if the literal is of a different type or lacks the
    /// left terms needed for comparison.
    pub fn equals(&self, literal: &Self) -> Result<Option<bool>, Error> {
        if let (Self::Text(stored), Self::Text(lit)) = (self, literal) {
            let (Some(stored), Some(lit)) = (&stored.e, &lit.e) else {
                return Self::missing_terms(literal, "equality");
            };
            return Ok(Some(stored.compare(lit, OreDomain::U64)? == Ordering::Equal));
        }
        Ok(self.compare(literal)?.map(|o| o == Ordering::Equal))
    }

    /// Ordering of the stored value behind `self` relative to a query literal.
    ///
    /// Text values are ordered by their prefix order term, so only attributes
    /// with ordering enabled can be compared. Returns `Ok(None)` if `self` is
    /// not queryable.
    ///
    /// # Errors
    ///
    /// Returns an error if the literal is of a different type or lacks the
    /// left terms needed for comparison.
    pub fn compare(&self, literal: &Self) -> Result<Option<Ordering>, Error> {
        match (self, literal) {
            (Self::Integer64(stored), Self::Integer64(lit)) => {
                compare_term(stored.o.as_ref(), lit.o.as_ref(), OreDomain::U64, literal)
            }
            (Self::Boolean(stored), Self::Boolean(lit)) => {
                compare_term(stored.o.as_ref(), lit.o.as_ref(), OreDomain::BIT, literal)
            }
            (Self::Date(stored), Self::Date(lit)) => {
                let components = [
                    (stored.y.as_ref(), lit.y.as_ref(), OreDomain::U16),
                    (stored.m.as_ref(), lit.m.as_ref(), OreDomain::MONTH),
                    (stored.d.as_ref(), lit.d.as_ref(), OreDomain::DAY),
                ];
                for (s, l, domain) in components {
                    match compare_term(s, l, domain, literal)? {
                        Some(Ordering::Equal) => continue,
                        other => return Ok(other),
                    }
                }
                Ok(Some(Ordering::Equal))
            }
            (Self::Text(stored), Self::Text(lit)) => {
                if stored.e.is_none() {
                    return Ok(None);
                }
                let (Some(s), Some(l)) = (&stored.o, &lit.o) else {
                    return Err(Error::Configuration(
                        "text ordering is not enabled for this attribute".to_string(),
                    ));
                };
                let domain = ore::byte_domain_of_right(&s.r)?;
                s.compare(l, domain).map(Some)
            }
            _ => Err(Self::kind_mismatch(self, literal)),
        }
    }

    /// Ordering of the stored text's length relative to an encoded length.
    ///
    /// # Errors
    ///
    /// Returns an error if `self` is not text or `literal` has no left term.
    pub fn compare_length(&self, literal: &OreCiphertext) -> Result<Option<Ordering>, Error> {
        match self {
            Self::Text(stored) => {
                stored.n.as_ref().map(|n| n.compare(literal, OreDomain::U32)).transpose()
            }
            other => Err(Error::Configuration(format!(
                "length comparison is only defined for text, not {}",
                other.kind()
            ))),
        }
    }

    fn kind_mismatch(stored: &Self, literal: &Self) -> Error {
        Error::Configuration(format!(
            "cannot compare {} ciphertext with {} literal",
            stored.kind(),
            literal.kind()
        ))
    }

    fn missing_terms<T>(literal: &Self, what: &str) -> Result<Option<T>, Error> {
        if literal.is_queryable() {
            Ok(None)
        } else {
            Err(Error::Configuration(format!("query literal has no {what} term")))
        }
    }
}

fn compare_term(
    stored: Option<&OreCiphertext>,
    literal: Option<&OreCiphertext>,
    domain: OreDomain,
    literal_value: &EncryptedValue,
) -> Result<Option<Ordering>, Error> {
    match (stored, literal) {
        (None, _) => Ok(None),
        (Some(_), None) => EncryptedValue::missing_terms(literal_value, "order"),
        (Some(s), Some(l)) => s.compare(l, domain).map(Some),
    }
}
