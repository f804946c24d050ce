//! Encrypted attribute types.
//!
//! Each [`EncryptedType`] validates raw input, encodes it into an
//! [`EncryptedValue`] through a [`Field`] and decodes it back. Null input
//! encodes to `None` without touching the crypto handle.

use std::fmt;

use tracing::warn;

use crate::context::EMPTY_CONTEXT;
use crate::envelope::EncryptedValue;
use crate::error::Error;
use crate::field::Field;
use crate::options::AttributeOptions;
use crate::value::Value;

pub mod boolean;
pub mod date;
pub mod integer;
pub mod text;

/// The encrypted attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptedType {
    /// Signed 64-bit integer
    Integer64,
    /// Boolean
    Boolean,
    /// Calendar date, years -32768 to 32767
    Date,
    /// UTF-8 text without NUL characters
    Text,
}

impl EncryptedType {
    /// Every encrypted type.
    pub const ALL: [Self; 4] = [Self::Integer64, Self::Boolean, Self::Date, Self::Text];

    /// Column type declaring an attribute of this type.
    #[must_use]
    pub const fn column_type(self) -> ColumnType {
        match self {
            Self::Integer64 => ColumnType::EncryptedInteger64,
            Self::Boolean => ColumnType::EncryptedBoolean,
            Self::Date => ColumnType::EncryptedDate,
            Self::Text => ColumnType::EncryptedText,
        }
    }

    /// SQL type name of columns holding this type.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        self.column_type().sql_type()
    }

    /// Looks a type up by SQL type name (case-insensitive).
    #[must_use]
    pub fn from_sql_type(name: &str) -> Option<Self> {
        ColumnType::from_sql_type(name).map(ColumnType::encrypted_type)
    }

    /// Checks a raw value and converts it to this type's canonical form.
    ///
    /// Null passes through unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for input of the wrong shape and
    /// `Error::Range` for input of the right shape that cannot be
    /// represented.
    pub fn validate(self, raw: &Value) -> Result<Value, Error> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let value = match self {
            Self::Integer64 => Value::from(integer::validate(raw)?),
            Self::Boolean => Value::from(boolean::validate(raw)?),
            Self::Date => Value::from(date::validate(raw)?),
            Self::Text => Value::from(text::validate(raw)?.to_string()),
        };
        Ok(value)
    }

    /// Encrypts a raw value bound to `context`.
    ///
    /// # Arguments
    ///
    /// * `raw` - Value to encrypt; null yields `Ok(None)`
    /// * `context` - Record context bound as associated data
    /// * `field` - Crypto handle of the attribute
    /// * `options` - Attribute options selecting the query terms
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for options incompatible with this type,
    /// and validation or range errors for unusable input.
    pub fn encode(
        self,
        raw: &Value,
        context: &str,
        field: &Field,
        options: &AttributeOptions,
    ) -> Result<Option<EncryptedValue>, Error> {
        options.validate(self)?;
        if raw.is_null() {
            return Ok(None);
        }
        let encoded = match self {
            Self::Integer64 => integer::encode(integer::validate(raw)?, context, field, options)?,
            Self::Boolean => boolean::encode(boolean::validate(raw)?, context, field, options)?,
            Self::Date => date::encode(date::validate(raw)?, context, field, options)?,
            Self::Text => text::encode(text::validate(raw)?, context, field, options)?,
        };
        Ok(Some(encoded))
    }

    /// Decrypts an envelope bound to `context`.
    ///
    /// If decryption under `context` fails, it is retried once with the
    /// empty context, which recovers values written before their record had
    /// a primary key. A successful retry is logged at `warn`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionContext` if both attempts fail and
    /// `Error::Envelope` if the envelope belongs to another type.
    pub fn decode(
        self,
        envelope: Option<&EncryptedValue>,
        context: &str,
        field: &Field,
    ) -> Result<Value, Error> {
        let Some(envelope) = envelope else {
            return Ok(Value::Null);
        };
        if envelope.kind() != self {
            return Err(Error::Envelope(format!(
                "expected {self} ciphertext, found {}",
                envelope.kind()
            )));
        }

        match decrypt(envelope, context, field) {
            Err(err) if err.is_decryption() && context != EMPTY_CONTEXT => {
                let value = decrypt(envelope, EMPTY_CONTEXT, field)?;
                warn!(
                    field = %field.id(),
                    context,
                    "value decrypted only under the empty context"
                );
                Ok(value)
            }
            result => result,
        }
    }
}

fn decrypt(envelope: &EncryptedValue, context: &str, field: &Field) -> Result<Value, Error> {
    let value = match envelope {
        EncryptedValue::Integer64(c) => Value::from(integer::decode(c, context, field)?),
        EncryptedValue::Boolean(c) => Value::from(boolean::decode(c, context, field)?),
        EncryptedValue::Date(c) => Value::from(date::decode(c, context, field)?),
        EncryptedValue::Text(c) => Value::from(text::decode(c, context, field)?),
    };
    Ok(value)
}

impl fmt::Display for EncryptedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer64 => "integer64",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Column declaration for an encrypted attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// `enquo_bigint`
    EncryptedInteger64,
    /// `enquo_boolean`
    EncryptedBoolean,
    /// `enquo_date`
    EncryptedDate,
    /// `enquo_text`
    EncryptedText,
}

impl ColumnType {
    /// SQL type name used in column definitions.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::EncryptedInteger64 => "enquo_bigint",
            Self::EncryptedBoolean => "enquo_boolean",
            Self::EncryptedDate => "enquo_date",
            Self::EncryptedText => "enquo_text",
        }
    }

    /// Type of the values held by the column.
    #[must_use]
    pub const fn encrypted_type(self) -> EncryptedType {
        match self {
            Self::EncryptedInteger64 => EncryptedType::Integer64,
            Self::EncryptedBoolean => EncryptedType::Boolean,
            Self::EncryptedDate => EncryptedType::Date,
            Self::EncryptedText => EncryptedType::Text,
        }
    }

    /// Looks a column type up by SQL type name (case-insensitive).
    #[must_use]
    pub fn from_sql_type(name: &str) -> Option<Self> {
        EncryptedType::ALL
            .into_iter()
            .map(EncryptedType::column_type)
            .find(|ty| ty.sql_type().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}
