//! UTF-8 text.

use crate::envelope::{EncryptedValue, OreCiphertext, TextCiphertext};
use crate::error::Error;
use crate::field::Field;
use crate::options::{AttributeOptions, SafetyMode};
use crate::value::Value;

/// Accepts text without NUL characters. The empty string is valid.
///
/// # Errors
///
/// Returns `Error::Validation` for non-text input, raw bytes and text
/// containing NUL.
pub fn validate(raw: &Value) -> Result<&str, Error> {
    match raw {
        Value::Text(s) if s.contains('\0') => {
            Err(Error::Validation("text must not contain NUL characters".to_string()))
        }
        Value::Text(s) => Ok(s),
        Value::Bytes(_) => {
            Err(Error::Validation("raw bytes have no text encoding; decode them first".to_string()))
        }
        other => Err(Error::Validation(format!("expected text, got {}", other.type_name()))),
    }
}

/// Encrypts validated text.
///
/// The prefix order term is requested only when ordering is enabled.
///
/// # Errors
///
/// Returns an error if the crypto handle fails.
pub fn encode(
    value: &str,
    context: &str,
    field: &Field,
    options: &AttributeOptions,
) -> Result<EncryptedValue, Error> {
    field
        .encrypt_text(
            value,
            context,
            options.field_safety(),
            options.safety() == SafetyMode::NoQuery,
            options.order_prefix(),
        )
        .map(EncryptedValue::Text)
}

/// Decrypts text.
///
/// # Errors
///
/// Returns `Error::DecryptionContext` if `context` does not match.
pub fn decode(value: &TextCiphertext, context: &str, field: &Field) -> Result<String, Error> {
    field.decrypt_text(value, context)
}

/// Encodes a length in characters for comparison against stored text lengths.
///
/// # Errors
///
/// Returns an error if the crypto handle fails.
pub fn encode_length_query(length: u32, field: &Field) -> Result<OreCiphertext, Error> {
    field.encrypt_text_length_query(length)
}
