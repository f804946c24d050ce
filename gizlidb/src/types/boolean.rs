//! Booleans.

use crate::envelope::{BoolCiphertext, EncryptedValue};
use crate::error::Error;
use crate::field::Field;
use crate::options::{AttributeOptions, SafetyMode};
use crate::value::Value;

/// Accepts only boolean input.
///
/// # Errors
///
/// Returns `Error::Validation` for anything but a boolean.
pub fn validate(raw: &Value) -> Result<bool, Error> {
    match raw {
        Value::Boolean(b) => Ok(*b),
        other => Err(Error::Validation(format!("expected a boolean, got {}", other.type_name()))),
    }
}

/// Encrypts a validated boolean.
///
/// # Errors
///
/// Returns an error if the crypto handle fails.
pub fn encode(
    value: bool,
    context: &str,
    field: &Field,
    options: &AttributeOptions,
) -> Result<EncryptedValue, Error> {
    let no_query = options.safety() == SafetyMode::NoQuery;
    field
        .encrypt_bool(value, context, options.field_safety(), no_query)
        .map(EncryptedValue::Boolean)
}

/// Decrypts a boolean.
///
/// # Errors
///
/// Returns `Error::DecryptionContext` if `context` does not match.
pub fn decode(value: &BoolCiphertext, context: &str, field: &Field) -> Result<bool, Error> {
    field.decrypt_bool(value, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_booleans() {
        assert!(validate(&Value::from(true)).unwrap());
        assert!(matches!(validate(&Value::from(1)), Err(Error::Validation(_))));
        assert!(matches!(validate(&Value::from("true")), Err(Error::Validation(_))));
    }
}
