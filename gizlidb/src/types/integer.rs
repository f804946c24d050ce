//! Signed 64-bit integers.

use crate::envelope::{EncryptedValue, I64Ciphertext};
use crate::error::Error;
use crate::field::Field;
use crate::options::{AttributeOptions, SafetyMode};
use crate::value::Value;

// 2^63 as a float; every integral float in [-2^63, 2^63) fits in i64.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Checks that `raw` is an integral value representable as `i64`.
///
/// Integral floats such as `3.0` are accepted.
///
/// # Errors
///
/// Returns `Error::Range` for integral values outside the `i64` range and
/// `Error::Validation` for everything else.
pub fn validate(raw: &Value) -> Result<i64, Error> {
    match raw {
        Value::Integer(i) => i64::try_from(*i)
            .map_err(|_| Error::Range(format!("{i} does not fit in a signed 64-bit integer"))),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
            if (-I64_BOUND..I64_BOUND).contains(f) {
                // Safe cast: range checked above
                #[allow(clippy::cast_possible_truncation)]
                Ok(*f as i64)
            } else {
                Err(Error::Range(format!("{f} does not fit in a signed 64-bit integer")))
            }
        }
        other => Err(Error::Validation(format!("expected an integer, got {}", other.type_name()))),
    }
}

/// Encrypts a validated integer.
///
/// # Errors
///
/// Returns an error if the crypto handle fails.
pub fn encode(
    value: i64,
    context: &str,
    field: &Field,
    options: &AttributeOptions,
) -> Result<EncryptedValue, Error> {
    let no_query = options.safety() == SafetyMode::NoQuery;
    field
        .encrypt_i64(value, context, options.field_safety(), no_query)
        .map(EncryptedValue::Integer64)
}

/// Decrypts an integer.
///
/// # Errors
///
/// Returns `Error::DecryptionContext` if `context` does not match.
pub fn decode(value: &I64Ciphertext, context: &str, field: &Field) -> Result<i64, Error> {
    field.decrypt_i64(value, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(validate(&Value::from(i64::MAX)).unwrap(), i64::MAX);
        assert_eq!(validate(&Value::from(i64::MIN)).unwrap(), i64::MIN);
        assert_eq!(validate(&Value::from(0)).unwrap(), 0);
    }

    #[test]
    fn test_one_past_range() {
        let above = Value::Integer(i128::from(i64::MAX) + 1);
        let below = Value::Integer(i128::from(i64::MIN) - 1);

        assert!(matches!(validate(&above), Err(Error::Range(_))));
        assert!(matches!(validate(&below), Err(Error::Range(_))));
    }

    #[test]
    fn test_integral_floats() {
        assert_eq!(validate(&Value::Float(42.0)).unwrap(), 42);
        assert!(matches!(validate(&Value::Float(I64_BOUND)), Err(Error::Range(_))));
        assert!(matches!(validate(&Value::Float(1.5)), Err(Error::Validation(_))));
        assert!(matches!(validate(&Value::Float(f64::NAN)), Err(Error::Validation(_))));
    }

    #[test]
    fn test_wrong_shape() {
        assert!(matches!(validate(&Value::from("42")), Err(Error::Validation(_))));
        assert!(matches!(validate(&Value::from(true)), Err(Error::Validation(_))));
    }
}
