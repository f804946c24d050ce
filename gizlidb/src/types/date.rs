//! Calendar dates.
//!
//! The supported era is the years representable in 16 bits, -32768 through
//! 32767. Timestamps are truncated to their date.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::envelope::{DateCiphertext, EncryptedValue};
use crate::error::Error;
use crate::field::Field;
use crate::options::{AttributeOptions, SafetyMode};
use crate::value::Value;

/// Converts `raw` into a date inside the supported era.
///
/// Accepts dates, timestamps and strings in `YYYY-MM-DD` or RFC 3339 form,
/// or a local `YYYY-MM-DD HH:MM:SS` timestamp with an optional fraction and
/// either a space or `T` separator.
///
/// # Errors
///
/// Returns `Error::Range` for dates outside the era and `Error::Validation`
/// for unparseable or wrongly typed input.
pub fn validate(raw: &Value) -> Result<NaiveDate, Error> {
    let date = match raw {
        Value::Date(d) => *d,
        Value::Timestamp(t) => t.date(),
        Value::Text(s) => parse(s)?,
        other => {
            let message = format!("expected a date, got {}", other.type_name());
            return Err(Error::Validation(message));
        }
    };

    if i16::try_from(date.year()).is_err() {
        return Err(Error::Range(format!("year {} is outside the supported era", date.year())));
    }
    Ok(date)
}

const LOCAL_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse(s: &str) -> Result<NaiveDate, Error> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return Ok(timestamp.date_naive());
    }
    LOCAL_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|t| t.date())
        .ok_or_else(|| Error::Validation(format!("cannot parse {s:?} as a date")))
}

/// Encrypts a validated date.
///
/// # Errors
///
/// Returns `Error::Range` if the year is outside the era.
pub fn encode(
    value: NaiveDate,
    context: &str,
    field: &Field,
    options: &AttributeOptions,
) -> Result<EncryptedValue, Error> {
    let no_query = options.safety() == SafetyMode::NoQuery;
    field.encrypt_date(value, context, options.field_safety(), no_query).map(EncryptedValue::Date)
}

/// Decrypts a date.
///
/// # Errors
///
/// Returns `Error::DecryptionContext` if `context` does not match.
pub fn decode(value: &DateCiphertext, context: &str, field: &Field) -> Result<NaiveDate, Error> {
    field.decrypt_date(value, context)
}
