//! Identifiers used for key derivation and ciphertext binding.

use std::fmt;

use crate::value::Value;

/// Identifies an encrypted attribute for key derivation and domain separation.
///
/// Every `(relation, attribute)` pair receives its own field keys, so the
/// same plaintext stored in two columns produces unrelated ciphertexts.
///
/// # Example
///
/// ```
/// use gizlidb::context::FieldId;
///
/// let id = FieldId::new("people", "first_name");
/// assert_eq!(id.to_string(), "people|first_name");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    relation: String,
    attribute: String,
}

impl FieldId {
    /// Creates a new field identifier.
    ///
    /// # Arguments
    ///
    /// * `relation` - Database table name
    /// * `attribute` - Column name
    #[must_use]
    pub fn new(relation: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self { relation: relation.into(), attribute: attribute.into() }
    }

    /// Returns the relation (table) name.
    #[must_use]
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Returns the attribute (column) name.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.relation, self.attribute)
    }
}

/// Context used for records that have not been assigned a primary key yet.
pub const EMPTY_CONTEXT: &str = "";

/// Derives the ciphertext binding context from a record's primary key.
///
/// A missing or null key yields [`EMPTY_CONTEXT`].
#[must_use]
pub fn record_context(primary_key: Option<&Value>) -> String {
    primary_key.map_or_else(String::new, Value::to_context)
}
