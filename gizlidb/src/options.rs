//! Per-attribute encryption options.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::field::{Safety, MAX_ORDER_PREFIX};
use crate::types::EncryptedType;
use crate::value::Value;

/// Which query terms an attribute's ciphertexts carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    /// Right order terms only; comparisons against query literals work
    #[default]
    Standard,
    /// Left and right terms; enables ordering between stored values
    ReducedSecurity,
    /// No query terms at all; the attribute cannot appear in predicates
    NoQuery,
}

/// Options attached to one encrypted attribute.
///
/// # Example
///
/// ```
/// use gizlidb::options::{AttributeOptions, SafetyMode};
///
/// let options = AttributeOptions::new().reduced_security().ordering(true);
/// assert_eq!(options.safety(), SafetyMode::ReducedSecurity);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeOptions {
    safety: SafetyMode,
    ordering: bool,
    default: Option<Value>,
}

impl AttributeOptions {
    /// Standard safety, no ordering, no default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the safety mode.
    #[must_use]
    pub fn safety_mode(mut self, safety: SafetyMode) -> Self {
        self.safety = safety;
        self
    }

    /// Shorthand for [`SafetyMode::ReducedSecurity`].
    #[must_use]
    pub fn reduced_security(self) -> Self {
        self.safety_mode(SafetyMode::ReducedSecurity)
    }

    /// Shorthand for [`SafetyMode::NoQuery`].
    #[must_use]
    pub fn no_query(self) -> Self {
        self.safety_mode(SafetyMode::NoQuery)
    }

    /// Enables prefix ordering (text only).
    ///
    /// Range queries then compare the first [`MAX_ORDER_PREFIX`] bytes of
    /// each value; longer values tied on that prefix are not told apart.
    #[must_use]
    pub fn ordering(mut self, enabled: bool) -> Self {
        self.ordering = enabled;
        self
    }

    /// Value assigned to new, unpersisted records that leave the attribute unset.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Returns the safety mode.
    #[must_use]
    pub const fn safety(&self) -> SafetyMode {
        self.safety
    }

    /// Returns `true` if text prefix ordering is enabled.
    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.ordering
    }

    /// Returns the configured default.
    #[must_use]
    pub const fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Checks the options against the attribute type.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if ordering is enabled for a non-text
    /// type or without reduced security.
    pub fn validate(&self, ty: EncryptedType) -> Result<(), Error> {
        if !self.ordering {
            return Ok(());
        }
        if ty != EncryptedType::Text {
            return Err(Error::Configuration(format!(
                "ordering is only supported for text, not {ty}"
            )));
        }
        if self.safety != SafetyMode::ReducedSecurity {
            return Err(Error::Configuration(
                "ordering requires reduced security operations to be enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Safety flag passed to the crypto handle.
    #[must_use]
    pub const fn field_safety(&self) -> Safety {
        match self.safety {
            SafetyMode::ReducedSecurity => Safety::Unsafe,
            SafetyMode::Standard | SafetyMode::NoQuery => Safety::Default,
        }
    }

    /// Text order prefix length to request, if ordering is on.
    #[must_use]
    pub const fn order_prefix(&self) -> Option<usize> {
        if self.ordering {
            Some(MAX_ORDER_PREFIX)
        } else {
            None
        }
    }

    /// Options used to encode query literals for this attribute.
    ///
    /// Literals always carry left terms; ordering is kept so text range
    /// bounds get a prefix order term.
    #[must_use]
    pub const fn for_literal(&self) -> Self {
        Self { safety: SafetyMode::ReducedSecurity, ordering: self.ordering, default: None }
    }

    /// Merges a configuration block into these options; keys present in
    /// `config` win.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the result would be both no-query
    /// and reduced-security.
    pub fn apply(&mut self, config: &AttributeConfig) -> Result<(), Error> {
        let no_query = config.no_query.unwrap_or(self.safety == SafetyMode::NoQuery);
        let reduced = config
            .enable_reduced_security_operations
            .unwrap_or(self.safety == SafetyMode::ReducedSecurity);

        self.safety = match (no_query, reduced) {
            (true, true) => {
                return Err(Error::Configuration(
                    "no_query cannot be combined with reduced security operations".to_string(),
                ))
            }
            (true, false) => SafetyMode::NoQuery,
            (false, true) => SafetyMode::ReducedSecurity,
            (false, false) => SafetyMode::Standard,
        };
        if let Some(ordering) = config.enable_ordering {
            self.ordering = ordering;
        }
        if let Some(default) = &config.default {
            self.default = Some(Value::from(default.clone()));
        }
        Ok(())
    }
}

/// Serialisable attribute configuration, for example read from JSON.
///
/// Absent keys leave the current setting untouched when applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeConfig {
    /// Strip all query terms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_query: Option<bool>,
    /// Generate left order terms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_reduced_security_operations: Option<bool>,
    /// Generate text prefix order terms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_ordering: Option<bool>,
    /// Default for new records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl AttributeConfig {
    /// Builds the options described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for contradictory settings.
    pub fn to_options(&self) -> Result<AttributeOptions, Error> {
        let mut options = AttributeOptions::new();
        options.apply(self)?;
        Ok(options)
    }
}
