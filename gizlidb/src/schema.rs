//! Model definitions.
//!
//! A [`ModelSchema`] names a relation, its primary key and an explicit
//! descriptor for every attribute. Whether an attribute is encrypted is
//! decided here, once, instead of by inspecting values at runtime.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::options::{AttributeConfig, AttributeOptions};
use crate::types::EncryptedType;

/// How an attribute is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Encrypted signed 64-bit integer
    Integer64,
    /// Encrypted boolean
    Boolean,
    /// Encrypted date
    Date,
    /// Encrypted text
    Text,
    /// Stored in the clear
    Plain,
}

impl AttributeKind {
    /// The encrypted type, or `None` for plain attributes.
    #[must_use]
    pub const fn encrypted_type(self) -> Option<EncryptedType> {
        match self {
            Self::Integer64 => Some(EncryptedType::Integer64),
            Self::Boolean => Some(EncryptedType::Boolean),
            Self::Date => Some(EncryptedType::Date),
            Self::Text => Some(EncryptedType::Text),
            Self::Plain => None,
        }
    }
}

impl From<EncryptedType> for AttributeKind {
    fn from(ty: EncryptedType) -> Self {
        match ty {
            EncryptedType::Integer64 => Self::Integer64,
            EncryptedType::Boolean => Self::Boolean,
            EncryptedType::Date => Self::Date,
            EncryptedType::Text => Self::Text,
        }
    }
}

/// Descriptor of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    name: String,
    kind: AttributeKind,
    options: AttributeOptions,
}

impl AttributeDescriptor {
    /// Attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage kind.
    #[must_use]
    pub const fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// Options; always the defaults for plain attributes.
    #[must_use]
    pub const fn options(&self) -> &AttributeOptions {
        &self.options
    }

    /// The encrypted type, or `None` for plain attributes.
    #[must_use]
    pub const fn encrypted_type(&self) -> Option<EncryptedType> {
        self.kind.encrypted_type()
    }
}

/// Definition of a model backed by one relation.
///
/// # Example
///
/// ```
/// use gizlidb::options::AttributeOptions;
/// use gizlidb::schema::ModelSchema;
/// use gizlidb::types::EncryptedType;
///
/// let schema = ModelSchema::builder("people")
///     .plain("name")
///     .encrypted("age", EncryptedType::Integer64, AttributeOptions::new().reduced_security())
///     .build()
///     .expect("invalid schema");
///
/// assert_eq!(schema.primary_key(), "id");
/// assert!(schema.attribute("age").unwrap().encrypted_type().is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    relation: String,
    primary_key: String,
    attributes: BTreeMap<String, AttributeDescriptor>,
}

impl ModelSchema {
    /// Starts a schema for `relation` with primary key `id`.
    pub fn builder(relation: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            relation: relation.into(),
            primary_key: "id".to_string(),
            attributes: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    /// Relation (table) name.
    #[must_use]
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Primary key column.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Looks up an attribute descriptor.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(name)
    }

    /// All attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.values()
    }

    /// Looks up an attribute that must be encrypted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the attribute is unknown or plain.
    pub fn encrypted_attribute(
        &self,
        name: &str,
    ) -> Result<(&AttributeDescriptor, EncryptedType), Error> {
        let descriptor = self.attribute(name).ok_or_else(|| {
            Error::Configuration(format!("{} has no attribute named {name}", self.relation))
        })?;
        let ty = descriptor.encrypted_type().ok_or_else(|| {
            Error::Configuration(format!("{}.{name} is not an encrypted attribute", self.relation))
        })?;
        Ok((descriptor, ty))
    }
}

/// Builder for [`ModelSchema`].
#[derive(Debug)]
pub struct ModelSchemaBuilder {
    relation: String,
    primary_key: String,
    attributes: BTreeMap<String, AttributeDescriptor>,
    pending: Vec<(String, AttributeConfig)>,
}

impl ModelSchemaBuilder {
    /// Sets the primary key column.
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = name.into();
        self
    }

    /// Declares an encrypted attribute.
    #[must_use]
    pub fn encrypted(
        mut self,
        name: impl Into<String>,
        ty: EncryptedType,
        options: AttributeOptions,
    ) -> Self {
        let name = name.into();
        self.attributes
            .insert(name.clone(), AttributeDescriptor { name, kind: ty.into(), options });
        self
    }

    /// Declares a plain attribute.
    #[must_use]
    pub fn plain(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.attributes.insert(
            name.clone(),
            AttributeDescriptor {
                name,
                kind: AttributeKind::Plain,
                options: AttributeOptions::new(),
            },
        );
        self
    }

    /// Merges configuration into an attribute's options. Calls accumulate
    /// in order and later keys win.
    #[must_use]
    pub fn configure(mut self, name: impl Into<String>, config: AttributeConfig) -> Self {
        self.pending.push((name.into(), config));
        self
    }

    /// Finishes the schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if a configured attribute is not
    /// encrypted, the primary key is declared as encrypted, or options do
    /// not suit the attribute's type.
    pub fn build(mut self) -> Result<ModelSchema, Error> {
        for (name, config) in &self.pending {
            let descriptor = self.attributes.get_mut(name).ok_or_else(|| {
                Error::Configuration(format!("cannot configure unknown attribute {name}"))
            })?;
            if descriptor.kind == AttributeKind::Plain {
                return Err(Error::Configuration(format!(
                    "cannot configure plain attribute {name}"
                )));
            }
            descriptor.options.apply(config)?;
        }

        if let Some(pk) = self.attributes.get(&self.primary_key) {
            if pk.kind != AttributeKind::Plain {
                return Err(Error::Configuration(format!(
                    "primary key {} cannot be encrypted",
                    self.primary_key
                )));
            }
        }
        for descriptor in self.attributes.values() {
            if let Some(ty) = descriptor.encrypted_type() {
                descriptor.options.validate(ty)?;
            }
        }

        Ok(ModelSchema {
            relation: self.relation,
            primary_key: self.primary_key,
            attributes: self.attributes,
        })
    }
}
