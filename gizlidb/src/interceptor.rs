//! Attribute interception.
//!
//! The [`Interceptor`] sits between application code and [`Record`]s: writes
//! to encrypted attributes are encoded under the record's current context,
//! reads are decoded on access. It performs no I/O.

use std::sync::Arc;

use crate::context::EMPTY_CONTEXT;
use crate::envelope::{EncryptedValue, OreCiphertext};
use crate::error::Error;
use crate::field::Field;
use crate::keys::KeyContext;
use crate::record::{Cell, Record};
use crate::schema::ModelSchema;
use crate::types::text;
use crate::types::EncryptedType;
use crate::value::Value;

/// Encodes and decodes the attributes of one model.
#[derive(Debug, Clone)]
pub struct Interceptor<'k> {
    keys: &'k KeyContext,
    schema: Arc<ModelSchema>,
}

impl<'k> Interceptor<'k> {
    /// Creates an interceptor for `schema` using keys from `keys`.
    #[must_use]
    pub const fn new(keys: &'k KeyContext, schema: Arc<ModelSchema>) -> Self {
        Self { keys, schema }
    }

    /// The model this interceptor serves.
    #[must_use]
    pub const fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Crypto handle for an encrypted attribute.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if no key is set or the attribute is
    /// not encrypted.
    pub fn field(&self, attribute: &str) -> Result<Field, Error> {
        self.schema.encrypted_attribute(attribute)?;
        self.keys.field(self.schema.relation(), attribute)
    }

    /// A new record with defaults applied.
    ///
    /// # Errors
    ///
    /// Returns an error if a default cannot be encoded.
    pub fn new_record(&self) -> Result<Record, Error> {
        let mut record = Record::new(Arc::clone(&self.schema));
        self.apply_defaults(&mut record)?;
        Ok(record)
    }

    /// Fills unset attributes of an unpersisted record with their defaults.
    ///
    /// Persisted records are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if a default cannot be encoded.
    pub fn apply_defaults(&self, record: &mut Record) -> Result<(), Error> {
        if !record.is_new_record() {
            return Ok(());
        }
        for descriptor in self.schema.attributes() {
            let Some(default) = descriptor.options().default_value() else { continue };
            if record.cell(descriptor.name()).is_none() {
                self.write(record, descriptor.name(), default.clone())?;
            }
        }
        Ok(())
    }

    /// Sets an attribute, encrypting it if it is encrypted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for unknown attributes and validation
    /// or range errors for values the attribute's type rejects.
    pub fn write(
        &self,
        record: &mut Record,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        let value = value.into();
        let cell = self.encode_cell(attribute, &value, &record.context())?;
        record.set_cell(attribute, cell);
        Ok(())
    }

    /// Reads an attribute, decrypting it if it is encrypted.
    ///
    /// Unset attributes read as null.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for unknown attributes and
    /// `Error::DecryptionContext` if the envelope does not decrypt under the
    /// record's context or the empty context.
    pub fn read(&self, record: &Record, attribute: &str) -> Result<Value, Error> {
        let descriptor = self.schema.attribute(attribute).ok_or_else(|| {
            Error::Configuration(format!(
                "{} has no attribute named {attribute}",
                self.schema.relation()
            ))
        })?;

        match (descriptor.encrypted_type(), record.cell(attribute)) {
            (_, None) => Ok(Value::Null),
            (None, Some(Cell::Plain(value))) => Ok(value.clone()),
            (Some(ty), Some(Cell::Encrypted(envelope))) => {
                ty.decode(envelope.as_ref(), &record.context(), &self.field(attribute)?)
            }
            (_, Some(_)) => Err(Error::Configuration(format!(
                "{}.{attribute} holds a cell of the wrong kind",
                self.schema.relation()
            ))),
        }
    }

    /// Encodes a value as the persisted cell of `attribute` under `context`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for unknown attributes and validation
    /// or range errors for unusable values.
    pub fn encode_cell(
        &self,
        attribute: &str,
        value: &Value,
        context: &str,
    ) -> Result<Cell, Error> {
        let descriptor = self.schema.attribute(attribute).ok_or_else(|| {
            Error::Configuration(format!(
                "{} has no attribute named {attribute}",
                self.schema.relation()
            ))
        })?;

        match descriptor.encrypted_type() {
            None => Ok(Cell::Plain(value.clone())),
            Some(ty) => {
                let field = self.field(attribute)?;
                ty.encode(value, context, &field, descriptor.options()).map(Cell::Encrypted)
            }
        }
    }

    /// Encodes a bare value for comparison against `attribute`.
    ///
    /// Literals use the empty context and always carry left terms, whatever
    /// the attribute's own safety mode. Text ordering is kept.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the attribute is not encrypted.
    pub fn literal_encode(
        &self,
        attribute: &str,
        value: &Value,
    ) -> Result<Option<EncryptedValue>, Error> {
        let (descriptor, ty) = self.schema.encrypted_attribute(attribute)?;
        let field = self.field(attribute)?;
        ty.encode(value, EMPTY_CONTEXT, &field, &descriptor.options().for_literal())
    }

    /// Encodes a text length for a length comparison on `attribute`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the attribute is not encrypted text.
    pub fn encode_length_query(
        &self,
        attribute: &str,
        length: u32,
    ) -> Result<OreCiphertext, Error> {
        let (_, ty) = self.schema.encrypted_attribute(attribute)?;
        if ty != EncryptedType::Text {
            return Err(Error::Configuration(format!(
                "length queries need a text attribute, {attribute} is {ty}"
            )));
        }
        text::encode_length_query(length, &self.field(attribute)?)
    }
}
