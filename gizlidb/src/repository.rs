//! Model-level access to a store.

use std::sync::Arc;

use crate::envelope::EncryptedValue;
use crate::error::Error;
use crate::interceptor::Interceptor;
use crate::keys::KeyContext;
use crate::predicate::{Predicate, PredicateRewriter};
use crate::record::Record;
use crate::schema::ModelSchema;
use crate::storage::Store;
use crate::value::Value;

/// Reads, writes and queries records of one model.
///
/// Every predicate is rewritten before the store sees it, so a query that
/// the rewriter rejects never reaches storage.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gizlidb::keys::KeyContext;
/// use gizlidb::options::AttributeOptions;
/// use gizlidb::predicate::Predicate;
/// use gizlidb::repository::Repository;
/// use gizlidb::schema::ModelSchema;
/// use gizlidb::storage::MemoryStore;
/// use gizlidb::types::EncryptedType;
/// use gizlidb::value::Value;
///
/// # fn main() -> Result<(), gizlidb::Error> {
/// let keys = KeyContext::new();
/// keys.set_key(&[1u8; 32])?;
///
/// let schema = Arc::new(
///     ModelSchema::builder("people")
///         .encrypted("age", EncryptedType::Integer64, AttributeOptions::new())
///         .build()?,
/// );
/// let store = MemoryStore::new();
/// store.create_table("people", ["age"]);
///
/// let people = Repository::new(&keys, schema, &store);
/// let mut ada = people.new_record()?;
/// people.set(&mut ada, "age", 36)?;
/// people.save(&mut ada)?;
///
/// let found = people.find(&[Predicate::ge("age", 18)])?;
/// assert_eq!(people.get(&found[0], "age")?, Value::from(36));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Repository<'k, S> {
    interceptor: Interceptor<'k>,
    store: S,
}

impl<'k, S: Store> Repository<'k, S> {
    /// Creates a repository for `schema` on `store`.
    pub fn new(keys: &'k KeyContext, schema: Arc<ModelSchema>, store: S) -> Self {
        Self { interceptor: Interceptor::new(keys, schema), store }
    }

    /// The model's interceptor.
    #[must_use]
    pub const fn interceptor(&self) -> &Interceptor<'k> {
        &self.interceptor
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// A new record with defaults applied.
    ///
    /// # Errors
    ///
    /// Returns an error if a default cannot be encoded.
    pub fn new_record(&self) -> Result<Record, Error> {
        self.interceptor.new_record()
    }

    /// Sets an attribute.
    ///
    /// # Errors
    ///
    /// See [`Interceptor::write`].
    pub fn set(
        &self,
        record: &mut Record,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        self.interceptor.write(record, attribute, value)
    }

    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// See [`Interceptor::read`].
    pub fn get(&self, record: &Record, attribute: &str) -> Result<Value, Error> {
        self.interceptor.read(record, attribute)
    }

    /// Inserts a new record or updates a persisted one.
    ///
    /// # Errors
    ///
    /// Returns storage errors and errors from encoding defaults.
    pub fn save(&self, record: &mut Record) -> Result<(), Error> {
        if record.is_new_record() {
            self.interceptor.apply_defaults(record)?;
            self.store.insert(record)
        } else {
            self.store.update(record)
        }
    }

    /// Loads a record by primary key.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn fetch(&self, key: impl Into<Value>) -> Result<Option<Record>, Error> {
        self.store.fetch(self.interceptor.schema(), &key.into())
    }

    /// Loads the records satisfying every predicate.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for predicates the rewriter rejects,
    /// before the store is consulted.
    pub fn find(&self, predicates: &[Predicate]) -> Result<Vec<Record>, Error> {
        let rewritten = PredicateRewriter::new(&self.interceptor).rewrite_all(predicates)?;
        self.store.find(self.interceptor.schema(), &rewritten)
    }

    /// Encodes a bare value for comparison against `attribute`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the attribute is not encrypted.
    pub fn literal_encode(
        &self,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<Option<EncryptedValue>, Error> {
        self.interceptor.literal_encode(attribute, &value.into())
    }
}
