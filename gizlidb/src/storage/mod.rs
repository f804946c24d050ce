//! Storage abstraction.
//!
//! The core never issues SQL. Everything that touches rows goes through a
//! [`Store`], and migrations additionally through a [`Transaction`] that
//! locks the rows it selects until it commits.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Error;
use crate::predicate::Predicate;
use crate::record::{Cell, Record};
use crate::schema::ModelSchema;
use crate::value::Value;

pub mod memory;

pub use memory::MemoryStore;

/// A plaintext source column and the encrypted column it migrates into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPair {
    /// Plaintext column
    pub source: String,
    /// Encrypted column
    pub target: String,
}

impl ColumnPair {
    /// Creates a pair.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self { source: source.into(), target: target.into() }
    }
}

/// A row selected for migration.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    /// Primary key value
    pub key: Value,
    /// Source columns as [`Cell::Plain`], target columns as [`Cell::Encrypted`]
    pub cells: BTreeMap<String, Cell>,
}

impl StoredRow {
    /// Returns `true` if `pair` still needs migrating in this row.
    #[must_use]
    pub fn needs(&self, pair: &ColumnPair) -> bool {
        let target_unset = self.cells.get(&pair.target).map_or(true, Cell::is_null);
        let source_set = self.cells.get(&pair.source).is_some_and(|c| !c.is_null());
        target_unset && source_set
    }
}

/// Operations available inside a storage transaction.
pub trait Transaction {
    /// Selects and exclusively locks up to `limit` rows in which at least one
    /// pair has its target unset and its source set.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the rows cannot be read or locked.
    fn lock_unmigrated(
        &mut self,
        schema: &ModelSchema,
        pairs: &[ColumnPair],
        limit: usize,
    ) -> Result<Vec<StoredRow>, Error>;

    /// Updates several columns of one row atomically.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the row cannot be written.
    fn update_row(
        &mut self,
        schema: &ModelSchema,
        key: &Value,
        cells: &[(String, Cell)],
    ) -> Result<(), Error>;
}

/// A relational store holding records.
pub trait Store: Send + Sync {
    /// Reloads cached column metadata for `relation`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the metadata cannot be read.
    fn refresh_columns(&self, relation: &str) -> Result<(), Error>;

    /// Runs `f` in a transaction, committing if it returns `Ok` and rolling
    /// back otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or `Error::Storage` if the transaction
    /// cannot be started or committed.
    fn transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, Error>;

    /// Inserts a new record, assigning a primary key if it has none.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the row cannot be written.
    fn insert(&self, record: &mut Record) -> Result<(), Error>;

    /// Writes back all cells of a persisted record.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the row does not exist or cannot be written.
    fn update(&self, record: &Record) -> Result<(), Error>;

    /// Loads a record by primary key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the row cannot be read.
    fn fetch(&self, schema: &Arc<ModelSchema>, key: &Value) -> Result<Option<Record>, Error>;

    /// Loads the records satisfying every (rewritten) predicate.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on read failures and `Error::Configuration`
    /// for predicates that were not rewritten.
    fn find(
        &self,
        schema: &Arc<ModelSchema>,
        predicates: &[Predicate],
    ) -> Result<Vec<Record>, Error>;
}

impl<S: Store + ?Sized> Store for &S {
    fn refresh_columns(&self, relation: &str) -> Result<(), Error> {
        (**self).refresh_columns(relation)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, Error>,
    {
        (**self).transaction(f)
    }

    fn insert(&self, record: &mut Record) -> Result<(), Error> {
        (**self).insert(record)
    }

    fn update(&self, record: &Record) -> Result<(), Error> {
        (**self).update(record)
    }

    fn fetch(&self, schema: &Arc<ModelSchema>, key: &Value) -> Result<Option<Record>, Error> {
        (**self).fetch(schema, key)
    }

    fn find(
        &self,
        schema: &Arc<ModelSchema>,
        predicates: &[Predicate],
    ) -> Result<Vec<Record>, Error> {
        (**self).find(schema, predicates)
    }
}

/// Applies rewritten predicates to a stored row.
///
/// The primary key column is matched against the row key.
///
/// # Errors
///
/// Returns `Error::Configuration` for predicates that were not rewritten.
pub fn row_matches(
    schema: &ModelSchema,
    key: &Value,
    cells: &BTreeMap<String, Cell>,
    predicates: &[Predicate],
) -> Result<bool, Error> {
    let key_cell = Cell::Plain(key.clone());
    for predicate in predicates {
        let cell = if predicate.attribute == schema.primary_key() {
            Some(&key_cell)
        } else {
            cells.get(&predicate.attribute)
        };
        if !predicate.matches(cell)? {
            return Ok(false);
        }
    }
    Ok(true)
}
