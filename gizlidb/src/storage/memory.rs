//! In-memory store.
//!
//! Tables live behind a single mutex. A transaction holds the mutex for its
//! whole duration and works on a copy of the state, which replaces the live
//! state on commit and is dropped on rollback.
//!
//! Like a database driver, the store caches each table's column list. Writes
//! to a column that is missing from the cache fail until
//! [`Store::refresh_columns`] is called.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{row_matches, ColumnPair, Store, StoredRow, Transaction};
use crate::error::Error;
use crate::predicate::Predicate;
use crate::record::{Cell, Record};
use crate::schema::ModelSchema;
use crate::value::Value;

#[derive(Debug, Clone, Default)]
struct Table {
    columns: BTreeSet<String>,
    rows: Vec<(Value, BTreeMap<String, Cell>)>,
    next_id: i64,
}

impl Table {
    fn row_mut(&mut self, key: &Value) -> Option<&mut BTreeMap<String, Cell>> {
        self.rows.iter_mut().find(|(k, _)| k == key).map(|(_, cells)| cells)
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    cached_columns: BTreeMap<String, BTreeSet<String>>,
}

impl State {
    fn table(&self, relation: &str) -> Result<&Table, Error> {
        self.tables
            .get(relation)
            .ok_or_else(|| Error::storage(format!("no such table: {relation}")))
    }

    fn table_mut(&mut self, relation: &str) -> Result<&mut Table, Error> {
        self.tables
            .get_mut(relation)
            .ok_or_else(|| Error::storage(format!("no such table: {relation}")))
    }

    fn check_columns<'a>(
        &self,
        relation: &str,
        columns: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), Error> {
        let cached = self.cached_columns.get(relation);
        for column in columns {
            if !cached.is_some_and(|c| c.contains(column)) {
                return Err(Error::storage(format!(
                    "unknown column {relation}.{column} (column metadata may be stale)"
                )));
            }
        }
        Ok(())
    }

    fn write_row(
        &mut self,
        relation: &str,
        key: &Value,
        cells: impl IntoIterator<Item = (String, Cell)>,
    ) -> Result<(), Error> {
        let cells: Vec<_> = cells.into_iter().collect();
        self.check_columns(relation, cells.iter().map(|(c, _)| c))?;
        let row = self
            .table_mut(relation)?
            .row_mut(key)
            .ok_or_else(|| Error::storage(format!("no row in {relation} with key {key}")))?;
        row.extend(cells);
        Ok(())
    }
}

/// Store keeping all tables in memory.
///
/// # Example
///
/// ```
/// use gizlidb::storage::{MemoryStore, Store};
///
/// let store = MemoryStore::new();
/// store.create_table("people", ["name", "age"]);
/// store.add_column("people", "age_encrypted").expect("no table");
/// store.refresh_columns("people").expect("no table");
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table. Its columns are cached immediately.
    pub fn create_table<I, C>(&self, relation: &str, columns: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let columns: BTreeSet<String> = columns.into_iter().map(Into::into).collect();
        let mut state = self.state.lock();
        state.cached_columns.insert(relation.to_string(), columns.clone());
        state.tables.insert(relation.to_string(), Table { columns, rows: Vec::new(), next_id: 1 });
    }

    /// Adds a column to an existing table without refreshing the cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the table does not exist.
    pub fn add_column(&self, relation: &str, column: &str) -> Result<(), Error> {
        self.state.lock().table_mut(relation)?.columns.insert(column.to_string());
        Ok(())
    }

    /// Inserts a raw row with an explicit key, bypassing any model.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` for unknown tables or columns and duplicate keys.
    pub fn insert_row<I>(
        &self,
        relation: &str,
        key: impl Into<Value>,
        cells: I,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = (String, Cell)>,
    {
        let key = key.into();
        let cells: BTreeMap<String, Cell> = cells.into_iter().collect();
        let mut state = self.state.lock();
        state.check_columns(relation, cells.keys())?;

        let table = state.table_mut(relation)?;
        if table.row_mut(&key).is_some() {
            return Err(Error::storage(format!("duplicate key {key} in {relation}")));
        }
        if let Value::Integer(i) = key {
            if let Ok(i) = i64::try_from(i) {
                table.next_id = table.next_id.max(i.saturating_add(1));
            }
        }
        table.rows.push((key, cells));
        Ok(())
    }

    /// Raw cells of one row.
    #[must_use]
    pub fn row(&self, relation: &str, key: &Value) -> Option<BTreeMap<String, Cell>> {
        let state = self.state.lock();
        let table = state.tables.get(relation)?;
        table.rows.iter().find(|(k, _)| k == key).map(|(_, cells)| cells.clone())
    }

    /// Number of rows in a table.
    #[must_use]
    pub fn len(&self, relation: &str) -> usize {
        self.state.lock().tables.get(relation).map_or(0, |t| t.rows.len())
    }

    /// Returns `true` if the table has no rows or does not exist.
    #[must_use]
    pub fn is_empty(&self, relation: &str) -> bool {
        self.len(relation) == 0
    }
}

struct MemoryTransaction<'s> {
    state: &'s mut State,
}

impl Transaction for MemoryTransaction<'_> {
    fn lock_unmigrated(
        &mut self,
        schema: &ModelSchema,
        pairs: &[ColumnPair],
        limit: usize,
    ) -> Result<Vec<StoredRow>, Error> {
        let table = self.state.table(schema.relation())?;
        let columns: BTreeSet<&String> =
            pairs.iter().flat_map(|p| [&p.source, &p.target]).collect();

        let rows = table
            .rows
            .iter()
            .map(|(key, cells)| StoredRow {
                key: key.clone(),
                cells: cells
                    .iter()
                    .filter(|(name, _)| columns.contains(name))
                    .map(|(name, cell)| (name.clone(), cell.clone()))
                    .collect(),
            })
            .filter(|row| pairs.iter().any(|pair| row.needs(pair)))
            .take(limit)
            .collect();
        Ok(rows)
    }

    fn update_row(
        &mut self,
        schema: &ModelSchema,
        key: &Value,
        cells: &[(String, Cell)],
    ) -> Result<(), Error> {
        self.state.write_row(schema.relation(), key, cells.iter().cloned())
    }
}

impl Store for MemoryStore {
    fn refresh_columns(&self, relation: &str) -> Result<(), Error> {
        let mut state = self.state.lock();
        let columns = state.table(relation)?.columns.clone();
        state.cached_columns.insert(relation.to_string(), columns);
        Ok(())
    }

    fn transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, Error>,
    {
        let mut state = self.state.lock();
        let mut working = state.clone();
        let result = f(&mut MemoryTransaction { state: &mut working })?;
        *state = working;
        Ok(result)
    }

    fn insert(&self, record: &mut Record) -> Result<(), Error> {
        let relation = record.schema().relation().to_string();
        let mut state = self.state.lock();
        state.check_columns(&relation, record.cells().keys())?;

        let table = state.table_mut(&relation)?;
        let key = match record.primary_key() {
            Some(key) if !key.is_null() => key.clone(),
            _ => {
                let id = table.next_id;
                table.next_id += 1;
                Value::from(id)
            }
        };
        if table.row_mut(&key).is_some() {
            return Err(Error::storage(format!("duplicate key {key} in {relation}")));
        }

        table.rows.push((key.clone(), record.cells().clone()));
        record.set_primary_key(key);
        record.mark_persisted();
        Ok(())
    }

    fn update(&self, record: &Record) -> Result<(), Error> {
        let key = record
            .primary_key()
            .ok_or_else(|| Error::storage("cannot update a record without a primary key"))?;
        let cells = record.cells().iter().map(|(c, v)| (c.clone(), v.clone()));
        self.state.lock().write_row(record.schema().relation(), key, cells)
    }

    fn fetch(&self, schema: &Arc<ModelSchema>, key: &Value) -> Result<Option<Record>, Error> {
        let state = self.state.lock();
        let table = state.table(schema.relation())?;
        Ok(table
            .rows
            .iter()
            .find(|(k, _)| k == key)
            .map(|(k, cells)| Record::from_stored(Arc::clone(schema), k.clone(), cells.clone())))
    }

    fn find(
        &self,
        schema: &Arc<ModelSchema>,
        predicates: &[Predicate],
    ) -> Result<Vec<Record>, Error> {
        let state = self.state.lock();
        let table = state.table(schema.relation())?;

        let mut records = Vec::new();
        for (key, cells) in &table.rows {
            if row_matches(schema, key, cells, predicates)? {
                records.push(Record::from_stored(Arc::clone(schema), key.clone(), cells.clone()));
            }
        }
        Ok(records)
    }
}
