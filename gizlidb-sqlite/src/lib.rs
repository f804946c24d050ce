//! SQLite storage backend for `GizliDB`.
//!
//! Encrypted attributes are stored as envelope JSON in `TEXT` columns; the
//! column's encrypted type comes from the model schema. Plain attributes map
//! onto SQLite's native types, except that columns declared `BOOLEAN`, `DATE`
//! or `DATETIME`/`TIMESTAMP` read back as booleans, dates and timestamps.
//!
//! Transactions start with `BEGIN IMMEDIATE`, which takes the database write
//! lock up front. Rows selected for migration therefore stay locked until the
//! batch commits or rolls back.
//!
//! Column lists are cached per table on first use. Columns added afterwards
//! are rejected until [`Store::refresh_columns`] reloads the cache.

#![warn(clippy::pedantic, clippy::nursery)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use gizlidb::envelope::EncryptedValue;
use gizlidb::predicate::Predicate;
use gizlidb::record::{Cell, Record};
use gizlidb::schema::ModelSchema;
use gizlidb::storage::{row_matches, ColumnPair, Store, StoredRow, Transaction};
use gizlidb::types::{ColumnType, EncryptedType};
use gizlidb::value::Value;
use gizlidb::Error;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use tracing::debug;

/// Errors raised by the SQLite backend.
#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    /// SQLite reported an error
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The table does not exist
    #[error("no such table: {0}")]
    NoSuchTable(String),

    /// The column is not in the cached column list
    #[error("unknown column {relation}.{column} (column metadata may be stale)")]
    UnknownColumn {
        /// Table name
        relation: String,
        /// Column name
        column: String,
    },

    /// The value has no SQLite representation
    #[error("cannot store value: {0}")]
    Unrepresentable(String),
}

impl From<SqliteError> for Error {
    fn from(err: SqliteError) -> Self {
        Self::storage(err)
    }
}

fn sql(err: rusqlite::Error) -> Error {
    SqliteError::Sql(err).into()
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// How a plain column's values are read back, taken from its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Declared {
    Boolean,
    Date,
    Timestamp,
    Other,
}

impl Declared {
    fn from_decl(decl: &str) -> Self {
        let decl = decl.trim().to_ascii_uppercase();
        if decl.starts_with("BOOL") {
            Self::Boolean
        } else if decl.contains("DATETIME") || decl.contains("TIMESTAMP") {
            Self::Timestamp
        } else if decl == "DATE" {
            Self::Date
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Default)]
struct ColumnCache(BTreeMap<String, BTreeMap<String, Declared>>);

impl ColumnCache {
    fn refresh(&mut self, conn: &Connection, relation: &str) -> Result<(), Error> {
        let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)").map_err(sql)?;
        let columns = stmt
            .query_map([relation], |row| {
                let decl: String = row.get(1)?;
                Ok((row.get::<_, String>(0)?, Declared::from_decl(&decl)))
            })
            .map_err(sql)?
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map_err(sql)?;
        if columns.is_empty() {
            return Err(SqliteError::NoSuchTable(relation.to_string()).into());
        }

        debug!(relation, columns = columns.len(), "loaded column metadata");
        self.0.insert(relation.to_string(), columns);
        Ok(())
    }

    fn columns(
        &mut self,
        conn: &Connection,
        relation: &str,
    ) -> Result<&BTreeMap<String, Declared>, Error> {
        if !self.0.contains_key(relation) {
            self.refresh(conn, relation)?;
        }
        self.0.get(relation).ok_or_else(|| SqliteError::NoSuchTable(relation.to_string()).into())
    }

    fn check<'a>(
        &mut self,
        conn: &Connection,
        relation: &str,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), Error> {
        let known = self.columns(conn, relation)?;
        for column in columns {
            if !known.contains_key(column) {
                return Err(SqliteError::UnknownColumn {
                    relation: relation.to_string(),
                    column: column.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    conn: Connection,
    cache: ColumnCache,
}

/// Store backed by a SQLite database.
///
/// # Example
///
/// ```
/// use gizlidb_sqlite::SqliteStore;
///
/// # fn main() -> Result<(), gizlidb::Error> {
/// let store = SqliteStore::open_in_memory()?;
/// store.execute_batch("CREATE TABLE people (id INTEGER PRIMARY KEY, age TEXT)")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteStore {
    inner: Mutex<Inner>,
}

impl SqliteStore {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_connection(Connection::open(path).map_err(sql)?)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the database cannot be opened.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::from_connection(Connection::open_in_memory().map_err(sql)?)
    }

    /// Wraps an existing connection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the connection cannot be configured.
    pub fn from_connection(conn: Connection) -> Result<Self, Error> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(sql)?;
        Ok(Self { inner: Mutex::new(Inner { conn, cache: ColumnCache::default() }) })
    }

    /// Runs raw SQL, typically schema changes. The column cache is not
    /// refreshed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the statements fail.
    pub fn execute_batch(&self, statements: &str) -> Result<(), Error> {
        self.inner.lock().conn.execute_batch(statements).map_err(sql)
    }

    /// Adds an encrypted column unless the table already has it.
    ///
    /// Returns `true` if the column was added. The column cache is not
    /// refreshed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the table does not exist or cannot be
    /// altered.
    pub fn add_column(&self, relation: &str, column: &str, ty: ColumnType) -> Result<bool, Error> {
        let guard = self.inner.lock();
        let mut existing = ColumnCache::default();
        existing.refresh(&guard.conn, relation)?;
        if existing.0.get(relation).is_some_and(|c| c.contains_key(column)) {
            return Ok(false);
        }

        let statement = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote(relation),
            quote(column),
            ty.sql_type()
        );
        guard.conn.execute_batch(&statement).map_err(sql)?;
        debug!(relation, column, sql_type = ty.sql_type(), "added encrypted column");
        Ok(true)
    }
}

/// A selected column and how its values are decoded.
#[derive(Debug, Clone)]
struct Column {
    name: String,
    encrypted: Option<EncryptedType>,
    declared: Declared,
}

/// Columns of `schema` that exist in the table.
fn selected(schema: &ModelSchema, known: &BTreeMap<String, Declared>) -> Vec<Column> {
    schema
        .attributes()
        .filter(|a| a.name() != schema.primary_key())
        .filter_map(|a| {
            known.get(a.name()).map(|declared| Column {
                name: a.name().to_string(),
                encrypted: a.encrypted_type(),
                declared: *declared,
            })
        })
        .collect()
}

fn to_sql(cell: &Cell) -> Result<SqlValue, Error> {
    let value = match cell {
        Cell::Encrypted(None) | Cell::Plain(Value::Null) => SqlValue::Null,
        Cell::Encrypted(Some(envelope)) => SqlValue::Text(envelope.to_json()?),
        Cell::Plain(Value::Boolean(b)) => SqlValue::Integer(i64::from(*b)),
        Cell::Plain(Value::Integer(i)) => SqlValue::Integer(i64::try_from(*i).map_err(|_| {
            SqliteError::Unrepresentable(format!("integer {i} does not fit in 64 bits"))
        })?),
        Cell::Plain(Value::Float(f)) => SqlValue::Real(*f),
        Cell::Plain(Value::Text(s)) => SqlValue::Text(s.clone()),
        Cell::Plain(Value::Bytes(b)) => SqlValue::Blob(b.clone()),
        Cell::Plain(Value::Date(d)) => SqlValue::Text(d.to_string()),
        Cell::Plain(Value::Timestamp(t)) => SqlValue::Text(t.to_string()),
    };
    Ok(value)
}

fn key_to_sql(key: &Value) -> Result<SqlValue, Error> {
    to_sql(&Cell::Plain(key.clone()))
}

fn from_sql(value: ValueRef<'_>, declared: Declared) -> Result<Value, Error> {
    let value = match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i @ (0 | 1)) if declared == Declared::Boolean => Value::Boolean(i == 1),
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => {
            let text = std::str::from_utf8(t).map_err(|e| Error::storage(e.to_string()))?;
            text_value(text, declared)
        }
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };
    Ok(value)
}

/// Reads date and timestamp columns back into their typed values. Text that
/// does not parse is kept as text.
fn text_value(text: &str, declared: Declared) -> Value {
    let typed = match declared {
        Declared::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Value::Date),
        Declared::Timestamp => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
            .map(Value::Timestamp),
        Declared::Boolean | Declared::Other => None,
    };
    typed.unwrap_or_else(|| Value::Text(text.to_string()))
}

fn read_cell(value: ValueRef<'_>, column: &Column) -> Result<Cell, Error> {
    let Some(ty) = column.encrypted else {
        return from_sql(value, column.declared).map(Cell::Plain);
    };
    match value {
        ValueRef::Null => Ok(Cell::Encrypted(None)),
        ValueRef::Text(json) => {
            let json = std::str::from_utf8(json).map_err(|e| Error::Envelope(e.to_string()))?;
            EncryptedValue::from_json(ty, json).map(|v| Cell::Encrypted(Some(v)))
        }
        other => Err(Error::Envelope(format!(
            "encrypted {ty} column holds {} data",
            other.data_type()
        ))),
    }
}

/// Runs `query` and decodes each row as key followed by `columns`.
fn select_rows(
    conn: &Connection,
    query: &str,
    params: &[SqlValue],
    columns: &[Column],
) -> Result<Vec<(Value, BTreeMap<String, Cell>)>, Error> {
    let mut stmt = conn.prepare(query).map_err(sql)?;
    let mut rows = stmt.query(params_from_iter(params)).map_err(sql)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(sql)? {
        let key = from_sql(row.get_ref(0).map_err(sql)?, Declared::Other)?;
        let mut cells = BTreeMap::new();
        for (i, column) in columns.iter().enumerate() {
            let cell = read_cell(row.get_ref(i + 1).map_err(sql)?, column)?;
            cells.insert(column.name.clone(), cell);
        }
        out.push((key, cells));
    }
    Ok(out)
}

fn select_list(schema: &ModelSchema, columns: &[Column]) -> String {
    std::iter::once(schema.primary_key())
        .chain(columns.iter().map(|c| c.name.as_str()))
        .map(quote)
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_row(
    conn: &Connection,
    cache: &mut ColumnCache,
    schema: &ModelSchema,
    key: &Value,
    cells: &[(&str, &Cell)],
) -> Result<(), Error> {
    if cells.is_empty() {
        return Ok(());
    }
    let relation = schema.relation();
    cache.check(conn, relation, cells.iter().map(|(name, _)| *name))?;

    let assignments = cells
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("{} = ?{}", quote(name), i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let query = format!(
        "UPDATE {} SET {assignments} WHERE {} = ?{}",
        quote(relation),
        quote(schema.primary_key()),
        cells.len() + 1
    );

    let mut params = cells.iter().map(|(_, cell)| to_sql(cell)).collect::<Result<Vec<_>, _>>()?;
    params.push(key_to_sql(key)?);

    let changed = conn.execute(&query, params_from_iter(params)).map_err(sql)?;
    if changed == 0 {
        return Err(Error::storage(format!("no row in {relation} with key {key}")));
    }
    Ok(())
}

struct SqliteTransaction<'c> {
    tx: rusqlite::Transaction<'c>,
    cache: &'c mut ColumnCache,
}

impl Transaction for SqliteTransaction<'_> {
    fn lock_unmigrated(
        &mut self,
        schema: &ModelSchema,
        pairs: &[ColumnPair],
        limit: usize,
    ) -> Result<Vec<StoredRow>, Error> {
        let relation = schema.relation();
        let names: Vec<&str> =
            pairs.iter().flat_map(|p| [p.source.as_str(), p.target.as_str()]).collect();
        self.cache.check(&self.tx, relation, names.iter().copied())?;
        let known = self.cache.columns(&self.tx, relation)?;

        let mut columns: Vec<Column> = Vec::new();
        for name in names {
            if !columns.iter().any(|c| c.name == name) {
                columns.push(Column {
                    name: name.to_string(),
                    encrypted: schema.attribute(name).and_then(|a| a.encrypted_type()),
                    declared: known.get(name).copied().unwrap_or(Declared::Other),
                });
            }
        }

        let pending = pairs
            .iter()
            .map(|p| {
                format!("({} IS NULL AND {} IS NOT NULL)", quote(&p.target), quote(&p.source))
            })
            .collect::<Vec<_>>()
            .join(" OR ");
        let query = format!(
            "SELECT {} FROM {} WHERE {pending} ORDER BY {} LIMIT ?1",
            select_list(schema, &columns),
            quote(relation),
            quote(schema.primary_key())
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = select_rows(&self.tx, &query, &[SqlValue::Integer(limit)], &columns)?;
        Ok(rows.into_iter().map(|(key, cells)| StoredRow { key, cells }).collect())
    }

    fn update_row(
        &mut self,
        schema: &ModelSchema,
        key: &Value,
        cells: &[(String, Cell)],
    ) -> Result<(), Error> {
        let cells: Vec<(&str, &Cell)> = cells.iter().map(|(n, c)| (n.as_str(), c)).collect();
        write_row(&self.tx, self.cache, schema, key, &cells)
    }
}

impl Store for SqliteStore {
    fn refresh_columns(&self, relation: &str) -> Result<(), Error> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.cache.refresh(&inner.conn, relation)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, Error>,
    {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let tx = inner.conn.transaction_with_behavior(TransactionBehavior::Immediate).map_err(sql)?;

        let mut handle = SqliteTransaction { tx, cache: &mut inner.cache };
        let result = f(&mut handle)?;
        handle.tx.commit().map_err(sql)?;
        Ok(result)
    }

    fn insert(&self, record: &mut Record) -> Result<(), Error> {
        let schema = Arc::clone(record.schema());
        let relation = schema.relation();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let key = record.primary_key().filter(|k| !k.is_null()).cloned();
        let mut names: Vec<&str> = Vec::new();
        let mut params = Vec::new();
        if let Some(key) = &key {
            names.push(schema.primary_key());
            params.push(key_to_sql(key)?);
        }
        for (name, cell) in record.cells() {
            names.push(name);
            params.push(to_sql(cell)?);
        }
        inner.cache.check(&inner.conn, relation, names.iter().copied())?;

        let query = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(relation))
        } else {
            let placeholders = (1..=names.len()).map(|i| format!("?{i}")).collect::<Vec<_>>();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(relation),
                names.iter().map(|n| quote(n)).collect::<Vec<_>>().join(", "),
                placeholders.join(", ")
            )
        };
        inner.conn.execute(&query, params_from_iter(params)).map_err(sql)?;

        let key = key.unwrap_or_else(|| Value::from(inner.conn.last_insert_rowid()));
        record.set_primary_key(key);
        record.mark_persisted();
        Ok(())
    }

    fn update(&self, record: &Record) -> Result<(), Error> {
        let key = record
            .primary_key()
            .ok_or_else(|| Error::storage("cannot update a record without a primary key"))?;
        let cells: Vec<(&str, &Cell)> =
            record.cells().iter().map(|(n, c)| (n.as_str(), c)).collect();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        write_row(&inner.conn, &mut inner.cache, record.schema(), key, &cells)
    }

    fn fetch(&self, schema: &Arc<ModelSchema>, key: &Value) -> Result<Option<Record>, Error> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let columns = selected(schema, inner.cache.columns(&inner.conn, schema.relation())?);

        let query = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            select_list(schema, &columns),
            quote(schema.relation()),
            quote(schema.primary_key())
        );
        let rows = select_rows(&inner.conn, &query, &[key_to_sql(key)?], &columns)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|(k, cells)| Record::from_stored(Arc::clone(schema), k, cells)))
    }

    fn find(
        &self,
        schema: &Arc<ModelSchema>,
        predicates: &[Predicate],
    ) -> Result<Vec<Record>, Error> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let columns = selected(schema, inner.cache.columns(&inner.conn, schema.relation())?);

        let query = format!(
            "SELECT {} FROM {} ORDER BY {}",
            select_list(schema, &columns),
            quote(schema.relation()),
            quote(schema.primary_key())
        );

        let mut records = Vec::new();
        for (key, cells) in select_rows(&inner.conn, &query, &[], &columns)? {
            if row_matches(schema, &key, &cells, predicates)? {
                records.push(Record::from_stored(Arc::clone(schema), key, cells));
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gizlidb::options::AttributeOptions;

    fn schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelSchema::builder("people")
                .plain("name")
                .encrypted("age", EncryptedType::Integer64, AttributeOptions::new())
                .build()
                .unwrap(),
        )
    }

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, age TEXT)")
            .unwrap();
        store
    }

    #[test]
    fn test_quote_escapes_quotes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_insert_assigns_rowid() {
        let store = store();
        let mut record = Record::new(schema());
        store.insert(&mut record).unwrap();
        assert_eq!(record.primary_key(), Some(&Value::from(1)));
        assert!(!record.is_new_record());

        let loaded = store.fetch(&schema(), &Value::from(1)).unwrap().unwrap();
        assert!(loaded.cells().values().all(Cell::is_null));
    }

    #[test]
    fn test_stale_columns_until_refresh() {
        let store = store();
        let mut record = Record::new(schema());
        store.insert(&mut record).unwrap();

        store.execute_batch("ALTER TABLE people ADD COLUMN age_copy TEXT").unwrap();
        let update = [("age_copy".to_string(), Cell::Plain(Value::from("x")))];
        let stale = store.transaction(|tx| tx.update_row(&schema(), &Value::from(1), &update));
        assert!(matches!(stale, Err(Error::Storage(_))));

        store.refresh_columns("people").unwrap();
        store.transaction(|tx| tx.update_row(&schema(), &Value::from(1), &update)).unwrap();
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = store();
        store.execute_batch("INSERT INTO people (id, name) VALUES (1, 'a')").unwrap();

        let result: Result<(), Error> = store.transaction(|tx| {
            let update = [("name".to_string(), Cell::Plain(Value::from("b")))];
            tx.update_row(&schema(), &Value::from(1), &update)?;
            Err(Error::Validation("boom".to_string()))
        });
        assert!(result.is_err());

        let loaded = store.fetch(&schema(), &Value::from(1)).unwrap().unwrap();
        assert_eq!(loaded.cell("name"), Some(&Cell::Plain(Value::from("a"))));
    }

    #[test]
    fn test_add_column_is_idempotent() {
        let store = store();
        assert!(store.add_column("people", "age_enc", ColumnType::EncryptedInteger64).unwrap());
        assert!(!store.add_column("people", "age_enc", ColumnType::EncryptedInteger64).unwrap());
        assert!(matches!(
            store.add_column("nobody", "x", ColumnType::EncryptedText),
            Err(Error::Storage(_))
        ));
    }

    #[test]
    fn test_unrepresentable_integer() {
        let cell = Cell::Plain(Value::Integer(1_i128 << 63));
        assert!(matches!(to_sql(&cell), Err(Error::Storage(_))));
    }

    #[test]
    fn test_encrypted_column_rejects_foreign_data() {
        let column =
            |encrypted| Column { name: "c".to_string(), encrypted, declared: Declared::Other };
        let cell = read_cell(ValueRef::Integer(3), &column(Some(EncryptedType::Integer64)));
        assert!(matches!(cell, Err(Error::Envelope(_))));
        let cell = read_cell(ValueRef::Null, &column(Some(EncryptedType::Text))).unwrap();
        assert_eq!(cell, Cell::Encrypted(None));
    }

    #[test]
    fn test_declared_types() {
        assert_eq!(Declared::from_decl("BOOLEAN"), Declared::Boolean);
        assert_eq!(Declared::from_decl("bool"), Declared::Boolean);
        assert_eq!(Declared::from_decl("DATE"), Declared::Date);
        assert_eq!(Declared::from_decl("DATETIME"), Declared::Timestamp);
        assert_eq!(Declared::from_decl("timestamp"), Declared::Timestamp);
        assert_eq!(Declared::from_decl("INTEGER"), Declared::Other);
        assert_eq!(Declared::from_decl(""), Declared::Other);
    }

    #[test]
    fn test_plain_values_follow_declared_type() {
        assert_eq!(from_sql(ValueRef::Integer(1), Declared::Boolean).unwrap(), Value::from(true));
        assert_eq!(from_sql(ValueRef::Integer(0), Declared::Boolean).unwrap(), Value::from(false));
        assert_eq!(from_sql(ValueRef::Integer(2), Declared::Boolean).unwrap(), Value::from(2));
        assert_eq!(from_sql(ValueRef::Integer(1), Declared::Other).unwrap(), Value::from(1));

        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let text = ValueRef::Text(b"2020-01-01");
        assert_eq!(from_sql(text, Declared::Date).unwrap(), Value::Date(date));
        assert_eq!(
            from_sql(ValueRef::Text(b"2020-01-01 08:30:00.123"), Declared::Timestamp).unwrap(),
            Value::Timestamp(date.and_hms_milli_opt(8, 30, 0, 123).unwrap())
        );
        assert_eq!(
            from_sql(ValueRef::Text(b"soon"), Declared::Date).unwrap(),
            Value::from("soon")
        );
    }

    #[test]
    fn test_boolean_column_reads_as_boolean() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch(
                "CREATE TABLE people (id INTEGER PRIMARY KEY, active BOOLEAN);
                 INSERT INTO people (id, active) VALUES (1, TRUE), (2, 0), (3, NULL);",
            )
            .unwrap();
        let schema = Arc::new(ModelSchema::builder("people").plain("active").build().unwrap());

        let active = |id: i64| {
            let record = store.fetch(&schema, &Value::from(id)).unwrap().unwrap();
            record.cell("active").cloned()
        };
        assert_eq!(active(1), Some(Cell::Plain(Value::from(true))));
        assert_eq!(active(2), Some(Cell::Plain(Value::from(false))));
        assert_eq!(active(3), Some(Cell::Plain(Value::Null)));
    }
}
