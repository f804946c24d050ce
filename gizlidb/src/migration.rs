//! Online migration of plaintext columns into encrypted columns.
//!
//! The engine repeatedly selects a batch of rows whose encrypted target is
//! still unset, encrypts them under their own primary key and writes them
//! back, one transaction per batch. Already-migrated rows never match the
//! selection again, so a run can be interrupted and restarted at any point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::interceptor::Interceptor;
use crate::record::Cell;
use crate::storage::{ColumnPair, Store, StoredRow};

/// Batch size used unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Cooperative cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; the current batch still commits.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Number of batches that migrated at least one row
    pub batches: usize,
    /// Rows migrated by each of those batches
    pub batch_sizes: Vec<usize>,
    /// Total rows migrated
    pub rows: usize,
    /// Selections performed, including the final empty one
    pub selections: usize,
    /// Whether the run stopped because of a cancellation request
    pub cancelled: bool,
}

/// Migrates plaintext columns into encrypted columns in batches.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gizlidb::keys::KeyContext;
/// use gizlidb::interceptor::Interceptor;
/// use gizlidb::migration::MigrationEngine;
/// use gizlidb::options::AttributeOptions;
/// use gizlidb::record::Cell;
/// use gizlidb::schema::ModelSchema;
/// use gizlidb::storage::MemoryStore;
/// use gizlidb::types::EncryptedType;
/// use gizlidb::value::Value;
///
/// # fn main() -> Result<(), gizlidb::Error> {
/// let keys = KeyContext::new();
/// keys.set_key(&[1u8; 32])?;
/// let schema = Arc::new(
///     ModelSchema::builder("people")
///         .plain("age")
///         .encrypted("age_encrypted", EncryptedType::Integer64, AttributeOptions::new())
///         .build()?,
/// );
///
/// let store = MemoryStore::new();
/// store.create_table("people", ["age", "age_encrypted"]);
/// for id in 1..=3 {
///     store.insert_row("people", id, [("age".to_string(), Cell::Plain(Value::from(id * 10)))])?;
/// }
///
/// let interceptor = Interceptor::new(&keys, schema);
/// let engine = MigrationEngine::new(&store, interceptor, [("age", "age_encrypted")])?
///     .with_batch_size(2)?;
/// let report = engine.run()?;
/// assert_eq!(report.batch_sizes, vec![2, 1]);
/// assert_eq!(report.selections, 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MigrationEngine<'k, S> {
    store: S,
    interceptor: Interceptor<'k>,
    pairs: Vec<ColumnPair>,
    batch_size: usize,
    cancel: CancelToken,
}

impl<'k, S: Store> MigrationEngine<'k, S> {
    /// Creates an engine migrating each `(source, target)` column pair.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the map is empty or a target is not
    /// an encrypted attribute of the interceptor's model.
    pub fn new<I, A, B>(
        store: S,
        interceptor: Interceptor<'k>,
        column_map: I,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let pairs: Vec<ColumnPair> =
            column_map.into_iter().map(|(s, t)| ColumnPair::new(s, t)).collect();
        if pairs.is_empty() {
            return Err(Error::Configuration(
                "migration needs at least one column pair".to_string(),
            ));
        }
        for pair in &pairs {
            interceptor.schema().encrypted_attribute(&pair.target)?;
        }

        Ok(Self {
            store,
            interceptor,
            pairs,
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: CancelToken::new(),
        })
    }

    /// Sets the number of rows per batch.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for a batch size of zero.
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, Error> {
        if batch_size == 0 {
            return Err(Error::Configuration("batch size must be at least 1".to_string()));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    /// Uses `token` to stop the run between batches.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Column pairs being migrated.
    #[must_use]
    pub fn pairs(&self) -> &[ColumnPair] {
        &self.pairs
    }

    /// Runs batches until no unmigrated row is left or cancellation is
    /// requested.
    ///
    /// Column metadata is refreshed once before the first batch so targets
    /// added just before the run are visible.
    ///
    /// # Errors
    ///
    /// Returns `Error::MigrationBatch` if a batch fails; that batch is rolled
    /// back and earlier batches stay committed. Errors refreshing column
    /// metadata are returned as they are.
    pub fn run(&self) -> Result<MigrationReport, Error> {
        let schema = self.interceptor.schema();
        info!(
            relation = schema.relation(),
            pairs = self.pairs.len(),
            batch_size = self.batch_size,
            "starting migration"
        );
        self.store.refresh_columns(schema.relation())?;

        let mut report = MigrationReport::default();
        loop {
            if self.cancel.is_cancelled() {
                info!(relation = schema.relation(), rows = report.rows, "migration cancelled");
                report.cancelled = true;
                return Ok(report);
            }

            let batch = report.batches + 1;
            report.selections += 1;
            let migrated = self.store.transaction(|tx| {
                let rows = tx.lock_unmigrated(schema, &self.pairs, self.batch_size)?;
                for row in &rows {
                    let updates = self.encode_row(row)?;
                    tx.update_row(schema, &row.key, &updates)?;
                }
                Ok(rows.len())
            });

            match migrated {
                Ok(0) => break,
                Ok(rows) => {
                    debug!(relation = schema.relation(), batch, rows, "migration batch committed");
                    report.batches = batch;
                    report.batch_sizes.push(rows);
                    report.rows += rows;
                }
                Err(err) => {
                    warn!(
                        relation = schema.relation(),
                        batch,
                        error = %err,
                        "migration batch rolled back"
                    );
                    return Err(Error::MigrationBatch { batch, source: Box::new(err) });
                }
            }
        }

        info!(
            relation = schema.relation(),
            batches = report.batches,
            rows = report.rows,
            "migration finished"
        );
        Ok(report)
    }

    fn encode_row(&self, row: &StoredRow) -> Result<Vec<(String, Cell)>, Error> {
        let context = row.key.to_context();
        let mut updates = Vec::new();

        for pair in self.pairs.iter().filter(|pair| row.needs(pair)) {
            let Some(Cell::Plain(value)) = row.cells.get(&pair.source) else {
                return Err(Error::Validation(format!(
                    "source column {} does not hold a plaintext value",
                    pair.source
                )));
            };
            let cell = self.interceptor.encode_cell(&pair.target, value, &context)?;
            updates.push((pair.target.clone(), cell));
        }
        Ok(updates)
    }
}
