//! In-memory records.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::record_context;
use crate::envelope::EncryptedValue;
use crate::schema::ModelSchema;
use crate::value::Value;

/// Persisted representation of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Cleartext value of a plain attribute
    Plain(Value),
    /// Envelope of an encrypted attribute; `None` is SQL `NULL`
    Encrypted(Option<EncryptedValue>),
}

impl Cell {
    /// Returns `true` for null cells of either kind.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        match self {
            Self::Plain(v) => v.is_null(),
            Self::Encrypted(e) => e.is_none(),
        }
    }
}

/// A row of a model, holding encrypted attributes as envelopes.
///
/// Encrypted attributes are never held in cleartext; reading one goes
/// through [`Interceptor::read`](crate::interceptor::Interceptor::read).
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<ModelSchema>,
    primary_key: Option<Value>,
    cells: BTreeMap<String, Cell>,
    persisted: bool,
}

impl Record {
    /// An empty, unpersisted record.
    #[must_use]
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        Self { schema, primary_key: None, cells: BTreeMap::new(), persisted: false }
    }

    /// A record loaded from storage.
    #[must_use]
    pub fn from_stored(
        schema: Arc<ModelSchema>,
        primary_key: Value,
        cells: BTreeMap<String, Cell>,
    ) -> Self {
        Self { schema, primary_key: Some(primary_key), cells, persisted: true }
    }

    /// The record's model.
    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Primary key, if assigned.
    #[must_use]
    pub const fn primary_key(&self) -> Option<&Value> {
        self.primary_key.as_ref()
    }

    /// Assigns the primary key. Envelopes written earlier stay bound to the
    /// context they were written with.
    pub fn set_primary_key(&mut self, key: impl Into<Value>) {
        self.primary_key = Some(key.into());
    }

    /// Current binding context: the stringified primary key or `""`.
    #[must_use]
    pub fn context(&self) -> String {
        record_context(self.primary_key.as_ref())
    }

    /// Returns `true` until the record has been stored.
    #[must_use]
    pub const fn is_new_record(&self) -> bool {
        !self.persisted
    }

    /// Flags the record as stored.
    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    /// Persisted representation of an attribute.
    #[must_use]
    pub fn cell(&self, attribute: &str) -> Option<&Cell> {
        self.cells.get(attribute)
    }

    /// All set attributes.
    #[must_use]
    pub const fn cells(&self) -> &BTreeMap<String, Cell> {
        &self.cells
    }

    pub(crate) fn set_cell(&mut self, attribute: &str, cell: Cell) {
        self.cells.insert(attribute.to_string(), cell);
    }
}
