//! # `GizliDB`
//!
//! Queryable field-level encryption for relational records.
//!
//! Attribute values are stored as versioned JSON envelopes that carry an
//! AEAD ciphertext next to order-revealing (ORE) terms, so equality and
//! range predicates can be evaluated without decrypting the column.
//!
//! ## Features
//!
//! - ChaCha20-Poly1305 encryption bound to the record's primary key
//! - Lewi-Wu order-revealing encryption for integers, booleans and dates
//! - Keyed equality digests and bounded prefix ordering for text
//! - Per-attribute safety modes (`standard`, `reduced_security`, `no_query`)
//! - Predicate rewriting of plaintext literals into encrypted operands
//! - Online batch migration of plaintext columns into encrypted columns
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use gizlidb::prelude::*;
//!
//! # fn main() -> Result<(), gizlidb::Error> {
//! let keys = KeyContext::new();
//! keys.set_key(&[7u8; 32])?;
//!
//! let schema = Arc::new(
//!     ModelSchema::builder("people")
//!         .encrypted("born", EncryptedType::Date, AttributeOptions::new())
//!         .build()?,
//! );
//! let store = MemoryStore::new();
//! store.create_table("people", ["born"]);
//!
//! let people = Repository::new(&keys, schema, &store);
//! let mut grace = people.new_record()?;
//! people.set(&mut grace, "born", "1906-12-09")?;
//! people.save(&mut grace)?;
//!
//! let earlier = people.find(&[Predicate::lt("born", "1950-01-01")])?;
//! assert_eq!(earlier.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod aead;
pub mod blind_index;
pub mod context;
pub mod envelope;
pub mod error;
pub mod field;
pub mod interceptor;
pub mod kdf;
pub mod keys;
pub mod migration;
pub mod options;
pub mod ore;
pub mod predicate;
pub mod record;
pub mod repository;
pub mod schema;
pub mod storage;
pub mod types;
pub mod value;

pub use error::{Error, Result};

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::context::FieldId;
    pub use crate::envelope::EncryptedValue;
    pub use crate::error::Error;
    pub use crate::interceptor::Interceptor;
    pub use crate::keys::KeyContext;
    pub use crate::migration::{CancelToken, MigrationEngine, MigrationReport};
    pub use crate::options::{AttributeConfig, AttributeOptions, SafetyMode};
    pub use crate::predicate::{Operand, Predicate, PredicateRewriter};
    pub use crate::record::{Cell, Record};
    pub use crate::repository::Repository;
    pub use crate::schema::ModelSchema;
    pub use crate::storage::{MemoryStore, Store, Transaction};
    pub use crate::types::{ColumnType, EncryptedType};
    pub use crate::value::Value;
}
