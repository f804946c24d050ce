//! End-to-end tests of the SQLite backend.

use std::sync::Arc;

use gizlidb::migration::MigrationEngine;
use gizlidb::prelude::*;
use gizlidb_sqlite::SqliteStore;
use tempfile::TempDir;

fn keys() -> KeyContext {
    let keys = KeyContext::new();
    keys.set_key(&[42u8; 32]).expect("fresh key context");
    keys
}

fn schema() -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::builder("accounts")
            .plain("balance")
            .plain("email")
            .encrypted("balance_enc", EncryptedType::Integer64, AttributeOptions::new())
            .encrypted("email_enc", EncryptedType::Text, AttributeOptions::new().reduced_security())
            .build()
            .expect("valid schema"),
    )
}

#[test]
fn test_migrate_then_query_file_database() {
    let dir = TempDir::new().expect("temp dir");
    let store = SqliteStore::open(dir.path().join("accounts.db")).expect("open database");
    store
        .execute_batch(
            "CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER, email TEXT);
             INSERT INTO accounts (balance, email) VALUES
                 (100, 'ada@example.com'), (-5, 'alan@example.com'), (NULL, 'grace@example.com'),
                 (2500, NULL), (7, 'edsger@example.com');",
        )
        .expect("seed table");

    let keys = keys();
    let repo = Repository::new(&keys, schema(), &store);
    assert!(repo.fetch(1).expect("fetch").is_some());

    store
        .execute_batch(
            "ALTER TABLE accounts ADD COLUMN balance_enc TEXT;
             ALTER TABLE accounts ADD COLUMN email_enc TEXT;",
        )
        .expect("add encrypted columns");

    let engine = MigrationEngine::new(
        &store,
        Interceptor::new(&keys, schema()),
        [("balance", "balance_enc"), ("email", "email_enc")],
    )
    .expect("valid column map")
    .with_batch_size(2)
    .expect("positive batch size");

    let report = engine.run().expect("migration succeeds");
    assert_eq!(report.rows, 5);
    assert_eq!(report.batch_sizes, vec![2, 2, 1]);
    assert_eq!(engine.run().expect("rerun").batches, 0);

    let repo = Repository::new(&keys, schema(), &store);
    let third = repo.fetch(3).expect("fetch").expect("row exists");
    assert_eq!(repo.get(&third, "balance_enc").expect("decrypt"), Value::Null);
    assert_eq!(repo.get(&third, "email_enc").expect("decrypt"), Value::from("grace@example.com"));

    let positive = repo.find(&[Predicate::gt("balance_enc", 0)]).expect("query");
    let keys_found: Vec<Option<Value>> =
        positive.iter().map(|r| r.primary_key().cloned()).collect();
    assert_eq!(keys_found, vec![Some(Value::from(1)), Some(Value::from(4)), Some(Value::from(5))]);

    let alan = repo.find(&[Predicate::eq("email_enc", "alan@example.com")]).expect("query");
    assert_eq!(alan.len(), 1);
    assert_eq!(repo.get(&alan[0], "balance_enc").expect("decrypt"), Value::from(-5));
}

#[test]
fn test_repository_round_trip() {
    let keys = keys();
    let store = SqliteStore::open_in_memory().expect("open database");
    store
        .execute_batch(
            "CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER, email TEXT,
                                    balance_enc TEXT, email_enc TEXT)",
        )
        .expect("create table");
    let repo = Repository::new(&keys, schema(), &store);

    let mut account = repo.new_record().expect("new record");
    repo.set(&mut account, "balance_enc", 1_i64 << 42).expect("encrypt");
    repo.set(&mut account, "email_enc", "").expect("encrypt");
    repo.save(&mut account).expect("insert");

    repo.set(&mut account, "balance_enc", 3).expect("encrypt under assigned key");
    repo.save(&mut account).expect("update");

    let loaded = repo.fetch(1).expect("fetch").expect("row exists");
    assert_eq!(repo.get(&loaded, "balance_enc").expect("decrypt"), Value::from(3));
    assert_eq!(repo.get(&loaded, "email_enc").expect("fallback decrypt"), Value::from(""));
}

#[test]
fn test_failed_batch_leaves_earlier_batches_committed() {
    let keys = keys();
    let store = SqliteStore::open_in_memory().expect("open database");
    store
        .execute_batch(
            "CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER, email TEXT,
                                    balance_enc TEXT, email_enc TEXT);
             INSERT INTO accounts (balance) VALUES (1), (2), ('not a number'), (4);",
        )
        .expect("seed table");

    let interceptor = Interceptor::new(&keys, schema());
    let result = MigrationEngine::new(&store, interceptor, [("balance", "balance_enc")])
        .expect("valid column map")
        .with_batch_size(2)
        .expect("positive batch size")
        .run();
    assert!(matches!(result, Err(Error::MigrationBatch { batch: 2, .. })));

    let repo = Repository::new(&keys, schema(), &store);
    let migrated: Vec<bool> = (1..=4)
        .map(|id| {
            let record = repo.fetch(id).expect("fetch").expect("row exists");
            !repo.get(&record, "balance_enc").expect("decrypt").is_null()
        })
        .collect();
    assert_eq!(migrated, vec![true, true, false, false]);
}

#[test]
fn test_migrate_boolean_and_date_columns() {
    let keys = keys();
    let store = SqliteStore::open_in_memory().expect("open database");
    store
        .execute_batch(
            "CREATE TABLE visits (id INTEGER PRIMARY KEY, loyal BOOLEAN, seen TEXT,
                                  loyal_enc TEXT, seen_enc TEXT);
             INSERT INTO visits (loyal, seen) VALUES
                 (TRUE, '2020-01-01 08:30:00.123'), (FALSE, '2021-06-15'),
                 (NULL, '2019-12-31T23:59:59'), (TRUE, NULL);",
        )
        .expect("seed table");

    let schema = Arc::new(
        ModelSchema::builder("visits")
            .plain("loyal")
            .plain("seen")
            .encrypted("loyal_enc", EncryptedType::Boolean, AttributeOptions::new())
            .encrypted("seen_enc", EncryptedType::Date, AttributeOptions::new())
            .build()
            .expect("valid schema"),
    );

    let report = MigrationEngine::new(
        &store,
        Interceptor::new(&keys, Arc::clone(&schema)),
        [("loyal", "loyal_enc"), ("seen", "seen_enc")],
    )
    .expect("valid column map")
    .run()
    .expect("migration succeeds");
    assert_eq!(report.rows, 4);

    let repo = Repository::new(&keys, schema, &store);
    let first = repo.fetch(1).expect("fetch").expect("row exists");
    assert_eq!(repo.get(&first, "loyal_enc").expect("decrypt"), Value::from(true));
    assert_eq!(repo.get(&first, "seen_enc").expect("decrypt").to_string(), "2020-01-01");

    let ids = |records: Vec<Record>| -> Vec<Value> {
        records.iter().filter_map(|r| r.primary_key().cloned()).collect()
    };
    let loyal = repo.find(&[Predicate::eq("loyal_enc", true)]).expect("query");
    assert_eq!(ids(loyal), vec![Value::from(1), Value::from(4)]);

    let new_visitors = repo.find(&[Predicate::eq("loyal_enc", false)]).expect("query");
    assert_eq!(ids(new_visitors), vec![Value::from(2)]);

    let early = repo.find(&[Predicate::lt("seen_enc", "2020-06-01")]).expect("query");
    assert_eq!(ids(early), vec![Value::from(1), Value::from(3)]);
}
