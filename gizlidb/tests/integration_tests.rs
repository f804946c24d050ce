//! Integration tests for gizlidb against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gizlidb::envelope::EncryptedValue;
use gizlidb::migration::{CancelToken, MigrationEngine};
use gizlidb::prelude::*;
use gizlidb::predicate::Bound;

fn keys(byte: u8) -> KeyContext {
    let keys = KeyContext::new();
    keys.set_key(&[byte; 32]).expect("fresh key context");
    keys
}

fn bigints(options: AttributeOptions) -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::builder("bigints")
            .plain("value")
            .encrypted("value_enc", EncryptedType::Integer64, options)
            .build()
            .expect("valid schema"),
    )
}

fn seeded_store(values: &[Value]) -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table("bigints", ["value"]);
    for (id, value) in (1_i64..).zip(values) {
        store
            .insert_row("bigints", id, [("value".to_string(), Cell::Plain(value.clone()))])
            .expect("insert seed row");
    }
    store.add_column("bigints", "value_enc").expect("table exists");
    store
}

/// Store wrapper counting how often queries reach storage.
struct CountingStore {
    inner: MemoryStore,
    finds: AtomicUsize,
}

impl Store for CountingStore {
    fn refresh_columns(&self, relation: &str) -> Result<(), Error> {
        self.inner.refresh_columns(relation)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, Error>,
    {
        self.inner.transaction(f)
    }

    fn insert(&self, record: &mut Record) -> Result<(), Error> {
        self.inner.insert(record)
    }

    fn update(&self, record: &Record) -> Result<(), Error> {
        self.inner.update(record)
    }

    fn fetch(&self, schema: &Arc<ModelSchema>, key: &Value) -> Result<Option<Record>, Error> {
        self.inner.fetch(schema, key)
    }

    fn find(
        &self,
        schema: &Arc<ModelSchema>,
        predicates: &[Predicate],
    ) -> Result<Vec<Record>, Error> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(schema, predicates)
    }
}

#[test]
fn test_large_integer_round_trip_hides_left_term() {
    let keys = keys(1);
    let schema = bigints(AttributeOptions::new());
    let store = MemoryStore::new();
    store.create_table("bigints", ["value", "value_enc"]);
    let repo = Repository::new(&keys, schema, &store);

    let mut record = repo.new_record().expect("new record");
    record.set_primary_key(1);
    repo.set(&mut record, "value_enc", 1_i64 << 42).expect("encrypt");

    let Some(Cell::Encrypted(Some(EncryptedValue::Integer64(ciphertext)))) =
        record.cell("value_enc")
    else {
        panic!("expected an integer envelope");
    };
    let order = ciphertext.o.as_ref().expect("queryable value carries an order term");
    assert!(order.l.is_none());
    assert!(!order.r.is_empty());

    let json = record.cell("value_enc").and_then(|c| match c {
        Cell::Encrypted(Some(v)) => v.to_json().ok(),
        _ => None,
    });
    let json = json.expect("serializable envelope");
    assert!(json.starts_with("{\"v1\":"));
    assert!(!json.contains("\"l\""));

    repo.save(&mut record).expect("save");
    let loaded = repo.fetch(1).expect("fetch").expect("row exists");
    assert_eq!(repo.get(&loaded, "value_enc").expect("decrypt"), Value::from(1_i64 << 42));
}

#[test]
fn test_integer_out_of_range_rejected() {
    let keys = keys(2);
    let store = MemoryStore::new();
    store.create_table("bigints", ["value", "value_enc"]);
    let repo = Repository::new(&keys, bigints(AttributeOptions::new()), &store);

    let mut record = repo.new_record().expect("new record");
    let result = repo.set(&mut record, "value_enc", Value::Integer(1_i128 << 63));

    assert!(matches!(result, Err(Error::Range(_))));
    assert!(record.cell("value_enc").is_none());
}

#[test]
fn test_migration_batches_and_rerun() {
    let keys = keys(3);
    let schema = bigints(AttributeOptions::new());
    let values: Vec<Value> = (0..12).map(|i| Value::from(i * 100)).collect();
    let store = seeded_store(&values);

    let engine = MigrationEngine::new(
        &store,
        Interceptor::new(&keys, Arc::clone(&schema)),
        [("value", "value_enc")],
    )
    .expect("valid column map")
    .with_batch_size(5)
    .expect("positive batch size");

    let report = engine.run().expect("migration succeeds");
    assert_eq!(report.batch_sizes, vec![5, 5, 2]);
    assert_eq!(report.selections, 4);
    assert!(!report.cancelled);

    let rerun = engine.run().expect("rerun succeeds");
    assert_eq!(rerun.batches, 0);
    assert_eq!(rerun.selections, 1);

    let repo = Repository::new(&keys, schema, &store);
    for id in 1..=12_i64 {
        let record = repo.fetch(id).expect("fetch").expect("row exists");
        assert_eq!(repo.get(&record, "value_enc").expect("decrypt"), Value::from((id - 1) * 100));
    }
}

#[test]
fn test_migrated_values_are_bound_to_their_row() {
    let keys = keys(4);
    let schema = bigints(AttributeOptions::new());
    let store = seeded_store(&[Value::from(10), Value::from(20)]);

    let interceptor = Interceptor::new(&keys, Arc::clone(&schema));
    MigrationEngine::new(&store, interceptor, [("value", "value_enc")])
        .expect("valid column map")
        .run()
        .expect("migration succeeds");

    let first = store.row("bigints", &Value::from(1)).expect("row 1");
    let moved = first.get("value_enc").cloned().expect("migrated cell");
    let copied = [("value_enc".to_string(), moved)];
    store
        .transaction(|tx| tx.update_row(&schema, &Value::from(2), &copied))
        .expect("copy ciphertext");

    let repo = Repository::new(&keys, schema, &store);
    let second = repo.fetch(2).expect("fetch").expect("row exists");
    assert!(matches!(repo.get(&second, "value_enc"), Err(Error::DecryptionContext(_))));
}

#[test]
fn test_migration_failure_rolls_back_batch() {
    let keys = keys(5);
    let schema = bigints(AttributeOptions::new());
    let values =
        [Value::from(1), Value::from(2), Value::Integer(1_i128 << 63), Value::from(4)];
    let store = seeded_store(&values);

    let interceptor = Interceptor::new(&keys, schema);
    let result = MigrationEngine::new(&store, interceptor, [("value", "value_enc")])
        .expect("valid column map")
        .with_batch_size(2)
        .expect("positive batch size")
        .run();

    match result {
        Err(Error::MigrationBatch { batch, source }) => {
            assert_eq!(batch, 2);
            assert!(matches!(*source, Error::Range(_)));
        }
        other => panic!("expected a failed batch, got {other:?}"),
    }

    let migrated = |id: i64| {
        store
            .row("bigints", &Value::from(id))
            .and_then(|cells| cells.get("value_enc").cloned())
            .is_some_and(|cell| !cell.is_null())
    };
    assert!(migrated(1));
    assert!(migrated(2));
    assert!(!migrated(3));
    assert!(!migrated(4));
}

#[test]
fn test_migration_stops_when_cancelled() {
    let keys = keys(6);
    let store = seeded_store(&[Value::from(1), Value::from(2)]);
    let token = CancelToken::new();
    token.cancel();

    let report = MigrationEngine::new(
        &store,
        Interceptor::new(&keys, bigints(AttributeOptions::new())),
        [("value", "value_enc")],
    )
    .expect("valid column map")
    .with_cancel_token(token)
    .run()
    .expect("cancelled run is not an error");

    assert!(report.cancelled);
    assert_eq!(report.rows, 0);
    assert!(store.row("bigints", &Value::from(1)).is_some_and(|r| !r.contains_key("value_enc")));
}

#[test]
fn test_equality_query_on_reduced_security_column() {
    let keys = keys(7);
    let store = MemoryStore::new();
    store.create_table("bigints", ["value", "value_enc"]);
    let repo = Repository::new(&keys, bigints(AttributeOptions::new().reduced_security()), &store);

    for value in [0_i64, 42, 420, 4200, 42_000] {
        let mut record = repo.new_record().expect("new record");
        repo.set(&mut record, "value_enc", value).expect("encrypt");
        repo.save(&mut record).expect("save");
    }

    let found = repo.find(&[Predicate::eq("value_enc", 420)]).expect("query");
    assert_eq!(found.len(), 1);
    assert_eq!(repo.get(&found[0], "value_enc").expect("decrypt"), Value::from(420));

    let found = repo.find(&[Predicate::is_in("value_enc", [0, 42_000, 7])]).expect("query");
    assert_eq!(found.len(), 2);
}

#[test]
fn test_range_query_on_standard_column() {
    let keys = keys(8);
    let store = MemoryStore::new();
    store.create_table("bigints", ["value", "value_enc"]);
    let repo = Repository::new(&keys, bigints(AttributeOptions::new()), &store);

    for value in [-50_i64, -1, 0, 1, 99, 100, 101] {
        let mut record = repo.new_record().expect("new record");
        repo.set(&mut record, "value_enc", value).expect("encrypt");
        repo.save(&mut record).expect("save");
    }

    let read = |records: Vec<Record>| -> Vec<Value> {
        records.iter().map(|r| repo.get(r, "value_enc").expect("decrypt")).collect()
    };

    let inclusive = repo.find(&[Predicate::between("value_enc", 0, 100)]).expect("query");
    assert_eq!(
        read(inclusive),
        vec![Value::from(0), Value::from(1), Value::from(99), Value::from(100)]
    );

    let half_open = Predicate::range(
        "value_enc",
        Some(Bound::exclusive(-1)),
        Some(Bound::exclusive(100)),
    );
    let found = repo.find(&[half_open]).expect("query");
    assert_eq!(read(found), vec![Value::from(0), Value::from(1), Value::from(99)]);

    let negative = repo.find(&[Predicate::lt("value_enc", 0)]).expect("query");
    assert_eq!(read(negative), vec![Value::from(-50), Value::from(-1)]);
}

#[test]
fn test_no_query_attribute_never_reaches_store() {
    let keys = keys(9);
    let inner = MemoryStore::new();
    inner.create_table("bigints", ["value", "value_enc"]);
    let store = CountingStore { inner, finds: AtomicUsize::new(0) };
    let repo = Repository::new(&keys, bigints(AttributeOptions::new().no_query()), &store);

    let mut record = repo.new_record().expect("new record");
    repo.set(&mut record, "value_enc", 5).expect("encrypt");
    repo.save(&mut record).expect("save");

    let Some(Cell::Encrypted(Some(envelope))) = record.cell("value_enc") else {
        panic!("expected an envelope");
    };
    assert!(!envelope.is_queryable());

    let result = repo.find(&[Predicate::eq("value_enc", 5)]);
    assert!(matches!(result, Err(Error::Configuration(_))));
    assert_eq!(store.finds.load(Ordering::SeqCst), 0);

    repo.find(&[Predicate::eq("value", 5)]).expect("plain query");
    assert_eq!(store.finds.load(Ordering::SeqCst), 1);
}

#[test]
fn test_text_queries() {
    let keys = keys(10);
    let schema = Arc::new(
        ModelSchema::builder("people")
            .encrypted("name", EncryptedType::Text, AttributeOptions::new().reduced_security())
            .encrypted(
                "city",
                EncryptedType::Text,
                AttributeOptions::new().reduced_security().ordering(true),
            )
            .build()
            .expect("valid schema"),
    );
    let store = MemoryStore::new();
    store.create_table("people", ["name", "city"]);
    let repo = Repository::new(&keys, schema, &store);

    for (name, city) in [("", "Ankara"), ("Ada", "Berlin"), ("Grace", "Cairo"), ("Alan", "Dakar")] {
        let mut record = repo.new_record().expect("new record");
        repo.set(&mut record, "name", name).expect("encrypt");
        repo.set(&mut record, "city", city).expect("encrypt");
        repo.save(&mut record).expect("save");
    }

    let empty = repo.fetch(1).expect("fetch").expect("row exists");
    let Some(Cell::Encrypted(Some(EncryptedValue::Text(text)))) = empty.cell("name") else {
        panic!("expected a text envelope");
    };
    assert!(text.h.is_some());
    assert_eq!(repo.get(&empty, "name").expect("decrypt"), Value::from(""));

    let found = repo.find(&[Predicate::eq("name", "Grace")]).expect("query");
    assert_eq!(found.len(), 1);

    let short = repo.find(&[Predicate::length_between("name", 1, 3)]).expect("query");
    assert_eq!(short.len(), 1);

    let range = repo.find(&[Predicate::between("city", "B", "Czz")]).expect("query");
    let cities: Vec<Value> = range.iter().map(|r| repo.get(r, "city").expect("decrypt")).collect();
    assert_eq!(cities, vec![Value::from("Berlin"), Value::from("Cairo")]);

    let unordered = repo.find(&[Predicate::gt("name", "A")]);
    assert!(matches!(unordered, Err(Error::Configuration(_))));
}

#[test]
fn test_value_written_before_insert_reads_after_key_assignment() {
    let keys = keys(11);
    let store = MemoryStore::new();
    store.create_table("bigints", ["value", "value_enc"]);
    let repo = Repository::new(&keys, bigints(AttributeOptions::new()), &store);

    let mut record = repo.new_record().expect("new record");
    repo.set(&mut record, "value_enc", 77).expect("encrypt under empty context");
    repo.save(&mut record).expect("save assigns key");
    assert_eq!(record.primary_key(), Some(&Value::from(1)));

    let loaded = repo.fetch(1).expect("fetch").expect("row exists");
    assert_eq!(repo.get(&loaded, "value_enc").expect("fallback decrypt"), Value::from(77));
}

#[test]
fn test_dates_query_by_component() {
    let keys = keys(12);
    let schema = Arc::new(
        ModelSchema::builder("people")
            .encrypted("born", EncryptedType::Date, AttributeOptions::new())
            .build()
            .expect("valid schema"),
    );
    let store = MemoryStore::new();
    store.create_table("people", ["born"]);
    let repo = Repository::new(&keys, schema, &store);

    for born in ["1815-12-10", "1906-12-09", "1912-06-23", "1906-12-31"] {
        let mut record = repo.new_record().expect("new record");
        repo.set(&mut record, "born", born).expect("encrypt");
        repo.save(&mut record).expect("save");
    }

    let found = repo
        .find(&[Predicate::range(
            "born",
            Some(Bound::inclusive("1906-12-09")),
            Some(Bound::exclusive("1912-06-23")),
        )])
        .expect("query");
    assert_eq!(found.len(), 2);
}

#[test]
fn test_keys_from_other_root_cannot_decrypt() {
    let writer = keys(13);
    let reader = keys(14);
    let store = MemoryStore::new();
    store.create_table("bigints", ["value", "value_enc"]);

    let writing = Repository::new(&writer, bigints(AttributeOptions::new()), &store);
    let mut record = writing.new_record().expect("new record");
    writing.set(&mut record, "value_enc", 3).expect("encrypt");
    writing.save(&mut record).expect("save");

    let reading = Repository::new(&reader, bigints(AttributeOptions::new()), &store);
    let loaded = reading.fetch(1).expect("fetch").expect("row exists");
    assert!(matches!(reading.get(&loaded, "value_enc"), Err(Error::DecryptionContext(_))));
}

fn flags(options: AttributeOptions) -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::builder("flags")
            .plain("active")
            .encrypted("active_enc", EncryptedType::Boolean, options)
            .build()
            .expect("valid schema"),
    )
}

#[test]
fn test_boolean_retrieval_in_every_safety_mode() {
    let keys = keys(15);
    let modes = [
        AttributeOptions::new(),
        AttributeOptions::new().reduced_security(),
        AttributeOptions::new().no_query(),
    ];

    for options in modes {
        let queryable = options.safety() != SafetyMode::NoQuery;
        let store = MemoryStore::new();
        store.create_table("flags", ["active", "active_enc"]);
        let repo = Repository::new(&keys, flags(options), &store);

        for value in [true, false, true] {
            let mut record = repo.new_record().expect("new record");
            repo.set(&mut record, "active_enc", value).expect("encrypt");
            repo.save(&mut record).expect("save");
        }

        let second = repo.fetch(2).expect("fetch").expect("row exists");
        assert_eq!(repo.get(&second, "active_enc").expect("decrypt"), Value::from(false));

        let found_true = repo.find(&[Predicate::eq("active_enc", true)]);
        if !queryable {
            assert!(matches!(found_true, Err(Error::Configuration(_))));
            continue;
        }
        let keys_of = |records: Vec<Record>| -> Vec<Value> {
            records.iter().filter_map(|r| r.primary_key().cloned()).collect()
        };
        assert_eq!(keys_of(found_true.expect("query")), vec![Value::from(1), Value::from(3)]);

        let found_false = repo.find(&[Predicate::eq("active_enc", false)]).expect("query");
        assert_eq!(keys_of(found_false), vec![Value::from(2)]);

        let below_true = repo.find(&[Predicate::lt("active_enc", true)]).expect("query");
        assert_eq!(keys_of(below_true), vec![Value::from(2)]);
    }
}

#[test]
fn test_boolean_migration_then_query() {
    let keys = keys(16);
    let schema = flags(AttributeOptions::new().reduced_security());
    let store = MemoryStore::new();
    store.create_table("flags", ["active"]);
    for (id, active) in [(1, Value::from(true)), (2, Value::from(false)), (3, Value::Null)] {
        store
            .insert_row("flags", id, [("active".to_string(), Cell::Plain(active))])
            .expect("insert seed row");
    }
    store.add_column("flags", "active_enc").expect("table exists");

    let report = MigrationEngine::new(
        &store,
        Interceptor::new(&keys, Arc::clone(&schema)),
        [("active", "active_enc")],
    )
    .expect("valid column map")
    .run()
    .expect("migration succeeds");
    assert_eq!(report.rows, 2);

    let repo = Repository::new(&keys, schema, &store);
    let active = repo.find(&[Predicate::eq("active_enc", true)]).expect("query");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].primary_key(), Some(&Value::from(1)));

    let unset = repo.fetch(3).expect("fetch").expect("row exists");
    assert_eq!(repo.get(&unset, "active_enc").expect("decrypt"), Value::Null);
}

#[test]
fn test_text_ranges_order_by_prefix() {
    let keys = keys(17);
    let schema = Arc::new(
        ModelSchema::builder("places")
            .encrypted(
                "city",
                EncryptedType::Text,
                AttributeOptions::new().reduced_security().ordering(true),
            )
            .build()
            .expect("valid schema"),
    );
    let store = MemoryStore::new();
    store.create_table("places", ["city"]);
    let repo = Repository::new(&keys, schema, &store);

    for city in ["Istanbul Asia", "Istanbul Europe", "Izmir"] {
        let mut record = repo.new_record().expect("new record");
        repo.set(&mut record, "city", city).expect("encrypt");
        repo.save(&mut record).expect("save");
    }

    let below = repo.find(&[Predicate::lt("city", "Istanbul Europe")]).expect("query");
    assert!(below.is_empty());

    let up_to = repo.find(&[Predicate::le("city", "Istanbul Asia")]).expect("query");
    assert_eq!(up_to.len(), 2);

    let above = repo.find(&[Predicate::gt("city", "Istanbul")]).expect("query");
    assert_eq!(above.len(), 1);
}
