//! Basic usage example for `GizliDB`.

use std::sync::Arc;

use gizlidb::migration::MigrationEngine;
use gizlidb::prelude::*;
use gizlidb_key_file::KeyFile;
use tempfile::TempDir;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("GizliDB Basic Usage Example");
    println!("===========================\n");

    // Setup: generate a root key in a throwaway directory
    let key_dir = TempDir::new()?;
    let key_file = KeyFile::new(key_dir.path().join("root.key"));
    key_file.generate()?;

    let keys = KeyContext::new();
    let key_id = key_file.install(&keys)?;
    println!("✓ Root key installed (id {})\n", hex::encode(key_id));

    // A model with one plaintext column waiting to be encrypted
    let schema = Arc::new(
        ModelSchema::builder("people")
            .plain("name")
            .plain("age")
            .encrypted("age_enc", EncryptedType::Integer64, AttributeOptions::new())
            .encrypted("name_enc", EncryptedType::Text, AttributeOptions::new().reduced_security())
            .encrypted("born", EncryptedType::Date, AttributeOptions::new())
            .build()?,
    );

    let store = MemoryStore::new();
    store.create_table("people", ["name", "age", "born"]);
    for (id, name, age) in [(1, "Ada", 36), (2, "Alan", 41), (3, "Grace", 85)] {
        store.insert_row(
            "people",
            id,
            [
                ("name".to_string(), Cell::Plain(Value::from(name))),
                ("age".to_string(), Cell::Plain(Value::from(age))),
            ],
        )?;
    }
    println!("✓ Seeded {} plaintext rows\n", store.len("people"));

    // Add the encrypted columns and migrate online
    store.add_column("people", "age_enc")?;
    store.add_column("people", "name_enc")?;
    let report = MigrationEngine::new(
        &store,
        Interceptor::new(&keys, Arc::clone(&schema)),
        [("age", "age_enc"), ("name", "name_enc")],
    )?
    .with_batch_size(2)?
    .run()?;
    println!("✓ Migrated {} rows in batches of {:?}\n", report.rows, report.batch_sizes);

    let people = Repository::new(&keys, schema, &store);

    // Show what is actually stored
    let ada = people.fetch(1)?.ok_or("row 1 missing")?;
    if let Some(Cell::Encrypted(Some(envelope))) = ada.cell("age_enc") {
        println!("Stored age of Ada: {}", envelope.to_json()?);
    }
    println!("Decrypted: {}\n", people.get(&ada, "age_enc")?);

    // Queries run against ciphertext
    let over_forty = people.find(&[Predicate::gt("age_enc", 40)])?;
    println!("People over 40:");
    for person in &over_forty {
        println!("  - {}", people.get(person, "name_enc")?);
    }

    let grace = people.find(&[Predicate::eq("name_enc", "Grace")])?;
    assert_eq!(grace.len(), 1);
    println!("✓ Equality query on encrypted text found Grace\n");

    // New records encrypt on write
    let mut edsger = people.new_record()?;
    people.set(&mut edsger, "name_enc", "Edsger")?;
    people.set(&mut edsger, "born", "1930-05-11")?;
    people.save(&mut edsger)?;

    let born_before_1950 = people.find(&[Predicate::lt("born", "1950-01-01")])?;
    assert_eq!(born_before_1950.len(), 1);
    println!("✓ Date range query found {} record\n", born_before_1950.len());

    println!("===========================");
    println!("All operations successful! 🎉");

    Ok(())
}
