//! `GizliDB` CLI tool for root keys, column migration and envelope inspection.

#![warn(clippy::pedantic, clippy::nursery)]

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gizlidb::envelope::EncryptedValue;
use gizlidb::interceptor::Interceptor;
use gizlidb::keys::KeyContext;
use gizlidb::migration::{MigrationEngine, DEFAULT_BATCH_SIZE};
use gizlidb::options::AttributeOptions;
use gizlidb::schema::ModelSchema;
use gizlidb::types::EncryptedType;
use gizlidb_key_file::KeyFile;
use gizlidb_sqlite::SqliteStore;
use tracing::info;

#[derive(Parser)]
#[command(name = "gizlidb")]
#[command(about = "GizliDB key management and migration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new root key file
    Keygen {
        /// Path of the key file to create
        #[arg(short, long, default_value = "./gizlidb.key")]
        output: PathBuf,
    },
    /// Encrypt plaintext columns into encrypted columns, batch by batch
    Migrate {
        /// SQLite database file
        #[arg(long, env = "GIZLIDB_DB")]
        db: PathBuf,
        /// Root key file; falls back to GIZLIDB_ROOT_KEY when omitted
        #[arg(long, env = "GIZLIDB_KEY_FILE")]
        key_file: Option<PathBuf>,
        /// Table to migrate
        #[arg(long)]
        table: String,
        /// Primary key column
        #[arg(long, default_value = "id")]
        primary_key: String,
        /// Column mapping as SOURCE=TARGET:TYPE, e.g. age=age_enc:integer64
        #[arg(long = "map", required = true, value_parser = parse_mapping)]
        mappings: Vec<Mapping>,
        /// Rows per batch
        #[arg(long, env = "GIZLIDB_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Store left ORE terms so the targets support equality and ordering leaks
        #[arg(long, conflicts_with = "no_query")]
        reduced_security: bool,
        /// Store no ORE terms at all; the targets cannot be queried
        #[arg(long)]
        no_query: bool,
        /// Add missing target columns before migrating
        #[arg(long)]
        add_columns: bool,
    },
    /// Describe a stored envelope without decrypting it
    Inspect {
        /// Encrypted type of the envelope
        #[arg(long = "type", value_parser = parse_type)]
        ty: EncryptedType,
        /// Envelope JSON; read from stdin when omitted
        json: Option<String>,
    },
}

/// One `--map` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mapping {
    source: String,
    target: String,
    ty: EncryptedType,
}

fn parse_type(name: &str) -> Result<EncryptedType, String> {
    EncryptedType::ALL
        .into_iter()
        .find(|ty| ty.to_string().eq_ignore_ascii_case(name))
        .or_else(|| EncryptedType::from_sql_type(name))
        .ok_or_else(|| format!("unknown encrypted type {name:?}"))
}

fn parse_mapping(arg: &str) -> Result<Mapping, String> {
    let (source, rest) = arg.split_once('=').ok_or("expected SOURCE=TARGET:TYPE")?;
    let (target, ty) = rest.split_once(':').ok_or("expected SOURCE=TARGET:TYPE")?;
    if source.is_empty() || target.is_empty() {
        return Err("column names must not be empty".to_string());
    }
    Ok(Mapping { source: source.to_string(), target: target.to_string(), ty: parse_type(ty)? })
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { output } => {
            KeyFile::new(&output)
                .generate()
                .with_context(|| format!("generating {}", output.display()))?;
            println!("Root key written to {}", output.display());
        }
        Commands::Migrate {
            db,
            key_file,
            table,
            primary_key,
            mappings,
            batch_size,
            reduced_security,
            no_query,
            add_columns,
        } => {
            let keys = KeyContext::new();
            match key_file {
                Some(path) => {
                    KeyFile::new(&path)
                        .install(&keys)
                        .with_context(|| format!("loading {}", path.display()))?;
                }
                None => {
                    if !gizlidb_key_file::install_from_env(&keys)? {
                        bail!(
                            "no root key: pass --key-file or set {}",
                            gizlidb_key_file::ROOT_KEY_ENV
                        );
                    }
                }
            }

            let options = if no_query {
                AttributeOptions::new().no_query()
            } else if reduced_security {
                AttributeOptions::new().reduced_security()
            } else {
                AttributeOptions::new()
            };
            let mut builder = ModelSchema::builder(&table).primary_key(&primary_key);
            for mapping in &mappings {
                builder = builder.plain(&mapping.source).encrypted(
                    &mapping.target,
                    mapping.ty,
                    options.clone(),
                );
            }
            let schema = Arc::new(builder.build()?);

            let store = SqliteStore::open(&db)
                .with_context(|| format!("opening {}", db.display()))?;
            if add_columns {
                for mapping in &mappings {
                    if store.add_column(&table, &mapping.target, mapping.ty.column_type())? {
                        info!(table = %table, column = %mapping.target, "added column");
                    }
                }
            }

            let pairs = mappings.iter().map(|m| (m.source.clone(), m.target.clone()));
            let report = MigrationEngine::new(&store, Interceptor::new(&keys, schema), pairs)?
                .with_batch_size(batch_size)?
                .run()?;
            println!(
                "Migrated {} rows of {table} in {} batches ({} selections)",
                report.rows, report.batches, report.selections
            );
        }
        Commands::Inspect { ty, json } => {
            let json = match json {
                Some(json) => json,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
                    buf
                }
            };
            let envelope = EncryptedValue::from_json(ty, json.trim())?;
            println!("type:          {}", envelope.kind());
            println!("key id:        {}", hex::encode(envelope.key_id()));
            println!("ciphertext:    {} bytes", envelope.aead().ct.len());
            println!("queryable:     {}", envelope.is_queryable());
            println!("left terms:    {}", envelope.has_left_term());
        }
    }

    Ok(())
}
