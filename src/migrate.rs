//! Ordered, idempotent SQL migrations.
//!
//! Applied migrations are recorded in a bookkeeping table (default
//! `__drizzle_migrations`, compatible with drizzle-style migration folders)
//! keyed by the migration's authoring timestamp. A migration runs only when
//! its timestamp is strictly newer than the newest recorded one, so running
//! the same set twice applies nothing the second time. Each migration's
//! statements and its bookkeeping row are committed in one transaction; a
//! failure rolls the whole migration back and leaves the table consistent
//! with the last fully applied migration.

use crate::database::Database;
use crate::error::{Error, Result};
use crate::session::Query;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Default name of the bookkeeping table.
pub const DEFAULT_MIGRATIONS_TABLE: &str = "__drizzle_migrations";

/// One migration: its statements, a content hash, and the authoring
/// timestamp used as the ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub sql: Vec<String>,
    pub hash: String,
    pub folder_millis: i64,
}

impl Migration {
    pub fn new(
        sql: impl IntoIterator<Item = impl Into<String>>,
        hash: impl Into<String>,
        folder_millis: i64,
    ) -> Self {
        Self {
            sql: sql.into_iter().map(Into::into).collect(),
            hash: hash.into(),
            folder_millis,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationConfig {
    pub migrations: Vec<Migration>,
    /// Overrides [`DEFAULT_MIGRATIONS_TABLE`] when set.
    pub migrations_table: Option<String>,
}

/// Apply all pending migrations from `config` to `db`.
///
/// A no-op when the migration set is empty.
pub fn migrate(db: &Database, config: &MigrationConfig) -> Result<()> {
    if config.migrations.is_empty() {
        return Ok(());
    }
    let table = config
        .migrations_table
        .as_deref()
        .unwrap_or(DEFAULT_MIGRATIONS_TABLE);

    db.exec(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (id TEXT PRIMARY KEY, hash TEXT NOT NULL, created_at INTEGER)"
    ))?;

    let last_applied = db
        .get(&Query::new(format!(
            "SELECT id, hash, created_at FROM \"{table}\" ORDER BY created_at DESC LIMIT 1"
        )))?
        .and_then(|row| row.get("created_at").and_then(Value::as_i64));

    let mut pending = config.migrations.clone();
    pending.sort_by_key(|migration| migration.folder_millis);

    for migration in &pending {
        let already_applied =
            last_applied.is_some_and(|applied| applied >= migration.folder_millis);
        if already_applied {
            continue;
        }
        apply_one(db, table, migration).map_err(|source| Error::Migration {
            hash: migration.hash.clone(),
            source: Box::new(source),
        })?;
    }
    Ok(())
}

fn apply_one(db: &Database, table: &str, migration: &Migration) -> Result<()> {
    debug!(hash = %migration.hash, created_at = migration.folder_millis, "applying migration");
    db.transaction(|tx| {
        for statement in &migration.sql {
            tx.exec(statement)?;
        }
        tx.run(
            &Query::new(format!(
                "INSERT INTO \"{table}\" (id, hash, created_at) VALUES (?, ?, ?)"
            ))
            .bind(Uuid::new_v4().to_string())
            .bind(migration.hash.clone())
            .bind(migration.folder_millis),
        )
    })
}

#[cfg(all(test, feature = "rusqlite"))]
mod tests {
    use super::*;
    use crate::database::{Config, Database};
    use crate::engine::rusqlite::RusqliteEngine;
    use crate::engine::Engine;
    use serde_json::json;
    use std::sync::Arc;

    fn test_db() -> Database {
        let engine = RusqliteEngine::open_in_memory().unwrap();
        Database::new(Arc::new(engine) as Arc<dyn Engine>, Config::default()).unwrap()
    }

    fn bookkeeping_rows(db: &Database) -> Vec<Value> {
        db.all(&Query::new(format!(
            "SELECT hash, created_at FROM \"{DEFAULT_MIGRATIONS_TABLE}\" ORDER BY created_at"
        )))
        .unwrap()
        .as_array()
        .cloned()
        .unwrap()
    }

    fn two_step_config() -> MigrationConfig {
        MigrationConfig {
            migrations: vec![
                Migration::new(
                    [
                        "CREATE TABLE customers (id TEXT PRIMARY KEY, name TEXT)",
                        "CREATE TABLE orders (id TEXT PRIMARY KEY, customer_id TEXT)",
                    ],
                    "0000_create_tables",
                    1_000,
                ),
                Migration::new(
                    ["ALTER TABLE orders ADD COLUMN quantity INTEGER"],
                    "0001_add_quantity",
                    2_000,
                ),
            ],
            migrations_table: None,
        }
    }

    #[test]
    fn empty_migration_set_is_a_no_op() {
        let db = test_db();
        migrate(&db, &MigrationConfig::default()).unwrap();
        // Not even the bookkeeping table is created.
        assert!(db
            .get(&Query::new(
                "SELECT name FROM sqlite_master WHERE name = '__drizzle_migrations'"
            ))
            .unwrap()
            .is_none());
    }

    #[test]
    fn migrations_apply_in_timestamp_order_and_evolve_the_schema() {
        let db = test_db();
        migrate(&db, &two_step_config()).unwrap();

        db.run(
            &Query::new("INSERT INTO orders (id, customer_id, quantity) VALUES (?, ?, ?)")
                .bind("o1")
                .bind("c1")
                .bind(3),
        )
        .unwrap();
        let row = db
            .get(&Query::new("SELECT quantity FROM orders WHERE id = 'o1'"))
            .unwrap()
            .unwrap();
        assert_eq!(row, json!({"quantity": 3}));

        let rows = bookkeeping_rows(&db);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["hash"], json!("0000_create_tables"));
        assert_eq!(rows[1]["created_at"], json!(2_000));
    }

    #[test]
    fn rerunning_migrate_applies_nothing() {
        let db = test_db();
        let config = two_step_config();
        migrate(&db, &config).unwrap();
        let before = bookkeeping_rows(&db);
        migrate(&db, &config).unwrap();
        assert_eq!(bookkeeping_rows(&db), before);
    }

    #[test]
    fn new_migrations_apply_on_top_of_recorded_ones() {
        let db = test_db();
        let mut config = two_step_config();
        migrate(&db, &config).unwrap();

        config.migrations.push(Migration::new(
            ["CREATE TABLE invoices (id TEXT PRIMARY KEY)"],
            "0002_invoices",
            3_000,
        ));
        migrate(&db, &config).unwrap();
        assert_eq!(bookkeeping_rows(&db).len(), 3);
        db.run(&Query::new("INSERT INTO invoices (id) VALUES ('i1')"))
            .unwrap();
    }

    #[test]
    fn failed_migration_is_not_recorded() {
        let db = test_db();
        let config = MigrationConfig {
            migrations: vec![
                Migration::new(
                    ["CREATE TABLE customers (id TEXT PRIMARY KEY)"],
                    "0000_ok",
                    1_000,
                ),
                Migration::new(
                    ["CREATE TABLE broken ("],
                    "0001_syntax_error",
                    2_000,
                ),
            ],
            migrations_table: None,
        };
        let err = migrate(&db, &config).unwrap_err();
        assert!(matches!(err, Error::Migration { .. }));

        let rows = bookkeeping_rows(&db);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["hash"], json!("0000_ok"));
    }

    #[test]
    fn migrations_table_name_can_be_overridden() {
        let db = test_db();
        let config = MigrationConfig {
            migrations: vec![Migration::new(
                ["CREATE TABLE things (id TEXT PRIMARY KEY)"],
                "0000_things",
                1_000,
            )],
            migrations_table: Some("__my_migrations".to_string()),
        };
        migrate(&db, &config).unwrap();
        let row = db
            .get(&Query::new(
                "SELECT count(*) AS n FROM \"__my_migrations\"",
            ))
            .unwrap()
            .unwrap();
        assert_eq!(row, json!({"n": 1}));
    }
}
