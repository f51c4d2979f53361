//! Engine trait implementations backed by `rusqlite`.
//!
//! Requires the `rusqlite` feature to be enabled.
//!
//! This is a complete local engine suitable for tests, demos and single-node
//! applications. Change tracking uses sqlite's update hook: mutated table
//! names are buffered while a statement (or an imperative transaction) is
//! running and delivered to registered callbacks only after the outermost
//! operation completes, so in-transaction mutations never leak early
//! notifications. A rolled back transaction discards its buffer.
//!
//! The CRDT surface is state-based and deliberately small: `pull_changes`
//! emits one change tuple per live row of every user table (the row image as
//! a JSON object keyed by column name), `apply_changes` upserts rows by
//! primary key and deletes rows whose change value is `null`. Applying the
//! same changeset twice is a no-op. Tables with a `__` prefix are treated as
//! internal bookkeeping and excluded. Continuous live sync needs a
//! network-capable engine and is not supported here.

use crate::changeset::{Change, ColVersion, DbVersion, SiteId};
use crate::engine::{
    ChangeKind, Engine, EngineError, EngineStatement, SyncHandle, TxToken, UpdateCallback,
    UpdateHandle,
};
use crate::syncer::SyncOptions;
use num_bigint::BigInt;
use parking_lot::Mutex;
use rusqlite::hooks::Action;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// [`Engine`] implementation over a single `rusqlite` connection.
pub struct RusqliteEngine {
    inner: Arc<Inner>,
}

type SharedCallback = Arc<dyn Fn(ChangeKind, &str, &str) + Send + Sync>;

struct Inner {
    conn: Mutex<Connection>,
    /// Tables mutated since the last flush, with the latest mutation kind.
    pending: Arc<Mutex<BTreeMap<String, ChangeKind>>>,
    callbacks: Mutex<BTreeMap<u64, SharedCallback>>,
    next_callback: AtomicU64,
    current_tx: Mutex<Option<u64>>,
    next_tx: AtomicU64,
    db_version: AtomicI64,
    site_id: BigInt,
    db_name: String,
}

fn box_err(error: rusqlite::Error) -> EngineError {
    Box::new(error)
}

impl RusqliteEngine {
    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns error if the connection could not be opened.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::from_connection(Connection::open_in_memory().map_err(box_err)?)
    }

    /// Open (or create) a database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the connection could not be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Self::from_connection(Connection::open(path).map_err(box_err)?)
    }

    /// Take ownership of an existing connection and install the change
    /// tracking hook.
    pub fn from_connection(conn: Connection) -> Result<Self, EngineError> {
        let pending: Arc<Mutex<BTreeMap<String, ChangeKind>>> =
            Arc::new(Mutex::new(BTreeMap::new()));
        let hook_pending = Arc::clone(&pending);
        conn.update_hook(Some(
            move |action: Action, _db: &str, table: &str, _rowid: i64| {
                let kind = match action {
                    Action::SQLITE_INSERT => ChangeKind::Insert,
                    Action::SQLITE_UPDATE => ChangeKind::Update,
                    Action::SQLITE_DELETE => ChangeKind::Delete,
                    _ => return,
                };
                hook_pending.lock().insert(table.to_string(), kind);
            },
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                pending,
                callbacks: Mutex::new(BTreeMap::new()),
                next_callback: AtomicU64::new(1),
                current_tx: Mutex::new(None),
                next_tx: AtomicU64::new(1),
                db_version: AtomicI64::new(0),
                site_id: BigInt::from(uuid::Uuid::new_v4().as_u128()),
                db_name: "main".to_string(),
            }),
        })
    }

    /// The stable identifier of this replica.
    pub fn site_id(&self) -> &BigInt {
        &self.inner.site_id
    }
}

impl Inner {
    /// Deliver buffered table changes unless an imperative transaction is
    /// still open.
    fn flush_if_idle(&self) {
        if self.current_tx.lock().is_some() {
            return;
        }
        let drained: Vec<(String, ChangeKind)> = {
            let mut pending = self.pending.lock();
            std::mem::take(&mut *pending).into_iter().collect()
        };
        if drained.is_empty() {
            return;
        }
        self.db_version.fetch_add(1, Ordering::AcqRel);
        let callbacks: Vec<SharedCallback> = self.callbacks.lock().values().cloned().collect();
        for (table, kind) in &drained {
            debug!(table = %table, ?kind, "delivering table change");
            for callback in &callbacks {
                callback(*kind, &self.db_name, table);
            }
        }
    }
}

struct RusqliteStatement {
    inner: Arc<Inner>,
    sql: String,
    columns: Vec<String>,
}

impl EngineStatement for RusqliteStatement {
    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn execute(&mut self, params: &[Value]) -> Result<(), EngineError> {
        {
            let conn = self.inner.conn.lock();
            let mut statement = conn.prepare_cached(&self.sql).map_err(box_err)?;
            statement
                .execute(rusqlite::params_from_iter(bind_params(params)))
                .map_err(box_err)?;
        }
        self.inner.flush_if_idle();
        Ok(())
    }

    fn query_raw(&mut self, params: &[Value]) -> Result<Vec<Vec<Value>>, EngineError> {
        let collected = {
            let conn = self.inner.conn.lock();
            let mut statement = conn.prepare_cached(&self.sql).map_err(box_err)?;
            let column_count = statement.column_count();
            let mut rows = statement
                .query(rusqlite::params_from_iter(bind_params(params)))
                .map_err(box_err)?;
            let mut collected = Vec::new();
            while let Some(row) = rows.next().map_err(box_err)? {
                let mut values = Vec::with_capacity(column_count);
                for index in 0..column_count {
                    values.push(ref_to_json(row.get_ref(index).map_err(box_err)?));
                }
                collected.push(values);
            }
            collected
        };
        self.inner.flush_if_idle();
        Ok(collected)
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        // Compiled statements live in the connection's statement cache; the
        // handle itself holds no sqlite resources.
        Ok(())
    }
}

impl Engine for RusqliteEngine {
    fn prepare(&self, sql: &str) -> Result<Box<dyn EngineStatement>, EngineError> {
        let columns = {
            let conn = self.inner.conn.lock();
            let statement = conn.prepare_cached(sql).map_err(box_err)?;
            statement
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect()
        };
        Ok(Box::new(RusqliteStatement {
            inner: Arc::clone(&self.inner),
            sql: sql.to_string(),
            columns,
        }))
    }

    fn exec(&self, sql: &str) -> Result<(), EngineError> {
        {
            let conn = self.inner.conn.lock();
            conn.execute_batch(sql).map_err(box_err)?;
        }
        self.inner.flush_if_idle();
        Ok(())
    }

    fn tx_begin(&self) -> Result<TxToken, EngineError> {
        let mut current = self.inner.current_tx.lock();
        if current.is_some() {
            return Err("an imperative transaction is already active".into());
        }
        {
            let conn = self.inner.conn.lock();
            conn.execute_batch("BEGIN").map_err(box_err)?;
        }
        let id = self.inner.next_tx.fetch_add(1, Ordering::Relaxed);
        *current = Some(id);
        Ok(TxToken::new(id))
    }

    fn tx_commit(&self, token: TxToken) -> Result<(), EngineError> {
        {
            let mut current = self.inner.current_tx.lock();
            if *current != Some(token.id()) {
                return Err("transaction token does not match the active transaction".into());
            }
            {
                let conn = self.inner.conn.lock();
                conn.execute_batch("COMMIT").map_err(box_err)?;
            }
            *current = None;
        }
        self.inner.flush_if_idle();
        Ok(())
    }

    fn tx_rollback(&self, token: TxToken) -> Result<(), EngineError> {
        let mut current = self.inner.current_tx.lock();
        if *current != Some(token.id()) {
            return Err("transaction token does not match the active transaction".into());
        }
        {
            let conn = self.inner.conn.lock();
            conn.execute_batch("ROLLBACK").map_err(box_err)?;
        }
        *current = None;
        self.inner.pending.lock().clear();
        Ok(())
    }

    fn on_update(&self, callback: UpdateCallback) -> UpdateHandle {
        let key = self.inner.next_callback.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.lock().insert(key, Arc::from(callback));
        let inner = Arc::clone(&self.inner);
        UpdateHandle::new(move || {
            inner.callbacks.lock().remove(&key);
        })
    }

    fn pull_changes(&self, since: &BigInt) -> Result<Vec<Change>, EngineError> {
        let version = BigInt::from(self.inner.db_version.load(Ordering::Acquire));
        if *since >= version {
            return Ok(Vec::new());
        }

        let conn = self.inner.conn.lock();
        let mut changes = Vec::new();
        let mut seq = 0i64;
        for table in user_tables(&conn)? {
            let pk_columns = primary_key_columns(&conn, &table)?;
            let select = format!("SELECT * FROM \"{table}\"");
            let mut statement = conn.prepare(&select).map_err(box_err)?;
            let columns: Vec<String> = statement
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let mut rows = statement.query([]).map_err(box_err)?;
            while let Some(row) = rows.next().map_err(box_err)? {
                let mut object = Map::with_capacity(columns.len());
                for (index, column) in columns.iter().enumerate() {
                    object.insert(
                        column.clone(),
                        ref_to_json(row.get_ref(index).map_err(box_err)?),
                    );
                }
                let pk = primary_key_value(&pk_columns, &object);
                changes.push(Change {
                    table: table.clone(),
                    pk,
                    col_version: ColVersion::from(1),
                    db_version: DbVersion(version.clone()),
                    site_id: SiteId(self.inner.site_id.clone()),
                    cl: 1,
                    seq,
                    value: Value::Object(object),
                });
                seq += 1;
            }
        }
        Ok(changes)
    }

    fn apply_changes(&self, changes: &[Change]) -> Result<(), EngineError> {
        {
            let conn = self.inner.conn.lock();
            conn.execute_batch("SAVEPOINT apply_changes")
                .map_err(box_err)?;
            match apply_all(&conn, changes) {
                Ok(()) => {
                    conn.execute_batch("RELEASE apply_changes").map_err(box_err)?;
                }
                Err(apply_error) => {
                    let _ = conn.execute_batch("ROLLBACK TO apply_changes; RELEASE apply_changes");
                    return Err(apply_error);
                }
            }
        }
        self.inner.flush_if_idle();
        Ok(())
    }

    fn sync(&self, _options: &SyncOptions) -> Result<SyncHandle, EngineError> {
        Err("live sync is not supported by the local rusqlite engine".into())
    }
}

fn apply_all(conn: &Connection, changes: &[Change]) -> Result<(), EngineError> {
    for change in changes {
        match &change.value {
            Value::Object(object) => {
                let columns: Vec<&String> = object.keys().collect();
                let column_list = columns
                    .iter()
                    .map(|column| format!("\"{column}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                let placeholders = vec!["?"; columns.len()].join(", ");
                let sql = format!(
                    "INSERT OR REPLACE INTO \"{}\" ({column_list}) VALUES ({placeholders})",
                    change.table
                );
                let params: Vec<SqlValue> = object.values().map(json_to_sql).collect();
                conn.execute(&sql, rusqlite::params_from_iter(params))
                    .map_err(box_err)?;
            }
            Value::Null => {
                delete_by_primary_key(conn, change)?;
            }
            other => {
                return Err(format!(
                    "change value for table '{}' must be a row object or null, got {other}",
                    change.table
                )
                .into());
            }
        }
    }
    Ok(())
}

fn delete_by_primary_key(conn: &Connection, change: &Change) -> Result<(), EngineError> {
    let pk_columns = primary_key_columns(conn, &change.table)?;
    if pk_columns.is_empty() {
        return Err(format!(
            "cannot delete from table '{}' without a primary key",
            change.table
        )
        .into());
    }
    let predicate = pk_columns
        .iter()
        .map(|column| format!("\"{column}\" = ?"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!("DELETE FROM \"{}\" WHERE {predicate}", change.table);
    let values: Vec<SqlValue> = match (&change.pk, pk_columns.len()) {
        (Value::Array(parts), n) if parts.len() == n => parts.iter().map(json_to_sql).collect(),
        (single, 1) => vec![json_to_sql(single)],
        (pk, _) => {
            return Err(format!(
                "primary key {pk} does not match the key columns of table '{}'",
                change.table
            )
            .into());
        }
    };
    conn.execute(&sql, rusqlite::params_from_iter(values))
        .map_err(box_err)?;
    Ok(())
}

/// All application tables, excluding sqlite internals and `__` bookkeeping
/// tables.
fn user_tables(conn: &Connection) -> Result<Vec<String>, EngineError> {
    let mut statement = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             AND name NOT LIKE '\\_\\_%' ESCAPE '\\' ORDER BY name",
        )
        .map_err(box_err)?;
    let rows = statement
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(box_err)?;
    let mut tables = Vec::new();
    for row in rows {
        tables.push(row.map_err(box_err)?);
    }
    Ok(tables)
}

fn primary_key_columns(conn: &Connection, table: &str) -> Result<Vec<String>, EngineError> {
    let sql = format!("PRAGMA table_info(\"{table}\")");
    let mut statement = conn.prepare(&sql).map_err(box_err)?;
    let rows = statement
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?))
        })
        .map_err(box_err)?;
    let mut columns: Vec<(String, i64)> = Vec::new();
    for row in rows {
        let (name, pk_rank) = row.map_err(box_err)?;
        if pk_rank > 0 {
            columns.push((name, pk_rank));
        }
    }
    columns.sort_by_key(|(_, rank)| *rank);
    Ok(columns.into_iter().map(|(name, _)| name).collect())
}

fn primary_key_value(pk_columns: &[String], row: &Map<String, Value>) -> Value {
    match pk_columns {
        [] => Value::Null,
        [single] => row.get(single).cloned().unwrap_or(Value::Null),
        many => Value::Array(
            many.iter()
                .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
    }
}

fn bind_params(params: &[Value]) -> Vec<SqlValue> {
    params.iter().map(json_to_sql).collect()
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| number.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(text) => SqlValue::Text(text.clone()),
        // Arrays and objects are stored as JSON text.
        other => SqlValue::Text(other.to_string()),
    }
}

fn ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => Number::from_f64(real).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::Array(blob.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine_with_users() -> RusqliteEngine {
        let engine = RusqliteEngine::open_in_memory().unwrap();
        engine
            .exec("CREATE TABLE users (id TEXT PRIMARY KEY, name TEXT, email TEXT UNIQUE)")
            .unwrap();
        engine
    }

    fn collect_changes(engine: &RusqliteEngine) -> (UpdateHandle, Arc<Mutex<Vec<(ChangeKind, String)>>>) {
        let seen: Arc<Mutex<Vec<(ChangeKind, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = engine.on_update(Box::new(move |kind, _db, table| {
            sink.lock().push((kind, table.to_string()));
        }));
        (handle, seen)
    }

    #[test]
    fn updates_are_delivered_after_the_statement_completes() {
        let engine = engine_with_users();
        let (_handle, seen) = collect_changes(&engine);

        engine
            .exec("INSERT INTO users VALUES ('1', 'Alice', 'a@a.com')")
            .unwrap();
        assert_eq!(
            seen.lock().as_slice(),
            [(ChangeKind::Insert, "users".to_string())]
        );
    }

    #[test]
    fn ddl_produces_no_update_events() {
        let engine = RusqliteEngine::open_in_memory().unwrap();
        let (_handle, seen) = collect_changes(&engine);
        engine.exec("CREATE TABLE empty (id INTEGER)").unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn transaction_buffers_updates_until_commit() {
        let engine = engine_with_users();
        let (_handle, seen) = collect_changes(&engine);

        let token = engine.tx_begin().unwrap();
        engine
            .exec("INSERT INTO users VALUES ('1', 'Alice', 'a@a.com')")
            .unwrap();
        engine
            .exec("INSERT INTO users VALUES ('2', 'Bob', 'b@b.com')")
            .unwrap();
        assert!(seen.lock().is_empty());

        engine.tx_commit(token).unwrap();
        // Both inserts touched one table: a single post-commit event.
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn rollback_discards_buffered_updates() {
        let engine = engine_with_users();
        let (_handle, seen) = collect_changes(&engine);

        let token = engine.tx_begin().unwrap();
        engine
            .exec("INSERT INTO users VALUES ('1', 'Alice', 'a@a.com')")
            .unwrap();
        engine.tx_rollback(token).unwrap();
        assert!(seen.lock().is_empty());

        engine
            .exec("INSERT INTO users VALUES ('2', 'Bob', 'b@b.com')")
            .unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn stale_transaction_tokens_are_rejected() {
        let engine = engine_with_users();
        let token = engine.tx_begin().unwrap();
        let stale = TxToken::new(token.id() + 1);
        assert!(engine.tx_commit(stale).is_err());
        engine.tx_rollback(token).unwrap();
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let engine = engine_with_users();
        let (handle, seen) = collect_changes(&engine);
        drop(handle);
        engine
            .exec("INSERT INTO users VALUES ('1', 'Alice', 'a@a.com')")
            .unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn statements_round_trip_values() {
        let engine = engine_with_users();
        let mut insert = engine
            .prepare("INSERT INTO users (id, name, email) VALUES (?, ?, ?)")
            .unwrap();
        insert
            .execute(&[json!("1"), json!("Alice"), json!("a@a.com")])
            .unwrap();

        let mut select = engine
            .prepare("SELECT id, name, email FROM users WHERE id = ?")
            .unwrap();
        assert_eq!(select.column_names(), ["id", "name", "email"]);
        let rows = select.query_raw(&[json!("1")]).unwrap();
        assert_eq!(rows, vec![vec![json!("1"), json!("Alice"), json!("a@a.com")]]);
    }

    #[test]
    fn pull_changes_snapshot_covers_all_user_tables() {
        let engine = engine_with_users();
        engine
            .exec("INSERT INTO users VALUES ('1', 'Alice', 'a@a.com')")
            .unwrap();

        let changes = engine.pull_changes(&BigInt::from(0)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].table, "users");
        assert_eq!(changes[0].pk, json!("1"));
        assert_eq!(
            changes[0].value,
            json!({"id": "1", "name": "Alice", "email": "a@a.com"})
        );
        assert_eq!(changes[0].site_id.as_bigint(), engine.site_id());
    }

    #[test]
    fn pull_changes_is_empty_when_nothing_changed_since() {
        let engine = engine_with_users();
        engine
            .exec("INSERT INTO users VALUES ('1', 'Alice', 'a@a.com')")
            .unwrap();
        let current = BigInt::from(1_000_000);
        assert!(engine.pull_changes(&current).unwrap().is_empty());
    }

    #[test]
    fn bookkeeping_tables_are_excluded_from_changesets() {
        let engine = engine_with_users();
        engine
            .exec("CREATE TABLE __drizzle_migrations (id TEXT PRIMARY KEY, hash TEXT NOT NULL, created_at INTEGER)")
            .unwrap();
        engine
            .exec("INSERT INTO __drizzle_migrations VALUES ('m1', 'abc', 1)")
            .unwrap();
        let changes = engine.pull_changes(&BigInt::from(0)).unwrap();
        assert!(changes.iter().all(|change| change.table == "users"));
    }

    #[test]
    fn apply_changes_upserts_and_fires_callbacks() {
        let source = engine_with_users();
        source
            .exec("INSERT INTO users VALUES ('1', 'Alice', 'a@a.com')")
            .unwrap();
        let changes = source.pull_changes(&BigInt::from(0)).unwrap();

        let replica = engine_with_users();
        let (_handle, seen) = collect_changes(&replica);
        replica.apply_changes(&changes).unwrap();
        assert_eq!(seen.lock().len(), 1);

        let mut select = replica.prepare("SELECT id, name FROM users").unwrap();
        let rows = select.query_raw(&[]).unwrap();
        assert_eq!(rows, vec![vec![json!("1"), json!("Alice")]]);

        // Idempotent: applying the same changeset again adds nothing.
        replica.apply_changes(&changes).unwrap();
        let mut count = replica.prepare("SELECT count(*) FROM users").unwrap();
        assert_eq!(count.query_raw(&[]).unwrap(), vec![vec![json!(1)]]);
    }

    #[test]
    fn null_valued_changes_delete_by_primary_key() {
        let engine = engine_with_users();
        engine
            .exec("INSERT INTO users VALUES ('1', 'Alice', 'a@a.com')")
            .unwrap();
        let tombstone = Change {
            table: "users".to_string(),
            pk: json!("1"),
            col_version: ColVersion::from(2),
            db_version: DbVersion::from(2),
            site_id: SiteId::from(7),
            cl: 2,
            seq: 0,
            value: Value::Null,
        };
        engine.apply_changes(&[tombstone]).unwrap();
        let mut count = engine.prepare("SELECT count(*) FROM users").unwrap();
        assert_eq!(count.query_raw(&[]).unwrap(), vec![vec![json!(0)]]);
    }

    #[test]
    fn failed_apply_rolls_back_all_of_its_changes() {
        let engine = engine_with_users();
        let good = Change {
            table: "users".to_string(),
            pk: json!("1"),
            col_version: ColVersion::from(1),
            db_version: DbVersion::from(1),
            site_id: SiteId::from(7),
            cl: 1,
            seq: 0,
            value: json!({"id": "1", "name": "Alice", "email": "a@a.com"}),
        };
        let bad = Change {
            table: "no_such_table".to_string(),
            pk: json!("1"),
            col_version: ColVersion::from(1),
            db_version: DbVersion::from(1),
            site_id: SiteId::from(7),
            cl: 1,
            seq: 1,
            value: json!({"id": "1"}),
        };
        assert!(engine.apply_changes(&[good, bad]).is_err());
        let mut count = engine.prepare("SELECT count(*) FROM users").unwrap();
        assert_eq!(count.query_raw(&[]).unwrap(), vec![vec![json!(0)]]);
    }

    #[test]
    fn on_disk_databases_persist_across_engines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite3");
        {
            let engine = RusqliteEngine::open(&path).unwrap();
            engine
                .exec("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
                .unwrap();
            engine
                .exec("INSERT INTO notes (body) VALUES ('persisted')")
                .unwrap();
        }
        let engine = RusqliteEngine::open(&path).unwrap();
        let mut select = engine.prepare("SELECT body FROM notes").unwrap();
        assert_eq!(select.query_raw(&[]).unwrap(), vec![vec![json!("persisted")]]);
    }

    #[test]
    fn sync_is_not_supported_locally() {
        let engine = engine_with_users();
        let options = SyncOptions::new("wss://sync.example.com", "app");
        assert!(engine.sync(&options).is_err());
    }
}
