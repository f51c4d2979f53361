//! Per-connection execution context: query preparation, one-shot
//! statements, and the transaction abstraction.
//!
//! A [`Session`] wraps the engine handle with the dialect-level concerns the
//! driver needs: statement logging, the table-dependency collector, and
//! transaction scoping. `transaction` acquires the engine's imperative
//! transaction primitive and hands the closure a child session bound to that
//! transaction; nested calls use named savepoints.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::extract;
use crate::statement::{PreparedStatement, RowMapper};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// A compiled query object as produced by a query builder: SQL text plus
/// positional parameters in compilation order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append one positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// Statement logging selector.
///
/// `Default` logs every `(sql, params)` pair at DEBUG under the
/// `sqlite_live::sql` target before engine dispatch; `Disabled` logs
/// nothing; `Tagged` adds a caller-chosen tag field to each event.
#[derive(Debug, Clone, Default)]
pub enum LogConfig {
    #[default]
    Default,
    Disabled,
    Tagged(String),
}

impl LogConfig {
    pub(crate) fn statement(&self, sql: &str, params: &[Value]) {
        match self {
            LogConfig::Disabled => {}
            LogConfig::Default => {
                debug!(target: "sqlite_live::sql", sql = %sql, params = ?params, "execute");
            }
            LogConfig::Tagged(tag) => {
                debug!(target: "sqlite_live::sql", tag = %tag, sql = %sql, params = ?params, "execute");
            }
        }
    }
}

/// The table-dependency collector.
///
/// One slot per database. The live-query engine arms it for the first
/// refetch of a record; every prepared-statement execution in between
/// contributes its referenced tables. Arming an already armed collector is
/// a usage error, which is exactly the nested-live-query case.
#[derive(Clone, Default)]
pub struct Collector {
    slot: Arc<Mutex<Option<BTreeSet<String>>>>,
}

impl Collector {
    pub(crate) fn arm(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(Error::Usage(
                "cannot register a live query while another live query's first \
                 refetch is collecting its table dependencies"
                    .to_string(),
            ));
        }
        *slot = Some(BTreeSet::new());
        Ok(())
    }

    pub(crate) fn disarm(&self) -> BTreeSet<String> {
        self.slot.lock().take().unwrap_or_default()
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub(crate) fn contribute(&self, tables: &BTreeSet<String>) {
        if let Some(active) = self.slot.lock().as_mut() {
            active.extend(tables.iter().cloned());
        }
    }
}

/// Scope marker for a transaction a session (and its statements) is bound
/// to. Released exactly once, on both the commit and the rollback path.
#[derive(Clone, Debug)]
pub struct TxContext {
    released: Arc<AtomicBool>,
}

impl TxContext {
    fn new() -> Self {
        Self {
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Marks the context released. Idempotent.
    pub(crate) fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::Usage(
                "statement executed after its transaction was released".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Session {
    engine: Arc<dyn Engine>,
    log: LogConfig,
    collector: Collector,
    tx: Option<TxContext>,
    depth: usize,
}

impl Session {
    pub(crate) fn new(engine: Arc<dyn Engine>, log: LogConfig, collector: Collector) -> Self {
        Self {
            engine,
            log,
            collector,
            tx: None,
            depth: 0,
        }
    }

    pub(crate) fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Prepare a long-lived statement. Finalized on drop.
    pub fn prepare_query(
        &self,
        query: &Query,
        mapper: Option<RowMapper>,
    ) -> Result<PreparedStatement> {
        self.prepare_inner(query, mapper, false)
    }

    /// Prepare a statement that finalizes itself after one execution.
    pub fn prepare_one_time_query(
        &self,
        query: &Query,
        mapper: Option<RowMapper>,
    ) -> Result<PreparedStatement> {
        self.prepare_inner(query, mapper, true)
    }

    fn prepare_inner(
        &self,
        query: &Query,
        mapper: Option<RowMapper>,
        one_shot: bool,
    ) -> Result<PreparedStatement> {
        if let Some(tx) = &self.tx {
            tx.ensure_live()?;
        }
        let statement = self.engine.prepare(&query.sql).map_err(Error::Engine)?;
        Ok(PreparedStatement::new(
            statement,
            query.sql.clone(),
            extract::table_names(&query.sql),
            mapper,
            self.collector.clone(),
            self.log.clone(),
            self.tx.clone(),
            one_shot,
        ))
    }

    /// Execute raw SQL, dispatched within the active transaction when one is
    /// bound to this session.
    pub fn exec(&self, sql: &str) -> Result<()> {
        if let Some(tx) = &self.tx {
            tx.ensure_live()?;
        }
        self.log.statement(sql, &[]);
        self.engine.exec(sql).map_err(Error::Engine)
    }

    /// Execute `query`, discarding rows.
    pub fn run(&self, query: &Query) -> Result<()> {
        self.prepare_one_time_query(query, None)?.run(&query.params)
    }

    /// Execute `query` and return all rows as a JSON array of row objects.
    pub fn all(&self, query: &Query) -> Result<Value> {
        self.prepare_one_time_query(query, None)?.all(&query.params)
    }

    /// Execute `query` and return the first row, if any.
    pub fn get(&self, query: &Query) -> Result<Option<Value>> {
        self.prepare_one_time_query(query, None)?.get(&query.params)
    }

    /// Execute `query` and return the first column of each row.
    pub fn values(&self, query: &Query) -> Result<Vec<Value>> {
        self.prepare_one_time_query(query, None)?
            .values(&query.params)
    }

    /// Run `f` inside a transaction.
    ///
    /// A top-level call acquires the engine's imperative transaction and
    /// commits when `f` returns `Ok`, rolls back when it returns `Err`; the
    /// transaction context is released on both paths. A nested call issues a
    /// `SAVEPOINT sp<depth>` and releases or rolls back to it.
    pub fn transaction<T>(&self, f: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        match &self.tx {
            None => self.top_level_transaction(f),
            Some(parent) => {
                parent.ensure_live()?;
                self.savepoint_transaction(f)
            }
        }
    }

    fn top_level_transaction<T>(&self, f: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        let token = self.engine.tx_begin().map_err(Error::Engine)?;
        let context = TxContext::new();
        let child = Session {
            engine: Arc::clone(&self.engine),
            log: self.log.clone(),
            collector: self.collector.clone(),
            tx: Some(context.clone()),
            depth: 1,
        };
        let result = f(&child);
        context.release();
        match result {
            Ok(value) => {
                self.engine.tx_commit(token).map_err(Error::Engine)?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.engine.tx_rollback(token) {
                    error!(%rollback_error, "transaction rollback failed");
                }
                Err(error)
            }
        }
    }

    fn savepoint_transaction<T>(&self, f: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        let name = format!("sp{}", self.depth);
        self.exec(&format!("SAVEPOINT {name}"))?;
        let context = TxContext::new();
        let child = Session {
            engine: Arc::clone(&self.engine),
            log: self.log.clone(),
            collector: self.collector.clone(),
            tx: Some(context.clone()),
            depth: self.depth + 1,
        };
        let result = f(&child);
        context.release();
        match result {
            Ok(value) => {
                self.exec(&format!("RELEASE savepoint {name}"))?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.exec(&format!("ROLLBACK TO savepoint {name}")) {
                    error!(%rollback_error, "savepoint rollback failed");
                }
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("in_transaction", &self.tx.is_some())
            .field("depth", &self.depth)
            .finish()
    }
}
