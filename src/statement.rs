//! Prepared statements.
//!
//! A [`PreparedStatement`] owns one compiled engine statement and executes
//! it in one of four modes: `run` (discard rows), `all` (rows as JSON
//! objects), `get` (first row or `None`) and `values` (first column of each
//! row). Every execution logs `(sql, params)` before engine dispatch and
//! contributes the statement's referenced tables to the session's table
//! collector when one is armed.
//!
//! One-shot statements finalize themselves after their single execution,
//! including on the error path. Long-lived statements finalize on drop;
//! `finalize` runs exactly once either way.

use crate::engine::EngineStatement;
use crate::error::{Error, Result};
use crate::session::{Collector, LogConfig, TxContext};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::error;

/// Maps raw positional rows to a caller-defined result value.
///
/// When present, the engine is asked for rows in raw array form and the
/// mapper produces the typed result.
pub type RowMapper = Box<dyn Fn(&[Vec<Value>]) -> Value + Send + Sync>;

pub struct PreparedStatement {
    statement: Box<dyn EngineStatement>,
    sql: String,
    tables: BTreeSet<String>,
    mapper: Option<RowMapper>,
    collector: Collector,
    log: LogConfig,
    tx: Option<TxContext>,
    one_shot: bool,
    finalized: bool,
}

impl PreparedStatement {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        statement: Box<dyn EngineStatement>,
        sql: String,
        tables: BTreeSet<String>,
        mapper: Option<RowMapper>,
        collector: Collector,
        log: LogConfig,
        tx: Option<TxContext>,
        one_shot: bool,
    ) -> Self {
        Self {
            statement,
            sql,
            tables,
            mapper,
            collector,
            log,
            tx,
            one_shot,
            finalized: false,
        }
    }

    /// The SQL text this statement was compiled from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The table names referenced by this statement, lowercased.
    pub fn tables(&self) -> &BTreeSet<String> {
        &self.tables
    }

    /// Execute and discard any rows.
    pub fn run(&mut self, params: &[Value]) -> Result<()> {
        let result = self.dispatch_run(params);
        self.after_dispatch();
        result
    }

    /// Execute and return all rows as a JSON array of row objects (or the
    /// mapper's output when one was supplied).
    pub fn all(&mut self, params: &[Value]) -> Result<Value> {
        let result = self.dispatch_all(params);
        self.after_dispatch();
        result
    }

    /// Execute and return the first row, or `None` when the result set is
    /// empty.
    pub fn get(&mut self, params: &[Value]) -> Result<Option<Value>> {
        let result = self.dispatch_get(params);
        self.after_dispatch();
        result
    }

    /// Execute in raw mode and return the first column of each row.
    pub fn values(&mut self, params: &[Value]) -> Result<Vec<Value>> {
        let result = self.dispatch_values(params);
        self.after_dispatch();
        result
    }

    /// Release the compiled statement. Safe to call more than once; only the
    /// first call reaches the engine.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if let Err(error) = self.statement.finalize() {
            error!(sql = %self.sql, %error, "failed to finalize statement");
        }
    }

    fn dispatch_run(&mut self, params: &[Value]) -> Result<()> {
        self.before_dispatch(params)?;
        self.statement.execute(params).map_err(Error::Engine)
    }

    fn dispatch_all(&mut self, params: &[Value]) -> Result<Value> {
        self.before_dispatch(params)?;
        let columns = self.statement.column_names().to_vec();
        let rows = self.raw_rows(params)?;
        Ok(match &self.mapper {
            Some(mapper) => mapper(&rows),
            None => Value::Array(
                rows.into_iter()
                    .map(|row| row_to_object(&columns, row))
                    .collect(),
            ),
        })
    }

    fn dispatch_get(&mut self, params: &[Value]) -> Result<Option<Value>> {
        self.before_dispatch(params)?;
        let columns = self.statement.column_names().to_vec();
        let rows = self.raw_rows(params)?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(match &self.mapper {
            Some(mapper) => mapper(&rows[..1]),
            None => {
                let mut rows = rows;
                row_to_object(&columns, rows.swap_remove(0))
            }
        }))
    }

    fn dispatch_values(&mut self, params: &[Value]) -> Result<Vec<Value>> {
        self.before_dispatch(params)?;
        let rows = self.raw_rows(params)?;
        Ok(rows
            .into_iter()
            .map(|mut row| {
                if row.is_empty() {
                    Value::Null
                } else {
                    row.swap_remove(0)
                }
            })
            .collect())
    }

    fn raw_rows(&mut self, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        self.statement.query_raw(params).map_err(Error::Engine)
    }

    fn before_dispatch(&self, params: &[Value]) -> Result<()> {
        if self.finalized {
            return Err(Error::Usage(format!(
                "statement '{}' was already finalized",
                self.sql
            )));
        }
        if let Some(tx) = &self.tx {
            tx.ensure_live()?;
        }
        self.log.statement(&self.sql, params);
        self.collector.contribute(&self.tables);
        Ok(())
    }

    fn after_dispatch(&mut self) {
        if self.one_shot {
            self.finalize();
        }
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl std::fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .field("tables", &self.tables)
            .field("one_shot", &self.one_shot)
            .field("finalized", &self.finalized)
            .finish()
    }
}

fn row_to_object(columns: &[String], row: Vec<Value>) -> Value {
    let mut object = Map::with_capacity(columns.len());
    for (column, value) in columns.iter().zip(row) {
        object.insert(column.clone(), value);
    }
    Value::Object(object)
}
