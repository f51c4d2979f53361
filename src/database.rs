//! The database facade.
//!
//! [`Database`] combines the driver surface (prepare/run/all/get/values,
//! transactions) with the reactive layer (`live_query`), the sync surface
//! (`sync`, `get_changeset`, `apply_changeset`) and an escape hatch to the
//! raw engine handle.
//!
//! On construction the facade subscribes one table-change callback with the
//! engine; that callback is the change router: it lowercases the reported
//! table name and refetches every live query whose dependency set contains
//! it. The subscription handle is owned by the facade and dropped on
//! [`Database::close`] or when the last handle goes away.

use crate::changeset;
use crate::engine::{ChangeKind, Engine, SyncHandle, UpdateHandle};
use crate::error::{Error, Result};
use crate::live::{Builder, LiveQuery, LiveRegistry};
use crate::session::{Collector, LogConfig, Query, Session};
use crate::statement::{PreparedStatement, RowMapper};
use crate::syncer::SyncOptions;
use num_bigint::BigInt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Column of a [`TableDef`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Typed definition of one logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }
}

/// Schema descriptor: logical table name to table definition. Immutable
/// after database construction; consumed by query builders for type
/// inference. An empty schema is permitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    tables: BTreeMap<String, TableDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, def: TableDef) -> Self {
        self.tables.insert(def.name.clone(), def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Facade construction options.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub schema: Option<Schema>,
    pub logger: LogConfig,
}

struct DbShared {
    engine: Arc<dyn Engine>,
    session: Session,
    live: LiveRegistry,
    router: Mutex<Option<UpdateHandle>>,
    schema: Option<Schema>,
}

/// The database facade. Cheap to clone; all clones share one session, one
/// live-query registry and one change-router subscription.
#[derive(Clone)]
pub struct Database {
    shared: Arc<DbShared>,
}

impl Database {
    /// Build a facade over `engine`.
    ///
    /// The engine handle is probed with a trivial prepare so that a broken
    /// handle fails construction instead of the first query.
    pub fn new(engine: Arc<dyn Engine>, config: Config) -> Result<Database> {
        match engine.prepare("SELECT 1") {
            Ok(mut probe) => {
                let _ = probe.finalize();
            }
            Err(probe_error) => {
                return Err(Error::Usage(format!(
                    "engine handle is not usable: {probe_error}"
                )));
            }
        }

        let session = Session::new(Arc::clone(&engine), config.logger.clone(), Collector::default());
        let shared = Arc::new(DbShared {
            engine,
            session,
            live: LiveRegistry::new(),
            router: Mutex::new(None),
            schema: config.schema,
        });

        let weak = Arc::downgrade(&shared);
        let handle = shared.engine.on_update(Box::new(move |kind, db_name, table| {
            if let Some(shared) = weak.upgrade() {
                Database { shared }.on_engine_update(kind, db_name, table);
            }
        }));
        *shared.router.lock() = Some(handle);

        Ok(Database { shared })
    }

    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self))]
    fn on_engine_update(&self, kind: ChangeKind, db_name: &str, table: &str) {
        let table = table.to_ascii_lowercase();
        debug!(?kind, db_name, table = %table, "engine reported table change");
        self.shared.live.on_table_changed(self, &table);
    }

    /// The schema this facade was constructed with, if any.
    pub fn schema(&self) -> Option<&Schema> {
        self.shared.schema.as_ref()
    }

    /// The raw engine handle.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.shared.engine
    }

    /// The facade-level session.
    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    pub(crate) fn live(&self) -> &LiveRegistry {
        &self.shared.live
    }

    pub(crate) fn collector(&self) -> &Collector {
        self.shared.session.collector()
    }

    /// Prepare a long-lived statement against the facade session.
    pub fn prepare(&self, query: &Query, mapper: Option<RowMapper>) -> Result<PreparedStatement> {
        self.shared.session.prepare_query(query, mapper)
    }

    /// Execute raw SQL.
    pub fn exec(&self, sql: &str) -> Result<()> {
        self.shared.session.exec(sql)
    }

    /// Execute `query`, discarding rows.
    pub fn run(&self, query: &Query) -> Result<()> {
        self.shared.session.run(query)
    }

    /// Execute `query`, returning all rows as a JSON array of row objects.
    pub fn all(&self, query: &Query) -> Result<Value> {
        self.shared.session.all(query)
    }

    /// Execute `query`, returning the first row if any.
    pub fn get(&self, query: &Query) -> Result<Option<Value>> {
        self.shared.session.get(query)
    }

    /// Execute `query`, returning the first column of each row.
    pub fn values(&self, query: &Query) -> Result<Vec<Value>> {
        self.shared.session.values(query)
    }

    /// Run `f` inside a transaction. See [`Session::transaction`].
    pub fn transaction<T>(&self, f: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        self.shared.session.transaction(f)
    }

    /// Register a live query.
    ///
    /// The builder is executed once immediately; afterwards it re-runs
    /// whenever a table it read from changes. The returned handle exposes
    /// the result snapshot and subscription surface.
    pub fn live_query<F>(&self, builder: F) -> Result<LiveQuery>
    where
        F: Fn(&Database) -> Result<Value> + Send + Sync + 'static,
    {
        let builder: Builder = Arc::new(builder);
        let id = self.shared.live.register(self, builder)?;
        Ok(LiveQuery::new(self.clone(), id))
    }

    /// Start the engine's continuous live-sync channel.
    ///
    /// Remote changes applied by the engine produce the same table-change
    /// callbacks as local mutations, so affected live queries refetch
    /// automatically.
    pub fn sync(&self, options: &SyncOptions) -> Result<SyncHandle> {
        options.validate()?;
        self.shared.engine.sync(options).map_err(Error::Engine)
    }

    /// Serialize the engine's full change history into the changeset wire
    /// format. An empty history yields `"[]"`.
    pub fn get_changeset(&self) -> Result<String> {
        let changes = self
            .shared
            .engine
            .pull_changes(&BigInt::from(0))
            .map_err(Error::Engine)?;
        Ok(changeset::stringify_changes(&changes))
    }

    /// Parse, validate and apply a changeset produced by a peer's
    /// [`Database::get_changeset`].
    pub fn apply_changeset(&self, text: &str) -> Result<()> {
        let changes = changeset::parse_changes(text)?;
        self.shared
            .engine
            .apply_changes(&changes)
            .map_err(Error::Engine)
    }

    /// Tear down the reactive layer: unsubscribe the change router and drop
    /// all live queries. Statement execution remains possible.
    pub fn close(&self) {
        if let Some(handle) = self.shared.router.lock().take() {
            handle.unsubscribe();
        }
        self.shared.live.clear();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("schema", &self.shared.schema.is_some())
            .finish()
    }
}
