//! The seam between the adapter and the embedded CRDT-enabled sqlite
//! engine.
//!
//! The adapter is agnostic over the engine implementation, the same way a
//! watcher layer can be agnostic over the concrete sqlite bindings. An
//! engine must be able to prepare and execute SQL, open an imperative
//! transaction, notify about table changes after a mutation commits, and
//! expose the CRDT surface (`pull_changes` / `apply_changes`) plus a
//! continuous live-sync primitive.
//!
//! A reference implementation backed by `rusqlite` is provided in
//! [`rusqlite`](crate::engine::rusqlite) and enabled by default.

use crate::changeset::Change;
use crate::syncer::SyncOptions;
use num_bigint::BigInt;
use serde_json::Value;

#[cfg(feature = "rusqlite")]
pub mod rusqlite;

/// Errors raised by an engine are propagated unchanged; the adapter never
/// inspects them.
pub type EngineError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The kind of row mutation reported by the engine's update callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Callback invoked by the engine after a mutation has been committed.
///
/// Arguments are `(kind, db_name, table_name)`. The engine must only fire
/// this after the mutating statement (or its enclosing transaction) has
/// completed; mid-transaction mutations stay buffered until commit.
pub type UpdateCallback = Box<dyn Fn(ChangeKind, &str, &str) + Send + Sync>;

/// Opaque token for an imperative engine transaction.
///
/// Obtained from [`Engine::tx_begin`]; consumed by exactly one of
/// [`Engine::tx_commit`] or [`Engine::tx_rollback`].
#[derive(Debug)]
pub struct TxToken {
    id: u64,
}

impl TxToken {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Unsubscribe handle for a registered update callback.
///
/// The callback is removed when the handle is dropped or
/// [`UpdateHandle::unsubscribe`] is called, whichever comes first.
pub struct UpdateHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl UpdateHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for UpdateHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for UpdateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Handle for a running live-sync channel.
///
/// Connection management, retry and authentication are the engine's
/// responsibility; the handle only allows stopping the channel.
pub struct SyncHandle {
    endpoint: String,
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl SyncHandle {
    pub fn new(endpoint: impl Into<String>, stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            endpoint: endpoint.into(),
            stop: Some(Box::new(stop)),
        }
    }

    /// The websocket endpoint this channel is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop the sync channel.
    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// One compiled statement owned by the engine.
///
/// Rows are returned in raw positional form; the adapter maps them to
/// objects using [`EngineStatement::column_names`] or a caller-supplied
/// mapper.
pub trait EngineStatement: Send {
    /// Column names of the result set, in positional order. Empty for
    /// statements that return no rows.
    fn column_names(&self) -> &[String];

    /// Execute the statement, discarding any rows.
    fn execute(&mut self, params: &[Value]) -> Result<(), EngineError>;

    /// Execute the statement and return all rows in positional form.
    fn query_raw(&mut self, params: &[Value]) -> Result<Vec<Vec<Value>>, EngineError>;

    /// Release the compiled statement. Idempotent.
    fn finalize(&mut self) -> Result<(), EngineError>;
}

/// The embedded CRDT-enabled sqlite engine.
pub trait Engine: Send + Sync + 'static {
    /// Compile `sql` into a statement handle.
    fn prepare(&self, sql: &str) -> Result<Box<dyn EngineStatement>, EngineError>;

    /// Execute one or more SQL statements without collecting rows.
    fn exec(&self, sql: &str) -> Result<(), EngineError>;

    /// Open an imperative transaction and return its token.
    fn tx_begin(&self) -> Result<TxToken, EngineError>;

    /// Commit the transaction identified by `token`. Buffered update events
    /// are delivered after the commit completes.
    fn tx_commit(&self, token: TxToken) -> Result<(), EngineError>;

    /// Roll back the transaction identified by `token`, discarding its
    /// buffered update events.
    fn tx_rollback(&self, token: TxToken) -> Result<(), EngineError>;

    /// Register a table-change callback. The returned handle unsubscribes
    /// on drop.
    fn on_update(&self, callback: UpdateCallback) -> UpdateHandle;

    /// Pull all CRDT change tuples with a database version greater than
    /// `since`. `since = 0` means all history.
    fn pull_changes(&self, since: &BigInt) -> Result<Vec<Change>, EngineError>;

    /// Apply change tuples from a peer. Fires table-change callbacks for all
    /// touched tables once the application completes.
    fn apply_changes(&self, changes: &[Change]) -> Result<(), EngineError>;

    /// Start the engine's continuous live-sync channel.
    fn sync(&self, options: &SyncOptions) -> Result<SyncHandle, EngineError>;
}
