//! The live-query engine.
//!
//! A live query is a cold source: each refetch is a fresh execution of the
//! builder closure against the facade. The engine's table-change callback is
//! the only event source, and every callback is treated as a hint to
//! recompute; structural equality suppresses no-op notifications.
//!
//! # Registration
//!
//! [`crate::database::Database::live_query`] stores the builder in the
//! registry with a fresh id and an empty table-dependency set, then runs the
//! initial refetch. During the first successful execution the session's
//! table collector is armed and every prepared-statement execution
//! contributes its referenced tables; the collected set becomes the record's
//! dependency set.
//!
//! # Refetch serialization
//!
//! Refetches of one record never overlap. A table-change event that arrives
//! while a refetch is in flight marks the record pending; any number of
//! events coalesce into exactly one follow-up refetch after the current one
//! completes.

use crate::database::Database;
use crate::eq::structural_eq;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

new_key_type! {
    /// Handle for a registered live query.
    pub struct LiveQueryId;
}

/// Identifies one subscriber of a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberHandle(u64);

type SubscriberCallback = Arc<dyn Fn(&Value) + Send + Sync>;
pub(crate) type Builder = Arc<dyn Fn(&Database) -> Result<Value> + Send + Sync>;

/// The current result of a live query.
///
/// `loading` is true from construction until the first refetch reaches a
/// terminal state. `data` is only ever replaced by a successful fetch; a
/// failed refetch stores `error` and leaves the previous `data` untouched.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub data: Option<Value>,
    pub error: Option<Arc<Error>>,
    pub loading: bool,
}

impl Snapshot {
    fn initial() -> Self {
        Self {
            data: None,
            error: None,
            loading: true,
        }
    }

    fn destroyed() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
        }
    }
}

struct LiveQueryRecord {
    builder: Builder,
    snapshot: Snapshot,
    deps: BTreeSet<String>,
    deps_captured: bool,
    subscribers: Vec<(u64, SubscriberCallback)>,
    next_subscriber: u64,
    refetching: bool,
    pending: bool,
}

impl LiveQueryRecord {
    fn new(builder: Builder) -> Self {
        Self {
            builder,
            snapshot: Snapshot::initial(),
            deps: BTreeSet::new(),
            deps_captured: false,
            subscribers: Vec::new(),
            next_subscriber: 0,
            refetching: false,
            pending: false,
        }
    }
}

/// Registry of all live queries of one database.
pub(crate) struct LiveRegistry {
    records: Mutex<SlotMap<LiveQueryId, LiveQueryRecord>>,
}

impl LiveRegistry {
    pub(crate) fn new() -> Self {
        Self {
            records: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Store a new record and run its initial refetch.
    pub(crate) fn register(&self, db: &Database, builder: Builder) -> Result<LiveQueryId> {
        if db.collector().is_armed() {
            return Err(Error::Usage(
                "live queries cannot be registered from within another live query's builder"
                    .to_string(),
            ));
        }
        let id = self.records.lock().insert(LiveQueryRecord::new(builder));
        self.refetch(db, id);
        Ok(id)
    }

    /// Remove `id` from the registry. An in-flight refetch completes but its
    /// notifications are suppressed.
    pub(crate) fn destroy(&self, id: LiveQueryId) {
        self.records.lock().remove(id);
    }

    pub(crate) fn clear(&self) {
        self.records.lock().clear();
    }

    /// Dispatch a table-change event: refetch every record whose dependency
    /// set contains `table` (already lowercased).
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self, db))]
    pub(crate) fn on_table_changed(&self, db: &Database, table: &str) {
        let affected: Vec<LiveQueryId> = self
            .records
            .lock()
            .iter()
            .filter(|(_, record)| record.deps.contains(table))
            .map(|(id, _)| id)
            .collect();
        if !affected.is_empty() {
            debug!(table, queries = affected.len(), "table change affects live queries");
        }
        for id in affected {
            self.refetch(db, id);
        }
    }

    /// Re-execute the builder of `id` and notify subscribers when the result
    /// changed. Serialized per record; concurrent requests coalesce.
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self, db))]
    pub(crate) fn refetch(&self, db: &Database, id: LiveQueryId) {
        loop {
            let (builder, first_run) = {
                let mut records = self.records.lock();
                let Some(record) = records.get_mut(id) else {
                    return;
                };
                if record.refetching {
                    record.pending = true;
                    return;
                }
                record.refetching = true;
                record.snapshot.loading = true;
                (Arc::clone(&record.builder), !record.deps_captured)
            };

            if first_run {
                if let Err(arm_error) = db.collector().arm() {
                    self.settle_with_error(id, arm_error);
                    return;
                }
            }

            let result = builder(db);

            let captured = if first_run {
                Some(db.collector().disarm())
            } else {
                None
            };

            let mut notify: Option<(Value, Vec<SubscriberCallback>)> = None;
            let run_again = {
                let mut records = self.records.lock();
                let Some(record) = records.get_mut(id) else {
                    // Destroyed while the builder was running.
                    return;
                };
                match result {
                    Ok(data) => {
                        if let Some(tables) = captured {
                            debug!(?tables, "captured live query dependencies");
                            record.deps = tables;
                            record.deps_captured = true;
                        }
                        let changed = match &record.snapshot.data {
                            Some(previous) => !structural_eq(previous, &data),
                            None => true,
                        };
                        record.snapshot.error = None;
                        if changed {
                            record.snapshot.data = Some(data.clone());
                            notify = Some((
                                data,
                                record
                                    .subscribers
                                    .iter()
                                    .map(|(_, callback)| Arc::clone(callback))
                                    .collect(),
                            ));
                        }
                    }
                    Err(query_error) => {
                        record.snapshot.error = Some(Arc::new(query_error));
                    }
                }
                record.snapshot.loading = false;
                record.refetching = false;
                std::mem::take(&mut record.pending)
            };

            if let Some((data, subscribers)) = notify {
                dispatch(&data, &subscribers);
            }

            if !run_again {
                return;
            }
        }
    }

    pub(crate) fn snapshot(&self, id: LiveQueryId) -> Snapshot {
        self.records
            .lock()
            .get(id)
            .map(|record| record.snapshot.clone())
            .unwrap_or_else(Snapshot::destroyed)
    }

    pub(crate) fn subscribe(
        &self,
        id: LiveQueryId,
        callback: SubscriberCallback,
    ) -> (SubscriberHandle, Option<Value>) {
        let mut records = self.records.lock();
        match records.get_mut(id) {
            Some(record) => {
                let key = record.next_subscriber;
                record.next_subscriber += 1;
                record.subscribers.push((key, callback));
                (SubscriberHandle(key), record.snapshot.data.clone())
            }
            None => (SubscriberHandle(u64::MAX), None),
        }
    }

    pub(crate) fn unsubscribe(&self, id: LiveQueryId, handle: SubscriberHandle) {
        if let Some(record) = self.records.lock().get_mut(id) {
            record.subscribers.retain(|(key, _)| *key != handle.0);
        }
    }

    fn settle_with_error(&self, id: LiveQueryId, error: Error) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(id) {
            record.snapshot.error = Some(Arc::new(error));
            record.snapshot.loading = false;
            record.refetching = false;
            record.pending = false;
        }
    }
}

fn dispatch(data: &Value, subscribers: &[SubscriberCallback]) {
    for callback in subscribers {
        if catch_unwind(AssertUnwindSafe(|| callback(data))).is_err() {
            error!("live query subscriber panicked; remaining subscribers still notified");
        }
    }
}

/// Handle for a registered live query.
///
/// Cloneable; all clones refer to the same registry record. Dropping a
/// handle does not destroy the query. Teardown is explicit via
/// [`LiveQuery::destroy`], so multiple consumers can safely share one
/// registration.
#[derive(Clone)]
pub struct LiveQuery {
    db: Database,
    id: LiveQueryId,
}

impl LiveQuery {
    pub(crate) fn new(db: Database, id: LiveQueryId) -> Self {
        Self { db, id }
    }

    pub fn id(&self) -> LiveQueryId {
        self.id
    }

    /// A fresh copy of the current result snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.db.live().snapshot(self.id)
    }

    /// The current data, if at least one fetch succeeded.
    pub fn data(&self) -> Option<Value> {
        self.snapshot().data
    }

    /// The error of the most recent failed fetch, cleared by the next
    /// successful one.
    pub fn error(&self) -> Option<Arc<Error>> {
        self.snapshot().error
    }

    pub fn loading(&self) -> bool {
        self.snapshot().loading
    }

    /// Register `callback`. If data is already available it is delivered
    /// synchronously before this method returns.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> SubscriberHandle {
        let callback: SubscriberCallback = Arc::new(callback);
        let (handle, current) = self.db.live().subscribe(self.id, Arc::clone(&callback));
        if let Some(data) = current {
            dispatch(&data, std::slice::from_ref(&callback));
        }
        handle
    }

    /// Remove a subscriber. No callbacks are delivered after this returns.
    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        self.db.live().unsubscribe(self.id, handle);
    }

    /// Re-execute the builder now. Coalesced with any refetch already in
    /// flight.
    pub fn refetch(&self) {
        self.db.live().refetch(&self.db, self.id);
    }

    /// Unregister this query. Engine callbacks arriving afterwards trigger
    /// no work for it.
    pub fn destroy(&self) {
        self.db.live().destroy(self.id);
    }
}

impl std::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery").field("id", &self.id).finish()
    }
}
