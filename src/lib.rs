//! This crate provides a reactive, local-first database adapter for
//! embedded CRDT-enabled sqlite engines. A query declared once stays alive:
//! its result is recomputed whenever the underlying rows change, whether the
//! change came from a local mutation, from applying a peer's changeset, or
//! from a live sync stream.
//!
//! The crate is agnostic over the engine implementation via the
//! [`engine::Engine`] trait. A reference implementation backed by `rusqlite`
//! is provided and enabled by default.
//!
//! # Basic example
//!
//! ```rust
//! use sqlite_live::engine::rusqlite::RusqliteEngine;
//! use sqlite_live::{Config, Database, Query};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(RusqliteEngine::open_in_memory().unwrap());
//! let db = Database::new(engine, Config::default()).unwrap();
//! db.exec("CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT)").unwrap();
//!
//! // Declare the query once; it stays alive from here on.
//! let todos = db
//!     .live_query(|db| db.all(&Query::new("SELECT * FROM todos")))
//!     .unwrap();
//! assert_eq!(todos.data(), Some(serde_json::json!([])));
//!
//! todos.subscribe(|rows| println!("todos changed: {rows}"));
//!
//! // Mutations re-run the query and notify subscribers on change.
//! db.run(&Query::new("INSERT INTO todos (title) VALUES (?)").bind("water the plants"))
//!     .unwrap();
//! assert_eq!(todos.data().unwrap().as_array().unwrap().len(), 1);
//! ```
//!
//! # How it works
//!
//! When a live query is registered, its builder runs once against the
//! facade. During that first execution the session records every table the
//! builder's statements read from; the collected set becomes the query's
//! table-dependency set. The facade subscribes a single change router to the
//! engine's table-update callback: whenever the engine reports a mutated
//! table, the router refetches every live query whose dependency set
//! contains it. The fresh result is compared structurally against the
//! previous one, and subscribers are only notified when something actually
//! changed.
//!
//! Refetches of one query never overlap. Change events arriving while a
//! refetch is in flight coalesce into a single follow-up execution.
//!
//! # Transactions
//!
//! [`Database::transaction`] wraps the engine's imperative transaction
//! primitive. Mutations inside a transaction are buffered by the engine and
//! delivered as table-change events only after the commit completes, so a
//! transaction produces at most one notification per live query. Nested
//! transactions map to sqlite savepoints.
//!
//! # Peer sync
//!
//! Two facades converge by exchanging changesets:
//! [`Database::get_changeset`] serializes the engine's change history into a
//! JSON wire format (arbitrary-precision version fields survive the round
//! trip as `"BIGINT::<decimal>"` strings), and
//! [`Database::apply_changeset`] validates and applies a peer's changeset.
//! Applied changes fire the same table-change callbacks as local mutations,
//! so affected live queries refetch automatically. Continuous background
//! sync over a websocket is a pass-through to the engine via
//! [`Database::sync`].
//!
//! # Migrations
//!
//! [`migrate()`] applies ordered SQL migrations exactly once each, tracked
//! in a bookkeeping table; see the [`migrate`] module.

pub mod bridge;
pub mod changeset;
pub mod database;
pub mod engine;
pub mod eq;
pub mod error;
pub mod extract;
pub mod live;
pub mod migrate;
pub mod session;
pub mod statement;
pub mod syncer;

pub use bridge::{BindingRegistry, LiveQueryBinding};
pub use database::{ColumnDef, Config, Database, Schema, TableDef};
pub use error::{Error, Result};
pub use live::{LiveQuery, LiveQueryId, Snapshot, SubscriberHandle};
pub use migrate::{migrate, Migration, MigrationConfig};
pub use session::{LogConfig, Query, Session};
pub use statement::PreparedStatement;
pub use syncer::SyncOptions;
