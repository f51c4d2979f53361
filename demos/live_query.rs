use sqlite_live::engine::rusqlite::RusqliteEngine;
use sqlite_live::{Config, Database, Query, SyncOptions};
use std::sync::Arc;

// Walks through the full adapter surface: a live query that reacts to
// mutations, a transaction that produces a single notification, and a
// changeset round trip that converges an empty replica. Expected output:
// ```
// [subscriber] todos changed: []
// [subscriber] todos changed: [{"done":0,"id":1,"title":"water the plants"}]
// [subscriber] todos changed: [...both rows, first one done...]
// [replica] todos: [...same two rows...]
// [sync] live sync unavailable locally: ...
// ```
fn main() {
    let engine = Arc::new(RusqliteEngine::open_in_memory().unwrap());
    let db = Database::new(engine, Config::default()).unwrap();
    db.exec("CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT, done INTEGER DEFAULT 0)")
        .unwrap();

    let todos = db
        .live_query(|db| db.all(&Query::new("SELECT * FROM todos ORDER BY id")))
        .unwrap();
    todos.subscribe(|rows| println!("[subscriber] todos changed: {rows}"));

    db.run(&Query::new("INSERT INTO todos (title) VALUES (?)").bind("water the plants"))
        .unwrap();

    // Both mutations land in one transaction: subscribers hear about it once,
    // after the commit.
    db.transaction(|tx| {
        tx.run(&Query::new("INSERT INTO todos (title) VALUES (?)").bind("file taxes"))?;
        tx.run(&Query::new("UPDATE todos SET done = 1 WHERE id = ?").bind(1))
    })
    .unwrap();

    // Converge an empty replica through an explicit changeset exchange.
    let replica_engine = Arc::new(RusqliteEngine::open_in_memory().unwrap());
    let replica = Database::new(replica_engine, Config::default()).unwrap();
    replica
        .exec("CREATE TABLE todos (id INTEGER PRIMARY KEY, title TEXT, done INTEGER DEFAULT 0)")
        .unwrap();
    replica.apply_changeset(&db.get_changeset().unwrap()).unwrap();
    println!(
        "[replica] todos: {}",
        replica
            .all(&Query::new("SELECT * FROM todos ORDER BY id"))
            .unwrap()
    );

    // Continuous sync needs a network-capable engine; the local reference
    // engine declines.
    match db.sync(&SyncOptions::new("wss://sync.example.com", "demo")) {
        Ok(handle) => println!("[sync] connected to {}", handle.endpoint()),
        Err(error) => println!("[sync] live sync unavailable locally: {error}"),
    }

    todos.destroy();
}
