//! External-store bindings for rendering frameworks.
//!
//! UI frameworks with an external-store mechanism need two things from a
//! live query: a subscribe function and a snapshot function that returns a
//! fresh `{data, error, loading}` value. [`LiveQueryBinding`] packages
//! exactly that surface, and [`BindingRegistry`] memoizes one binding per
//! caller-chosen key so repeated renders reuse the same registration instead
//! of piling up duplicates.
//!
//! Bindings deliberately do not destroy their live query when dropped:
//! several components may share one binding, and implicit teardown would
//! surprise the survivors. Teardown is explicit via
//! [`BindingRegistry::release`].

use crate::error::Result;
use crate::live::{LiveQuery, Snapshot, SubscriberHandle};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// A live query packaged as an external store.
#[derive(Clone, Debug)]
pub struct LiveQueryBinding {
    query: LiveQuery,
}

impl LiveQueryBinding {
    fn new(query: LiveQuery) -> Self {
        Self { query }
    }

    /// The underlying live query.
    pub fn query(&self) -> &LiveQuery {
        &self.query
    }

    /// A fresh `{data, error, loading}` snapshot. Each call returns a new
    /// value, as external-store contracts expect.
    pub fn snapshot(&self) -> Snapshot {
        self.query.snapshot()
    }

    /// Subscribe the framework's re-render trigger. Current data, if any, is
    /// delivered synchronously.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> SubscriberHandle {
        self.query.subscribe(callback)
    }

    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        self.query.unsubscribe(handle);
    }

    pub fn refetch(&self) {
        self.query.refetch();
    }
}

/// Memoizes one [`LiveQueryBinding`] per key.
#[derive(Default)]
pub struct BindingRegistry {
    bindings: Mutex<HashMap<String, LiveQueryBinding>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the binding registered under `key`, creating it with `factory`
    /// on first use. Subsequent calls with the same key return the memoized
    /// binding and never invoke the factory.
    pub fn use_live_query(
        &self,
        key: impl Into<String>,
        factory: impl FnOnce() -> Result<LiveQuery>,
    ) -> Result<LiveQueryBinding> {
        let key = key.into();
        if let Some(existing) = self.bindings.lock().get(&key) {
            return Ok(existing.clone());
        }
        // The factory registers a live query and must not run under the map
        // lock; on a lost race the duplicate registration is torn down.
        let binding = LiveQueryBinding::new(factory()?);
        let mut bindings = self.bindings.lock();
        match bindings.get(&key) {
            Some(existing) => {
                binding.query.destroy();
                Ok(existing.clone())
            }
            None => {
                bindings.insert(key, binding.clone());
                Ok(binding)
            }
        }
    }

    /// Destroy the live query registered under `key` and forget the binding.
    /// Returns `false` when no binding was registered.
    pub fn release(&self, key: &str) -> bool {
        match self.bindings.lock().remove(key) {
            Some(binding) => {
                binding.query.destroy();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.lock().is_empty()
    }
}
