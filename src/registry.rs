//! Tables of live objects addressed by opaque identifiers.
//!
//! Cursors and pending bulk writes outlive the call that created them. They
//! are stored here under a random UUID that the caller passes back later.

use crate::bulk::BulkWriteBatch;
use crate::cursor::Cursor;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// A lock-protected map from generated identifiers to live objects.
#[derive(Debug)]
pub struct HandleTable<T> {
    label: &'static str,
    entries: Mutex<HashMap<Uuid, T>>,
}

impl<T> HandleTable<T> {
    /// Create an empty table. `label` names the table in logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store `value` under a fresh identifier.
    pub async fn insert(&self, value: T) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.lock().await.insert(id, value);
        info!(table = self.label, %id, "handle created");
        id
    }

    /// Remove and return the entry for `id`.
    pub async fn take(&self, id: &Uuid) -> Option<T> {
        let taken = self.entries.lock().await.remove(id);
        if taken.is_some() {
            info!(table = self.label, %id, "handle removed");
        }
        taken
    }

    /// Put a previously taken entry back under its identifier.
    pub async fn restore(&self, id: Uuid, value: T) {
        self.entries.lock().await.insert(id, value);
        info!(table = self.label, %id, "handle restored");
    }

    /// Remove the entry for `id`. Returns whether anything was removed.
    pub async fn remove(&self, id: &Uuid) -> bool {
        self.take(id).await.is_some()
    }

    /// Run `f` on the entry for `id` while the table is locked.
    pub async fn with_mut<R>(&self, id: &Uuid, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.entries.lock().await.get_mut(id).map(f)
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the table has no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl<T: Clone> HandleTable<T> {
    /// Get a clone of the entry for `id`.
    ///
    /// The table lock is released before the clone is returned.
    pub async fn get(&self, id: &Uuid) -> Option<T> {
        self.entries.lock().await.get(id).cloned()
    }
}

/// Every handle table the bridge owns.
#[derive(Debug)]
pub struct Registry {
    /// Open cursors.
    pub cursors: HandleTable<Cursor>,
    /// Bulk write batches that have not been executed yet.
    pub bulk: HandleTable<BulkWriteBatch>,
}

impl Registry {
    /// Create empty tables.
    pub fn new() -> Self {
        Self {
            cursors: HandleTable::new("cursors"),
            bulk: HandleTable::new("bulk"),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an identifier received from the caller.
pub fn parse_handle(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id.trim()).ok()
}
