//! In-memory document store
//!
//! Keeps every document in a map and pushes snapshots to subscribers on each
//! change. Nothing survives the process; used by tests and when the whole
//! room lives inside one program.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    append_unique, merge_fields, remove_matching, ArrayMatch, Document, DocumentStore, Fields,
    SnapshotEvent, Subscription,
};
use crate::error::{StoreError, StoreResult};

type Key = (String, String);

/// In-memory store implementation
///
/// Thread-safe; cheap to share behind an `Arc`.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<Key, Document>,
    subscribers: HashMap<Key, Vec<mpsc::UnboundedSender<SnapshotEvent>>>,
}

impl Inner {
    /// Deliver the current state of `key` to its live subscribers
    fn publish(&mut self, key: &Key) {
        let snapshot = self.documents.get(key).cloned();
        if let Some(senders) = self.subscribers.get_mut(key) {
            senders.retain(|tx| tx.send(Ok(snapshot.clone())).is_ok());
        }
    }

    fn existing_mut(&mut self, key: &Key) -> StoreResult<&mut Document> {
        self.documents
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound {
                collection: key.0.clone(),
                id: key.1.clone(),
            })
    }

    /// Apply `change` to an existing document, publishing if it changed
    fn modify<F>(&mut self, key: Key, change: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Document) -> StoreResult<bool>,
    {
        let doc = self.existing_mut(&key)?;
        if change(doc)? {
            doc.version += 1;
            debug!("{}/{} now at version {}", key.0, key.1, doc.version);
            self.publish(&key);
        }
        Ok(())
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the map consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Delete a document, as the backend does once a room expires
    pub fn delete(&self, collection: &str, id: &str) -> bool {
        let key = key(collection, id);
        let mut inner = self.lock();
        let removed = inner.documents.remove(&key).is_some();
        if removed {
            inner.publish(&key);
        }
        removed
    }

    /// End every subscription on a document with `error`
    ///
    /// Simulates the backend dropping live connections.
    pub fn disconnect_subscribers(&self, collection: &str, id: &str, error: &str) {
        let mut inner = self.lock();
        if let Some(senders) = inner.subscribers.remove(&key(collection, id)) {
            for tx in senders {
                let _ = tx.send(Err(StoreError::Unavailable(error.to_string())));
            }
        }
    }

    /// Number of subscriptions still listening on a document
    pub fn subscriber_count(&self, collection: &str, id: &str) -> usize {
        let mut inner = self.lock();
        match inner.subscribers.get_mut(&key(collection, id)) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }
}

fn key(collection: &str, id: &str) -> Key {
    (collection.to_string(), id.to_string())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        Ok(self.lock().documents.get(&key(collection, id)).cloned())
    }

    async fn set(&self, collection: &str, id: &str, data: Fields) -> StoreResult<()> {
        let key = key(collection, id);
        let mut inner = self.lock();
        let version = inner.documents.get(&key).map_or(1, |doc| doc.version + 1);
        inner.documents.insert(
            key.clone(),
            Document {
                id: id.to_string(),
                version,
                data,
            },
        );
        inner.publish(&key);
        Ok(())
    }

    async fn create(&self, collection: &str, id: &str, data: Fields) -> StoreResult<()> {
        let key = key(collection, id);
        let mut inner = self.lock();
        if inner.documents.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        inner.documents.insert(
            key.clone(),
            Document {
                id: id.to_string(),
                version: 1,
                data,
            },
        );
        inner.publish(&key);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.lock()
            .modify(key(collection, id), |doc| Ok(merge_fields(&mut doc.data, fields)))
    }

    async fn update_if_version(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        fields: Fields,
    ) -> StoreResult<()> {
        self.lock().modify(key(collection, id), |doc| {
            if doc.version != expected_version {
                return Err(StoreError::VersionConflict {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    expected: expected_version,
                    actual: doc.version,
                });
            }
            Ok(merge_fields(&mut doc.data, fields))
        })
    }

    async fn append_to_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> StoreResult<()> {
        self.lock().modify(key(collection, id), |doc| {
            append_unique(&mut doc.data, field, value)
        })
    }

    async fn remove_from_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        matcher: &ArrayMatch,
    ) -> StoreResult<()> {
        self.lock().modify(key(collection, id), |doc| {
            remove_matching(&mut doc.data, field, matcher)
        })
    }

    async fn subscribe(&self, collection: &str, id: &str) -> StoreResult<Subscription> {
        let key = key(collection, id);
        let (tx, subscription) = Subscription::channel();

        let mut inner = self.lock();
        let snapshot = inner.documents.get(&key).cloned();
        // The receiver is alive; this cannot fail
        let _ = tx.send(Ok(snapshot));
        inner.subscribers.entry(key).or_default().push(tx);

        debug!("Subscribed to {}/{}", collection, id);
        Ok(subscription)
    }
}
