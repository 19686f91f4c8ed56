//! File-backed document store
//!
//! Each document is a JSON file `<root>/<collection>/<id>.json` holding its
//! version and body. Several processes can share the directory: every
//! read-modify-write holds an exclusive lock on `<id>.lock`, and subscribers
//! learn about changes from any process by polling the file.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{
    append_unique, merge_fields, remove_matching, ArrayMatch, Document, DocumentStore, Fields,
    Subscription,
};
use crate::error::{StoreError, StoreResult};
use crate::persistence::{read_json, write_json};

/// On-disk layout of one document
#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    version: u64,
    data: Fields,
}

/// Shortest polling period; a zero interval would spin
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Document store keeping one JSON file per document
pub struct FileDocumentStore {
    root: PathBuf,
    poll_interval: Duration,
    write_lock: Mutex<()>,
}

impl FileDocumentStore {
    /// Create a store rooted at `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of a document's file
    ///
    /// Collection and id become path components, so only plain names are
    /// accepted.
    pub fn document_path(&self, collection: &str, id: &str) -> StoreResult<PathBuf> {
        for part in [collection, id] {
            let plain = !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !plain {
                return Err(StoreError::InvalidFormat {
                    path: self.root.join(part),
                    details: format!("'{}' is not a valid document name", part),
                });
            }
        }
        Ok(self.root.join(collection).join(format!("{}.json", id)))
    }

    /// Delete a document's file; returns whether it existed
    pub async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let path = self.document_path(collection, id)?;
        let _guard = self.write_lock.lock().await;

        blocking(move || {
            let _lock = lock_document(&path)?;
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Deleted {:?}", path);
                    Ok(true)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(StoreError::from_io(e, path)),
            }
        })
        .await
    }

    /// Read-modify-write of an existing document under the document lock
    async fn modify<F>(&self, collection: &str, id: &str, change: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Document) -> StoreResult<bool> + Send + 'static,
    {
        let path = self.document_path(collection, id)?;
        let (collection, id) = (collection.to_string(), id.to_string());
        let _guard = self.write_lock.lock().await;

        blocking(move || {
            let _lock = lock_document(&path)?;
            let mut doc = read_document(&path, &id)?.ok_or_else(|| StoreError::NotFound {
                collection: collection.clone(),
                id: id.clone(),
            })?;

            if change(&mut doc)? {
                doc.version += 1;
                let version = doc.version;
                write_document(&path, doc)?;
                debug!("{}/{} now at version {}", collection, id, version);
            }
            Ok(())
        })
        .await
    }
}

/// Take the exclusive lock guarding a document; released when the file drops
///
/// The lock lives in a sibling file so it survives the rename that replaces
/// the document.
fn lock_document(path: &Path) -> StoreResult<File> {
    let lock_path = path.with_extension("lock");
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::from_io(e, parent.to_path_buf()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| StoreError::from_io(e, lock_path.clone()))?;
    FileExt::lock_exclusive(&file).map_err(|e| StoreError::from_io(e, lock_path))?;
    Ok(file)
}

fn read_document(path: &Path, id: &str) -> StoreResult<Option<Document>> {
    Ok(read_json::<StoredDocument>(path)?.map(|stored| Document {
        id: id.to_string(),
        version: stored.version,
        data: stored.data,
    }))
}

fn write_document(path: &Path, doc: Document) -> StoreResult<()> {
    write_json(
        path,
        &StoredDocument {
            version: doc.version,
            data: doc.data,
        },
    )
}

/// Run blocking file work off the async runtime
async fn blocking<T, F>(work: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Unavailable(format!("file store task failed: {}", e)))?
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let path = self.document_path(collection, id)?;
        let id = id.to_string();
        blocking(move || read_document(&path, &id)).await
    }

    async fn set(&self, collection: &str, id: &str, data: Fields) -> StoreResult<()> {
        let path = self.document_path(collection, id)?;
        let id = id.to_string();
        let _guard = self.write_lock.lock().await;

        blocking(move || {
            let _lock = lock_document(&path)?;
            let version = read_document(&path, &id)?.map_or(1, |doc| doc.version + 1);
            write_document(&path, Document { id, version, data })
        })
        .await
    }

    async fn create(&self, collection: &str, id: &str, data: Fields) -> StoreResult<()> {
        let path = self.document_path(collection, id)?;
        let (collection, id) = (collection.to_string(), id.to_string());
        let _guard = self.write_lock.lock().await;

        blocking(move || {
            let _lock = lock_document(&path)?;
            if path.exists() {
                return Err(StoreError::AlreadyExists { collection, id });
            }
            write_document(
                &path,
                Document {
                    id,
                    version: 1,
                    data,
                },
            )
        })
        .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.modify(collection, id, move |doc| {
            Ok(merge_fields(&mut doc.data, fields))
        })
        .await
    }

    async fn update_if_version(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        fields: Fields,
    ) -> StoreResult<()> {
        let (coll, doc_id) = (collection.to_string(), id.to_string());
        self.modify(collection, id, move |doc| {
            if doc.version != expected_version {
                return Err(StoreError::VersionConflict {
                    collection: coll,
                    id: doc_id,
                    expected: expected_version,
                    actual: doc.version,
                });
            }
            Ok(merge_fields(&mut doc.data, fields))
        })
        .await
    }

    async fn append_to_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> StoreResult<()> {
        let field = field.to_string();
        self.modify(collection, id, move |doc| {
            append_unique(&mut doc.data, &field, value)
        })
        .await
    }

    async fn remove_from_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        matcher: &ArrayMatch,
    ) -> StoreResult<()> {
        let field = field.to_string();
        let matcher = matcher.clone();
        self.modify(collection, id, move |doc| {
            remove_matching(&mut doc.data, &field, &matcher)
        })
        .await
    }

    async fn subscribe(&self, collection: &str, id: &str) -> StoreResult<Subscription> {
        let path = self.document_path(collection, id)?;
        let id = id.to_string();
        let (tx, subscription) = Subscription::channel();

        let initial = {
            let (path, id) = (path.clone(), id.clone());
            blocking(move || read_document(&path, &id)).await?
        };
        let _ = tx.send(Ok(initial.clone()));

        let poll_interval = self.poll_interval;
        debug!("Polling {:?} every {:?}", path, poll_interval);

        tokio::spawn(async move {
            let mut last_seen = initial;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial state is already sent
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                let read = {
                    let (path, id) = (path.clone(), id.clone());
                    blocking(move || read_document(&path, &id)).await
                };

                match read {
                    Ok(current) => {
                        if current != last_seen {
                            last_seen = current.clone();
                            if tx.send(Ok(current)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Subscription on {:?} failed: {}", path, e);
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }

            debug!("Stopped polling {:?}", path);
        });

        Ok(subscription)
    }
}
