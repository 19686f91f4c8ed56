//! Host identity storage
//!
//! Whoever creates a room gets a host token. The token is kept in small
//! device-local key-value storage under `countmein_host_<roomId>`, so the
//! same device is recognised as host when it comes back to the room.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::StoreResult;
use crate::persistence::{read_json, write_json};

const HOST_KEY_PREFIX: &str = "countmein_host_";

/// Storage key holding the host token for `room_id`
pub fn host_key(room_id: &str) -> String {
    format!("{}{}", HOST_KEY_PREFIX, room_id)
}

/// Device-local key-value storage
pub trait HostIdentityStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Host token stored for a room
    fn host_token(&self, room_id: &str) -> StoreResult<Option<String>> {
        self.get(&host_key(room_id))
    }

    fn set_host_token(&self, room_id: &str, token: &str) -> StoreResult<()> {
        self.set(&host_key(room_id), token)
    }
}

/// Key-value storage that lives as long as the process
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HostIdentityStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Key-value storage in a single JSON file
///
/// The file is re-read on every lookup so tokens written by another process
/// are seen.
pub struct FileKeyValueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> StoreResult<BTreeMap<String, String>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }
}

impl HostIdentityStore for FileKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        write_json(&self.path, &values)?;

        debug!("Stored {} in {:?}", key, self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::TempDir;

    #[test]
    fn test_host_key_format() {
        assert_eq!(host_key("ABC234"), "countmein_host_ABC234");
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryKeyValueStore::new();
        assert!(store.host_token("ABC234").unwrap().is_none());

        store.set_host_token("ABC234", "host_1").unwrap();
        assert_eq!(store.host_token("ABC234").unwrap().as_deref(), Some("host_1"));
        assert_eq!(
            store.get("countmein_host_ABC234").unwrap().as_deref(),
            Some("host_1")
        );
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("host_tokens.json");

        let store = FileKeyValueStore::new(&path);
        store.set_host_token("ABC234", "host_1").unwrap();
        store.set_host_token("XYZ789", "host_2").unwrap();

        let reopened = FileKeyValueStore::new(&path);
        assert_eq!(
            reopened.host_token("ABC234").unwrap().as_deref(),
            Some("host_1")
        );
        assert_eq!(
            reopened.host_token("XYZ789").unwrap().as_deref(),
            Some("host_2")
        );
        assert!(reopened.host_token("NOPE22").unwrap().is_none());
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path().join("none.json"));
        assert!(store.get("anything").unwrap().is_none());
    }

    #[test]
    fn test_file_store_corrupt_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("host_tokens.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let store = FileKeyValueStore::new(&path);
        assert!(matches!(
            store.get("x").unwrap_err(),
            StoreError::InvalidFormat { .. }
        ));
    }
}
