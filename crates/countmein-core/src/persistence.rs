//! File persistence helpers
//!
//! Uses atomic writes (write to temp file, then rename) so a reader polling
//! the file never sees it half-written.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

/// Write data to a file atomically
///
/// 1. Write to a uniquely named temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
pub fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::from_io(e, parent.to_path_buf()))?;

    let mut file =
        NamedTempFile::new_in(parent).map_err(|e| StoreError::from_io(e, parent.to_path_buf()))?;
    file.write_all(data)
        .map_err(|e| StoreError::from_io(e, file.path().to_path_buf()))?;
    file.as_file()
        .sync_all()
        .map_err(|e| StoreError::from_io(e, file.path().to_path_buf()))?;

    file.persist(path)
        .map_err(|e| StoreError::from_io(e.error, path.to_path_buf()))?;

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &bytes)
}

/// Read a JSON file; `None` if it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::from_read_io(e, path.to_path_buf())),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::InvalidFormat {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
}
