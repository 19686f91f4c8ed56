//! Error handling
//!
//! `StoreError` covers the document store and host-token storage.
//! `RoomError` is what room operations report to callers; each variant
//! names one failure of the room workflow and keeps the store error that
//! caused it.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur talking to a document store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Document does not exist (update on a missing document)
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Document already exists (create on an existing id)
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    /// A versioned write lost against another writer
    #[error("Version conflict on {collection}/{id}: expected {expected}, found {actual}")]
    VersionConflict {
        collection: String,
        id: String,
        expected: u64,
        actual: u64,
    },

    /// An array operation targeted a field holding something else
    #[error("Field '{field}' is not an array")]
    NotAnArray { field: String },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored data cannot be parsed
    #[error("Invalid document format in '{path}': {details}")]
    InvalidFormat { path: PathBuf, details: String },

    /// A computed value does not fit the stored representation
    #[error("Value out of range for '{field}': {details}")]
    OutOfRange { field: String, details: String },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend cannot be reached or dropped the connection
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied {
                path,
                source: error,
            },
            _ if is_disk_full_error(&error) => StoreError::DiskFull {
                path,
                source: error,
            },
            _ => StoreError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Like `from_io`, for failures while reading
    pub fn from_read_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied {
                path,
                source: error,
            },
            _ => StoreError::ReadError {
                path,
                source: error,
            },
        }
    }

    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::Unavailable(_)
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::DiskFull { .. } => Some("Free up disk space and try again."),
            StoreError::PermissionDenied { .. } => {
                Some("Check file and directory permissions of the data directory.")
            }
            StoreError::InvalidFormat { .. } => {
                Some("The stored file was edited or truncated. Remove it to start the room over.")
            }
            StoreError::Unavailable(_) => Some("Check the connection and subscribe again."),
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Which room operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomErrorKind {
    RoomCreateFailed,
    RoomNotFound,
    ConnectionLost,
    RequestSubmitFailed,
    StatusUpdateFailed,
    RequestRemoveFailed,
    TtlExtendFailed,
}

impl RoomErrorKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RoomErrorKind::RoomCreateFailed => "room-create-failed",
            RoomErrorKind::RoomNotFound => "room-not-found",
            RoomErrorKind::ConnectionLost => "connection-lost",
            RoomErrorKind::RequestSubmitFailed => "request-submit-failed",
            RoomErrorKind::StatusUpdateFailed => "status-update-failed",
            RoomErrorKind::RequestRemoveFailed => "request-remove-failed",
            RoomErrorKind::TtlExtendFailed => "ttl-extend-failed",
        }
    }

    /// Short message suitable for showing to a person
    pub fn message(&self) -> &'static str {
        match self {
            RoomErrorKind::RoomCreateFailed => "Failed to create room",
            RoomErrorKind::RoomNotFound => "Room not found",
            RoomErrorKind::ConnectionLost => "Connection lost",
            RoomErrorKind::RequestSubmitFailed => "Failed to submit request",
            RoomErrorKind::StatusUpdateFailed => "Failed to update status",
            RoomErrorKind::RequestRemoveFailed => "Failed to remove request",
            RoomErrorKind::TtlExtendFailed => "Failed to extend room",
        }
    }
}

impl fmt::Display for RoomErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors reported by room operations
#[derive(Error, Debug)]
pub enum RoomError {
    #[error("Failed to create room: {source}")]
    CreateFailed {
        #[source]
        source: StoreError,
    },

    #[error("Room not found: {room_id}")]
    NotFound {
        room_id: String,
        #[source]
        source: Option<StoreError>,
    },

    #[error("Connection lost: {source}")]
    ConnectionLost {
        #[source]
        source: StoreError,
    },

    #[error("Failed to submit request: {source}")]
    SubmitFailed {
        #[source]
        source: StoreError,
    },

    #[error("Failed to update status: {source}")]
    StatusUpdateFailed {
        #[source]
        source: StoreError,
    },

    #[error("Failed to remove request: {source}")]
    RemoveFailed {
        #[source]
        source: StoreError,
    },

    #[error("Failed to extend room: {source}")]
    TtlExtendFailed {
        #[source]
        source: StoreError,
    },
}

impl RoomError {
    pub fn kind(&self) -> RoomErrorKind {
        match self {
            RoomError::CreateFailed { .. } => RoomErrorKind::RoomCreateFailed,
            RoomError::NotFound { .. } => RoomErrorKind::RoomNotFound,
            RoomError::ConnectionLost { .. } => RoomErrorKind::ConnectionLost,
            RoomError::SubmitFailed { .. } => RoomErrorKind::RequestSubmitFailed,
            RoomError::StatusUpdateFailed { .. } => RoomErrorKind::StatusUpdateFailed,
            RoomError::RemoveFailed { .. } => RoomErrorKind::RequestRemoveFailed,
            RoomError::TtlExtendFailed { .. } => RoomErrorKind::TtlExtendFailed,
        }
    }
}

/// The single error slot exposed by a room session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub kind: RoomErrorKind,
    pub message: String,
}

impl From<&RoomError> for LastError {
    fn from(error: &RoomError) -> Self {
        Self {
            kind: error.kind(),
            message: error.kind().message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StoreError::from_io(io_err, PathBuf::from("/test/path"));

        assert!(matches!(err, StoreError::PermissionDenied { .. }));
        assert!(err.recovery_suggestion().is_some());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StoreError::from_io(io_err, PathBuf::from("/full/disk"));

        assert!(matches!(err, StoreError::DiskFull { .. }));
    }

    #[test]
    fn test_read_error_classification() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "truncated");
        let err = StoreError::from_read_io(io_err, PathBuf::from("/data/room.json"));

        assert!(matches!(err, StoreError::ReadError { .. }));
        assert!(err.to_string().contains("/data/room.json"));
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err = StoreError::VersionConflict {
            collection: "rooms".into(),
            id: "ABC234".into(),
            expected: 3,
            actual: 4,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("expected 3, found 4"));
    }

    #[test]
    fn test_room_error_codes() {
        let err = RoomError::NotFound {
            room_id: "ZZZZZZ".into(),
            source: None,
        };
        assert_eq!(err.kind().code(), "room-not-found");
        assert_eq!(LastError::from(&err).message, "Room not found");

        let err = RoomError::ConnectionLost {
            source: StoreError::Unavailable("socket closed".into()),
        };
        assert_eq!(err.kind().to_string(), "connection-lost");
        assert!(err.to_string().contains("socket closed"));
    }
}
