//! CountMeIn Core Library
//!
//! This crate provides the core functionality for CountMeIn, a shared
//! song-request queue for karaoke and open-mic nights. A host creates a room,
//! guests join with its 6-character code and submit songs, and every device
//! watching the room sees the queue change live.
//!
//! # Architecture
//!
//! - **Document store**: source of truth for rooms; one document per room,
//!   with live subscriptions delivering full snapshots
//! - **Room session**: the client-side view of one room, replaced wholesale
//!   by every snapshot
//!
//! # Quick Start
//!
//! ```text
//! let store = Arc::new(MemoryDocumentStore::new());
//! let identity = Arc::new(MemoryKeyValueStore::new());
//! let session = RoomSession::new(store, identity, SessionOptions::default());
//!
//! let room = session.create_room().await?;
//! session.subscribe_to_room(&room.id).await?;
//! session.add_song_request(&room.id, "Ann", "Song A", None).await?;
//! ```
//!
//! # Modules
//!
//! - `session`: Room sessions (main entry point)
//! - `models`: Rooms, song requests and notifications
//! - `queue`: Status transitions of the queue
//! - `document`: Document store capability and its implementations
//! - `identity`: Device-local host tokens
//! - `ids`: Room codes and generated ids
//! - `config`: Application configuration

pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod ids;
pub mod models;
pub mod persistence;
pub mod queue;
pub mod session;

pub use config::{Config, WriteMode, MAX_ROOM_TTL_HOURS};
pub use document::{
    ArrayMatch, Document, DocumentStore, FileDocumentStore, MemoryDocumentStore, Subscription,
};
pub use error::{LastError, RoomError, RoomErrorKind, StoreError, StoreResult};
pub use identity::{FileKeyValueStore, HostIdentityStore, MemoryKeyValueStore};
pub use ids::{RoomCode, RoomCodeError};
pub use models::{Notification, NotificationKind, RequestStatus, Room, SongRequest};
pub use session::{RoomSession, SessionOptions};
