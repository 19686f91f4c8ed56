//! Room sessions
//!
//! A `RoomSession` is the single point of truth for the room currently being
//! viewed. It creates rooms, follows one room through a live subscription,
//! and issues the writes guests and hosts make against the shared queue.
//!
//! Writes never touch local state directly: the durable document changes and
//! the new snapshot comes back through the subscription, replacing the local
//! copy wholesale.
//!
//! # Example
//!
//! ```text
//! let session = RoomSession::new(store, identity, SessionOptions::default());
//! let room = session.create_room().await?;
//! session.subscribe_to_room(&room.id).await?;
//! session.add_song_request(&room.id, "Ann", "Song A", None).await?;
//! ```

mod notifications;

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, WriteMode};
use crate::document::{ArrayMatch, DocumentStore, Fields, SnapshotEvent, Subscription, ROOMS};
use crate::error::{LastError, RoomError, StoreError, StoreResult};
use crate::identity::HostIdentityStore;
use crate::ids::{self, RoomCode};
use crate::models::{
    expiry_after, Notification, NotificationKind, RequestStatus, Room, SongRequest,
};
use crate::queue::apply_status_change;

pub use notifications::NotificationCenter;

const QUEUE_FIELD: &str = "queue";

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Lifetime of a new room
    pub room_ttl: chrono::Duration,
    /// How long a notification stays up
    pub notification_ttl: Duration,
    pub write_mode: WriteMode,
    /// Versioned writes give up after this many conflicts
    pub max_write_attempts: u32,
    /// Room creation gives up after this many taken codes
    pub max_code_attempts: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            room_ttl: chrono::Duration::hours(24),
            notification_ttl: Duration::from_secs(5),
            write_mode: WriteMode::default(),
            max_write_attempts: 5,
            max_code_attempts: 5,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            room_ttl: config.room_ttl(),
            notification_ttl: config.notification_ttl(),
            write_mode: config.write_mode,
            max_write_attempts: config.max_write_attempts,
            max_code_attempts: config.max_code_attempts,
        }
    }
}

/// Client-side view of one room
pub struct RoomSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn HostIdentityStore>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    room: watch::Sender<Option<Room>>,
    notifications: NotificationCenter,
}

#[derive(Default)]
struct SessionState {
    host_id: Option<String>,
    owner_id: Option<String>,
    last_error: Option<LastError>,
    in_flight: usize,
    /// Bumped whenever a subscription starts or ends
    generation: u64,
    pump: Option<JoinHandle<()>>,
}

/// Marks a store call in flight for `is_loading`
struct Loading<'a> {
    inner: &'a SessionInner,
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start an awaited operation, clearing the previous error
    fn begin(&self) -> Loading<'_> {
        let mut state = self.lock();
        state.in_flight += 1;
        state.last_error = None;
        Loading { inner: self }
    }

    fn fail(&self, err: RoomError) -> RoomError {
        record_error(&mut self.lock(), &err);
        err
    }

    /// Apply one subscription delivery; returns whether to keep listening
    fn apply_snapshot(&self, generation: u64, event: SnapshotEvent) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            debug!("Dropping snapshot from cancelled subscription");
            return false;
        }

        match event {
            Ok(Some(doc)) => {
                let room: Room = match doc.decode() {
                    Ok(room) => room,
                    Err(e) => {
                        warn!("Ignoring unreadable snapshot of room {}: {}", doc.id, e);
                        return true;
                    }
                };

                let announcement = {
                    let previous = self.room.borrow();
                    let grew = previous
                        .as_ref()
                        .is_some_and(|prev| room.queue.len() > prev.queue.len());
                    if state.host_id.is_some() && grew {
                        room.queue
                            .last()
                            .map(|r| format!("{} requested \"{}\"", r.guest_name, r.song_name))
                    } else {
                        None
                    }
                };

                debug!(
                    "Room {} at version {} with {} requests",
                    room.id,
                    doc.version,
                    room.queue.len()
                );
                self.room.send_replace(Some(room));
                drop(state);

                if let Some(message) = announcement {
                    self.notifications.add(message, NotificationKind::Info);
                }
                true
            }
            Ok(None) => {
                info!("Room document is gone");
                self.room.send_replace(None);
                true
            }
            Err(source) => {
                record_error(&mut state, &RoomError::ConnectionLost { source });
                false
            }
        }
    }
}

fn record_error(state: &mut SessionState, err: &RoomError) {
    error!("{} ({})", err, err.kind());
    state.last_error = Some(LastError::from(err));
}

async fn run_pump(inner: Weak<SessionInner>, generation: u64, mut subscription: Subscription) {
    while let Some(event) = subscription.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.apply_snapshot(generation, event) {
            break;
        }
    }
    debug!("Subscription pump {} finished", generation);
}

fn queue_fields(queue: &[SongRequest]) -> StoreResult<Fields> {
    let mut fields = Fields::new();
    fields.insert(QUEUE_FIELD.to_string(), serde_json::to_value(queue)?);
    Ok(fields)
}

fn missing_room(room_id: &str) -> StoreError {
    StoreError::NotFound {
        collection: ROOMS.to_string(),
        id: room_id.to_string(),
    }
}

impl RoomSession {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn HostIdentityStore>,
        options: SessionOptions,
    ) -> Self {
        let (room, _rx) = watch::channel(None);
        let notifications = NotificationCenter::new(options.notification_ttl);
        Self {
            inner: Arc::new(SessionInner {
                store,
                identity,
                options,
                state: Mutex::new(SessionState::default()),
                room,
                notifications,
            }),
        }
    }

    /// Account recorded as owner of rooms created from now on
    pub fn set_owner(&self, owner_id: Option<String>) {
        self.inner.lock().owner_id = owner_id;
    }

    /// Create a room with an empty queue and become its host
    ///
    /// Taken codes are retried with a fresh one up to `max_code_attempts`.
    pub async fn create_room(&self) -> Result<Room, RoomError> {
        let inner = &self.inner;
        let _loading = inner.begin();

        let host_id = ids::host_id();
        let owner_id = inner.lock().owner_id.clone();
        let max_attempts = inner.options.max_code_attempts.max(1);

        let mut attempt = 0;
        let room = loop {
            attempt += 1;
            let code = RoomCode::generate();
            let room = Room::new(
                code.as_str(),
                host_id.as_str(),
                owner_id.clone(),
                Utc::now(),
                inner.options.room_ttl,
            )
            .map_err(|source| inner.fail(RoomError::CreateFailed { source }))?;
            let fields = room
                .to_fields()
                .map_err(|source| inner.fail(RoomError::CreateFailed { source }))?;

            match inner.store.create(ROOMS, &room.id, fields).await {
                Ok(()) => break room,
                Err(StoreError::AlreadyExists { .. }) if attempt < max_attempts => {
                    debug!("Room code {} is taken, trying another", code);
                }
                Err(source) => return Err(inner.fail(RoomError::CreateFailed { source })),
            }
        };

        inner.lock().host_id = Some(host_id.clone());
        inner
            .identity
            .set_host_token(&room.id, &host_id)
            .map_err(|source| inner.fail(RoomError::CreateFailed { source }))?;

        info!("Created room {} (expires {})", room.id, room.expires_at);
        Ok(room)
    }

    /// Whether the room exists; a failed read counts as absent
    pub async fn room_exists(&self, room_id: &str) -> bool {
        match self.try_room_exists(room_id).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Error checking room {}: {}", room_id, e);
                false
            }
        }
    }

    /// Whether the room exists, keeping read failures apart from absence
    pub async fn try_room_exists(&self, room_id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.store.get(ROOMS, room_id).await?.is_some())
    }

    /// Follow a room, replacing any room followed before
    pub async fn subscribe_to_room(&self, room_id: &str) -> Result<(), RoomError> {
        self.unsubscribe_from_room();

        let inner = &self.inner;
        let _loading = inner.begin();

        let not_found = |source: Option<StoreError>| RoomError::NotFound {
            room_id: room_id.to_string(),
            source,
        };

        let room: Room = match inner.store.get(ROOMS, room_id).await {
            Ok(Some(doc)) => doc
                .decode()
                .map_err(|source| inner.fail(not_found(Some(source))))?,
            Ok(None) => return Err(inner.fail(not_found(None))),
            Err(source) => return Err(inner.fail(not_found(Some(source)))),
        };

        match inner.identity.host_token(room_id) {
            Ok(Some(token)) => inner.lock().host_id = Some(token),
            Ok(None) => {}
            Err(e) => warn!("Could not read host token for {}: {}", room_id, e),
        }

        let subscription = inner
            .store
            .subscribe(ROOMS, room_id)
            .await
            .map_err(|source| inner.fail(RoomError::ConnectionLost { source }))?;

        let mut state = inner.lock();
        state.generation += 1;
        let generation = state.generation;
        inner.room.send_replace(Some(room));

        let pump = tokio::spawn(run_pump(Arc::downgrade(inner), generation, subscription));
        if let Some(previous) = state.pump.replace(pump) {
            previous.abort();
        }

        info!("Subscribed to room {}", room_id);
        Ok(())
    }

    /// Stop following the current room; does nothing when there is none
    pub fn unsubscribe_from_room(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        if let Some(pump) = state.pump.take() {
            pump.abort();
            debug!("Unsubscribed");
        }
        self.inner.room.send_replace(None);
    }

    /// Submit a song request as a guest
    pub async fn add_song_request(
        &self,
        room_id: &str,
        guest_name: &str,
        song_name: &str,
        youtube_link: Option<&str>,
    ) -> Result<SongRequest, RoomError> {
        let inner = &self.inner;
        let _loading = inner.begin();

        let request = SongRequest::new(guest_name, song_name, youtube_link.map(str::to_string));
        let value = request
            .to_value()
            .map_err(|source| inner.fail(RoomError::SubmitFailed { source }))?;

        inner
            .store
            .append_to_array(ROOMS, room_id, QUEUE_FIELD, value)
            .await
            .map_err(|source| inner.fail(RoomError::SubmitFailed { source }))?;

        info!("{} requested \"{}\" in {}", guest_name, song_name, room_id);
        Ok(request)
    }

    /// Move a request to `status`, evicting the holder of its slot
    ///
    /// A request that cannot be found is left alone without error.
    pub async fn update_request_status(
        &self,
        room_id: &str,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<(), RoomError> {
        let _loading = self.inner.begin();
        match self.inner.options.write_mode {
            WriteMode::LastWriterWins => self.write_status_local(room_id, request_id, status).await,
            WriteMode::Versioned => {
                self.write_status_versioned(room_id, request_id, status)
                    .await
            }
        }
    }

    /// Recompute from the local snapshot and overwrite the stored queue
    async fn write_status_local(
        &self,
        room_id: &str,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<(), RoomError> {
        let inner = &self.inner;

        let queue = {
            let current = inner.room.borrow();
            let Some(room) = current.as_ref().filter(|room| room.id == room_id) else {
                debug!("Room {} is not loaded; ignoring status change", room_id);
                return Ok(());
            };
            let mut queue = room.queue.clone();
            if !apply_status_change(&mut queue, request_id, status) {
                debug!("Request {} not in queue; ignoring", request_id);
                return Ok(());
            }
            queue
        };

        let fields = queue_fields(&queue)
            .map_err(|source| inner.fail(RoomError::StatusUpdateFailed { source }))?;
        inner
            .store
            .update(ROOMS, room_id, fields)
            .await
            .map_err(|source| inner.fail(RoomError::StatusUpdateFailed { source }))?;

        info!("Request {} is now {}", request_id, status);
        Ok(())
    }

    /// Recompute from the stored document and write with a version check
    async fn write_status_versioned(
        &self,
        room_id: &str,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<(), RoomError> {
        let inner = &self.inner;
        let fail = |source: StoreError| inner.fail(RoomError::StatusUpdateFailed { source });
        let max_attempts = inner.options.max_write_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;

            let doc = inner
                .store
                .get(ROOMS, room_id)
                .await
                .map_err(fail)?
                .ok_or_else(|| fail(missing_room(room_id)))?;
            let mut room: Room = doc.decode().map_err(fail)?;

            if !apply_status_change(&mut room.queue, request_id, status) {
                debug!("Request {} not in queue; ignoring", request_id);
                return Ok(());
            }

            let fields = queue_fields(&room.queue).map_err(fail)?;
            match inner
                .store
                .update_if_version(ROOMS, room_id, doc.version, fields)
                .await
            {
                Ok(()) => {
                    info!("Request {} is now {}", request_id, status);
                    return Ok(());
                }
                Err(StoreError::VersionConflict { actual, .. }) if attempt < max_attempts => {
                    debug!(
                        "Room {} moved to version {} during write, retrying ({}/{})",
                        room_id, actual, attempt, max_attempts
                    );
                }
                Err(source) => return Err(fail(source)),
            }
        }
    }

    /// Remove a request from the queue by id
    ///
    /// Only requests present in the local snapshot of `room_id` are removed.
    pub async fn remove_request(&self, room_id: &str, request_id: &str) -> Result<(), RoomError> {
        let inner = &self.inner;

        let known = inner
            .room
            .borrow()
            .as_ref()
            .is_some_and(|room| room.id == room_id && room.find_request(request_id).is_some());
        if !known {
            debug!("Request {} not in local queue; ignoring removal", request_id);
            return Ok(());
        }

        let _loading = inner.begin();
        inner
            .store
            .remove_from_array(ROOMS, room_id, QUEUE_FIELD, &ArrayMatch::by_id(request_id))
            .await
            .map_err(|source| inner.fail(RoomError::RemoveFailed { source }))?;

        info!("Removed request {} from {}", request_id, room_id);
        Ok(())
    }

    /// Push the room's expiry `hours` past the later of now and its current expiry
    pub async fn extend_room_ttl(
        &self,
        room_id: &str,
        hours: u32,
    ) -> Result<DateTime<Utc>, RoomError> {
        let inner = &self.inner;
        let _loading = inner.begin();
        let fail = |source: StoreError| inner.fail(RoomError::TtlExtendFailed { source });

        let doc = inner
            .store
            .get(ROOMS, room_id)
            .await
            .map_err(fail)?
            .ok_or_else(|| fail(missing_room(room_id)))?;
        let room: Room = doc.decode().map_err(fail)?;

        let extension = chrono::Duration::try_hours(i64::from(hours)).ok_or_else(|| {
            fail(StoreError::OutOfRange {
                field: "expiresAt".to_string(),
                details: format!("{} hours is too long", hours),
            })
        })?;
        let expires_at = expiry_after(room.expires_at.max(Utc::now()), extension).map_err(fail)?;

        let mut fields = Fields::new();
        fields.insert(
            "expiresAt".to_string(),
            serde_json::to_value(expires_at)
                .map_err(|e| fail(StoreError::Serialization(e)))?,
        );
        inner
            .store
            .update(ROOMS, room_id, fields)
            .await
            .map_err(fail)?;

        info!("Room {} now expires {}", room_id, expires_at);
        Ok(expires_at)
    }

    /// Whether this session holds the host token stored for the room
    pub fn is_host(&self, room_id: &str) -> bool {
        let stored = match self.inner.identity.host_token(room_id) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not read host token for {}: {}", room_id, e);
                return false;
            }
        };
        let state = self.inner.lock();
        matches!((stored, state.host_id.as_deref()), (Some(stored), Some(held)) if stored == held)
    }

    /// Show a local notification; returns its id
    pub fn add_notification(&self, message: impl Into<String>, kind: NotificationKind) -> String {
        self.inner.notifications.add(message, kind)
    }

    pub fn remove_notification(&self, id: &str) -> bool {
        self.inner.notifications.remove(id)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.notifications.snapshot()
    }

    pub fn watch_notifications(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.notifications.watch()
    }

    pub fn current_room(&self) -> Option<Room> {
        self.inner.room.borrow().clone()
    }

    /// Receiver that sees every replacement of the current room
    pub fn watch_room(&self) -> watch::Receiver<Option<Room>> {
        self.inner.room.subscribe()
    }

    pub fn queue(&self) -> Vec<SongRequest> {
        self.with_room(|room| room.queue.clone())
            .unwrap_or_default()
    }

    pub fn pending_requests(&self) -> Vec<SongRequest> {
        self.with_room(|room| room.pending_requests().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn next_request(&self) -> Option<SongRequest> {
        self.with_room(|room| room.next_request().cloned()).flatten()
    }

    pub fn ongoing_request(&self) -> Option<SongRequest> {
        self.with_room(|room| room.ongoing_request().cloned())
            .flatten()
    }

    pub fn completed_requests(&self) -> Vec<SongRequest> {
        self.with_room(|room| room.completed_requests().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    fn with_room<T>(&self, f: impl FnOnce(&Room) -> T) -> Option<T> {
        self.inner.room.borrow().as_ref().map(f)
    }

    /// The last error any operation reported
    pub fn error(&self) -> Option<LastError> {
        self.inner.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.inner.lock().last_error = None;
    }

    /// Whether an awaited store call is in flight
    pub fn is_loading(&self) -> bool {
        self.inner.lock().in_flight > 0
    }

    pub fn current_host_id(&self) -> Option<String> {
        self.inner.lock().host_id.clone()
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        if let Some(pump) = self.inner.lock().pump.take() {
            pump.abort();
        }
    }
}
