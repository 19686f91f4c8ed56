//! End-to-end queue flows with a host and a guest sharing one store

use std::sync::Arc;
use std::time::Duration;

use countmein_core::{
    DocumentStore, FileDocumentStore, HostIdentityStore, MemoryDocumentStore, MemoryKeyValueStore,
    RequestStatus, RoomSession, SessionOptions, WriteMode,
};
use tempfile::TempDir;

fn session(
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn HostIdentityStore>,
    write_mode: WriteMode,
) -> RoomSession {
    RoomSession::new(
        store,
        identity,
        SessionOptions {
            write_mode,
            ..SessionOptions::default()
        },
    )
}

/// Host and guest on separate devices
fn pair(store: Arc<dyn DocumentStore>, write_mode: WriteMode) -> (RoomSession, RoomSession) {
    let host = session(
        store.clone(),
        Arc::new(MemoryKeyValueStore::new()),
        write_mode,
    );
    let guest = session(store, Arc::new(MemoryKeyValueStore::new()), write_mode);
    (host, guest)
}

async fn wait_until(session: &RoomSession, what: &str, check: impl Fn(&RoomSession) -> bool) {
    let mut rx = session.watch_room();
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check(session) {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

fn status_of(session: &RoomSession, song: &str) -> Option<RequestStatus> {
    session
        .queue()
        .into_iter()
        .find(|r| r.song_name == song)
        .map(|r| r.status)
}

async fn next_and_ongoing_are_independent(store: Arc<dyn DocumentStore>, write_mode: WriteMode) {
    let (host, guest) = pair(store, write_mode);

    let room = host.create_room().await.unwrap();
    assert!(host.is_host(&room.id));
    assert!(host.room_exists(&room.id).await);
    host.subscribe_to_room(&room.id).await.unwrap();

    let song_a = guest
        .add_song_request(&room.id, "Ann", "Song A", None)
        .await
        .unwrap();
    wait_until(&host, "Song A", |s| s.queue().len() == 1).await;

    host.update_request_status(&room.id, &song_a.id, RequestStatus::Next)
        .await
        .unwrap();
    wait_until(&host, "Song A to be next", |s| {
        status_of(s, "Song A") == Some(RequestStatus::Next)
    })
    .await;
    assert_eq!(host.queue().len(), 1);

    let song_b = guest
        .add_song_request(&room.id, "Bo", "Song B", Some("https://youtu.be/b"))
        .await
        .unwrap();
    wait_until(&host, "Song B", |s| s.queue().len() == 2).await;

    host.update_request_status(&room.id, &song_b.id, RequestStatus::Ongoing)
        .await
        .unwrap();
    wait_until(&host, "Song B on stage", |s| {
        status_of(s, "Song B") == Some(RequestStatus::Ongoing)
    })
    .await;

    assert_eq!(status_of(&host, "Song A"), Some(RequestStatus::Next));
    assert_eq!(host.next_request().map(|r| r.id), Some(song_a.id.clone()));
    assert_eq!(host.ongoing_request().map(|r| r.id), Some(song_b.id.clone()));

    // Starting Song A finishes Song B
    host.update_request_status(&room.id, &song_a.id, RequestStatus::Ongoing)
        .await
        .unwrap();
    wait_until(&host, "Song B to finish", |s| {
        status_of(s, "Song B") == Some(RequestStatus::Completed)
    })
    .await;
    assert_eq!(status_of(&host, "Song A"), Some(RequestStatus::Ongoing));
    assert!(host.next_request().is_none());
    assert_eq!(host.completed_requests().len(), 1);

    // Guest never became host
    assert!(!guest.is_host(&room.id));

    host.remove_request(&room.id, &song_b.id).await.unwrap();
    wait_until(&host, "Song B removal", |s| s.queue().len() == 1).await;

    host.unsubscribe_from_room();
    assert!(host.current_room().is_none());
    assert!(host.error().is_none());
}

#[tokio::test]
async fn test_queue_flow_last_writer_wins() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    next_and_ongoing_are_independent(store, WriteMode::LastWriterWins).await;
}

#[tokio::test]
async fn test_queue_flow_versioned() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    next_and_ongoing_are_independent(store, WriteMode::Versioned).await;
}

#[tokio::test]
async fn test_queue_flow_on_disk() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(FileDocumentStore::new(
        dir.path().join("rooms"),
        Duration::from_millis(10),
    ));
    next_and_ongoing_are_independent(store, WriteMode::Versioned).await;
}

#[tokio::test]
async fn test_guest_view_follows_host_changes() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let (host, guest) = pair(store, WriteMode::LastWriterWins);

    let room = host.create_room().await.unwrap();
    host.subscribe_to_room(&room.id).await.unwrap();
    guest.subscribe_to_room(&room.id).await.unwrap();
    assert!(!guest.is_host(&room.id));

    let request = guest
        .add_song_request(&room.id, "Ann", "Song A", None)
        .await
        .unwrap();
    wait_until(&host, "request at host", |s| s.queue().len() == 1).await;

    host.update_request_status(&room.id, &request.id, RequestStatus::Ongoing)
        .await
        .unwrap();
    wait_until(&guest, "status at guest", |s| {
        status_of(s, "Song A") == Some(RequestStatus::Ongoing)
    })
    .await;

    // Only the host hears about new requests
    assert!(guest.notifications().is_empty());
    assert_eq!(host.notifications().len(), 1);
    assert!(host.notifications()[0].message.contains("Song A"));
}

#[tokio::test]
async fn test_host_token_survives_new_session() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let identity: Arc<dyn HostIdentityStore> = Arc::new(MemoryKeyValueStore::new());

    let first = session(store.clone(), identity.clone(), WriteMode::LastWriterWins);
    let room = first.create_room().await.unwrap();
    drop(first);

    // Same device after a reload
    let second = session(store, identity, WriteMode::LastWriterWins);
    assert!(!second.is_host(&room.id));
    second.subscribe_to_room(&room.id).await.unwrap();
    assert!(second.is_host(&room.id));
    assert_eq!(second.current_host_id().as_deref(), Some(room.host_id.as_str()));
}
