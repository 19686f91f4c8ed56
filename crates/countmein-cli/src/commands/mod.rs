//! Command handlers

pub mod config;
pub mod request;
pub mod room;
pub mod watch;

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use countmein_core::{
    Config, FileDocumentStore, FileKeyValueStore, RoomCode, RoomSession, SessionOptions,
};

/// Build a session over the file store in the data directory
pub fn open_session(config: &Config) -> RoomSession {
    let store = FileDocumentStore::new(config.rooms_dir(), config.poll_interval());
    let identity = FileKeyValueStore::new(config.host_tokens_path());
    RoomSession::new(
        Arc::new(store),
        Arc::new(identity),
        SessionOptions::from(config),
    )
}

/// Parse a room code typed by a person
pub fn parse_code(code: &str) -> Result<RoomCode> {
    RoomCode::parse(code).with_context(|| format!("Invalid room code '{}'", code))
}

/// Load the room into the session and make sure this device hosts it
pub async fn join_as_host(session: &RoomSession, code: &RoomCode) -> Result<()> {
    session
        .subscribe_to_room(code.as_str())
        .await
        .with_context(|| format!("Could not open room {}", code))?;

    if !session.is_host(code.as_str()) {
        bail!("Only the host of room {} can do that", code);
    }
    Ok(())
}
