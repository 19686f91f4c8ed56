//! Room codes and opaque identifiers
//!
//! Room codes are the 6 symbols people read aloud or type in, drawn from an
//! alphabet without I, O, 0 and 1. Request, host and notification ids are
//! `<prefix>_<epoch-millis>_<base36>` tokens; nothing parses them.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Symbols a room code may contain
pub const ROOM_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of symbols in a room code
pub const ROOM_CODE_LEN: usize = 6;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 7;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoomCodeError {
    #[error("Room code must be 6 characters, got {0}")]
    InvalidLength(usize),

    #[error("Room code contains invalid character '{0}'")]
    InvalidCharacter(char),
}

/// A shareable room code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Generate a random code
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parse user input; lowercase is accepted and surrounding whitespace ignored
    pub fn parse(input: &str) -> Result<Self, RoomCodeError> {
        let code = input.trim().to_ascii_uppercase();

        let len = code.chars().count();
        if len != ROOM_CODE_LEN {
            return Err(RoomCodeError::InvalidLength(len));
        }

        if let Some(bad) = code
            .chars()
            .find(|c| !c.is_ascii() || !ROOM_CODE_ALPHABET.contains(&(*c as u8)))
        {
            return Err(RoomCodeError::InvalidCharacter(bad));
        }

        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shareable link guests open to join
    pub fn join_link(&self, base_url: &str) -> String {
        join_link(base_url, &self.0)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl AsRef<str> for RoomCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Shareable join link, `<base>/join/<room id>`
pub fn join_link(base_url: &str, room_id: &str) -> String {
    format!("{}/join/{}", base_url.trim_end_matches('/'), room_id)
}

/// Id for a new song request
pub fn request_id() -> String {
    prefixed_id("req")
}

/// Token identifying the host of a room
pub fn host_id() -> String {
    prefixed_id("host")
}

/// Id for a local notification
pub fn notification_id() -> String {
    prefixed_id("notif")
}

fn prefixed_id(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        Utc::now().timestamp_millis(),
        base36_suffix(&mut rand::thread_rng())
    )
}

fn base36_suffix<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}
