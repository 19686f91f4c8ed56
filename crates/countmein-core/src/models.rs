//! Data models for CountMeIn
//!
//! Defines the core data structures: Room, SongRequest and Notification.
//! Rooms and requests are stored as JSON documents with camelCase keys;
//! optional fields are left out of the document when absent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Fields;
use crate::error::{StoreError, StoreResult};
use crate::ids;

/// Where a request stands in the evening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Next,
    Ongoing,
    Completed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::Next,
        RequestStatus::Ongoing,
        RequestStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Next => "next",
            RequestStatus::Ongoing => "ongoing",
            RequestStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Unknown status '{}'. Expected one of: pending, next, ongoing, completed",
                    s
                )
            })
    }
}

/// A song a guest asked to perform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SongRequest {
    /// Unique identifier within the room
    pub id: String,
    /// Who asked
    pub guest_name: String,
    /// What they want to sing
    pub song_name: String,
    /// Optional karaoke track link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_link: Option<String>,
    pub status: RequestStatus,
    /// When the request was submitted
    pub submitted_at: DateTime<Utc>,
}

impl SongRequest {
    /// Create a pending request stamped with the current time
    ///
    /// A blank link counts as no link.
    pub fn new(
        guest_name: impl Into<String>,
        song_name: impl Into<String>,
        youtube_link: Option<String>,
    ) -> Self {
        Self {
            id: ids::request_id(),
            guest_name: guest_name.into(),
            song_name: song_name.into(),
            youtube_link: youtube_link
                .map(|link| link.trim().to_string())
                .filter(|link| !link.is_empty()),
            status: RequestStatus::Pending,
            submitted_at: Utc::now(),
        }
    }

    /// Persisted form of this request
    pub fn to_value(&self) -> StoreResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A room and its queue, as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// The 6-character room code
    pub id: String,
    /// Token of the device that created the room
    pub host_id: String,
    /// Account that owns the room, when the host was signed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the backend may delete the room
    pub expires_at: DateTime<Utc>,
    /// Requests in submission order
    #[serde(default)]
    pub queue: Vec<SongRequest>,
}

impl Room {
    /// Create an empty room expiring `ttl` after `created_at`
    ///
    /// Fails when the expiry is past the representable date range.
    pub fn new(
        id: impl Into<String>,
        host_id: impl Into<String>,
        owner_id: Option<String>,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> StoreResult<Self> {
        let expires_at = expiry_after(created_at, ttl)?;
        Ok(Self {
            id: id.into(),
            host_id: host_id.into(),
            owner_id,
            created_at,
            expires_at,
            queue: Vec::new(),
        })
    }

    /// Persisted form of this room
    pub fn to_fields(&self) -> StoreResult<Fields> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(fields) => Ok(fields),
            _ => Err(StoreError::InvalidFormat {
                path: self.id.clone().into(),
                details: "room did not serialize to an object".to_string(),
            }),
        }
    }

    pub fn find_request(&self, request_id: &str) -> Option<&SongRequest> {
        self.queue.iter().find(|r| r.id == request_id)
    }

    pub fn pending_requests(&self) -> Vec<&SongRequest> {
        self.with_status(RequestStatus::Pending)
    }

    pub fn next_request(&self) -> Option<&SongRequest> {
        self.queue.iter().find(|r| r.status == RequestStatus::Next)
    }

    pub fn ongoing_request(&self) -> Option<&SongRequest> {
        self.queue.iter().find(|r| r.status == RequestStatus::Ongoing)
    }

    pub fn completed_requests(&self) -> Vec<&SongRequest> {
        self.with_status(RequestStatus::Completed)
    }

    fn with_status(&self, status: RequestStatus) -> Vec<&SongRequest> {
        self.queue.iter().filter(|r| r.status == status).collect()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the backend may already delete this room
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// `from + ttl`, or `OutOfRange` when that date cannot be represented
pub fn expiry_after(from: DateTime<Utc>, ttl: chrono::Duration) -> StoreResult<DateTime<Utc>> {
    from.checked_add_signed(ttl).ok_or_else(|| StoreError::OutOfRange {
        field: "expiresAt".to_string(),
        details: format!("{} plus {} is past the supported date range", from, ttl),
    })
}

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// A short-lived local message, never stored
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            id: ids::notification_id(),
            message: message.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}
