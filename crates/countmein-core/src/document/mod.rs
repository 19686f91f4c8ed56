//! Document store capability
//!
//! Rooms live in a document database that offers per-document reads and
//! writes plus a live subscription delivering full snapshots. This module
//! defines that capability as a trait so sessions can be handed any backend:
//!
//! - `MemoryDocumentStore`: in-process, for tests and embedding
//! - `FileDocumentStore`: one JSON file per document, shared between processes
//!
//! Every successful write that changes a document bumps its `version` and is
//! pushed to subscribers.

mod file;
mod memory;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{StoreError, StoreResult};

pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;

/// Top-level fields of a document
pub type Fields = serde_json::Map<String, Value>;

/// Collection holding room documents
pub const ROOMS: &str = "rooms";

/// A document as read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    /// Incremented by every write that changes the document
    pub version: u64,
    pub data: Fields,
}

impl Document {
    /// Decode the document body into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Selects array elements for removal
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayMatch {
    /// Elements equal to this value
    Value(Value),
    /// Object elements whose `key` field equals `value`
    Field { key: String, value: Value },
}

impl ArrayMatch {
    pub fn by_id(id: &str) -> Self {
        ArrayMatch::Field {
            key: "id".to_string(),
            value: Value::String(id.to_string()),
        }
    }

    fn matches(&self, element: &Value) -> bool {
        match self {
            ArrayMatch::Value(expected) => element == expected,
            ArrayMatch::Field { key, value } => element.get(key) == Some(value),
        }
    }
}

/// One delivery on a subscription: the document, `None` once it is deleted,
/// or the error that ended the subscription
pub type SnapshotEvent = StoreResult<Option<Document>>;

/// Live feed of snapshots for one document
///
/// Dropping the subscription closes the channel; the store stops delivering.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<SnapshotEvent>,
}

impl Subscription {
    /// Create a subscription and the sender a store feeds it through
    pub fn channel() -> (mpsc::UnboundedSender<SnapshotEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next snapshot; `None` once the store hung up
    pub async fn next_snapshot(&mut self) -> Option<SnapshotEvent> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = SnapshotEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A document database with live subscriptions
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Write a whole document, replacing any existing one
    async fn set(&self, collection: &str, id: &str, data: Fields) -> StoreResult<()>;

    /// Write a new document; fails with `AlreadyExists` if the id is taken
    async fn create(&self, collection: &str, id: &str, data: Fields) -> StoreResult<()>;

    /// Replace the given top-level fields; fails with `NotFound` on a missing document
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    /// Like `update`, but only if the document is still at `expected_version`
    async fn update_if_version(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        fields: Fields,
    ) -> StoreResult<()>;

    /// Append `value` to an array field unless an equal element is present
    async fn append_to_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> StoreResult<()>;

    /// Remove every element of an array field selected by `matcher`
    async fn remove_from_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        matcher: &ArrayMatch,
    ) -> StoreResult<()>;

    /// Open a live subscription; the current state is delivered first
    async fn subscribe(&self, collection: &str, id: &str) -> StoreResult<Subscription>;
}

/// Merge top-level fields into a document body
///
/// Returns whether anything changed.
pub(crate) fn merge_fields(data: &mut Fields, fields: Fields) -> bool {
    let mut changed = false;
    for (key, value) in fields {
        if data.get(&key) != Some(&value) {
            data.insert(key, value);
            changed = true;
        }
    }
    changed
}

/// Add-to-set on an array field, creating the field if missing
pub(crate) fn append_unique(data: &mut Fields, field: &str, value: Value) -> StoreResult<bool> {
    let entry = data
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));

    let Value::Array(items) = entry else {
        return Err(StoreError::NotAnArray {
            field: field.to_string(),
        });
    };

    if items.contains(&value) {
        return Ok(false);
    }
    items.push(value);
    Ok(true)
}

/// Remove matching elements from an array field; a missing field is a no-op
pub(crate) fn remove_matching(
    data: &mut Fields,
    field: &str,
    matcher: &ArrayMatch,
) -> StoreResult<bool> {
    let Some(entry) = data.get_mut(field) else {
        return Ok(false);
    };

    let Value::Array(items) = entry else {
        return Err(StoreError::NotAnArray {
            field: field.to_string(),
        });
    };

    let before = items.len();
    items.retain(|item| !matcher.matches(item));
    Ok(items.len() != before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_merge_reports_changes() {
        let mut data = fields(json!({"a": 1, "b": 2}));

        assert!(!merge_fields(&mut data, fields(json!({"a": 1}))));
        assert!(merge_fields(&mut data, fields(json!({"b": 3, "c": 4}))));
        assert_eq!(Value::Object(data), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_append_is_add_to_set() {
        let mut data = Fields::new();

        assert!(append_unique(&mut data, "queue", json!({"id": "x"})).unwrap());
        assert!(!append_unique(&mut data, "queue", json!({"id": "x"})).unwrap());
        assert!(append_unique(&mut data, "queue", json!({"id": "y"})).unwrap());
        assert_eq!(data["queue"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_append_rejects_non_array() {
        let mut data = fields(json!({"queue": "nope"}));
        let err = append_unique(&mut data, "queue", json!(1)).unwrap_err();
        assert!(matches!(err, StoreError::NotAnArray { .. }));
    }

    #[test]
    fn test_remove_by_value_needs_exact_match() {
        let mut data = fields(json!({"queue": [{"id": "x", "status": "next"}]}));

        let stale = ArrayMatch::Value(json!({"id": "x", "status": "pending"}));
        assert!(!remove_matching(&mut data, "queue", &stale).unwrap());

        let exact = ArrayMatch::Value(json!({"id": "x", "status": "next"}));
        assert!(remove_matching(&mut data, "queue", &exact).unwrap());
        assert!(data["queue"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_remove_by_id_ignores_other_fields() {
        let mut data = fields(json!({"queue": [
            {"id": "x", "status": "next"},
            {"id": "y", "status": "pending"}
        ]}));

        assert!(remove_matching(&mut data, "queue", &ArrayMatch::by_id("x")).unwrap());
        assert_eq!(Value::Object(data), json!({"queue": [{"id": "y", "status": "pending"}]}));
    }

    #[test]
    fn test_remove_from_missing_field_is_noop() {
        let mut data = Fields::new();
        assert!(!remove_matching(&mut data, "queue", &ArrayMatch::by_id("x")).unwrap());
    }

    #[test]
    fn test_decode_document() {
        #[derive(serde::Deserialize)]
        struct Sample {
            name: String,
        }

        let doc = Document {
            id: "d".into(),
            version: 1,
            data: fields(json!({"name": "sample"})),
        };
        assert_eq!(doc.decode::<Sample>().unwrap().name, "sample");
    }
}
