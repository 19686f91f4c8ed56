//! Self-expiring notifications
//!
//! Each notification gets its own timer task that removes it once its time to
//! live has passed. Removing it by hand first turns that timer into a no-op.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::{Notification, NotificationKind};

/// The list of live notifications
pub struct NotificationCenter {
    list: Arc<watch::Sender<Vec<Notification>>>,
    ttl: Duration,
}

impl NotificationCenter {
    pub fn new(ttl: Duration) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            list: Arc::new(tx),
            ttl,
        }
    }

    /// Add a notification and schedule its removal; returns its id
    ///
    /// Timers run on the current Tokio runtime. Outside of one the
    /// notification stays until removed by hand.
    pub fn add(&self, message: impl Into<String>, kind: NotificationKind) -> String {
        let notification = Notification::new(message, kind);
        let id = notification.id.clone();
        let deadline = Instant::now() + self.ttl;

        debug!("Notification {}: {}", id, notification.message);
        self.list.send_modify(|list| list.push(notification));

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let list = Arc::downgrade(&self.list);
                let timer_id = id.clone();
                handle.spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    if let Some(list) = list.upgrade() {
                        remove_from(&list, &timer_id);
                    }
                });
            }
            Err(_) => warn!("No async runtime; notification {} will not expire", id),
        }

        id
    }

    /// Remove a notification; returns whether it was present
    pub fn remove(&self, id: &str) -> bool {
        remove_from(&self.list, id)
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.list.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<Notification>> {
        self.list.subscribe()
    }
}

fn remove_from(list: &watch::Sender<Vec<Notification>>, id: &str) -> bool {
    list.send_if_modified(|list| {
        let before = list.len();
        list.retain(|n| n.id != id);
        list.len() != before
    })
}
