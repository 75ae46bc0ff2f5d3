//! Fan-out of entry changes to WebSocket subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use nutrisnap_core::LogEntry;

/// A user's full entry list after a change.
pub type EntriesSnapshot = Arc<Vec<LogEntry>>;

/// Broadcast channels keyed by uid.
pub struct EntryHub {
    channels: RwLock<HashMap<String, broadcast::Sender<EntriesSnapshot>>>,
}

impl EntryHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, uid: &str) -> broadcast::Receiver<EntriesSnapshot> {
        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(uid) {
            sender.subscribe()
        } else {
            let (sender, receiver) = broadcast::channel(16);
            channels.insert(uid.to_string(), sender);
            receiver
        }
    }

    /// Sends the new entry list to every subscriber of `uid`.
    ///
    /// A channel whose receivers are all gone is dropped.
    pub async fn publish(&self, uid: &str, entries: Vec<LogEntry>) {
        let snapshot = Arc::new(entries);
        let mut channels = self.channels.write().await;

        match channels.get(uid).map(|sender| sender.send(snapshot)) {
            Some(Ok(count)) => {
                tracing::debug!("Pushed entries of {} to {} subscriber(s)", uid, count)
            }
            Some(Err(_)) => {
                channels.remove(uid);
            }
            None => {}
        }
    }

    pub async fn subscriber_count(&self, uid: &str) -> usize {
        self.channels
            .read()
            .await
            .get(uid)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EntryHub {
    fn default() -> Self {
        Self::new()
    }
}
