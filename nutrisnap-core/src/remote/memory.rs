use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{PushSender, RemoteError, RemoteStore, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::models::{LogEntry, ProfileUpdate, UserProfile};

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, Vec<LogEntry>>,
    profiles: HashMap<String, UserProfile>,
    subscribers: HashMap<String, Vec<(u64, PushSender)>>,
    next_subscriber: u64,
}

impl MemoryState {
    /// Pushes the current collection of `uid` to its subscribers.
    fn notify(&mut self, uid: &str) {
        let snapshot = self.entries.get(uid).cloned().unwrap_or_default();
        if let Some(subscribers) = self.subscribers.get_mut(uid) {
            subscribers.retain(|(_, tx)| tx.send(snapshot.clone()).is_ok());
        }
    }
}

/// In-process remote store with the same semantics as the server.
///
/// Cloning shares the same data.
#[derive(Clone)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
        }
    }

    /// Seeds entries for `uid` as they would be after earlier adds.
    pub fn seed(&self, uid: &str, entries: impl IntoIterator<Item = LogEntry>) {
        let mut state = self.lock();
        let stored = state.entries.entry(uid.to_string()).or_default();
        for entry in entries {
            let id = entry.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
            stored.push(LogEntry {
                id: Some(id),
                ..entry
            });
        }
        state.notify(uid);
    }

    /// Current entries of `uid`, without going through the async API.
    pub fn snapshot(&self, uid: &str) -> Vec<LogEntry> {
        self.lock().entries.get(uid).cloned().unwrap_or_default()
    }

    pub fn subscriber_count(&self, uid: &str) -> usize {
        self.lock().subscribers.get(uid).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list(&self, uid: &str) -> Result<Vec<LogEntry>, RemoteError> {
        Ok(self.snapshot(uid))
    }

    async fn add(&self, uid: &str, entry: LogEntry) -> Result<LogEntry, RemoteError> {
        let stored = LogEntry {
            id: Some(Uuid::new_v4().to_string()),
            timestamp: Some(entry.timestamp.unwrap_or_else(|| self.clock.now_millis())),
            ..entry
        };

        let mut state = self.lock();
        state
            .entries
            .entry(uid.to_string())
            .or_default()
            .push(stored.clone());
        state.notify(uid);

        Ok(stored)
    }

    async fn remove(&self, uid: &str, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        let entries = state.entries.entry(uid.to_string()).or_default();
        let before = entries.len();
        entries.retain(|e| e.id.as_deref() != Some(id));
        if entries.len() == before {
            return Err(RemoteError::NotFound(format!("entry {}", id)));
        }
        state.notify(uid);
        Ok(())
    }

    async fn subscribe(&self, uid: &str) -> Result<Subscription, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.lock();
        let id = state.next_subscriber;
        state.next_subscriber += 1;

        let snapshot = state.entries.get(uid).cloned().unwrap_or_default();
        // The receiver is held below, so this cannot fail.
        let _ = tx.send(snapshot);
        state
            .subscribers
            .entry(uid.to_string())
            .or_default()
            .push((id, tx));

        let weak = Arc::downgrade(&self.state);
        let owner = uid.to_string();
        Ok(Subscription::new(uid, rx, move || {
            if let Some(state) = weak.upgrade() {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(subscribers) = state.subscribers.get_mut(&owner) {
                    subscribers.retain(|(sub_id, _)| *sub_id != id);
                }
            }
        }))
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, RemoteError> {
        Ok(self.lock().profiles.get(uid).cloned())
    }

    async fn set_profile(&self, uid: &str, fields: ProfileUpdate) -> Result<(), RemoteError> {
        self.lock()
            .profiles
            .entry(uid.to_string())
            .or_default()
            .merge(&fields);
        Ok(())
    }

    async fn update_profile(&self, uid: &str, fields: ProfileUpdate) -> Result<(), RemoteError> {
        match self.lock().profiles.get_mut(uid) {
            Some(profile) => {
                profile.merge(&fields);
                Ok(())
            }
            None => Err(RemoteError::NotFound(format!("profile {}", uid))),
        }
    }
}
