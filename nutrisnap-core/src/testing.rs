//! Test doubles shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::clock::FixedClock;
use crate::local::{KeyValueStore, LocalStore, LocalStoreError, MemoryKeyValueStore};
use crate::models::{LogEntry, ProfileUpdate, UserProfile};
use crate::remote::{MemoryRemoteStore, RemoteError, RemoteStore, Subscription};

/// 2025-01-15T12:00:00Z
pub const NOW_MS: i64 = 1_736_942_400_000;

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::from_millis(NOW_MS))
}

/// A remote call as seen by [`RecordingRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String),
    /// uid, entry name
    Add(String, String),
    Remove(String, String),
    Subscribe(String),
    Unsubscribe(String),
    GetProfile(String),
    SetProfile(String),
    UpdateProfile(String),
}

#[derive(Debug, Default)]
struct Failures {
    list: HashSet<String>,
    add_names: HashSet<String>,
    all_adds: bool,
    removes: bool,
    subscribe: bool,
    profile: bool,
}

/// Wraps a [`MemoryRemoteStore`], recording calls and failing on demand.
#[derive(Clone)]
pub struct RecordingRemote {
    pub inner: MemoryRemoteStore,
    calls: Arc<Mutex<Vec<Call>>>,
    failures: Arc<Mutex<Failures>>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self {
            inner: MemoryRemoteStore::with_clock(fixed_clock()),
            calls: Arc::default(),
            failures: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn adds(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Add(..)))
            .collect()
    }

    pub fn fail_list_for(&self, uid: &str) {
        self.failures().list.insert(uid.to_string());
    }

    pub fn fail_add_of(&self, name: &str) {
        self.failures().add_names.insert(name.to_string());
    }

    pub fn fail_all_adds(&self, fail: bool) {
        self.failures().all_adds = fail;
    }

    pub fn fail_removes(&self, fail: bool) {
        self.failures().removes = fail;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.failures().subscribe = fail;
    }

    pub fn fail_profile(&self, fail: bool) {
        self.failures().profile = fail;
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn failures(&self) -> MutexGuard<'_, Failures> {
        self.failures.lock().unwrap()
    }
}

fn offline() -> RemoteError {
    RemoteError::Network("injected failure".to_string())
}

#[async_trait]
impl RemoteStore for RecordingRemote {
    async fn list(&self, uid: &str) -> Result<Vec<LogEntry>, RemoteError> {
        self.record(Call::List(uid.to_string()));
        if self.failures().list.contains(uid) {
            return Err(offline());
        }
        self.inner.list(uid).await
    }

    async fn add(&self, uid: &str, entry: LogEntry) -> Result<LogEntry, RemoteError> {
        self.record(Call::Add(uid.to_string(), entry.name.clone()));
        {
            let failures = self.failures();
            if failures.all_adds || failures.add_names.contains(&entry.name) {
                return Err(offline());
            }
        }
        self.inner.add(uid, entry).await
    }

    async fn remove(&self, uid: &str, id: &str) -> Result<(), RemoteError> {
        self.record(Call::Remove(uid.to_string(), id.to_string()));
        if self.failures().removes {
            return Err(offline());
        }
        self.inner.remove(uid, id).await
    }

    async fn subscribe(&self, uid: &str) -> Result<Subscription, RemoteError> {
        self.record(Call::Subscribe(uid.to_string()));
        if self.failures().subscribe {
            return Err(offline());
        }
        let calls = self.calls.clone();
        let owner = uid.to_string();
        let subscription = self.inner.subscribe(uid).await?;
        Ok(subscription.with_teardown(move || {
            calls.lock().unwrap().push(Call::Unsubscribe(owner));
        }))
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, RemoteError> {
        self.record(Call::GetProfile(uid.to_string()));
        if self.failures().profile {
            return Err(offline());
        }
        self.inner.get_profile(uid).await
    }

    async fn set_profile(&self, uid: &str, fields: ProfileUpdate) -> Result<(), RemoteError> {
        self.record(Call::SetProfile(uid.to_string()));
        if self.failures().profile {
            return Err(offline());
        }
        self.inner.set_profile(uid, fields).await
    }

    async fn update_profile(&self, uid: &str, fields: ProfileUpdate) -> Result<(), RemoteError> {
        self.record(Call::UpdateProfile(uid.to_string()));
        if self.failures().profile {
            return Err(offline());
        }
        self.inner.update_profile(uid, fields).await
    }
}

/// Memory key/value store whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyKeyValueStore {
    inner: MemoryKeyValueStore,
    fail_writes: AtomicBool,
}

impl FlakyKeyValueStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), LocalStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LocalStoreError::Unavailable("quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for FlakyKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, LocalStoreError> {
        self.check()?;
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, LocalStoreError> {
        self.inner.keys()
    }
}

/// A local store over a flaky key/value store, plus the handle to break it.
pub fn flaky_local_store() -> (LocalStore, Arc<FlakyKeyValueStore>) {
    let kv = Arc::new(FlakyKeyValueStore::default());
    (LocalStore::new(kv.clone()), kv)
}
