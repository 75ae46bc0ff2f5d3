use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use super::{KeyValueStore, LocalStoreError};
use crate::models::{LogEntry, MacroGoals};

/// Key prefix of the per-day food log buckets.
pub const BUCKET_PREFIX: &str = "foodLog-";

/// Key of the device goals record.
pub const GOALS_KEY: &str = "macroGoals";

/// Key of the uid remembered from an anonymous session.
pub const PENDING_ANON_UID_KEY: &str = "pendingAnonUid";

const BUCKET_DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage key of the bucket for `date`.
pub fn bucket_key(date: NaiveDate) -> String {
    format!("{}{}", BUCKET_PREFIX, date.format(BUCKET_DATE_FORMAT))
}

/// A bucket key found in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBucket {
    pub key: String,
    /// `None` when the key suffix is not a valid date.
    pub date: Option<NaiveDate>,
}

/// Typed access to the device's food log, goals and session marker.
#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    // ==================== Day Buckets ====================

    /// Reads the entries logged on `date`. A missing bucket is empty.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<LogEntry>, LocalStoreError> {
        self.read_bucket(&bucket_key(date))
    }

    /// Replaces the bucket for `date`.
    ///
    /// Entries without an id are given a `local-<uuid>` id; the written
    /// entries are returned.
    pub fn write_day(
        &self,
        date: NaiveDate,
        entries: &[LogEntry],
    ) -> Result<Vec<LogEntry>, LocalStoreError> {
        let entries: Vec<LogEntry> = entries
            .iter()
            .cloned()
            .map(|mut entry| {
                if entry.id.is_none() {
                    entry.id = Some(Self::new_local_id());
                }
                entry
            })
            .collect();

        let json = serde_json::to_string(&entries)?;
        self.kv.set(&bucket_key(date), &json)?;
        tracing::debug!("Wrote {} entries to {}", entries.len(), bucket_key(date));
        Ok(entries)
    }

    pub fn read_bucket(&self, key: &str) -> Result<Vec<LogEntry>, LocalStoreError> {
        match self.kv.get(key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn remove_bucket(&self, key: &str) -> Result<bool, LocalStoreError> {
        self.kv.remove(key)
    }

    /// Lists every stored day bucket.
    pub fn day_buckets(&self) -> Result<Vec<DayBucket>, LocalStoreError> {
        Ok(self
            .kv
            .keys()?
            .into_iter()
            .filter_map(|key| {
                let suffix = key.strip_prefix(BUCKET_PREFIX)?;
                let date = NaiveDate::parse_from_str(suffix, BUCKET_DATE_FORMAT).ok();
                Some(DayBucket { key, date })
            })
            .collect())
    }

    /// Generates an id for an entry persisted on this device.
    pub fn new_local_id() -> String {
        format!("local-{}", Uuid::new_v4())
    }

    // ==================== Goals ====================

    pub fn read_goals(&self) -> Result<Option<MacroGoals>, LocalStoreError> {
        match self.kv.get(GOALS_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn write_goals(&self, goals: &MacroGoals) -> Result<(), LocalStoreError> {
        let json = serde_json::to_string(goals)?;
        self.kv.set(GOALS_KEY, &json)
    }

    // ==================== Pending Anonymous Uid ====================

    pub fn pending_anon_uid(&self) -> Result<Option<String>, LocalStoreError> {
        match self.kv.get(PENDING_ANON_UID_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn set_pending_anon_uid(&self, uid: &str) -> Result<(), LocalStoreError> {
        let json = serde_json::to_string(uid)?;
        self.kv.set(PENDING_ANON_UID_KEY, &json)
    }

    pub fn clear_pending_anon_uid(&self) -> Result<(), LocalStoreError> {
        self.kv.remove(PENDING_ANON_UID_KEY).map(|_| ())
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}
